//! Nominatim-compatible reverse geocoding client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use picflow_core::GeoPoint;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{GeocodingProvider, PlaceLookup};

/// Address keys per hierarchy level, coarse to fine. The first key present at
/// each level is used.
const ADDRESS_HIERARCHY: &[&[&str]] = &[
    &["country"],
    &["state", "province", "region"],
    &["city", "municipality", "county", "district", "city_district"],
    &["town", "suburb"],
    &["village", "hamlet", "neighbourhood"],
    &["amenity", "tourism", "leisure", "shop", "building", "road"],
];

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    address: Option<Map<String, Value>>,
    #[serde(default)]
    error: Option<String>,
}

pub struct NominatimClient {
    http_client: reqwest::Client,
    base_url: String,
    language: String,
}

impl NominatimClient {
    pub fn new(base_url: &str, user_agent: &str, language: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .build()
            .context("Failed to create HTTP client for reverse geocoding")?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            language: language.to_string(),
        })
    }

    fn address_fields(address: &Map<String, Value>) -> Vec<String> {
        ADDRESS_HIERARCHY
            .iter()
            .filter_map(|level| {
                level
                    .iter()
                    .filter_map(|key| address.get(*key).and_then(Value::as_str))
                    .map(str::trim)
                    .find(|v| !v.is_empty())
                    .map(str::to_string)
            })
            .collect()
    }
}

#[async_trait]
impl GeocodingProvider for NominatimClient {
    fn name(&self) -> &str {
        "nominatim"
    }

    async fn reverse(&self, point: GeoPoint) -> Result<PlaceLookup> {
        let lat = point.latitude().to_string();
        let lon = point.longitude().to_string();

        let response = self
            .http_client
            .get(format!("{}/reverse", self.base_url))
            .query(&[
                ("format", "jsonv2"),
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("zoom", "18"),
                ("addressdetails", "1"),
                ("accept-language", self.language.as_str()),
            ])
            .send()
            .await
            .context("Failed to send reverse geocoding request")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "Reverse geocoding request failed: {} - {}",
                status,
                error_text
            ));
        }

        let parsed: ReverseResponse = response
            .json()
            .await
            .context("Failed to parse reverse geocoding response")?;

        if let Some(error) = parsed.error {
            tracing::debug!(error = %error, "Geocoder has no place for point");
            return Ok(PlaceLookup::NotFound);
        }

        Ok(parsed
            .address
            .map(|address| PlaceLookup::from_fields(Self::address_fields(&address)))
            .unwrap_or(PlaceLookup::NotFound))
    }
}
