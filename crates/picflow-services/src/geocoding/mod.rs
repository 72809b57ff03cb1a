//! Reverse geocoding.
//!
//! `GeocodingResolver` walks an ordered list of providers, each under its own
//! deadline, and returns the first place it finds. When every provider comes up
//! empty the coordinate itself becomes the description.

mod nominatim;
mod offline;

pub use nominatim::NominatimClient;
pub use offline::{OfflineGeocoder, OfflinePlace};

use anyhow::Result;
use async_trait::async_trait;
use picflow_core::config::GeocodingConfig;
use picflow_core::GeoPoint;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Answer from a single provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceLookup {
    Found {
        description: String,
        tags: Vec<String>,
    },
    NotFound,
}

impl PlaceLookup {
    /// Build a lookup from administrative fields ordered coarse to fine.
    ///
    /// Blank fields are skipped. The description drops consecutive repeats
    /// (`"北京市 北京市 朝阳区"` becomes `"北京市 朝阳区"`); tags drop every repeat.
    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parts: Vec<String> = Vec::new();
        let mut tags: Vec<String> = Vec::new();

        for field in fields {
            let field = field.as_ref().trim();
            if field.is_empty() {
                continue;
            }
            if parts.last().map(|last| last != field).unwrap_or(true) {
                parts.push(field.to_string());
            }
            if !tags.iter().any(|t| t == field) {
                tags.push(field.to_string());
            }
        }

        if parts.is_empty() {
            return PlaceLookup::NotFound;
        }

        PlaceLookup::Found {
            description: parts.join(" "),
            tags,
        }
    }
}

/// Final result of the provider chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    pub description: String,
    /// Empty when the description is the coordinate fallback.
    pub tags: Vec<String>,
}

/// A single reverse-geocoding backend.
#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Errors are reported to the resolver, which treats them as "no answer".
    async fn reverse(&self, point: GeoPoint) -> Result<PlaceLookup>;
}

struct ProviderSlot {
    provider: Arc<dyn GeocodingProvider>,
    timeout: Duration,
}

/// Ordered provider chain; the first `Found` wins.
#[derive(Default)]
pub struct GeocodingResolver {
    providers: Vec<ProviderSlot>,
}

impl GeocodingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider to the end of the chain.
    pub fn with_provider(mut self, provider: Arc<dyn GeocodingProvider>, timeout: Duration) -> Self {
        self.providers.push(ProviderSlot { provider, timeout });
        self
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|slot| slot.provider.name()).collect()
    }

    /// Online provider first, offline index second. An offline index that fails
    /// to load is logged and left out of the chain.
    pub fn from_config(config: &GeocodingConfig) -> Result<Self> {
        let mut resolver = Self::new();

        if let Some(url) = &config.online_url {
            let client = NominatimClient::new(url, &config.user_agent, &config.language)?;
            resolver = resolver.with_provider(Arc::new(client), config.online_timeout);
        }

        if let Some(path) = &config.offline_index_path {
            match OfflineGeocoder::load(path) {
                Ok(index) => {
                    tracing::info!(
                        path = %path.display(),
                        places = index.len(),
                        "Loaded offline geocoding index"
                    );
                    resolver = resolver.with_provider(Arc::new(index), config.offline_timeout);
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        path = %path.display(),
                        "Offline geocoding index unavailable, continuing without it"
                    );
                }
            }
        }

        Ok(resolver)
    }

    /// Resolve a point to a place. Returns `None` only when there is no point.
    pub async fn resolve(&self, point: Option<GeoPoint>) -> Option<ResolvedLocation> {
        let point = point?;

        for slot in &self.providers {
            let provider = slot.provider.name();
            let started = Instant::now();

            match tokio::time::timeout(slot.timeout, slot.provider.reverse(point)).await {
                Ok(Ok(PlaceLookup::Found { description, tags })) => {
                    tracing::debug!(
                        provider,
                        duration_ms = started.elapsed().as_millis() as u64,
                        location = %description,
                        "Reverse geocoding succeeded"
                    );
                    return Some(ResolvedLocation { description, tags });
                }
                Ok(Ok(PlaceLookup::NotFound)) => {
                    tracing::debug!(provider, "Reverse geocoding returned no place");
                }
                Ok(Err(e)) => {
                    tracing::warn!(provider, error = %e, "Reverse geocoding failed");
                }
                Err(_) => {
                    tracing::warn!(
                        provider,
                        timeout_ms = slot.timeout.as_millis() as u64,
                        "Reverse geocoding timed out"
                    );
                }
            }
        }

        Some(ResolvedLocation {
            description: point.to_coordinate_string(),
            tags: Vec::new(),
        })
    }
}
