//! Offline nearest-place lookup over a CSV gazetteer.
//!
//! Rows are `lat,lon,name,admin1,admin2,cc` (the reverse_geocoder / GeoNames
//! cities layout). A header row is detected and skipped. Fields may be quoted.

use anyhow::{Context, Result};
use async_trait::async_trait;
use picflow_core::GeoPoint;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use super::{GeocodingProvider, PlaceLookup};

#[derive(Debug, Clone, PartialEq)]
pub struct OfflinePlace {
    pub point: GeoPoint,
    pub name: String,
    pub admin1: String,
    pub admin2: String,
    pub country_code: String,
}

pub struct OfflineGeocoder {
    places: Arc<Vec<OfflinePlace>>,
}

impl OfflineGeocoder {
    pub fn new(places: Vec<OfflinePlace>) -> Self {
        Self {
            places: Arc::new(places),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open geocoding index {}", path.display()))?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Parse an index. Malformed rows are skipped; an index with no usable rows
    /// is an error.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut places = Vec::new();
        let mut skipped = 0usize;

        for (line_no, line) in reader.lines().enumerate() {
            let line = line.context("Failed to read geocoding index")?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let fields = split_csv_line(line);
            match parse_row(&fields) {
                Some(place) => places.push(place),
                // Header
                None if line_no == 0 => {}
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            tracing::warn!(skipped, "Skipped malformed geocoding index rows");
        }
        if places.is_empty() {
            anyhow::bail!("Geocoding index contains no places");
        }

        Ok(Self::new(places))
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    pub fn nearest(&self, point: &GeoPoint) -> Option<&OfflinePlace> {
        nearest_in(&self.places, point)
    }
}

fn nearest_in<'a>(places: &'a [OfflinePlace], point: &GeoPoint) -> Option<&'a OfflinePlace> {
    places.iter().min_by(|a, b| {
        point
            .haversine_km(&a.point)
            .total_cmp(&point.haversine_km(&b.point))
    })
}

fn parse_row(fields: &[String]) -> Option<OfflinePlace> {
    if fields.len() < 3 {
        return None;
    }
    let lat: f64 = fields[0].trim().parse().ok()?;
    let lon: f64 = fields[1].trim().parse().ok()?;
    let field = |i: usize| fields.get(i).map(|f| f.trim().to_string()).unwrap_or_default();

    Some(OfflinePlace {
        point: GeoPoint::new(lat, lon)?,
        name: field(2),
        admin1: field(3),
        admin2: field(4),
        country_code: field(5),
    })
}

fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

#[async_trait]
impl GeocodingProvider for OfflineGeocoder {
    fn name(&self) -> &str {
        "offline"
    }

    async fn reverse(&self, point: GeoPoint) -> Result<PlaceLookup> {
        // A linear scan over a large gazetteer is CPU-bound.
        let places = Arc::clone(&self.places);
        let lookup = tokio::task::spawn_blocking(move || {
            nearest_in(&places, &point)
                .map(|place| {
                    PlaceLookup::from_fields([&place.admin1, &place.admin2, &place.name])
                })
                .unwrap_or(PlaceLookup::NotFound)
        })
        .await
        .context("Offline geocoding task failed")?;

        Ok(lookup)
    }
}
