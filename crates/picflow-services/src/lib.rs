//! Picflow Services Library
//!
//! The photo pipeline proper:
//!
//! - `ingest`: the synchronous upload path (persist, extract, geocode, tag, normalize)
//! - `enrichment`: the deferred vision step that merges AI tags into a stored asset
//! - `geocoding`: the reverse-geocoding provider chain
//! - `vision`: vision model clients and response parsing

pub mod enrichment;
pub mod geocoding;
pub mod ingest;
pub mod vision;

// Re-export commonly used types
pub use enrichment::{EnrichmentJob, EnrichmentOutcome, SkipReason};
pub use geocoding::{GeocodingProvider, GeocodingResolver, PlaceLookup, ResolvedLocation};
pub use ingest::IngestionPipeline;
pub use vision::{VisionAnalysis, VisionImage, VisionProvider};
