//! Picflow Core Library
//!
//! This crate provides the domain models, error types, and configuration shared by
//! every picflow component: the ingestion pipeline, the enrichment worker, and the
//! persistence and storage backends.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::{Config, GeocodingConfig, VisionConfig, VisionProviderKind};
pub use error::AppError;
pub use models::{
    AssetTag, GeoPoint, IngestionDraft, MediaAsset, RawUpload, Resolution, Tag, TagSource,
};
