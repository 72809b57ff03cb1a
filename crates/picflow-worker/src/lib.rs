//! Picflow background worker
//!
//! Vision enrichment runs after the upload that created an asset has returned.
//! `EnrichmentQueue` accepts requests without blocking the caller and hands them
//! to an `EnrichmentHandler` on a bounded pool of tasks.

pub mod context;
pub mod queue;

pub use context::EnrichmentHandler;
pub use queue::{EnrichmentQueue, EnrichmentQueueConfig, EnrichmentRequest};
