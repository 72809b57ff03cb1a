//! Enrichment handler trait
//!
//! The queue owns an `Arc` of the handler and clones it into every spawned job,
//! so a job never borrows anything from the request that submitted it.

use async_trait::async_trait;
use std::sync::Arc;

use picflow_services::EnrichmentJob;

use crate::queue::EnrichmentRequest;

#[async_trait]
pub trait EnrichmentHandler: Send + Sync {
    /// Process one request. Outcomes are the handler's business; the queue only
    /// schedules.
    async fn handle(self: Arc<Self>, request: EnrichmentRequest);
}

#[async_trait]
impl EnrichmentHandler for EnrichmentJob {
    async fn handle(self: Arc<Self>, request: EnrichmentRequest) {
        self.run(request.asset_id, &request.file_key).await;
    }
}
