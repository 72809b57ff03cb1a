//! Vision enrichment.
//!
//! Runs after an asset has been committed. Sends a bounded JPEG copy to the
//! vision model and merges the returned tags and summary into the stored asset.
//! The job never fails from the caller's point of view: every problem ends in
//! `EnrichmentOutcome::Skipped` and a log line. It is not retried.

use picflow_core::constants::{VISION_JPEG_QUALITY, VISION_MAX_EDGE};
use picflow_db::AssetStore;
use picflow_processing::encode_bounded_jpeg;
use picflow_storage::Storage;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::vision::{VisionAnalysis, VisionImage, VisionProvider, SYSTEM_INSTRUCTION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoCredential,
    AssetMissing,
    FileUnavailable,
    EncodeFailed,
    ProviderFailed,
    InvalidResponse,
    EmptyResponse,
    StoreFailed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::NoCredential => "no vision credential configured",
            SkipReason::AssetMissing => "asset no longer exists",
            SkipReason::FileUnavailable => "image file unavailable",
            SkipReason::EncodeFailed => "image could not be re-encoded",
            SkipReason::ProviderFailed => "vision provider call failed",
            SkipReason::InvalidResponse => "vision response rejected",
            SkipReason::EmptyResponse => "vision response had no tags or summary",
            SkipReason::StoreFailed => "asset store error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentOutcome {
    Applied {
        /// Tags newly associated by this run.
        added: Vec<String>,
        summary: Option<String>,
    },
    Skipped(SkipReason),
}

/// Shared by every queued job; cheap to clone behind an `Arc`.
pub struct EnrichmentJob {
    store: Arc<dyn AssetStore>,
    storage: Arc<dyn Storage>,
    provider: Option<Arc<dyn VisionProvider>>,
}

impl EnrichmentJob {
    pub fn new(
        store: Arc<dyn AssetStore>,
        storage: Arc<dyn Storage>,
        provider: Option<Arc<dyn VisionProvider>>,
    ) -> Self {
        Self {
            store,
            storage,
            provider,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    #[tracing::instrument(skip_all, fields(asset_id = %asset_id, file_key))]
    pub async fn run(&self, asset_id: Uuid, file_key: &str) -> EnrichmentOutcome {
        let started = Instant::now();
        let outcome = self.try_run(asset_id, file_key).await;

        match &outcome {
            EnrichmentOutcome::Applied { added, summary } => tracing::info!(
                added = added.len(),
                has_summary = summary.is_some(),
                duration_ms = started.elapsed().as_millis() as u64,
                "Vision enrichment applied"
            ),
            EnrichmentOutcome::Skipped(SkipReason::NoCredential) => {
                tracing::debug!("Vision enrichment disabled, skipping")
            }
            EnrichmentOutcome::Skipped(reason) => tracing::warn!(
                reason = %reason,
                duration_ms = started.elapsed().as_millis() as u64,
                "Vision enrichment skipped"
            ),
        }

        outcome
    }

    async fn try_run(&self, asset_id: Uuid, file_key: &str) -> EnrichmentOutcome {
        let Some(provider) = &self.provider else {
            return EnrichmentOutcome::Skipped(SkipReason::NoCredential);
        };

        match self.store.find_asset_by_id(asset_id).await {
            Ok(Some(_)) => {}
            Ok(None) => return EnrichmentOutcome::Skipped(SkipReason::AssetMissing),
            Err(e) => {
                tracing::error!(error = %e, "Failed to load asset for enrichment");
                return EnrichmentOutcome::Skipped(SkipReason::StoreFailed);
            }
        }

        let data = match self.storage.get(file_key).await {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(error = %e, file_key, "Failed to read image for enrichment");
                return EnrichmentOutcome::Skipped(SkipReason::FileUnavailable);
            }
        };

        let image = match tokio::task::spawn_blocking(move || {
            encode_bounded_jpeg(&data, VISION_MAX_EDGE, VISION_JPEG_QUALITY)
        })
        .await
        {
            Ok(Ok(jpeg)) => VisionImage::new(jpeg),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Failed to re-encode image for vision");
                return EnrichmentOutcome::Skipped(SkipReason::EncodeFailed);
            }
            Err(e) => {
                tracing::error!(error = %e, "Vision encode task panicked");
                return EnrichmentOutcome::Skipped(SkipReason::EncodeFailed);
            }
        };

        let reply = match provider.describe(&image, SYSTEM_INSTRUCTION).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(provider = provider.name(), error = %e, "Vision provider call failed");
                return EnrichmentOutcome::Skipped(SkipReason::ProviderFailed);
            }
        };

        let analysis = match VisionAnalysis::parse(&reply) {
            Ok(analysis) if analysis.is_empty() => {
                return EnrichmentOutcome::Skipped(SkipReason::EmptyResponse)
            }
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::warn!(error = %e, "Vision response rejected");
                return EnrichmentOutcome::Skipped(SkipReason::InvalidResponse);
            }
        };

        let VisionAnalysis { summary, tags } = analysis;
        match self
            .store
            .apply_enrichment(asset_id, &tags, summary.as_deref())
            .await
        {
            Ok(Some(added)) => EnrichmentOutcome::Applied { added, summary },
            Ok(None) => EnrichmentOutcome::Skipped(SkipReason::AssetMissing),
            Err(e) => {
                tracing::error!(error = %e, "Failed to store vision enrichment");
                EnrichmentOutcome::Skipped(SkipReason::StoreFailed)
            }
        }
    }
}
