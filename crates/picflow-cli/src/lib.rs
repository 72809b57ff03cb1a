//! Shared wiring for the picflow command-line tool.

use anyhow::{Context, Result};
use picflow_core::{Config, MediaAsset, RawUpload};
use picflow_db::{connect, run_migrations, AssetStore, MemoryAssetStore, PgAssetStore};
use picflow_services::{vision, EnrichmentJob, GeocodingResolver, IngestionPipeline};
use picflow_storage::{LocalStorage, Storage};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("picflow=info")),
        )
        .init();
}

/// Truncate a string to `max_chars` characters, appending "..." if truncated.
pub fn truncate_string(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// One line of `search --format table` output.
pub fn format_asset_row(asset: &MediaAsset) -> String {
    let taken = asset
        .capture_time
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    let tags = asset.tag_names().collect::<Vec<_>>().join(",");

    format!(
        "{}  {:<16}  {:<24}  {:<24}  {}",
        asset.id,
        taken,
        truncate_string(&asset.filename, 24),
        truncate_string(asset.location.as_deref().unwrap_or("-"), 24),
        truncate_string(&tags, 60)
    )
}

/// Result of deleting several assets in one call.
#[derive(Debug, Default, Serialize)]
pub struct BatchDeleteReport {
    pub deleted: Vec<Uuid>,
    pub not_found: Vec<Uuid>,
}

/// Storage, persistence and pipeline built from one `Config`.
pub struct App {
    pub config: Config,
    pub store: Arc<dyn AssetStore>,
    pub storage: Arc<dyn Storage>,
    pub pipeline: IngestionPipeline,
    pub enrichment: Arc<EnrichmentJob>,
}

impl App {
    /// Without `DATABASE_URL` the store is in-memory and lives only as long as
    /// this process.
    pub async fn from_config(config: Config) -> Result<Self> {
        let storage: Arc<dyn Storage> = Arc::new(
            LocalStorage::new(config.storage_path.clone(), config.storage_base_url.clone())
                .await
                .context("Failed to initialize local storage")?,
        );

        let store: Arc<dyn AssetStore> = if config.database_url.is_some() {
            let pool = connect(&config).await?;
            run_migrations(&pool).await?;
            Arc::new(PgAssetStore::new(pool))
        } else {
            tracing::warn!("DATABASE_URL not set, using in-memory store (nothing is persisted)");
            Arc::new(MemoryAssetStore::new())
        };

        let geocoder = Arc::new(
            GeocodingResolver::from_config(&config.geocoding)
                .context("Failed to initialize reverse geocoding")?,
        );
        tracing::info!(providers = ?geocoder.provider_names(), "Geocoding providers ready");

        let provider = vision::from_config(&config.vision)
            .context("Failed to initialize vision provider")?;
        if provider.is_none() {
            tracing::info!("No vision credential configured, AI enrichment disabled");
        }

        let pipeline = IngestionPipeline::new(storage.clone(), geocoder);
        let enrichment = Arc::new(EnrichmentJob::new(store.clone(), storage.clone(), provider));

        Ok(Self {
            config,
            store,
            storage,
            pipeline,
            enrichment,
        })
    }

    /// Ingest one file from disk and commit it.
    pub async fn ingest_file(&self, path: &Path, owner_id: Uuid) -> Result<MediaAsset> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let draft = self
            .pipeline
            .ingest(RawUpload::new(bytes, filename, owner_id))
            .await?;
        let asset_id = self.store.create(&draft, owner_id).await?;

        self.store
            .find_asset_by_id(asset_id)
            .await?
            .with_context(|| format!("Asset {} vanished after commit", asset_id))
    }

    /// Overwrite the asset's description (the AI summary field) with user text.
    /// Returns false if the asset does not exist.
    pub async fn describe_asset(&self, id: Uuid, text: &str) -> Result<bool> {
        let text = text.trim();
        if text.is_empty() {
            anyhow::bail!("Description must not be empty");
        }
        Ok(self.store.set_ai_summary(id, text).await?)
    }

    /// Delete each asset in turn. Unknown ids are reported, not treated as errors.
    pub async fn delete_assets(&self, ids: &[Uuid]) -> Result<BatchDeleteReport> {
        let mut report = BatchDeleteReport::default();
        for &id in ids {
            match self.delete_asset(id).await? {
                Some(_) => report.deleted.push(id),
                None => report.not_found.push(id),
            }
        }
        Ok(report)
    }

    /// Delete the record, then its files. Missing files are not an error.
    pub async fn delete_asset(&self, id: Uuid) -> Result<Option<MediaAsset>> {
        let Some(asset) = self.store.delete_asset(id).await? else {
            return Ok(None);
        };

        let mut keys = vec![asset.file_key.as_str()];
        if asset.thumbnail_key != asset.file_key {
            keys.push(asset.thumbnail_key.as_str());
        }
        for key in keys {
            if let Err(e) = self.storage.delete(key).await {
                tracing::warn!(error = %e, key, "Failed to delete asset file");
            }
        }

        Ok(Some(asset))
    }
}
