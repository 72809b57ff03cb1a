//! Upload ingestion.
//!
//! `IngestionPipeline::ingest` turns an upload into an `IngestionDraft`. Every
//! step after the raw bytes are stored degrades instead of failing: no metadata,
//! no place name, or no normalized copy still yields a usable draft.

use picflow_core::constants::{ORIGINALS_PREFIX, THUMBNAILS_PREFIX};
use picflow_core::{AppError, IngestionDraft, RawUpload, Resolution};
use picflow_processing::{normalize, synthesize_tags, ExifMetadata, NormalizedImage};
use picflow_storage::{derived_key, raw_key, Storage};
use std::sync::Arc;

use crate::geocoding::GeocodingResolver;

pub struct IngestionPipeline {
    storage: Arc<dyn Storage>,
    geocoder: Arc<GeocodingResolver>,
}

struct StoredImage {
    file_key: String,
    thumbnail_key: String,
    resolution: Resolution,
}

impl IngestionPipeline {
    pub fn new(storage: Arc<dyn Storage>, geocoder: Arc<GeocodingResolver>) -> Self {
        Self { storage, geocoder }
    }

    /// Build a draft for one upload.
    ///
    /// Fails only when the raw bytes cannot be written to storage.
    #[tracing::instrument(
        skip(self, upload),
        fields(owner_id = %upload.owner_id, filename = %upload.filename, size = upload.bytes.len())
    )]
    pub async fn ingest(&self, upload: RawUpload) -> Result<IngestionDraft, AppError> {
        let extension = upload.extension();
        let RawUpload {
            bytes,
            filename,
            owner_id,
        } = upload;

        let raw_key = raw_key(owner_id, extension.as_deref());
        self.storage
            .put(&raw_key, bytes.clone(), content_type_for(extension.as_deref()))
            .await
            .map_err(|e| AppError::Storage(format!("Failed to store upload: {}", e)))?;

        // Orientation must be read before the pixels are rotated.
        let metadata = ExifMetadata::extract(&bytes);
        let capture_time = metadata.capture_time();
        let coordinates = metadata.gps.as_ref().and_then(|gps| gps.to_geo_point());

        let resolved = self.geocoder.resolve(coordinates).await;
        let place_tags = resolved
            .as_ref()
            .map(|r| r.tags.as_slice())
            .unwrap_or_default();
        let auto_tags = synthesize_tags(&metadata, capture_time, place_tags);

        let stored = match self.normalize_and_store(&raw_key, bytes, metadata.orientation).await {
            Some(stored) => stored,
            None => StoredImage {
                file_key: raw_key.clone(),
                thumbnail_key: raw_key.clone(),
                resolution: Resolution::UNSET,
            },
        };

        tracing::info!(
            file_key = %stored.file_key,
            resolution = %stored.resolution,
            has_location = resolved.is_some(),
            tag_count = auto_tags.len(),
            "Upload ingested"
        );

        Ok(IngestionDraft {
            filename,
            file_key: stored.file_key,
            thumbnail_key: stored.thumbnail_key,
            resolution: stored.resolution,
            capture_time,
            location: resolved.map(|r| r.description),
            coordinates,
            auto_tags,
        })
    }

    /// Decode, correct orientation, and persist original plus thumbnail.
    /// `None` means the raw file stays the only copy.
    async fn normalize_and_store(
        &self,
        raw_key: &str,
        bytes: Vec<u8>,
        orientation: u8,
    ) -> Option<StoredImage> {
        let normalized = match tokio::task::spawn_blocking(move || normalize(&bytes, orientation)).await
        {
            Ok(Ok(normalized)) => normalized,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, raw_key, "Image normalization failed, keeping raw file");
                return None;
            }
            Err(e) => {
                tracing::error!(error = %e, raw_key, "Image normalization task panicked");
                return None;
            }
        };

        let NormalizedImage {
            original,
            format,
            thumbnail,
            resolution,
        } = normalized;

        let file_key = derived_key(ORIGINALS_PREFIX, raw_key, format.extension());
        let thumbnail_key = derived_key(THUMBNAILS_PREFIX, raw_key, "jpg");

        if let Err(e) = self
            .storage
            .put(&file_key, original, format.content_type())
            .await
        {
            tracing::warn!(error = %e, file_key = %file_key, "Failed to store normalized image");
            return None;
        }

        if let Err(e) = self.storage.put(&thumbnail_key, thumbnail, "image/jpeg").await {
            tracing::warn!(error = %e, thumbnail_key = %thumbnail_key, "Failed to store thumbnail");
            if let Err(e) = self.storage.delete(&file_key).await {
                tracing::warn!(error = %e, file_key = %file_key, "Failed to clean up normalized image");
            }
            return None;
        }

        if let Err(e) = self.storage.delete(raw_key).await {
            tracing::warn!(error = %e, raw_key, "Failed to remove raw upload after normalization");
        }

        Some(StoredImage {
            file_key,
            thumbnail_key,
            resolution,
        })
    }
}

fn content_type_for(extension: Option<&str>) -> &'static str {
    match extension {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("heic") | Some("heif") => "image/heic",
        _ => "application/octet-stream",
    }
}
