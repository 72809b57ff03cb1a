//! Persistence trait
//!
//! Everything outside this crate talks to the database through `AssetStore`, so the
//! pipeline can be exercised against `MemoryAssetStore` without PostgreSQL.

use async_trait::async_trait;
use picflow_core::{AppError, IngestionDraft, MediaAsset, Tag, TagSource};
use std::collections::HashSet;
use uuid::Uuid;

/// Media asset and tag persistence.
///
/// Tag names are matched exactly (case-sensitive). Implementations must make
/// `find_or_create_tag` safe under concurrent callers: two racing calls for one
/// name observe the same tag.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Insert a new asset from an ingestion draft and attach its auto tags
    /// (provenance `auto`). Returns the new asset id.
    async fn create(&self, draft: &IngestionDraft, owner_id: Uuid) -> Result<Uuid, AppError>;

    /// Load an asset with its tags.
    async fn find_asset_by_id(&self, id: Uuid) -> Result<Option<MediaAsset>, AppError>;

    /// Return the tag with this exact name, creating it if needed.
    async fn find_or_create_tag(&self, name: &str) -> Result<Tag, AppError>;

    /// Attach a tag to an asset. Re-attaching an existing pair is a no-op that keeps
    /// the first provenance. Returns whether a new association was made.
    async fn associate(
        &self,
        asset_id: Uuid,
        tag_id: Uuid,
        source: TagSource,
    ) -> Result<bool, AppError>;

    /// Names of every tag attached to the asset, regardless of provenance.
    async fn list_associated_tag_names(&self, asset_id: Uuid) -> Result<HashSet<String>, AppError>;

    /// Store the AI summary. Returns false if the asset no longer exists.
    async fn set_ai_summary(&self, asset_id: Uuid, summary: &str) -> Result<bool, AppError>;

    /// Replace the asset's manual tags with `names` (trimmed, empties skipped).
    /// Auto and AI associations are left alone, and a name that is already attached
    /// under another provenance keeps that provenance. Returns false if the asset
    /// does not exist.
    async fn replace_manual_tags(&self, asset_id: Uuid, names: &[String]) -> Result<bool, AppError>;

    /// Merge one vision result into an asset as a single unit: every name not yet
    /// attached is associated with provenance `ai`, and `summary`, when present,
    /// replaces the AI summary. Either all of it lands or none of it does.
    ///
    /// Returns the names that were newly attached, in input order, or `None` if the
    /// asset no longer exists.
    async fn apply_enrichment(
        &self,
        asset_id: Uuid,
        names: &[String],
        summary: Option<&str>,
    ) -> Result<Option<Vec<String>>, AppError>;

    /// Detach one tag, whatever its provenance. Returns whether anything was removed.
    async fn remove_tag(&self, asset_id: Uuid, name: &str) -> Result<bool, AppError>;

    /// Delete an asset and its associations, returning the deleted record so the
    /// caller can remove its files.
    async fn delete_asset(&self, id: Uuid) -> Result<Option<MediaAsset>, AppError>;

    /// Keyword search over one owner's assets.
    ///
    /// Whitespace-separated keywords are ANDed; each must match (case-insensitive
    /// substring) a tag name, the AI summary or the location, or, for date-like
    /// keywords, the capture date. Newest capture first, then newest upload.
    async fn search(
        &self,
        owner_id: Uuid,
        query: &str,
        limit: i64,
    ) -> Result<Vec<MediaAsset>, AppError>;
}
