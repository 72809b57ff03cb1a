//! In-memory `AssetStore`
//!
//! Same observable behaviour as `PgAssetStore`, kept behind one mutex. Used by the
//! pipeline tests and by the CLI when no `DATABASE_URL` is configured.

use super::search::SearchKeyword;
use super::store::AssetStore;
use async_trait::async_trait;
use chrono::Utc;
use picflow_core::models::AssetTag;
use picflow_core::{AppError, IngestionDraft, MediaAsset, Tag, TagSource};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    assets: HashMap<Uuid, MediaAsset>,
    tags_by_name: HashMap<String, Tag>,
    tag_names_by_id: HashMap<Uuid, String>,
}

impl Inner {
    fn find_or_create_tag(&mut self, name: &str) -> Tag {
        if let Some(tag) = self.tags_by_name.get(name) {
            return tag.clone();
        }
        let tag = Tag {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        self.tag_names_by_id.insert(tag.id, tag.name.clone());
        self.tags_by_name.insert(tag.name.clone(), tag.clone());
        tag
    }

    fn associate(&mut self, asset_id: Uuid, tag_id: Uuid, source: TagSource) -> Result<bool, AppError> {
        let name = self
            .tag_names_by_id
            .get(&tag_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("tag {}", tag_id)))?;
        let asset = self
            .assets
            .get_mut(&asset_id)
            .ok_or_else(|| AppError::NotFound(format!("media asset {}", asset_id)))?;

        if asset.has_tag(&name) {
            return Ok(false);
        }
        asset.tags.push(AssetTag { name, source });
        Ok(true)
    }
}

/// Mutex-guarded asset store. Cloning shares the same data.
#[derive(Clone, Default)]
pub struct MemoryAssetStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))
    }

    /// Number of distinct tags ever created.
    pub fn tag_count(&self) -> usize {
        self.lock().map(|inner| inner.tags_by_name.len()).unwrap_or(0)
    }
}

fn newest_first(a: &MediaAsset, b: &MediaAsset) -> Ordering {
    match (a.capture_time, b.capture_time) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| b.uploaded_at.cmp(&a.uploaded_at))
}

fn keyword_matches(keyword: &SearchKeyword, asset: &MediaAsset) -> bool {
    asset.tag_names().any(|name| keyword.matches_text(name))
        || asset
            .ai_summary
            .as_deref()
            .is_some_and(|s| keyword.matches_text(s))
        || asset
            .location
            .as_deref()
            .is_some_and(|l| keyword.matches_text(l))
        || asset
            .capture_time
            .as_ref()
            .is_some_and(|t| keyword.matches_date(t))
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn create(&self, draft: &IngestionDraft, owner_id: Uuid) -> Result<Uuid, AppError> {
        let mut inner = self.lock()?;
        let id = Uuid::new_v4();

        inner.assets.insert(
            id,
            MediaAsset {
                id,
                owner_id,
                filename: draft.filename.clone(),
                file_key: draft.file_key.clone(),
                thumbnail_key: draft.thumbnail_key.clone(),
                resolution: draft.resolution,
                capture_time: draft.capture_time,
                location: draft.location.clone(),
                coordinates: draft.coordinates,
                ai_summary: None,
                uploaded_at: Utc::now(),
                tags: Vec::new(),
            },
        );

        for name in &draft.auto_tags {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let tag = inner.find_or_create_tag(name);
            inner.associate(id, tag.id, TagSource::Auto)?;
        }
        Ok(id)
    }

    async fn find_asset_by_id(&self, id: Uuid) -> Result<Option<MediaAsset>, AppError> {
        Ok(self.lock()?.assets.get(&id).cloned())
    }

    async fn find_or_create_tag(&self, name: &str) -> Result<Tag, AppError> {
        Ok(self.lock()?.find_or_create_tag(name))
    }

    async fn associate(
        &self,
        asset_id: Uuid,
        tag_id: Uuid,
        source: TagSource,
    ) -> Result<bool, AppError> {
        self.lock()?.associate(asset_id, tag_id, source)
    }

    async fn list_associated_tag_names(&self, asset_id: Uuid) -> Result<HashSet<String>, AppError> {
        Ok(self
            .lock()?
            .assets
            .get(&asset_id)
            .map(|a| a.tag_names().map(str::to_string).collect())
            .unwrap_or_default())
    }

    async fn set_ai_summary(&self, asset_id: Uuid, summary: &str) -> Result<bool, AppError> {
        match self.lock()?.assets.get_mut(&asset_id) {
            Some(asset) => {
                asset.ai_summary = Some(summary.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn replace_manual_tags(&self, asset_id: Uuid, names: &[String]) -> Result<bool, AppError> {
        let mut inner = self.lock()?;
        match inner.assets.get_mut(&asset_id) {
            Some(asset) => asset.tags.retain(|t| t.source != TagSource::Manual),
            None => return Ok(false),
        }

        for name in names {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let tag = inner.find_or_create_tag(name);
            inner.associate(asset_id, tag.id, TagSource::Manual)?;
        }
        Ok(true)
    }

    async fn apply_enrichment(
        &self,
        asset_id: Uuid,
        names: &[String],
        summary: Option<&str>,
    ) -> Result<Option<Vec<String>>, AppError> {
        let mut inner = self.lock()?;
        let Some(asset) = inner.assets.get(&asset_id) else {
            return Ok(None);
        };
        let fresh: Vec<String> = names
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty() && !asset.has_tag(n))
            .map(str::to_string)
            .collect();

        let mut added = Vec::with_capacity(fresh.len());
        for name in fresh {
            let tag = inner.find_or_create_tag(&name);
            if inner.associate(asset_id, tag.id, TagSource::Ai)? {
                added.push(name);
            }
        }
        if let (Some(summary), Some(asset)) = (summary, inner.assets.get_mut(&asset_id)) {
            asset.ai_summary = Some(summary.to_string());
        }
        Ok(Some(added))
    }

    async fn remove_tag(&self, asset_id: Uuid, name: &str) -> Result<bool, AppError> {
        let mut inner = self.lock()?;
        let Some(asset) = inner.assets.get_mut(&asset_id) else {
            return Ok(false);
        };
        let before = asset.tags.len();
        asset.tags.retain(|t| t.name != name);
        Ok(asset.tags.len() < before)
    }

    async fn delete_asset(&self, id: Uuid) -> Result<Option<MediaAsset>, AppError> {
        Ok(self.lock()?.assets.remove(&id))
    }

    async fn search(
        &self,
        owner_id: Uuid,
        query: &str,
        limit: i64,
    ) -> Result<Vec<MediaAsset>, AppError> {
        let keywords = SearchKeyword::parse_query(query);
        let inner = self.lock()?;

        let mut results: Vec<MediaAsset> = inner
            .assets
            .values()
            .filter(|a| a.owner_id == owner_id)
            .filter(|a| keywords.iter().all(|k| keyword_matches(k, a)))
            .cloned()
            .collect();

        results.sort_by(newest_first);
        results.truncate(limit.max(0) as usize);
        Ok(results)
    }
}
