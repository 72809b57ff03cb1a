//! End-to-end: ingest an upload, commit it, enrich it, find it by search.

use anyhow::Result;
use async_trait::async_trait;
use picflow_core::constants::HAS_LOCATION_TAG;
use picflow_core::{GeoPoint, RawUpload, TagSource};
use picflow_db::{AssetStore, MemoryAssetStore};
use picflow_processing::fixtures::{jpeg_with_exif, ExifFixture};
use picflow_services::geocoding::{GeocodingProvider, GeocodingResolver, PlaceLookup};
use picflow_services::vision::{VisionImage, VisionProvider};
use picflow_services::{EnrichmentJob, EnrichmentOutcome, IngestionPipeline};
use picflow_storage::{LocalStorage, Storage};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

struct DownGeocoder;

#[async_trait]
impl GeocodingProvider for DownGeocoder {
    fn name(&self) -> &str {
        "down"
    }

    async fn reverse(&self, _point: GeoPoint) -> Result<PlaceLookup> {
        anyhow::bail!("503 Service Unavailable")
    }
}

struct CityGeocoder;

#[async_trait]
impl GeocodingProvider for CityGeocoder {
    fn name(&self) -> &str {
        "city"
    }

    async fn reverse(&self, _point: GeoPoint) -> Result<PlaceLookup> {
        Ok(PlaceLookup::from_fields(["浙江省", "杭州市", "西湖区"]))
    }
}

struct FixedVision(&'static str);

#[async_trait]
impl VisionProvider for FixedVision {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn describe(&self, image: &VisionImage, _instruction: &str) -> Result<String> {
        assert!(!image.jpeg.is_empty());
        Ok(self.0.to_string())
    }
}

#[tokio::test]
async fn test_upload_to_enriched_searchable_asset() {
    let dir = TempDir::new().unwrap();
    let storage: Arc<dyn Storage> = Arc::new(
        LocalStorage::new(dir.path(), "http://localhost/static".to_string())
            .await
            .unwrap(),
    );
    let geocoder = GeocodingResolver::new()
        .with_provider(Arc::new(DownGeocoder), Duration::from_secs(1))
        .with_provider(Arc::new(CityGeocoder), Duration::from_secs(1));
    let pipeline = IngestionPipeline::new(storage.clone(), Arc::new(geocoder));
    let store = Arc::new(MemoryAssetStore::new());
    let owner = Uuid::new_v4();

    let fixture = ExifFixture {
        make: Some("Canon\0".to_string()),
        orientation: Some(1),
        date_time_original: Some("2025:07:17 19:30:00".to_string()),
        gps: Some((("N", [30, 15, 0]), ("E", [120, 10, 0]))),
    };
    let upload = RawUpload::new(jpeg_with_exif(&fixture, 1600, 1200), "lake.jpg", owner);

    let draft = pipeline.ingest(upload).await.unwrap();
    assert_eq!(draft.location.as_deref(), Some("浙江省 杭州市 西湖区"));
    assert_eq!(
        draft.auto_tags,
        vec![
            "2025年",
            "7月",
            "夜晚",
            "Canon",
            HAS_LOCATION_TAG,
            "浙江省",
            "杭州市",
            "西湖区"
        ]
    );

    let asset_id = store.create(&draft, owner).await.unwrap();

    let job = EnrichmentJob::new(
        store.clone(),
        storage.clone(),
        Some(Arc::new(FixedVision(
            r#"{"summary": "西湖傍晚的游船", "scene_tags": ["湖泊", "杭州市"], "object_tags": ["游船"], "style_tags": []}"#,
        ))),
    );
    let outcome = job.run(asset_id, &draft.file_key).await;
    assert_eq!(
        outcome,
        EnrichmentOutcome::Applied {
            added: vec!["湖泊".to_string(), "游船".to_string()],
            summary: Some("西湖傍晚的游船".to_string()),
        }
    );

    let asset = store.find_asset_by_id(asset_id).await.unwrap().unwrap();
    assert_eq!(asset.resolution.to_string(), "1600x1200");
    assert!(asset
        .tags
        .iter()
        .any(|t| t.name == "游船" && t.source == TagSource::Ai));
    assert!(storage.exists(&asset.thumbnail_key).await.unwrap());

    let hits = store.search(owner, "2025年7月 游船", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, asset_id);

    let misses = store.search(owner, "游船 上海", 10).await.unwrap();
    assert!(misses.is_empty());
}
