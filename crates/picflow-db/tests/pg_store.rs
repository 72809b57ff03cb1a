//! PostgreSQL-backed `AssetStore` tests.
//!
//! Run with `cargo test -p picflow-db --test pg_store` (requires Docker).

mod helpers;

use helpers::{draft, names, setup_test_db, tag_rows};
use picflow_core::{GeoPoint, Tag, TagSource};
use picflow_db::AssetStore;
use uuid::Uuid;

#[tokio::test]
async fn test_create_and_find_keep_tag_order_and_coordinates() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let owner = Uuid::new_v4();
    let mut new_draft = draft(&["2025年", "7月", "下午", "2025年"], Some((2025, 7, 17)));
    new_draft.coordinates = GeoPoint::new(30.25, 120.1667);

    let id = db.store.create(&new_draft, owner).await.unwrap();
    let asset = db.store.find_asset_by_id(id).await.unwrap().unwrap();

    assert_eq!(asset.owner_id, owner);
    assert_eq!(asset.resolution.to_string(), "800x600");
    assert_eq!(asset.tag_names().collect::<Vec<_>>(), vec!["2025年", "7月", "下午"]);
    assert!(asset.tags.iter().all(|t| t.source == TagSource::Auto));
    let point = asset.coordinates.unwrap();
    assert!((point.latitude() - 30.25).abs() < 1e-9);
    assert!(db.store.find_asset_by_id(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_find_or_create_yields_one_tag() {
    let Some(db) = setup_test_db().await else {
        return;
    };

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let store = db.store.clone();
            tokio::spawn(async move { store.find_or_create_tag("日落").await.unwrap() })
        })
        .collect();
    let tags: Vec<Tag> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert!(tags.iter().all(|t| t.id == tags[0].id));
    assert_eq!(tag_rows(&db.pool, "日落").await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_order_tag_creation_does_not_fail() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let owner = Uuid::new_v4();

    for round in 0..25 {
        let forward: Vec<String> = (0..20).map(|i| format!("r{round}-auto-{i}")).collect();
        let mut backward = forward.clone();
        backward.reverse();

        let creates: Vec<_> = [forward.clone(), backward.clone()]
            .into_iter()
            .map(|tags| {
                let store = db.store.clone();
                let mut new_draft = draft(&[], None);
                new_draft.auto_tags = tags;
                tokio::spawn(async move { store.create(&new_draft, owner).await })
            })
            .collect();
        let ids: Vec<Uuid> = futures::future::join_all(creates)
            .await
            .into_iter()
            .map(|r| r.unwrap().expect("create must not surface a tag conflict"))
            .collect();

        let manual: Vec<String> = (0..20).map(|i| format!("r{round}-manual-{i}")).collect();
        let mut manual_backward = manual.clone();
        manual_backward.reverse();

        let replaces: Vec<_> = [(ids[0], manual.clone()), (ids[1], manual_backward)]
            .into_iter()
            .map(|(id, tags)| {
                let store = db.store.clone();
                tokio::spawn(async move { store.replace_manual_tags(id, &tags).await })
            })
            .collect();
        for result in futures::future::join_all(replaces).await {
            assert!(result
                .unwrap()
                .expect("replace must not surface a tag conflict"));
        }

        for name in forward.iter().chain(manual.iter()) {
            assert_eq!(tag_rows(&db.pool, name).await, 1, "duplicate tag {name}");
        }
        let first = db.store.find_asset_by_id(ids[0]).await.unwrap().unwrap();
        assert_eq!(first.tags.len(), 40);
    }
}

#[tokio::test]
async fn test_replace_manual_tags_keeps_other_provenance() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let id = db.store.create(&draft(&["2025年"], None), Uuid::new_v4()).await.unwrap();

    assert!(db
        .store
        .replace_manual_tags(id, &names(&["家人", "旅行"]))
        .await
        .unwrap());
    assert!(db
        .store
        .replace_manual_tags(id, &names(&[" 旅行 ", "2025年", ""]))
        .await
        .unwrap());

    let asset = db.store.find_asset_by_id(id).await.unwrap().unwrap();
    let tags: Vec<(&str, TagSource)> =
        asset.tags.iter().map(|t| (t.name.as_str(), t.source)).collect();
    assert_eq!(
        tags,
        vec![("2025年", TagSource::Auto), ("旅行", TagSource::Manual)]
    );
    // Detached tags stay in the global tag table.
    assert_eq!(tag_rows(&db.pool, "家人").await, 1);

    assert!(!db
        .store
        .replace_manual_tags(Uuid::new_v4(), &names(&["x"]))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_apply_enrichment_is_idempotent() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let id = db.store.create(&draft(&["日落"], None), Uuid::new_v4()).await.unwrap();
    let vision = names(&["湖泊", "日落", "游船"]);

    let added = db
        .store
        .apply_enrichment(id, &vision, Some("湖边的日落"))
        .await
        .unwrap();
    assert_eq!(added, Some(names(&["湖泊", "游船"])));

    let again = db.store.apply_enrichment(id, &vision, None).await.unwrap();
    assert_eq!(again, Some(vec![]));

    let asset = db.store.find_asset_by_id(id).await.unwrap().unwrap();
    assert_eq!(asset.ai_summary.as_deref(), Some("湖边的日落"));
    let tags: Vec<(&str, TagSource)> =
        asset.tags.iter().map(|t| (t.name.as_str(), t.source)).collect();
    assert_eq!(
        tags,
        vec![
            ("日落", TagSource::Auto),
            ("湖泊", TagSource::Ai),
            ("游船", TagSource::Ai)
        ]
    );
}

#[tokio::test]
async fn test_apply_enrichment_on_missing_asset_writes_nothing() {
    let Some(db) = setup_test_db().await else {
        return;
    };

    let result = db
        .store
        .apply_enrichment(Uuid::new_v4(), &names(&["孤儿"]), Some("无"))
        .await
        .unwrap();

    assert!(result.is_none());
    assert_eq!(tag_rows(&db.pool, "孤儿").await, 0);
}

#[tokio::test]
async fn test_search_matches_both_date_renderings() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let owner = Uuid::new_v4();
    let id = db
        .store
        .create(&draft(&["海边"], Some((2025, 7, 7))), owner)
        .await
        .unwrap();
    db.store
        .create(&draft(&["海边"], Some((2024, 12, 25))), owner)
        .await
        .unwrap();

    for query in ["2025年7月7日", "2025年7月", "2025-07-07", "7月7日"] {
        let hits = db.store.search(owner, query, 10).await.unwrap();
        assert_eq!(hits.len(), 1, "query {query}");
        assert_eq!(hits[0].id, id);
    }
    assert!(db.store.search(owner, "2025年8月", 10).await.unwrap().is_empty());
    assert_eq!(db.store.search(owner, "海边", 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_search_treats_like_wildcards_literally() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let owner = Uuid::new_v4();
    let percent = db.store.create(&draft(&["50%off"], None), owner).await.unwrap();
    db.store.create(&draft(&["50xoff"], None), owner).await.unwrap();
    let underscore = db.store.create(&draft(&["a_b"], None), owner).await.unwrap();
    db.store.create(&draft(&["axb"], None), owner).await.unwrap();

    let hits = db.store.search(owner, "50%", 10).await.unwrap();
    assert_eq!(hits.iter().map(|a| a.id).collect::<Vec<_>>(), vec![percent]);

    let hits = db.store.search(owner, "A_B", 10).await.unwrap();
    assert_eq!(hits.iter().map(|a| a.id).collect::<Vec<_>>(), vec![underscore]);
}

#[tokio::test]
async fn test_search_orders_and_scopes_by_owner() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let owner = Uuid::new_v4();
    let older = db
        .store
        .create(&draft(&["海边"], Some((2024, 7, 1))), owner)
        .await
        .unwrap();
    let newer = db
        .store
        .create(&draft(&["海边", "日落"], Some((2025, 7, 17))), owner)
        .await
        .unwrap();
    let undated = db.store.create(&draft(&["海边"], None), owner).await.unwrap();
    db.store
        .create(&draft(&["海边"], Some((2025, 8, 1))), Uuid::new_v4())
        .await
        .unwrap();

    let ids: Vec<Uuid> = db
        .store
        .search(owner, "海边", 10)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(ids, vec![newer, older, undated]);

    let both = db.store.search(owner, "海边 日落", 10).await.unwrap();
    assert_eq!(both.len(), 1);
    assert_eq!(both[0].id, newer);
    assert_eq!(db.store.search(owner, "杭州", 1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_remove_tag_and_delete_cascade() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let id = db.store.create(&draft(&["a", "b"], None), Uuid::new_v4()).await.unwrap();

    assert!(db.store.remove_tag(id, "a").await.unwrap());
    assert!(!db.store.remove_tag(id, "a").await.unwrap());
    assert!(db.store.set_ai_summary(id, "described").await.unwrap());

    let deleted = db.store.delete_asset(id).await.unwrap().unwrap();
    assert_eq!(deleted.ai_summary.as_deref(), Some("described"));
    assert_eq!(deleted.tag_names().collect::<Vec<_>>(), vec!["b"]);
    assert!(db.store.delete_asset(id).await.unwrap().is_none());
    assert!(!db.store.set_ai_summary(id, "gone").await.unwrap());

    let links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM asset_tags WHERE asset_id = $1")
        .bind(id)
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(links, 0);
    assert_eq!(helpers::tag_rows(&db.pool, "b").await, 1);
}
