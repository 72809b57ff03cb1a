use super::search::{like_pattern, SearchKeyword};
use super::store::AssetStore;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use picflow_core::models::AssetTag;
use picflow_core::{AppError, GeoPoint, IngestionDraft, MediaAsset, Resolution, Tag, TagSource};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use uuid::Uuid;

const ASSET_COLUMNS: &str = "id, owner_id, filename, file_key, thumbnail_key, resolution, \
     capture_time, location, latitude, longitude, ai_summary, uploaded_at";

#[derive(sqlx::FromRow)]
struct AssetRow {
    id: Uuid,
    owner_id: Uuid,
    filename: String,
    file_key: String,
    thumbnail_key: String,
    resolution: String,
    capture_time: Option<NaiveDateTime>,
    location: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    ai_summary: Option<String>,
    uploaded_at: DateTime<Utc>,
}

impl AssetRow {
    fn into_asset(self, tags: Vec<AssetTag>) -> MediaAsset {
        let coordinates = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => GeoPoint::new(lat, lon),
            _ => None,
        };
        MediaAsset {
            id: self.id,
            owner_id: self.owner_id,
            filename: self.filename,
            file_key: self.file_key,
            thumbnail_key: self.thumbnail_key,
            resolution: Resolution::parse(&self.resolution),
            capture_time: self.capture_time,
            location: self.location,
            coordinates,
            ai_summary: self.ai_summary,
            uploaded_at: self.uploaded_at,
            tags,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AssetTagRow {
    asset_id: Uuid,
    name: String,
    source: TagSource,
}

/// PostgreSQL-backed asset store
#[derive(Clone)]
pub struct PgAssetStore {
    pool: PgPool,
}

impl PgAssetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_asset(
        &self,
        id: Uuid,
        draft: &IngestionDraft,
        owner_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO media_assets
                (id, owner_id, filename, file_key, thumbnail_key, resolution,
                 capture_time, location, latitude, longitude)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(&draft.filename)
        .bind(&draft.file_key)
        .bind(&draft.thumbnail_key)
        .bind(draft.resolution.to_string())
        .bind(draft.capture_time)
        .bind(&draft.location)
        .bind(draft.coordinates.map(|p| p.latitude()))
        .bind(draft.coordinates.map(|p| p.longitude()))
        .execute(&mut *tx)
        .await?;

        let names = clean_names(&draft.auto_tags);
        let tag_ids = upsert_tags(&mut tx, &names).await?;
        for name in names {
            if let Some(tag_id) = tag_ids.get(name) {
                insert_association(&mut tx, id, *tag_id, TagSource::Auto).await?;
            }
        }

        tx.commit().await
    }

    /// Locks the asset row, so concurrent edits of one asset run one after another.
    /// `None` when the asset does not exist.
    async fn lock_asset(conn: &mut PgConnection, asset_id: Uuid) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<Postgres, Uuid>("SELECT id FROM media_assets WHERE id = $1 FOR UPDATE")
            .bind(asset_id)
            .fetch_optional(&mut *conn)
            .await
    }

    async fn replace_manual_tags_tx(&self, asset_id: Uuid, names: &[String]) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        if Self::lock_asset(&mut tx, asset_id).await?.is_none() {
            return Ok(false);
        }

        sqlx::query("DELETE FROM asset_tags WHERE asset_id = $1 AND source = $2")
            .bind(asset_id)
            .bind(TagSource::Manual)
            .execute(&mut *tx)
            .await?;

        let names = clean_names(names);
        let tag_ids = upsert_tags(&mut tx, &names).await?;
        for name in names {
            if let Some(tag_id) = tag_ids.get(name) {
                insert_association(&mut tx, asset_id, *tag_id, TagSource::Manual).await?;
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn apply_enrichment_tx(
        &self,
        asset_id: Uuid,
        names: &[String],
        summary: Option<&str>,
    ) -> Result<Option<Vec<String>>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        if Self::lock_asset(&mut tx, asset_id).await?.is_none() {
            return Ok(None);
        }

        let existing: HashSet<String> = sqlx::query_scalar::<Postgres, String>(
            "SELECT t.name FROM asset_tags link JOIN tags t ON t.id = link.tag_id WHERE link.asset_id = $1",
        )
        .bind(asset_id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();

        let fresh: Vec<&str> = clean_names(names)
            .into_iter()
            .filter(|n| !existing.contains(*n))
            .collect();
        let tag_ids = upsert_tags(&mut tx, &fresh).await?;

        let mut added = Vec::with_capacity(fresh.len());
        for name in fresh {
            if let Some(tag_id) = tag_ids.get(name) {
                if insert_association(&mut tx, asset_id, *tag_id, TagSource::Ai).await? {
                    added.push(name.to_string());
                }
            }
        }

        if let Some(summary) = summary {
            sqlx::query("UPDATE media_assets SET ai_summary = $2 WHERE id = $1")
                .bind(asset_id)
                .bind(summary)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(Some(added))
    }

    /// Tags of several assets at once, each list in attachment order.
    async fn load_tags(&self, asset_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<AssetTag>>, AppError> {
        let rows = sqlx::query_as::<Postgres, AssetTagRow>(
            r#"
            SELECT link.asset_id, t.name, link.source
            FROM asset_tags link
            JOIN tags t ON t.id = link.tag_id
            WHERE link.asset_id = ANY($1)
            ORDER BY link.seq
            "#,
        )
        .bind(asset_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_asset: HashMap<Uuid, Vec<AssetTag>> = HashMap::new();
        for row in rows {
            by_asset.entry(row.asset_id).or_default().push(AssetTag {
                name: row.name,
                source: row.source,
            });
        }
        Ok(by_asset)
    }

    async fn attach_tags(&self, rows: Vec<AssetRow>) -> Result<Vec<MediaAsset>, AppError> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut tags = self.load_tags(&ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let asset_tags = tags.remove(&row.id).unwrap_or_default();
                row.into_asset(asset_tags)
            })
            .collect())
    }
}

/// Insert the tag if its name is new, then read back whichever row owns the name.
///
/// `ON CONFLICT DO NOTHING` waits for a concurrent inserter of the same name to finish,
/// so the follow-up select always finds the winner. It also keeps the surrounding
/// transaction usable, which a raised unique violation would not.
async fn upsert_tag(conn: &mut PgConnection, name: &str) -> Result<Tag, sqlx::Error> {
    let inserted = sqlx::query_as::<Postgres, Tag>(
        "INSERT INTO tags (id, name) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING RETURNING id, name",
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(tag) = inserted {
        return Ok(tag);
    }

    sqlx::query_as::<Postgres, Tag>("SELECT id, name FROM tags WHERE name = $1")
        .bind(name)
        .fetch_one(&mut *conn)
        .await
}

/// Find-or-create several tags inside an open transaction, returning name → id.
///
/// A new name keeps its unique-index entry locked until commit, so every
/// transaction inserts in sorted name order. Two writers with overlapping names
/// then queue behind each other instead of deadlocking.
async fn upsert_tags(
    conn: &mut PgConnection,
    names: &[&str],
) -> Result<HashMap<String, Uuid>, sqlx::Error> {
    if names.is_empty() {
        return Ok(HashMap::new());
    }

    let mut sorted: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    sorted.sort_unstable();
    sorted.dedup();
    let ids: Vec<Uuid> = sorted.iter().map(|_| Uuid::new_v4()).collect();

    sqlx::query(
        r#"
        INSERT INTO tags (id, name)
        SELECT incoming.id, incoming.name
        FROM unnest($1::uuid[], $2::text[]) AS incoming(id, name)
        ORDER BY incoming.name COLLATE "C"
        ON CONFLICT (name) DO NOTHING
        "#,
    )
    .bind(&ids)
    .bind(&sorted)
    .execute(&mut *conn)
    .await?;

    let tags = sqlx::query_as::<Postgres, Tag>("SELECT id, name FROM tags WHERE name = ANY($1)")
        .bind(&sorted)
        .fetch_all(&mut *conn)
        .await?;

    Ok(tags.into_iter().map(|t| (t.name, t.id)).collect())
}

async fn insert_association(
    conn: &mut PgConnection,
    asset_id: Uuid,
    tag_id: Uuid,
    source: TagSource,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO asset_tags (asset_id, tag_id, source) VALUES ($1, $2, $3) \
         ON CONFLICT (asset_id, tag_id) DO NOTHING",
    )
    .bind(asset_id)
    .bind(tag_id)
    .bind(source)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Trimmed, non-empty, de-duplicated names in input order.
fn clean_names(names: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty() && seen.insert(*n))
        .collect()
}

const DEADLOCK_SQLSTATE: &str = "40P01";
const TRANSACTION_ATTEMPTS: u32 = 3;

fn is_deadlock(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|e| e.code())
        .is_some_and(|code| code == DEADLOCK_SQLSTATE)
}

/// Run a transactional write, starting over when Postgres picks it as a deadlock victim.
async fn retry_on_deadlock<T, F, Fut>(operation: &'static str, mut run: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt = 1;
    loop {
        match run().await {
            Err(e) if is_deadlock(&e) && attempt < TRANSACTION_ATTEMPTS => {
                tracing::warn!(operation, attempt, "Deadlock detected, retrying transaction");
                attempt += 1;
            }
            result => return result.map_err(AppError::from),
        }
    }
}

#[async_trait]
impl AssetStore for PgAssetStore {
    #[tracing::instrument(skip(self, draft), fields(db.table = "media_assets", db.operation = "insert"))]
    async fn create(&self, draft: &IngestionDraft, owner_id: Uuid) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        retry_on_deadlock("create", move || self.insert_asset(id, draft, owner_id)).await?;

        tracing::info!(asset_id = %id, tags = draft.auto_tags.len(), "Media asset created");
        Ok(id)
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_assets", db.operation = "select", db.record_id = %id))]
    async fn find_asset_by_id(&self, id: Uuid) -> Result<Option<MediaAsset>, AppError> {
        let sql = format!("SELECT {} FROM media_assets WHERE id = $1", ASSET_COLUMNS);
        let row = sqlx::query_as::<Postgres, AssetRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.attach_tags(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self), fields(db.table = "tags", db.operation = "upsert"))]
    async fn find_or_create_tag(&self, name: &str) -> Result<Tag, AppError> {
        let mut conn = self.pool.acquire().await?;
        Ok(upsert_tag(&mut conn, name).await?)
    }

    #[tracing::instrument(skip(self), fields(db.table = "asset_tags", db.operation = "insert"))]
    async fn associate(
        &self,
        asset_id: Uuid,
        tag_id: Uuid,
        source: TagSource,
    ) -> Result<bool, AppError> {
        let mut conn = self.pool.acquire().await?;
        Ok(insert_association(&mut conn, asset_id, tag_id, source).await?)
    }

    #[tracing::instrument(skip(self), fields(db.table = "asset_tags", db.operation = "select"))]
    async fn list_associated_tag_names(&self, asset_id: Uuid) -> Result<HashSet<String>, AppError> {
        let names = sqlx::query_scalar::<Postgres, String>(
            "SELECT t.name FROM asset_tags link JOIN tags t ON t.id = link.tag_id WHERE link.asset_id = $1",
        )
        .bind(asset_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(names.into_iter().collect())
    }

    #[tracing::instrument(skip(self, summary), fields(db.table = "media_assets", db.operation = "update", db.record_id = %asset_id))]
    async fn set_ai_summary(&self, asset_id: Uuid, summary: &str) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE media_assets SET ai_summary = $2 WHERE id = $1")
            .bind(asset_id)
            .bind(summary)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "asset_tags", db.operation = "replace", db.record_id = %asset_id))]
    async fn replace_manual_tags(&self, asset_id: Uuid, names: &[String]) -> Result<bool, AppError> {
        retry_on_deadlock("replace_manual_tags", move || {
            self.replace_manual_tags_tx(asset_id, names)
        })
        .await
    }

    #[tracing::instrument(skip(self, names, summary), fields(db.table = "asset_tags", db.operation = "enrich", db.record_id = %asset_id))]
    async fn apply_enrichment(
        &self,
        asset_id: Uuid,
        names: &[String],
        summary: Option<&str>,
    ) -> Result<Option<Vec<String>>, AppError> {
        retry_on_deadlock("apply_enrichment", move || {
            self.apply_enrichment_tx(asset_id, names, summary)
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(db.table = "asset_tags", db.operation = "delete", db.record_id = %asset_id))]
    async fn remove_tag(&self, asset_id: Uuid, name: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            "DELETE FROM asset_tags link USING tags t \
             WHERE link.tag_id = t.id AND link.asset_id = $1 AND t.name = $2",
        )
        .bind(asset_id)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_assets", db.operation = "delete", db.record_id = %id))]
    async fn delete_asset(&self, id: Uuid) -> Result<Option<MediaAsset>, AppError> {
        let Some(asset) = self.find_asset_by_id(id).await? else {
            return Ok(None);
        };

        let result = sqlx::query("DELETE FROM media_assets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        tracing::info!(asset_id = %id, "Media asset deleted");
        Ok(Some(asset))
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_assets", db.operation = "search"))]
    async fn search(
        &self,
        owner_id: Uuid,
        query: &str,
        limit: i64,
    ) -> Result<Vec<MediaAsset>, AppError> {
        let keywords = SearchKeyword::parse_query(query);

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM media_assets a WHERE a.owner_id = ",
            ASSET_COLUMNS
        ));
        qb.push_bind(owner_id);

        for keyword in &keywords {
            let pattern = like_pattern(&keyword.text);
            qb.push(
                " AND (EXISTS (SELECT 1 FROM asset_tags link JOIN tags t ON t.id = link.tag_id \
                 WHERE link.asset_id = a.id AND t.name ILIKE ",
            );
            qb.push_bind(pattern.clone());
            qb.push(") OR a.ai_summary ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR a.location ILIKE ");
            qb.push_bind(pattern);

            if let Some(date) = &keyword.date_pattern {
                let date_pattern = like_pattern(date);
                qb.push(" OR to_char(a.capture_time, 'YYYY-MM-DD') LIKE ");
                qb.push_bind(date_pattern.clone());
                qb.push(" OR to_char(a.capture_time, 'YYYY-FMMM-FMDD') LIKE ");
                qb.push_bind(date_pattern);
            }
            qb.push(")");
        }

        qb.push(" ORDER BY a.capture_time DESC NULLS LAST, a.uploaded_at DESC LIMIT ");
        qb.push_bind(limit.max(0));

        let rows = qb
            .build_query_as::<AssetRow>()
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!(keywords = keywords.len(), results = rows.len(), "Search completed");
        self.attach_tags(rows).await
    }
}
