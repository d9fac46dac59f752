use async_trait::async_trait;
use birdtag_core::{AppError, MediaId, TagIndexRow};
use sqlx::{FromRow, PgPool, Postgres};
use std::collections::HashMap;

/// Largest batch a single `put_rows` call accepts.
const MAX_BATCH_SIZE: usize = 25;

/// One page of a tag partition, ordered by media id.
///
/// `next_cursor` is the media id to continue after; `None` once the partition
/// is exhausted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagPage {
    pub rows: Vec<TagIndexRow>,
    pub next_cursor: Option<MediaId>,
}

/// Secondary index `tag -> {media_id: count}`
///
/// Each row write is atomic and replaces any existing value for the same
/// `(tag, media_id)`. Nothing spans rows.
#[async_trait]
pub trait TagIndexStore: Send + Sync {
    /// Read up to `limit` rows of the partition for `tag`, starting after
    /// `cursor`.
    async fn query_partition(
        &self,
        tag: &str,
        cursor: Option<&MediaId>,
        limit: usize,
    ) -> Result<TagPage, AppError>;

    /// Insert or replace one row.
    async fn put_row(&self, row: &TagIndexRow) -> Result<(), AppError>;

    /// Insert or replace up to [`batch_limit`](Self::batch_limit) rows.
    async fn put_rows(&self, rows: &[TagIndexRow]) -> Result<(), AppError>;

    /// Delete one row. Returns whether a row existed.
    async fn delete_row(&self, tag: &str, media_id: &MediaId) -> Result<bool, AppError>;

    /// Every row referencing `media_id`, across all partitions.
    async fn rows_for_media(&self, media_id: &MediaId) -> Result<Vec<TagIndexRow>, AppError>;

    /// Maximum number of rows per `put_rows` call.
    fn batch_limit(&self) -> usize;

    async fn ping(&self) -> Result<(), AppError>;
}

#[derive(Debug, FromRow)]
struct TagIndexDbRow {
    tag_name: String,
    media_id: MediaId,
    tag_value: i32,
}

impl From<TagIndexDbRow> for TagIndexRow {
    fn from(row: TagIndexDbRow) -> Self {
        TagIndexRow {
            tag_name: row.tag_name,
            media_id: row.media_id,
            tag_value: row.tag_value.max(0) as u32,
        }
    }
}

fn db_value(value: u32) -> Result<i32, AppError> {
    i32::try_from(value)
        .map_err(|_| AppError::InvalidInput(format!("Tag value {} is out of range", value)))
}

/// PostgreSQL repository for the `tag_index` table
#[derive(Clone)]
pub struct TagIndexRepository {
    pool: PgPool,
    batch_size: usize,
}

impl TagIndexRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            batch_size: MAX_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }
}

#[async_trait]
impl TagIndexStore for TagIndexRepository {
    #[tracing::instrument(skip(self), fields(db.table = "tag_index", db.operation = "select"))]
    async fn query_partition(
        &self,
        tag: &str,
        cursor: Option<&MediaId>,
        limit: usize,
    ) -> Result<TagPage, AppError> {
        let limit = limit.max(1);
        // One extra row tells whether another page follows.
        let mut rows = sqlx::query_as::<Postgres, TagIndexDbRow>(
            r#"
            SELECT tag_name, media_id, tag_value
            FROM tag_index
            WHERE tag_name = $1 AND ($2::TEXT IS NULL OR media_id > $2)
            ORDER BY media_id ASC
            LIMIT $3
            "#,
        )
        .bind(tag)
        .bind(cursor.map(|c| c.as_str()))
        .bind((limit + 1) as i64)
        .fetch_all(&self.pool)
        .await?;

        let next_cursor = if rows.len() > limit {
            rows.truncate(limit);
            rows.last().map(|r| r.media_id.clone())
        } else {
            None
        };

        Ok(TagPage {
            rows: rows.into_iter().map(TagIndexRow::from).collect(),
            next_cursor,
        })
    }

    #[tracing::instrument(skip(self), fields(db.table = "tag_index", db.operation = "upsert"))]
    async fn put_row(&self, row: &TagIndexRow) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO tag_index (tag_name, media_id, tag_value)
            VALUES ($1, $2, $3)
            ON CONFLICT (tag_name, media_id) DO UPDATE SET tag_value = EXCLUDED.tag_value
            "#,
        )
        .bind(&row.tag_name)
        .bind(&row.media_id)
        .bind(db_value(row.tag_value)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self, rows), fields(db.table = "tag_index", db.operation = "upsert", rows = rows.len()))]
    async fn put_rows(&self, rows: &[TagIndexRow]) -> Result<(), AppError> {
        if rows.is_empty() {
            return Ok(());
        }
        if rows.len() > self.batch_size {
            return Err(AppError::InvalidInput(format!(
                "Batch of {} rows exceeds the limit of {}",
                rows.len(),
                self.batch_size
            )));
        }

        // A single INSERT cannot touch the same key twice; the last write wins.
        let mut latest: HashMap<(&str, &str), u32> = HashMap::new();
        let mut order = Vec::new();
        for row in rows {
            let key = (row.tag_name.as_str(), row.media_id.as_str());
            if latest.insert(key, row.tag_value).is_none() {
                order.push(key);
            }
        }

        let mut tag_names = Vec::with_capacity(order.len());
        let mut media_ids = Vec::with_capacity(order.len());
        let mut values = Vec::with_capacity(order.len());
        for key in order {
            tag_names.push(key.0.to_string());
            media_ids.push(key.1.to_string());
            values.push(db_value(latest[&key])?);
        }

        sqlx::query(
            r#"
            INSERT INTO tag_index (tag_name, media_id, tag_value)
            SELECT * FROM UNNEST($1::TEXT[], $2::TEXT[], $3::INTEGER[])
            ON CONFLICT (tag_name, media_id) DO UPDATE SET tag_value = EXCLUDED.tag_value
            "#,
        )
        .bind(tag_names)
        .bind(media_ids)
        .bind(values)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "tag_index", db.operation = "delete", db.record_id = %media_id))]
    async fn delete_row(&self, tag: &str, media_id: &MediaId) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM tag_index WHERE tag_name = $1 AND media_id = $2")
            .bind(tag)
            .bind(media_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "tag_index", db.operation = "select", db.record_id = %media_id))]
    async fn rows_for_media(&self, media_id: &MediaId) -> Result<Vec<TagIndexRow>, AppError> {
        let rows = sqlx::query_as::<Postgres, TagIndexDbRow>(
            "SELECT tag_name, media_id, tag_value FROM tag_index WHERE media_id = $1 ORDER BY tag_name ASC",
        )
        .bind(media_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TagIndexRow::from).collect())
    }

    fn batch_limit(&self) -> usize {
        self.batch_size
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
