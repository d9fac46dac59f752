use async_trait::async_trait;
use birdtag_core::{AppError, MediaId, MediaRecord};
use sqlx::{PgPool, Postgres};

/// Primary store `media_id -> MediaRecord`
#[async_trait]
pub trait MediaCatalogStore: Send + Sync {
    async fn get(&self, media_id: &MediaId) -> Result<Option<MediaRecord>, AppError>;

    /// Insert a record, replacing any record with the same id.
    async fn put(&self, record: &MediaRecord) -> Result<(), AppError>;

    /// Returns whether a record existed.
    async fn delete(&self, media_id: &MediaId) -> Result<bool, AppError>;

    /// Reverse lookup by canonical media URL.
    async fn find_by_media_url(&self, media_url: &str) -> Result<Option<MediaRecord>, AppError>;

    /// Reverse lookup by canonical thumbnail URL.
    async fn find_by_thumbnail_url(
        &self,
        thumbnail_url: &str,
    ) -> Result<Option<MediaRecord>, AppError>;

    /// Set the thumbnail URL if none is set yet. Returns whether it was set.
    async fn set_thumbnail_url(
        &self,
        media_id: &MediaId,
        thumbnail_url: &str,
    ) -> Result<bool, AppError>;

    async fn ping(&self) -> Result<(), AppError>;
}

const SELECT_COLUMNS: &str =
    "SELECT media_id, file_type, media_url, thumbnail_url, uploader, uploaded_at FROM media_records";

/// PostgreSQL repository for the `media_records` table
#[derive(Clone)]
pub struct MediaCatalogRepository {
    pool: PgPool,
}

impl MediaCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MediaCatalogStore for MediaCatalogRepository {
    #[tracing::instrument(skip(self), fields(db.table = "media_records", db.operation = "select", db.record_id = %media_id))]
    async fn get(&self, media_id: &MediaId) -> Result<Option<MediaRecord>, AppError> {
        let record = sqlx::query_as::<Postgres, MediaRecord>(&format!(
            "{} WHERE media_id = $1",
            SELECT_COLUMNS
        ))
        .bind(media_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    #[tracing::instrument(skip(self, record), fields(db.table = "media_records", db.operation = "upsert", db.record_id = %record.media_id))]
    async fn put(&self, record: &MediaRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO media_records (media_id, file_type, media_url, thumbnail_url, uploader, uploaded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (media_id) DO UPDATE SET
                file_type = EXCLUDED.file_type,
                media_url = EXCLUDED.media_url,
                thumbnail_url = EXCLUDED.thumbnail_url,
                uploader = EXCLUDED.uploader,
                uploaded_at = EXCLUDED.uploaded_at
            "#,
        )
        .bind(&record.media_id)
        .bind(record.file_type)
        .bind(&record.media_url)
        .bind(&record.thumbnail_url)
        .bind(&record.uploader)
        .bind(record.uploaded_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_records", db.operation = "delete", db.record_id = %media_id))]
    async fn delete(&self, media_id: &MediaId) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM media_records WHERE media_id = $1")
            .bind(media_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_records", db.operation = "select"))]
    async fn find_by_media_url(&self, media_url: &str) -> Result<Option<MediaRecord>, AppError> {
        let record = sqlx::query_as::<Postgres, MediaRecord>(&format!(
            "{} WHERE media_url = $1 LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(media_url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_records", db.operation = "select"))]
    async fn find_by_thumbnail_url(
        &self,
        thumbnail_url: &str,
    ) -> Result<Option<MediaRecord>, AppError> {
        if thumbnail_url.is_empty() {
            return Ok(None);
        }

        let record = sqlx::query_as::<Postgres, MediaRecord>(&format!(
            "{} WHERE thumbnail_url = $1 LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(thumbnail_url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_records", db.operation = "update", db.record_id = %media_id))]
    async fn set_thumbnail_url(
        &self,
        media_id: &MediaId,
        thumbnail_url: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE media_records SET thumbnail_url = $2 WHERE media_id = $1 AND thumbnail_url = ''",
        )
        .bind(media_id)
        .bind(thumbnail_url)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
