//! Single-record lookups and URL reverse lookups

use birdtag_core::{AppError, MediaId, MediaRecord, TagIndexRow};
use birdtag_db::{MediaCatalogStore, TagIndexStore};
use birdtag_storage::UrlResolver;
use std::sync::Arc;
use std::time::Duration;

use crate::bounded::bounded;
use crate::query::QueryOptions;

/// Replace the stored URLs of a record with signed delivery URLs.
pub(crate) async fn resolve_record(
    resolver: &UrlResolver,
    mut record: MediaRecord,
    expires_in: Duration,
) -> MediaRecord {
    let (media_url, thumbnail_url) = tokio::join!(
        resolver.resolve(&record.media_url, expires_in),
        resolver.resolve(&record.thumbnail_url, expires_in),
    );
    record.media_url = media_url;
    record.thumbnail_url = thumbnail_url;
    record
}

#[derive(Clone)]
pub struct MediaLookupService {
    tag_index: Arc<dyn TagIndexStore>,
    catalog: Arc<dyn MediaCatalogStore>,
    resolver: UrlResolver,
    store_timeout: Duration,
    url_expiration: Duration,
}

impl MediaLookupService {
    pub fn new(
        tag_index: Arc<dyn TagIndexStore>,
        catalog: Arc<dyn MediaCatalogStore>,
        resolver: UrlResolver,
        options: &QueryOptions,
    ) -> Self {
        Self {
            tag_index,
            catalog,
            resolver,
            store_timeout: options.store_timeout,
            url_expiration: options.url_expiration,
        }
    }

    /// Record whose thumbnail is `thumbnail_url` (signed or not), with
    /// signed URLs.
    #[tracing::instrument(skip(self))]
    pub async fn by_thumbnail(&self, thumbnail_url: &str) -> Result<MediaRecord, AppError> {
        let canonical = self.resolver.canonicalize(thumbnail_url).ok_or_else(|| {
            AppError::BadRequest(format!("'{}' is not a valid URL", thumbnail_url))
        })?;

        let record = bounded(
            "catalog.find_by_thumbnail_url",
            self.store_timeout,
            self.catalog.find_by_thumbnail_url(&canonical),
        )
        .await?
        .ok_or_else(|| AppError::NotFound("No media found for the given thumbnail".to_string()))?;

        Ok(resolve_record(&self.resolver, record, self.url_expiration).await)
    }

    /// Every tag recorded for a media item.
    #[tracing::instrument(skip(self), fields(media_id = %media_id))]
    pub async fn tags_of(&self, media_id: &MediaId) -> Result<Vec<TagIndexRow>, AppError> {
        bounded(
            "tag_index.rows_for_media",
            self.store_timeout,
            self.tag_index.rows_for_media(media_id),
        )
        .await
    }

    /// Media ids behind a list of URLs, tried as thumbnail URLs first and as
    /// media URLs second. URLs that match nothing are skipped.
    pub async fn media_ids_for_urls<S: AsRef<str>>(
        &self,
        urls: &[S],
    ) -> Result<Vec<MediaId>, AppError> {
        let mut ids: Vec<MediaId> = Vec::with_capacity(urls.len());
        for url in urls {
            let url = url.as_ref();
            let Some(canonical) = self.resolver.canonicalize(url) else {
                tracing::debug!(url = %url, "Skipping malformed URL");
                continue;
            };

            let mut found = bounded(
                "catalog.find_by_thumbnail_url",
                self.store_timeout,
                self.catalog.find_by_thumbnail_url(&canonical),
            )
            .await?;
            if found.is_none() {
                found = bounded(
                    "catalog.find_by_media_url",
                    self.store_timeout,
                    self.catalog.find_by_media_url(&canonical),
                )
                .await?;
            }

            match found {
                Some(record) if !ids.contains(&record.media_id) => ids.push(record.media_id),
                Some(_) => {}
                None => tracing::debug!(url = %canonical, "No media found for URL, skipping"),
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use birdtag_core::FileType;
    use birdtag_db::{InMemoryMediaCatalog, InMemoryTagIndex};
    use birdtag_storage::LocalStorage;
    use tempfile::TempDir;

    const BASE_URL: &str = "http://localhost:4000/media";

    async fn service(dir: &TempDir) -> (MediaLookupService, InMemoryMediaCatalog, InMemoryTagIndex) {
        let storage = LocalStorage::new(dir.path(), BASE_URL.to_string())
            .await
            .unwrap();
        let resolver = UrlResolver::new(Arc::new(storage), Duration::from_millis(200));
        let catalog = InMemoryMediaCatalog::new();
        let index = InMemoryTagIndex::new();
        let service = MediaLookupService::new(
            Arc::new(index.clone()),
            Arc::new(catalog.clone()),
            resolver,
            &QueryOptions::default(),
        );

        let record = MediaRecord::new(
            MediaId::new("abc"),
            FileType::Image,
            format!("{}/images/abc.jpg", BASE_URL),
            "u1",
        )
        .with_thumbnail(format!("{}/thumbnails/abc.jpg", BASE_URL));
        catalog.put(&record).await.unwrap();

        (service, catalog, index)
    }

    #[tokio::test]
    async fn by_thumbnail_accepts_signed_url() {
        let dir = TempDir::new().unwrap();
        let (service, _, _) = service(&dir).await;
        let record = service
            .by_thumbnail(&format!("{}/thumbnails/abc.jpg?expires=123", BASE_URL))
            .await
            .unwrap();
        assert_eq!(record.media_id.as_str(), "abc");
    }

    #[tokio::test]
    async fn by_thumbnail_unknown_is_not_found() {
        let dir = TempDir::new().unwrap();
        let (service, _, _) = service(&dir).await;
        let err = service
            .by_thumbnail(&format!("{}/thumbnails/zzz.jpg", BASE_URL))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn urls_resolve_through_thumbnail_or_media_url() {
        let dir = TempDir::new().unwrap();
        let (service, _, _) = service(&dir).await;
        let ids = service
            .media_ids_for_urls(&[
                format!("{}/thumbnails/abc.jpg?sig=1", BASE_URL),
                format!("{}/images/abc.jpg", BASE_URL),
                format!("{}/images/unknown.jpg", BASE_URL),
                "garbage".to_string(),
            ])
            .await
            .unwrap();
        assert_eq!(ids, vec![MediaId::new("abc")]);
    }
}
