//! In-memory stores
//!
//! Used by the `memory` store backend and by tests. State sits behind a
//! `std::sync::Mutex` that is never held across an await point.

use async_trait::async_trait;
use birdtag_core::{AppError, MediaId, MediaRecord, TagIndexRow};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::catalog::MediaCatalogStore;
use super::tag_index::{TagIndexStore, TagPage};

const DEFAULT_BATCH_LIMIT: usize = 25;

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, AppError> {
    mutex
        .lock()
        .map_err(|_| AppError::Internal("in-memory store lock poisoned".to_string()))
}

/// Tag index held in memory, partitioned by tag and ordered by media id.
#[derive(Clone)]
pub struct InMemoryTagIndex {
    partitions: Arc<Mutex<BTreeMap<String, BTreeMap<MediaId, u32>>>>,
    batch_limit: usize,
}

impl Default for InMemoryTagIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTagIndex {
    pub fn new() -> Self {
        Self {
            partitions: Arc::new(Mutex::new(BTreeMap::new())),
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }

    pub fn with_batch_limit(mut self, batch_limit: usize) -> Self {
        self.batch_limit = batch_limit.max(1);
        self
    }

    /// Every row currently stored, ordered by tag then media id.
    pub fn all_rows(&self) -> Vec<TagIndexRow> {
        let partitions = match self.partitions.lock() {
            Ok(p) => p,
            Err(poisoned) => poisoned.into_inner(),
        };
        partitions
            .iter()
            .flat_map(|(tag, rows)| {
                rows.iter()
                    .map(move |(id, value)| TagIndexRow::new(tag.clone(), id.clone(), *value))
            })
            .collect()
    }
}

#[async_trait]
impl TagIndexStore for InMemoryTagIndex {
    async fn query_partition(
        &self,
        tag: &str,
        cursor: Option<&MediaId>,
        limit: usize,
    ) -> Result<TagPage, AppError> {
        let limit = limit.max(1);
        let partitions = lock(&self.partitions)?;
        let Some(partition) = partitions.get(tag) else {
            return Ok(TagPage::default());
        };

        let mut remaining = partition
            .iter()
            .filter(|(id, _)| cursor.map_or(true, |c| *id > c));
        let rows: Vec<TagIndexRow> = remaining
            .by_ref()
            .take(limit)
            .map(|(id, value)| TagIndexRow::new(tag, id.clone(), *value))
            .collect();
        let next_cursor = match remaining.next() {
            Some(_) => rows.last().map(|r| r.media_id.clone()),
            None => None,
        };

        Ok(TagPage { rows, next_cursor })
    }

    async fn put_row(&self, row: &TagIndexRow) -> Result<(), AppError> {
        if row.tag_value == 0 {
            return Err(AppError::InvalidInput("Tag value must be positive".to_string()));
        }
        lock(&self.partitions)?
            .entry(row.tag_name.clone())
            .or_default()
            .insert(row.media_id.clone(), row.tag_value);
        Ok(())
    }

    async fn put_rows(&self, rows: &[TagIndexRow]) -> Result<(), AppError> {
        if rows.len() > self.batch_limit {
            return Err(AppError::InvalidInput(format!(
                "Batch of {} rows exceeds the limit of {}",
                rows.len(),
                self.batch_limit
            )));
        }
        if rows.iter().any(|r| r.tag_value == 0) {
            return Err(AppError::InvalidInput("Tag value must be positive".to_string()));
        }
        let mut partitions = lock(&self.partitions)?;
        for row in rows {
            partitions
                .entry(row.tag_name.clone())
                .or_default()
                .insert(row.media_id.clone(), row.tag_value);
        }
        Ok(())
    }

    async fn delete_row(&self, tag: &str, media_id: &MediaId) -> Result<bool, AppError> {
        let mut partitions = lock(&self.partitions)?;
        let Some(partition) = partitions.get_mut(tag) else {
            return Ok(false);
        };
        let existed = partition.remove(media_id).is_some();
        if partition.is_empty() {
            partitions.remove(tag);
        }
        Ok(existed)
    }

    async fn rows_for_media(&self, media_id: &MediaId) -> Result<Vec<TagIndexRow>, AppError> {
        let partitions = lock(&self.partitions)?;
        Ok(partitions
            .iter()
            .filter_map(|(tag, rows)| {
                rows.get(media_id)
                    .map(|value| TagIndexRow::new(tag.clone(), media_id.clone(), *value))
            })
            .collect())
    }

    fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    async fn ping(&self) -> Result<(), AppError> {
        lock(&self.partitions).map(|_| ())
    }
}

/// Media catalog held in memory.
#[derive(Clone, Default)]
pub struct InMemoryMediaCatalog {
    records: Arc<Mutex<HashMap<MediaId, MediaRecord>>>,
}

impl InMemoryMediaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MediaCatalogStore for InMemoryMediaCatalog {
    async fn get(&self, media_id: &MediaId) -> Result<Option<MediaRecord>, AppError> {
        Ok(lock(&self.records)?.get(media_id).cloned())
    }

    async fn put(&self, record: &MediaRecord) -> Result<(), AppError> {
        lock(&self.records)?.insert(record.media_id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, media_id: &MediaId) -> Result<bool, AppError> {
        Ok(lock(&self.records)?.remove(media_id).is_some())
    }

    async fn find_by_media_url(&self, media_url: &str) -> Result<Option<MediaRecord>, AppError> {
        Ok(lock(&self.records)?
            .values()
            .find(|r| r.media_url == media_url)
            .cloned())
    }

    async fn find_by_thumbnail_url(
        &self,
        thumbnail_url: &str,
    ) -> Result<Option<MediaRecord>, AppError> {
        if thumbnail_url.is_empty() {
            return Ok(None);
        }
        Ok(lock(&self.records)?
            .values()
            .find(|r| r.thumbnail_url == thumbnail_url)
            .cloned())
    }

    async fn set_thumbnail_url(
        &self,
        media_id: &MediaId,
        thumbnail_url: &str,
    ) -> Result<bool, AppError> {
        let mut records = lock(&self.records)?;
        match records.get_mut(media_id) {
            Some(record) if record.thumbnail_url.is_empty() => {
                record.thumbnail_url = thumbnail_url.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ping(&self) -> Result<(), AppError> {
        lock(&self.records).map(|_| ())
    }
}

/// Tag index wrapper that injects failures and latency for chosen tags.
///
/// Partition reads for a failing tag return a store error; reads for a slow
/// tag sleep first. Writes for a failing tag fail as well, which lets batch
/// fallback paths be exercised.
#[derive(Clone)]
pub struct FailingTagIndex<S> {
    inner: S,
    failing_tags: Arc<Mutex<HashSet<String>>>,
    slow_tags: Arc<Mutex<HashMap<String, Duration>>>,
    fail_batches: bool,
}

impl<S: TagIndexStore> FailingTagIndex<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing_tags: Arc::new(Mutex::new(HashSet::new())),
            slow_tags: Arc::new(Mutex::new(HashMap::new())),
            fail_batches: false,
        }
    }

    pub fn failing(self, tag: &str) -> Self {
        if let Ok(mut tags) = self.failing_tags.lock() {
            tags.insert(tag.to_string());
        }
        self
    }

    pub fn slow(self, tag: &str, delay: Duration) -> Self {
        if let Ok(mut tags) = self.slow_tags.lock() {
            tags.insert(tag.to_string(), delay);
        }
        self
    }

    /// Make every multi-row `put_rows` call fail.
    pub fn failing_batches(mut self) -> Self {
        self.fail_batches = true;
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check(&self, tag: &str) -> Result<(), AppError> {
        if lock(&self.failing_tags)?.contains(tag) {
            return Err(AppError::Database(injected_failure(tag)));
        }
        Ok(())
    }

    fn delay_for(&self, tag: &str) -> Option<Duration> {
        self.slow_tags.lock().ok()?.get(tag).copied()
    }
}

fn injected_failure(tag: &str) -> sqlx::Error {
    sqlx::Error::Protocol(format!("injected failure for tag '{}'", tag))
}

#[async_trait]
impl<S: TagIndexStore> TagIndexStore for FailingTagIndex<S> {
    async fn query_partition(
        &self,
        tag: &str,
        cursor: Option<&MediaId>,
        limit: usize,
    ) -> Result<TagPage, AppError> {
        if let Some(delay) = self.delay_for(tag) {
            tokio::time::sleep(delay).await;
        }
        self.check(tag)?;
        self.inner.query_partition(tag, cursor, limit).await
    }

    async fn put_row(&self, row: &TagIndexRow) -> Result<(), AppError> {
        self.check(&row.tag_name)?;
        self.inner.put_row(row).await
    }

    async fn put_rows(&self, rows: &[TagIndexRow]) -> Result<(), AppError> {
        if self.fail_batches && rows.len() > 1 {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        for row in rows {
            self.check(&row.tag_name)?;
        }
        self.inner.put_rows(rows).await
    }

    async fn delete_row(&self, tag: &str, media_id: &MediaId) -> Result<bool, AppError> {
        self.check(tag)?;
        self.inner.delete_row(tag, media_id).await
    }

    async fn rows_for_media(&self, media_id: &MediaId) -> Result<Vec<TagIndexRow>, AppError> {
        self.inner.rows_for_media(media_id).await
    }

    fn batch_limit(&self) -> usize {
        self.inner.batch_limit()
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.inner.ping().await
    }
}

/// Media catalog wrapper that injects failures into deletes and reverse
/// lookups by media URL.
#[derive(Clone)]
pub struct FailingMediaCatalog<S> {
    inner: S,
    fail_deletes: bool,
    failing_urls: Arc<Mutex<HashSet<String>>>,
}

impl<S: MediaCatalogStore> FailingMediaCatalog<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_deletes: false,
            failing_urls: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Make every `delete` call fail.
    pub fn failing_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    /// Make `find_by_media_url` fail for this canonical URL.
    pub fn failing_media_url(self, url: &str) -> Self {
        if let Ok(mut urls) = self.failing_urls.lock() {
            urls.insert(url.to_string());
        }
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: MediaCatalogStore> MediaCatalogStore for FailingMediaCatalog<S> {
    async fn get(&self, media_id: &MediaId) -> Result<Option<MediaRecord>, AppError> {
        self.inner.get(media_id).await
    }

    async fn put(&self, record: &MediaRecord) -> Result<(), AppError> {
        self.inner.put(record).await
    }

    async fn delete(&self, media_id: &MediaId) -> Result<bool, AppError> {
        if self.fail_deletes {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.delete(media_id).await
    }

    async fn find_by_media_url(&self, media_url: &str) -> Result<Option<MediaRecord>, AppError> {
        if lock(&self.failing_urls)?.contains(media_url) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.find_by_media_url(media_url).await
    }

    async fn find_by_thumbnail_url(
        &self,
        thumbnail_url: &str,
    ) -> Result<Option<MediaRecord>, AppError> {
        self.inner.find_by_thumbnail_url(thumbnail_url).await
    }

    async fn set_thumbnail_url(
        &self,
        media_id: &MediaId,
        thumbnail_url: &str,
    ) -> Result<bool, AppError> {
        self.inner.set_thumbnail_url(media_id, thumbnail_url).await
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.inner.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use birdtag_core::FileType;

    fn id(s: &str) -> MediaId {
        MediaId::new(s)
    }

    #[tokio::test]
    async fn put_row_replaces_instead_of_accumulating() {
        let index = InMemoryTagIndex::new();
        index.put_row(&TagIndexRow::new("crow", id("a"), 3)).await.unwrap();
        index.put_row(&TagIndexRow::new("crow", id("a"), 5)).await.unwrap();

        assert_eq!(index.all_rows(), vec![TagIndexRow::new("crow", id("a"), 5)]);
    }

    #[tokio::test]
    async fn partition_pages_follow_cursor_until_exhausted() {
        let index = InMemoryTagIndex::new();
        for name in ["a", "b", "c", "d", "e"] {
            index.put_row(&TagIndexRow::new("owl", id(name), 1)).await.unwrap();
        }

        let first = index.query_partition("owl", None, 2).await.unwrap();
        assert_eq!(first.rows.len(), 2);
        assert_eq!(first.next_cursor, Some(id("b")));

        let second = index
            .query_partition("owl", first.next_cursor.as_ref(), 2)
            .await
            .unwrap();
        assert_eq!(second.next_cursor, Some(id("d")));

        let last = index
            .query_partition("owl", second.next_cursor.as_ref(), 2)
            .await
            .unwrap();
        assert_eq!(last.rows, vec![TagIndexRow::new("owl", id("e"), 1)]);
        assert_eq!(last.next_cursor, None);
    }

    #[tokio::test]
    async fn missing_partition_is_an_empty_page() {
        let index = InMemoryTagIndex::new();
        let page = index.query_partition("sparrow", None, 10).await.unwrap();
        assert!(page.rows.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn rows_for_media_scans_every_partition() {
        let index = InMemoryTagIndex::new();
        index
            .put_rows(&[
                TagIndexRow::new("crow", id("a"), 3),
                TagIndexRow::new("owl", id("a"), 2),
                TagIndexRow::new("crow", id("b"), 1),
            ])
            .await
            .unwrap();

        let rows = index.rows_for_media(&id("a")).await.unwrap();
        let tags: Vec<_> = rows.iter().map(|r| r.tag_name.as_str()).collect();
        assert_eq!(tags, vec!["crow", "owl"]);

        assert!(index.delete_row("crow", &id("a")).await.unwrap());
        assert!(!index.delete_row("crow", &id("a")).await.unwrap());
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected() {
        let index = InMemoryTagIndex::new().with_batch_limit(1);
        let err = index
            .put_rows(&[
                TagIndexRow::new("crow", id("a"), 1),
                TagIndexRow::new("owl", id("a"), 1),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn thumbnail_is_set_once() {
        let catalog = InMemoryMediaCatalog::new();
        let record = MediaRecord::new(id("a"), FileType::Image, "https://m/images/a.jpg", "u1");
        catalog.put(&record).await.unwrap();

        assert!(catalog.set_thumbnail_url(&id("a"), "https://m/thumbnails/a.jpg").await.unwrap());
        assert!(!catalog.set_thumbnail_url(&id("a"), "https://m/other.jpg").await.unwrap());

        let found = catalog
            .find_by_thumbnail_url("https://m/thumbnails/a.jpg")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.media_id, id("a"));
        assert!(catalog.find_by_thumbnail_url("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failing_tag_index_fails_only_chosen_tags() {
        let index = FailingTagIndex::new(InMemoryTagIndex::new()).failing("owl");
        assert!(index.query_partition("crow", None, 10).await.is_ok());
        assert!(matches!(
            index.query_partition("owl", None, 10).await,
            Err(AppError::Database(_))
        ));
    }

    #[tokio::test]
    async fn failing_catalog_fails_only_chosen_calls() {
        let inner = InMemoryMediaCatalog::new();
        inner
            .put(&MediaRecord::new(id("a"), FileType::Image, "http://m/images/a.jpg", "u"))
            .await
            .unwrap();
        let catalog = FailingMediaCatalog::new(inner.clone())
            .failing_deletes()
            .failing_media_url("http://m/images/a.jpg");

        assert!(catalog.get(&id("a")).await.unwrap().is_some());
        assert!(matches!(catalog.delete(&id("a")).await, Err(AppError::Database(_))));
        assert!(catalog.find_by_media_url("http://m/images/a.jpg").await.is_err());
        assert!(catalog.find_by_media_url("http://m/images/b.jpg").await.unwrap().is_none());
        assert_eq!(inner.len(), 1);
    }
}
