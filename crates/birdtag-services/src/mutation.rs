//! Tag edits and cascading media deletion
//!
//! Stores give single-row atomicity only. Multi-row effects are applied one
//! row at a time; each step is idempotent, so repeating a partially failed
//! request finishes the job.

use birdtag_core::validation::TagToken;
use birdtag_core::{AppError, Config, MediaId, TagCounts, TagIndexRow};
use birdtag_db::{MediaCatalogStore, TagIndexStore};
use birdtag_storage::{ObjectStorage, UrlResolver};
use std::sync::Arc;
use std::time::Duration;

use crate::bounded::bounded;

#[derive(Debug, Clone)]
pub struct MutationOptions {
    /// Upper bound on rows per batch write; the store's own limit also applies.
    pub batch_size: usize,
    pub store_timeout: Duration,
}

impl Default for MutationOptions {
    fn default() -> Self {
        MutationOptions::from(&Config::default())
    }
}

impl From<&Config> for MutationOptions {
    fn from(config: &Config) -> Self {
        Self {
            batch_size: config.index_batch_size.max(1),
            store_timeout: Duration::from_millis(config.store_call_timeout_ms),
        }
    }
}

/// Tag edit operation flag: 1 adds (replaces), 0 removes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOperation {
    Add,
    Remove,
}

impl TryFrom<i64> for TagOperation {
    type Error = AppError;

    fn try_from(flag: i64) -> Result<Self, Self::Error> {
        match flag {
            1 => Ok(TagOperation::Add),
            0 => Ok(TagOperation::Remove),
            other => Err(AppError::BadRequest(format!(
                "Invalid operation {}: use 1 to add tags or 0 to remove them",
                other
            ))),
        }
    }
}

/// Outcome of writing the rows of one upsert
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationReport {
    pub written: usize,
    /// Rows that still failed after being retried one by one.
    pub failed: Vec<TagIndexRow>,
}

impl MutationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Turn leftover failures into `AppError::PartialFailure`.
    pub fn ensure_complete(self) -> Result<Self, AppError> {
        if self.is_complete() {
            return Ok(self);
        }
        let tags: Vec<String> = self
            .failed
            .iter()
            .map(|row| format!("{}/{}", row.media_id, row.tag_name))
            .collect();
        Err(AppError::PartialFailure(format!(
            "{} tag row(s) written, {} failed: {}",
            self.written,
            self.failed.len(),
            tags.join(", ")
        )))
    }
}

/// Outcome of a cascading delete of one media item
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeReport {
    pub media_id: MediaId,
    pub rows_deleted: usize,
    pub record_deleted: bool,
}

/// Outcome of a tag edit over several media items
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditReport {
    pub media_ids: Vec<MediaId>,
    pub rows_changed: usize,
    /// Media items whose edit did not fully apply, with the reason.
    pub failed: Vec<(MediaId, String)>,
}

/// Outcome of deleting media by URL
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeletionReport {
    pub deleted: Vec<MediaId>,
    pub failed: Vec<(MediaId, String)>,
    /// URLs whose media lookup failed, so nothing is known about them.
    pub failed_urls: Vec<(String, String)>,
}

#[derive(Clone)]
pub struct TagMutationService {
    tag_index: Arc<dyn TagIndexStore>,
    catalog: Arc<dyn MediaCatalogStore>,
    options: MutationOptions,
}

impl TagMutationService {
    pub fn new(
        tag_index: Arc<dyn TagIndexStore>,
        catalog: Arc<dyn MediaCatalogStore>,
        options: MutationOptions,
    ) -> Self {
        Self {
            tag_index,
            catalog,
            options,
        }
    }

    fn chunk_size(&self) -> usize {
        self.options
            .batch_size
            .min(self.tag_index.batch_limit())
            .max(1)
    }

    /// Write `counts` for one media item, replacing existing values.
    ///
    /// Rows are written in chunks; a failed chunk is retried row by row and
    /// whatever still fails is listed in the report.
    #[tracing::instrument(skip(self, counts), fields(media_id = %media_id, tags = counts.len()))]
    pub async fn upsert_tags(
        &self,
        media_id: &MediaId,
        counts: &TagCounts,
    ) -> Result<MutationReport, AppError> {
        let rows: Vec<TagIndexRow> = counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(tag, count)| TagIndexRow::new(tag.clone(), media_id.clone(), *count))
            .collect();

        let mut report = MutationReport::default();
        for chunk in rows.chunks(self.chunk_size()) {
            let written = bounded(
                "tag_index.put_rows",
                self.options.store_timeout,
                self.tag_index.put_rows(chunk),
            )
            .await;

            match written {
                Ok(()) => report.written += chunk.len(),
                Err(e) => {
                    tracing::warn!(error = %e, rows = chunk.len(), "Batch write failed, retrying rows individually");
                    for row in chunk {
                        match bounded(
                            "tag_index.put_row",
                            self.options.store_timeout,
                            self.tag_index.put_row(row),
                        )
                        .await
                        {
                            Ok(()) => report.written += 1,
                            Err(e) => {
                                tracing::error!(error = %e, tag = %row.tag_name, "Tag row write failed");
                                report.failed.push(row.clone());
                            }
                        }
                    }
                }
            }
        }

        Ok(report)
    }

    /// Delete the given tags of one media item. Missing rows are ignored.
    /// Returns the number of rows that existed.
    ///
    /// A failed delete is retried once; tags that still fail are reported as
    /// `AppError::PartialFailure` after every other tag has been tried.
    #[tracing::instrument(skip(self, tags), fields(media_id = %media_id, tags = tags.len()))]
    pub async fn remove_tags<S: AsRef<str>>(
        &self,
        media_id: &MediaId,
        tags: &[S],
    ) -> Result<usize, AppError> {
        let mut removed = 0;
        let mut failed = Vec::new();
        for tag in tags {
            let tag = tag.as_ref().trim().to_lowercase();
            if tag.is_empty() {
                continue;
            }
            let mut outcome = self.delete_tag_row(&tag, media_id).await;
            if outcome.is_err() {
                outcome = self.delete_tag_row(&tag, media_id).await;
            }
            match outcome {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(error = %e, tag = %tag, "Failed to remove tag row");
                    failed.push(tag);
                }
            }
        }

        if !failed.is_empty() {
            return Err(AppError::PartialFailure(format!(
                "{} tag row(s) removed, {} failed: {}",
                removed,
                failed.len(),
                failed.join(", ")
            )));
        }
        Ok(removed)
    }

    /// Apply parsed `tag,count` tokens to several media items.
    ///
    /// Add replaces the count of each tag (the last token wins for a repeated
    /// tag); remove deletes the rows and ignores the counts. A media item that
    /// fails is listed in the report and the remaining items are still edited.
    pub async fn edit_tags(
        &self,
        media_ids: &[MediaId],
        tokens: &[TagToken],
        operation: TagOperation,
    ) -> Result<EditReport, AppError> {
        let mut report = EditReport::default();
        if tokens.is_empty() {
            return Ok(report);
        }

        let counts: TagCounts = tokens
            .iter()
            .map(|token| (token.tag.clone(), token.count))
            .collect();
        let tags: Vec<&str> = tokens.iter().map(|t| t.tag.as_str()).collect();

        for media_id in media_ids {
            let changed = match operation {
                TagOperation::Add => self
                    .upsert_tags(media_id, &counts)
                    .await
                    .and_then(MutationReport::ensure_complete)
                    .map(|applied| applied.written),
                TagOperation::Remove => self.remove_tags(media_id, &tags).await,
            };
            match changed {
                Ok(changed) => {
                    report.rows_changed += changed;
                    report.media_ids.push(media_id.clone());
                }
                Err(e) => {
                    tracing::warn!(error = %e, media_id = %media_id, "Tag edit failed for media item");
                    report.failed.push((media_id.clone(), e.to_string()));
                }
            }
        }

        Ok(report)
    }

    /// Delete every index row of a media item, then its catalog record.
    ///
    /// The index is partitioned by tag, so rows are found by a reverse scan
    /// on media id. If any row cannot be deleted the record is kept, so the
    /// item stays addressable and the delete can be repeated; leftover rows
    /// are harmless because queries skip ids missing from the catalog.
    #[tracing::instrument(skip(self), fields(media_id = %media_id))]
    pub async fn cascade_delete_media(&self, media_id: &MediaId) -> Result<CascadeReport, AppError> {
        let rows = bounded(
            "tag_index.rows_for_media",
            self.options.store_timeout,
            self.tag_index.rows_for_media(media_id),
        )
        .await?;

        let mut rows_deleted = 0;
        let mut failed = Vec::new();
        for row in &rows {
            let mut outcome = self.delete_row(row).await;
            if outcome.is_err() {
                outcome = self.delete_row(row).await;
            }
            match outcome {
                Ok(_) => rows_deleted += 1,
                Err(e) => {
                    tracing::error!(error = %e, tag = %row.tag_name, "Failed to delete tag row");
                    failed.push(row.tag_name.clone());
                }
            }
        }

        if !failed.is_empty() {
            return Err(AppError::PartialFailure(format!(
                "Media {}: deleted {} of {} tag rows; could not delete: {}. The media record was kept",
                media_id,
                rows_deleted,
                rows.len(),
                failed.join(", ")
            )));
        }

        let record_deleted = bounded(
            "catalog.delete",
            self.options.store_timeout,
            self.catalog.delete(media_id),
        )
        .await
        .map_err(|e| {
            AppError::PartialFailure(format!(
                "Media {}: deleted {} tag rows but the media record could not be deleted: {}",
                media_id, rows_deleted, e
            ))
        })?;

        tracing::info!(rows_deleted, record_deleted, "Media deleted");
        Ok(CascadeReport {
            media_id: media_id.clone(),
            rows_deleted,
            record_deleted,
        })
    }

    async fn delete_row(&self, row: &TagIndexRow) -> Result<bool, AppError> {
        self.delete_tag_row(&row.tag_name, &row.media_id).await
    }

    async fn delete_tag_row(&self, tag: &str, media_id: &MediaId) -> Result<bool, AppError> {
        bounded(
            "tag_index.delete_row",
            self.options.store_timeout,
            self.tag_index.delete_row(tag, media_id),
        )
        .await
    }

    /// Delete the media behind each URL: index rows, record, then the stored
    /// objects (best effort). URLs matching no record are skipped; a failed
    /// lookup or cascade is reported and the remaining URLs are still handled.
    pub async fn delete_media_by_urls<S: AsRef<str>>(
        &self,
        urls: &[S],
        resolver: &UrlResolver,
    ) -> Result<DeletionReport, AppError> {
        let mut report = DeletionReport::default();

        for url in urls {
            let url = url.as_ref();
            let Some(canonical) = resolver.canonicalize(url) else {
                tracing::debug!(url = %url, "Skipping malformed URL");
                continue;
            };

            let record = match bounded(
                "catalog.find_by_media_url",
                self.options.store_timeout,
                self.catalog.find_by_media_url(&canonical),
            )
            .await
            {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(error = %e, url = %canonical, "Media lookup failed");
                    report.failed_urls.push((url.to_string(), e.to_string()));
                    continue;
                }
            };
            let Some(record) = record else {
                tracing::debug!(url = %canonical, "No media found for URL, skipping");
                continue;
            };
            if report.deleted.contains(&record.media_id) {
                continue;
            }

            match self.cascade_delete_media(&record.media_id).await {
                Ok(_) => {
                    delete_object(resolver, &record.media_url).await;
                    if !record.thumbnail_url.is_empty() {
                        delete_object(resolver, &record.thumbnail_url).await;
                    }
                    report.deleted.push(record.media_id);
                }
                Err(e) => report.failed.push((record.media_id, e.to_string())),
            }
        }

        Ok(report)
    }
}

async fn delete_object(resolver: &UrlResolver, url: &str) {
    let Some(location) = resolver.locate(url) else {
        tracing::debug!(url = %url, "URL outside object storage, nothing to delete");
        return;
    };
    let storage: &Arc<dyn ObjectStorage> = resolver.storage();
    if let Err(e) = storage.delete(&location).await {
        tracing::warn!(error = %e, location = %location, "Failed to delete stored object");
    }
}
