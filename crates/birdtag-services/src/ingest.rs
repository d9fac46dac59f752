//! Ingestion of detector output and thumbnail events
//!
//! Both entry points receive an `UploadEvent` normalized to the uploaded
//! object. The media id is the object key's file stem.

use birdtag_core::events::{DetectionEvent, UploadEvent};
use birdtag_core::{AppError, FileType, MediaId, MediaRecord, TagCounts};
use birdtag_db::MediaCatalogStore;
use birdtag_storage::{ObjectLocation, UrlResolver};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::aggregator::{AggregationPolicy, TagAggregator};
use crate::bounded::bounded;
use crate::mutation::TagMutationService;
use crate::notify::{publish_detached, NotificationSink, TagNotification};

/// Keys accepted as thumbnails live under this prefix.
pub const THUMBNAIL_PREFIX: &str = "thumbnails/";

/// Uploader recorded for media first seen through the pipeline.
const PIPELINE_UPLOADER: &str = "pipeline";

#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub media_id: MediaId,
    pub file_type: FileType,
    pub tags: TagCounts,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailOutcome {
    pub media_id: MediaId,
    pub thumbnail_url: String,
    /// False when the record already had a thumbnail.
    pub updated: bool,
}

#[derive(Clone)]
pub struct DetectionIngestService {
    mutation: TagMutationService,
    catalog: Arc<dyn MediaCatalogStore>,
    resolver: UrlResolver,
    notifier: Arc<dyn NotificationSink>,
    store_timeout: Duration,
}

impl DetectionIngestService {
    pub fn new(
        mutation: TagMutationService,
        catalog: Arc<dyn MediaCatalogStore>,
        resolver: UrlResolver,
        notifier: Arc<dyn NotificationSink>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            mutation,
            catalog,
            resolver,
            notifier,
            store_timeout,
        }
    }

    /// Aggregate the detector output for one object and store it as that
    /// media item's tags, replacing earlier values. Publishes one
    /// notification per tag.
    #[tracing::instrument(skip(self, detection))]
    pub async fn ingest_detections(
        &self,
        detection: &DetectionEvent,
    ) -> Result<IngestReport, AppError> {
        let object = detection.event.object()?;
        let media_id = object.media_id()?;
        let file_type = object.file_type()?;

        let policy = AggregationPolicy::for_file_type(file_type);
        let tags = match file_type {
            FileType::Video => TagAggregator::aggregate(policy, &detection.frames),
            FileType::Image => TagAggregator::aggregate(policy, [&detection.labels]),
            FileType::Audio => TagAggregator::aggregate(policy, [&detection.species]),
        };

        let media_url = self
            .resolver
            .url_for(&ObjectLocation::new(&object.bucket, &object.key));
        self.ensure_record(&media_id, file_type, &media_url).await?;

        if tags.is_empty() {
            tracing::info!(media_id = %media_id, "No detections for media");
            return Ok(IngestReport {
                media_id,
                file_type,
                tags,
            });
        }

        self.mutation
            .upsert_tags(&media_id, &tags)
            .await?
            .ensure_complete()?;

        let now = Utc::now();
        let notifications = tags
            .iter()
            .map(|(tag, count)| TagNotification {
                url: media_url.clone(),
                media_id: media_id.clone(),
                tag: tag.clone(),
                count: *count,
                timestamp: now,
            })
            .collect();
        publish_detached(self.notifier.clone(), notifications);

        tracing::info!(media_id = %media_id, file_type = file_type.as_str(), tags = tags.len(), "Detections ingested");
        Ok(IngestReport {
            media_id,
            file_type,
            tags,
        })
    }

    async fn ensure_record(
        &self,
        media_id: &MediaId,
        file_type: FileType,
        media_url: &str,
    ) -> Result<(), AppError> {
        let existing = bounded("catalog.get", self.store_timeout, self.catalog.get(media_id)).await?;
        if existing.is_some() {
            return Ok(());
        }

        tracing::debug!(media_id = %media_id, "Media not in catalog yet, creating record");
        let record = MediaRecord::new(media_id.clone(), file_type, media_url, PIPELINE_UPLOADER);
        bounded("catalog.put", self.store_timeout, self.catalog.put(&record)).await
    }

    /// Record the thumbnail of a media item. Only keys under `thumbnails/`
    /// are accepted; an existing thumbnail is never replaced.
    #[tracing::instrument(skip(self, event))]
    pub async fn ingest_thumbnail(&self, event: &UploadEvent) -> Result<ThumbnailOutcome, AppError> {
        let object = event.object()?;
        if !object.key.starts_with(THUMBNAIL_PREFIX) {
            return Err(AppError::BadRequest(format!(
                "Thumbnail key '{}' must start with '{}'",
                object.key, THUMBNAIL_PREFIX
            )));
        }
        let media_id = object.media_id()?;
        let thumbnail_url = self
            .resolver
            .url_for(&ObjectLocation::new(&object.bucket, &object.key));

        let updated = bounded(
            "catalog.set_thumbnail_url",
            self.store_timeout,
            self.catalog.set_thumbnail_url(&media_id, &thumbnail_url),
        )
        .await?;

        if !updated {
            let existing = bounded("catalog.get", self.store_timeout, self.catalog.get(&media_id)).await?;
            if existing.is_none() {
                return Err(AppError::NotFound(format!("Media {} not found", media_id)));
            }
            tracing::debug!(media_id = %media_id, "Thumbnail already set, leaving it");
        }

        Ok(ThumbnailOutcome {
            media_id,
            thumbnail_url,
            updated,
        })
    }
}
