//! Pipeline callbacks
//!
//! Called by the detection and thumbnail workers, not by end users, so no
//! caller identity is required.

use std::sync::Arc;

use axum::{extract::State, Json};
use birdtag_core::events::{DetectionEvent, UploadEvent};
use birdtag_core::{FileType, MediaId, TagCounts};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct DetectionIngestResponse {
    pub message: String,
    #[schema(value_type = String)]
    pub media_id: MediaId,
    pub file_type: FileType,
    #[schema(value_type = Object)]
    pub tags: TagCounts,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ThumbnailIngestResponse {
    #[schema(value_type = String)]
    pub media_id: MediaId,
    pub thumbnail_url: String,
    pub updated: bool,
}

/// Store the detector output for an uploaded object as its tags
#[utoipa::path(
    post,
    path = "/api/v0/events/detections",
    tag = "events",
    request_body = DetectionEvent,
    responses(
        (status = 200, description = "Detections stored", body = DetectionIngestResponse),
        (status = 400, description = "Invalid event", body = ErrorResponse),
        (status = 500, description = "Some tag rows could not be written", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, event), fields(operation = "ingest_detections"))]
pub async fn ingest_detections(
    State(state): State<Arc<AppState>>,
    ValidatedJson(event): ValidatedJson<DetectionEvent>,
) -> Result<Json<DetectionIngestResponse>, HttpAppError> {
    let key = event.event.object()?.key;
    let report = state.ingest.ingest_detections(&event).await?;
    Ok(Json(DetectionIngestResponse {
        message: format!("Successfully processed {}", key),
        media_id: report.media_id,
        file_type: report.file_type,
        tags: report.tags,
    }))
}

/// Record a generated thumbnail on its media item
#[utoipa::path(
    post,
    path = "/api/v0/events/thumbnails",
    tag = "events",
    request_body = UploadEvent,
    responses(
        (status = 200, description = "Thumbnail recorded", body = ThumbnailIngestResponse),
        (status = 400, description = "Key outside thumbnails/", body = ErrorResponse),
        (status = 404, description = "Unknown media item", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, event), fields(operation = "ingest_thumbnail"))]
pub async fn ingest_thumbnail(
    State(state): State<Arc<AppState>>,
    ValidatedJson(event): ValidatedJson<UploadEvent>,
) -> Result<Json<ThumbnailIngestResponse>, HttpAppError> {
    let outcome = state.ingest.ingest_thumbnail(&event).await?;
    Ok(Json(ThumbnailIngestResponse {
        media_id: outcome.media_id,
        thumbnail_url: outcome.thumbnail_url,
        updated: outcome.updated,
    }))
}
