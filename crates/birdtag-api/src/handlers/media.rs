use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use birdtag_core::{AppError, MediaId, MediaRecord, TagIndexRow};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::identity::CallerIdentity;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ThumbnailLookupRequest {
    /// Thumbnail URL, signed or canonical
    pub thumbnail: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MediaTagsResponse {
    #[schema(value_type = String)]
    pub media_id: MediaId,
    pub tags: Vec<TagIndexRow>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteMediaRequest {
    #[serde(default)]
    pub urls: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FailedDeletion {
    #[schema(value_type = String)]
    pub media_id: MediaId,
    pub error: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FailedUrl {
    pub url: String,
    pub error: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteMediaResponse {
    pub message: String,
    #[schema(value_type = Vec<String>)]
    pub deleted: Vec<MediaId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<FailedDeletion>,
    /// URLs whose media could not be looked up.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_urls: Vec<FailedUrl>,
}

/// Look up the media item behind a thumbnail URL
#[utoipa::path(
    post,
    path = "/api/v0/media/by-thumbnail",
    tag = "media",
    request_body = ThumbnailLookupRequest,
    responses(
        (status = 200, description = "Media record with signed URLs", body = MediaRecord),
        (status = 400, description = "Malformed URL", body = ErrorResponse),
        (status = 401, description = "Missing caller identity", body = ErrorResponse),
        (status = 404, description = "No media has this thumbnail", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(user = %caller.as_str(), operation = "media_by_thumbnail"))]
pub async fn media_by_thumbnail(
    caller: CallerIdentity,
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<ThumbnailLookupRequest>,
) -> Result<Json<MediaRecord>, HttpAppError> {
    if request.thumbnail.trim().is_empty() {
        return Err(AppError::BadRequest("No thumbnail URL provided in the request body".to_string()).into());
    }
    let record = state.lookup.by_thumbnail(&request.thumbnail).await?;
    Ok(Json(record))
}

/// Every tag recorded for one media item
#[utoipa::path(
    get,
    path = "/api/v0/media/{media_id}/tags",
    tag = "media",
    params(
        ("media_id" = String, Path, description = "Media ID")
    ),
    responses(
        (status = 200, description = "Tags of the media item", body = MediaTagsResponse),
        (status = 401, description = "Missing caller identity", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(user = %caller.as_str(), operation = "media_tags"))]
pub async fn media_tags(
    caller: CallerIdentity,
    State(state): State<Arc<AppState>>,
    Path(media_id): Path<String>,
) -> Result<Json<MediaTagsResponse>, HttpAppError> {
    let media_id = MediaId::new(media_id);
    let tags = state.lookup.tags_of(&media_id).await?;
    Ok(Json(MediaTagsResponse { media_id, tags }))
}

/// Delete media by URL, with all their tags and stored objects
///
/// URLs that match no media item are ignored. A media item whose tag rows
/// could not all be removed is kept and listed under `failed`, and a URL
/// whose lookup failed is listed under `failed_urls`; repeating the request
/// finishes the job.
#[utoipa::path(
    delete,
    path = "/api/v0/media",
    tag = "media",
    request_body = DeleteMediaRequest,
    responses(
        (status = 200, description = "Deletion report", body = DeleteMediaResponse),
        (status = 400, description = "No URLs provided", body = ErrorResponse),
        (status = 401, description = "Missing caller identity", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(user = %caller.as_str(), urls = request.urls.len(), operation = "delete_media"))]
pub async fn delete_media(
    caller: CallerIdentity,
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<DeleteMediaRequest>,
) -> Result<Json<DeleteMediaResponse>, HttpAppError> {
    if request.urls.is_empty() {
        return Err(AppError::BadRequest("No URLs provided in the request body".to_string()).into());
    }

    let report = state
        .mutation
        .delete_media_by_urls(&request.urls, &state.resolver)
        .await?;

    if !report.failed.is_empty() || !report.failed_urls.is_empty() {
        tracing::warn!(
            failed = report.failed.len(),
            failed_urls = report.failed_urls.len(),
            "Some media could not be deleted"
        );
    }

    Ok(Json(DeleteMediaResponse {
        message: format!(
            "{} media file(s) got deleted successfully.",
            report.deleted.len()
        ),
        deleted: report.deleted,
        failed: report
            .failed
            .into_iter()
            .map(|(media_id, error)| FailedDeletion { media_id, error })
            .collect(),
        failed_urls: report
            .failed_urls
            .into_iter()
            .map(|(url, error)| FailedUrl { url, error })
            .collect(),
    }))
}
