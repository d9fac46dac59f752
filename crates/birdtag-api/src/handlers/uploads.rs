use std::sync::Arc;

use axum::{extract::State, Json};
use birdtag_core::AppError;
use birdtag_services::PresignedUpload;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::identity::CallerIdentity;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct UploadRequest {
    pub file_name: String,
    pub content_type: String,
}

/// Issue a presigned PUT URL for a new media file
///
/// The media record is created right away with the caller as uploader; its
/// tags arrive once the detector has processed the upload.
#[utoipa::path(
    post,
    path = "/api/v0/uploads",
    tag = "uploads",
    request_body = UploadRequest,
    responses(
        (status = 200, description = "Presigned URL generated", body = PresignedUpload),
        (status = 400, description = "Unsupported file type", body = ErrorResponse),
        (status = 401, description = "Missing caller identity", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(user = %caller.as_str(), file_name = %request.file_name, operation = "create_upload"))]
pub async fn create_upload(
    caller: CallerIdentity,
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<UploadRequest>,
) -> Result<Json<PresignedUpload>, HttpAppError> {
    if request.content_type.trim().is_empty() {
        return Err(AppError::InvalidInput("content_type is required".to_string()).into());
    }
    let upload = state
        .uploads
        .create_upload(&request.file_name, &request.content_type, caller.as_str())
        .await?;
    Ok(Json(upload))
}
