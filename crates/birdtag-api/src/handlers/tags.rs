use std::sync::Arc;

use axum::{extract::State, Json};
use birdtag_core::validation::parse_tag_tokens;
use birdtag_core::{AppError, MediaId};
use birdtag_services::TagOperation;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::identity::CallerIdentity;
use crate::state::AppState;

/// Tag edit over several media items
///
/// Items are named by URL (thumbnail or media URL, signed or not) or by id.
/// Tags are `"name,count"` tokens; malformed tokens are ignored.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TagEditRequest {
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub media_ids: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// 1 adds or replaces, 0 removes
    pub operation: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FailedTagEdit {
    #[schema(value_type = String)]
    pub media_id: MediaId,
    pub error: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TagEditResponse {
    pub message: String,
    #[schema(value_type = Vec<String>)]
    pub media_ids: Vec<MediaId>,
    pub rows_changed: usize,
    /// Media items whose edit did not fully apply; repeating the request
    /// finishes them.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<FailedTagEdit>,
}

/// Add or remove tags on media items
#[utoipa::path(
    post,
    path = "/api/v0/tags",
    tag = "tags",
    request_body = TagEditRequest,
    responses(
        (status = 200, description = "Tags modified; items that failed are listed under `failed`", body = TagEditResponse),
        (status = 400, description = "Missing media, tags or operation", body = ErrorResponse),
        (status = 401, description = "Missing caller identity", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(user = %caller.as_str(), operation = "edit_tags"))]
pub async fn edit_tags(
    caller: CallerIdentity,
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<TagEditRequest>,
) -> Result<Json<TagEditResponse>, HttpAppError> {
    if request.urls.is_empty() && request.media_ids.is_empty() {
        return Err(AppError::BadRequest(
            "No media URLs or ids provided in the request body".to_string(),
        )
        .into());
    }
    if request.tags.is_empty() {
        return Err(AppError::BadRequest("No tags provided in the request body".to_string()).into());
    }
    let operation = TagOperation::try_from(request.operation.unwrap_or(-1))?;

    let mut media_ids: Vec<MediaId> = Vec::new();
    for id in request.media_ids.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let id = MediaId::new(id);
        if !media_ids.contains(&id) {
            media_ids.push(id);
        }
    }
    for id in state.lookup.media_ids_for_urls(&request.urls).await? {
        if !media_ids.contains(&id) {
            media_ids.push(id);
        }
    }

    let tokens = parse_tag_tokens(&request.tags);
    if tokens.len() < request.tags.len() {
        tracing::debug!(
            dropped = request.tags.len() - tokens.len(),
            "Ignoring malformed tag tokens"
        );
    }

    let report = state
        .mutation
        .edit_tags(&media_ids, &tokens, operation)
        .await?;

    if !report.failed.is_empty() {
        tracing::warn!(failed = report.failed.len(), "Some tag edits did not fully apply");
    }

    Ok(Json(TagEditResponse {
        message: format!("Tags in {} file(s) modified successfully", report.media_ids.len()),
        media_ids: report.media_ids,
        rows_changed: report.rows_changed,
        failed: report
            .failed
            .into_iter()
            .map(|(media_id, error)| FailedTagEdit { media_id, error })
            .collect(),
    }))
}
