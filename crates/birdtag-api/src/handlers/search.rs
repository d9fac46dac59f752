use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use birdtag_core::validation::constraints_from_params;
use birdtag_core::{AppError, MediaRecord, TagConstraints};
use birdtag_services::{count_labels, QueryOutcome};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::constants::{DETECTION_USAGE_HINT, NO_RESULTS_MESSAGE, SEARCH_USAGE_HINT};
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::identity::CallerIdentity;
use crate::state::AppState;

/// Query response. `results` is absent when the query carried no tag at all
/// and empty when nothing matched.
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<MediaRecord>>,
}

impl SearchResponse {
    fn from_outcome(outcome: QueryOutcome, usage_hint: &str) -> Self {
        match outcome {
            QueryOutcome::EmptyQuery => SearchResponse {
                message: usage_hint.to_string(),
                results: None,
            },
            QueryOutcome::NoMatches => SearchResponse {
                message: NO_RESULTS_MESSAGE.to_string(),
                results: Some(Vec::new()),
            },
            QueryOutcome::Matches(records) => SearchResponse {
                message: format!("Succeeded! Got {} records", records.len()),
                results: Some(records),
            },
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DetectionSearchRequest {
    /// Raw detector labels; repeated labels raise the minimum count.
    #[serde(default)]
    pub labels: Vec<String>,
}

async fn run_query(
    state: &AppState,
    constraints: &TagConstraints,
    usage_hint: &str,
) -> Result<SearchResponse, AppError> {
    let outcome = state.query.execute(constraints).await?;
    Ok(SearchResponse::from_outcome(outcome, usage_hint))
}

/// Find media carrying every requested tag with at least the requested count
///
/// Each query parameter other than `userID` is a tag; its value is the
/// minimum count (blank means 1, invalid values drop the tag).
#[utoipa::path(
    get,
    path = "/api/v0/media/search",
    tag = "search",
    params(
        ("userID" = Option<String>, Query, description = "Caller identity when no X-User-Id header is sent")
    ),
    responses(
        (status = 200, description = "Query evaluated", body = SearchResponse),
        (status = 401, description = "Missing caller identity", body = ErrorResponse),
        (status = 502, description = "A tag lookup failed", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, params), fields(user = %caller.as_str(), operation = "search_media"))]
pub async fn search_media(
    caller: CallerIdentity,
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<SearchResponse>, HttpAppError> {
    let constraints =
        constraints_from_params(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    let response = run_query(&state, &constraints, SEARCH_USAGE_HINT).await?;
    Ok(Json(response))
}

/// Find media by the labels a detector produced for a sample file
///
/// Labels are counted; each count becomes the minimum for its tag.
#[utoipa::path(
    post,
    path = "/api/v0/media/search/by-detections",
    tag = "search",
    request_body = DetectionSearchRequest,
    responses(
        (status = 200, description = "Query evaluated", body = SearchResponse),
        (status = 400, description = "Invalid request body", body = ErrorResponse),
        (status = 401, description = "Missing caller identity", body = ErrorResponse),
        (status = 502, description = "A tag lookup failed", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(user = %caller.as_str(), labels = request.labels.len(), operation = "search_by_detections"))]
pub async fn search_by_detections(
    caller: CallerIdentity,
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<DetectionSearchRequest>,
) -> Result<Json<SearchResponse>, HttpAppError> {
    let constraints = TagConstraints::from(count_labels(&request.labels));
    let response = run_query(&state, &constraints, DETECTION_USAGE_HINT).await?;
    Ok(Json(response))
}
