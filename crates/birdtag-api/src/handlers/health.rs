//! Health check handlers

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use birdtag_core::AppError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Run a check with a timeout; "ready", "timeout" or "not_ready: {error}".
async fn run_check<F>(timeout: Duration, check: F) -> Result<(), String>
where
    F: Future<Output = Result<(), AppError>>,
{
    match tokio::time::timeout(timeout, check).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("not_ready: {}", e)),
        Err(_) => Err("timeout".to_string()),
    }
}

/// Liveness probe - process is running.
pub async fn liveness_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "alive" })),
    )
}

/// Readiness probe - both stores answer.
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let timeout = state.store_timeout();
    let tag_index = run_check(timeout, state.tag_index.ping()).await;
    let catalog = run_check(timeout, state.catalog.ping()).await;

    let describe = |result: &Result<(), String>| match result {
        Ok(()) => "ready".to_string(),
        Err(reason) => reason.clone(),
    };
    let ready = tag_index.is_ok() && catalog.is_ok();
    if !ready {
        tracing::error!(
            tag_index = %describe(&tag_index),
            catalog = %describe(&catalog),
            "Readiness check failed"
        );
    }

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(serde_json::json!({
            "status": if ready { "ready" } else { "not_ready" },
            "tag_index": describe(&tag_index),
            "catalog": describe(&catalog),
        })),
    )
}
