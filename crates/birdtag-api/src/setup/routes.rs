//! Route configuration and setup

use crate::constants::{API_PREFIX, MAX_BODY_BYTES};
use crate::handlers;
use crate::state::AppState;
use axum::{
    http::{HeaderValue, Method},
    routing::{delete, get, post},
    Json, Router,
};
use birdtag_core::Config;
use birdtag_infra::request_id_middleware;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router<()>, anyhow::Error> {
    let cors = setup_cors(config)?;

    let app = Router::new()
        .merge(public_routes())
        .nest(API_PREFIX, api_routes())
        .merge(utoipa_rapidoc::RapiDoc::new(format!("{}/openapi.json", API_PREFIX)).path("/docs"))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_id_middleware))
        .with_state(state);

    Ok(app)
}

/// Setup CORS configuration
fn setup_cors(config: &Config) -> Result<CorsLayer, anyhow::Error> {
    let methods = [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];
    let cors = if config.cors_origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS configured to allow all origins - not recommended for production");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any)
    } else {
        let origins = config
            .cors_origins
            .iter()
            .map(|o| o.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("Invalid CORS origin: {}", e))?;

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(Any)
    };
    Ok(cors)
}

/// Health probes
fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health/live", get(handlers::health::liveness_check))
        .route("/health/ready", get(handlers::health::readiness_check))
}

/// Versioned API. Every route except the OpenAPI document and the pipeline
/// callbacks requires a caller identity, enforced by the `CallerIdentity`
/// extractor.
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/openapi.json",
            get(|| async { Json(crate::api_doc::get_openapi_spec()) }),
        )
        .route("/media/search", get(handlers::search::search_media))
        .route(
            "/media/search/by-detections",
            post(handlers::search::search_by_detections),
        )
        .route(
            "/media/by-thumbnail",
            post(handlers::media::media_by_thumbnail),
        )
        .route("/media/{media_id}/tags", get(handlers::media::media_tags))
        .route("/media", delete(handlers::media::delete_media))
        .route("/tags", post(handlers::tags::edit_tags))
        .route("/uploads", post(handlers::uploads::create_upload))
        .route(
            "/events/detections",
            post(handlers::events::ingest_detections),
        )
        .route(
            "/events/thumbnails",
            post(handlers::events::ingest_thumbnail),
        )
}
