//! Application setup and initialization

pub mod database;
pub mod routes;
pub mod server;
pub mod services;
pub mod storage;

use crate::state::AppState;
use anyhow::{Context, Result};
use birdtag_core::Config;
use birdtag_infra::{init_telemetry, LogFormat};
use std::sync::Arc;

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    // Fail fast on misconfiguration
    config.validate().context("Configuration validation failed")?;

    init_telemetry(LogFormat::for_environment(&config.environment))
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    tracing::info!(
        environment = %config.environment,
        store_backend = %config.store_backend,
        storage_backend = %config.storage_backend,
        "Configuration loaded and validated successfully"
    );

    let (tag_index, catalog) = database::setup_stores(&config).await?;
    let storage = storage::setup_storage(&config).await?;
    let state = services::initialize_services(&config, tag_index, catalog, storage)?;
    let router = routes::setup_routes(&config, state.clone())?;

    Ok((state, router))
}
