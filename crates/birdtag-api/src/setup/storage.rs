//! Storage setup and initialization

use anyhow::Result;
use birdtag_core::Config;
use birdtag_storage::{create_storage, ObjectStorage};
use std::sync::Arc;

pub async fn setup_storage(config: &Config) -> Result<Arc<dyn ObjectStorage>> {
    tracing::info!("Initializing object storage...");
    let storage = create_storage(config).await?;
    tracing::info!(
        backend = ?storage.backend_type(),
        bucket = storage.default_bucket(),
        "Object storage initialized successfully"
    );
    Ok(storage)
}
