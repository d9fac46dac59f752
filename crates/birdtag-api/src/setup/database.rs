//! Store setup: Postgres pool with migrations, or the in-memory stores

use anyhow::{Context, Result};
use birdtag_core::{Config, StoreBackend};
use birdtag_db::{
    InMemoryMediaCatalog, InMemoryTagIndex, MediaCatalogRepository, MediaCatalogStore,
    TagIndexRepository, TagIndexStore,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub type Stores = (Arc<dyn TagIndexStore>, Arc<dyn MediaCatalogStore>);

/// Build the tag index and media catalog for the configured backend
pub async fn setup_stores(config: &Config) -> Result<Stores> {
    match config.store_backend {
        StoreBackend::Postgres => {
            let pool = setup_database(config).await?;
            let tag_index =
                TagIndexRepository::new(pool.clone()).with_batch_size(config.index_batch_size);
            let catalog = MediaCatalogRepository::new(pool);
            Ok((Arc::new(tag_index), Arc::new(catalog)))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory stores; data is lost on restart");
            Ok((
                Arc::new(InMemoryTagIndex::new().with_batch_limit(config.index_batch_size)),
                Arc::new(InMemoryMediaCatalog::new()),
            ))
        }
    }
}

/// Setup database connection pool and run migrations
pub async fn setup_database(config: &Config) -> Result<PgPool> {
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set for the postgres store backend")?;

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_timeout_seconds))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    tracing::info!(
        max_connections = config.db_max_connections,
        "Database connected successfully"
    );

    // Workspace migrations/ relative to this crate
    let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
    let migrator = sqlx::migrate::Migrator::new(migrations_dir)
        .await
        .context("Failed to load migrations")?;
    migrator
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}
