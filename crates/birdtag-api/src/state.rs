//! Application state
//!
//! Stores are injected as trait objects, so the same state runs over
//! Postgres in production and over the in-memory stores in tests.

use birdtag_core::Config;
use birdtag_db::{MediaCatalogStore, TagIndexStore};
use birdtag_services::{
    DetectionIngestService, IntersectionQueryEngine, MediaLookupService, MutationOptions,
    NotificationSink, QueryOptions, TagMutationService, UploadService,
};
use birdtag_storage::{ObjectStorage, UrlResolver};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub tag_index: Arc<dyn TagIndexStore>,
    pub catalog: Arc<dyn MediaCatalogStore>,
    pub resolver: UrlResolver,
    pub query: IntersectionQueryEngine,
    pub lookup: MediaLookupService,
    pub mutation: TagMutationService,
    pub ingest: DetectionIngestService,
    pub uploads: UploadService,
}

impl AppState {
    pub fn new(
        config: Config,
        tag_index: Arc<dyn TagIndexStore>,
        catalog: Arc<dyn MediaCatalogStore>,
        storage: Arc<dyn ObjectStorage>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let resolver = UrlResolver::new(
            storage.clone(),
            Duration::from_millis(config.signing_timeout_ms),
        )
        .with_region(config.s3_region.clone());
        let query_options = QueryOptions::from(&config);
        let mutation_options = MutationOptions::from(&config);

        let query = IntersectionQueryEngine::new(
            tag_index.clone(),
            catalog.clone(),
            resolver.clone(),
            query_options.clone(),
        );
        let lookup = MediaLookupService::new(
            tag_index.clone(),
            catalog.clone(),
            resolver.clone(),
            &query_options,
        );
        let mutation = TagMutationService::new(
            tag_index.clone(),
            catalog.clone(),
            mutation_options.clone(),
        );
        let ingest = DetectionIngestService::new(
            mutation.clone(),
            catalog.clone(),
            resolver.clone(),
            notifier,
            mutation_options.store_timeout,
        );
        let uploads = UploadService::new(storage, catalog.clone(), &config);

        Self {
            config,
            tag_index,
            catalog,
            resolver,
            query,
            lookup,
            mutation,
            ingest,
            uploads,
        }
    }

    /// Bound applied to each store call made directly by handlers.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.config.store_call_timeout_ms)
    }
}
