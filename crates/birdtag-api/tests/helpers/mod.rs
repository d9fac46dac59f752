//! Test helpers: build the router over in-memory stores and a local storage
//! directory.
//!
//! Run from workspace root: `cargo test -p birdtag-api`.

#![allow(dead_code)]

use axum_test::TestServer;
use birdtag_api::constants::{API_PREFIX, USER_ID_HEADER};
use birdtag_api::setup::routes;
use birdtag_api::AppState;
use birdtag_core::{
    Config, FileType, MediaId, MediaRecord, StorageBackend, StoreBackend, TagIndexRow,
};
use birdtag_db::{InMemoryMediaCatalog, InMemoryTagIndex, MediaCatalogStore, TagIndexStore};
use birdtag_services::LogNotificationSink;
use birdtag_storage::LocalStorage;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub const BASE_URL: &str = "http://localhost:4000/media";
pub const TEST_USER: &str = "test-user";

/// API path prefix for tests (e.g. `/api/v0`).
pub fn api_path(path: &str) -> String {
    format!("{}{}", API_PREFIX, path)
}

pub fn media_url(key: &str) -> String {
    format!("{}/{}", BASE_URL, key)
}

/// Test application: server plus direct handles on the stores.
pub struct TestApp {
    pub server: TestServer,
    pub index: InMemoryTagIndex,
    pub catalog: InMemoryMediaCatalog,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    pub fn storage_path(&self, key: &str) -> PathBuf {
        self._temp_dir.path().join(key)
    }

    /// Create an empty stored object so URL signing succeeds for it.
    pub fn store_object(&self, key: &str) {
        let path = self.storage_path(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create object directory");
        }
        std::fs::write(path, b"object").expect("Failed to write object");
    }

    pub async fn add_media(&self, id: &str, file_type: FileType, key: &str, thumbnail_key: Option<&str>) {
        let mut record = MediaRecord::new(MediaId::new(id), file_type, media_url(key), TEST_USER);
        if let Some(thumbnail_key) = thumbnail_key {
            record = record.with_thumbnail(media_url(thumbnail_key));
        }
        self.catalog.put(&record).await.expect("Failed to seed record");
    }

    pub async fn add_tags(&self, rows: &[(&str, &str, u32)]) {
        let rows: Vec<TagIndexRow> = rows
            .iter()
            .map(|(tag, id, count)| TagIndexRow::new(*tag, MediaId::new(*id), *count))
            .collect();
        self.index.put_rows(&rows).await.expect("Failed to seed tags");
    }

    /// Index `(crow,A,3) (crow,B,1) (owl,A,2)` with catalog records for A and B.
    pub async fn seed_birds(&self) {
        self.add_media("A", FileType::Image, "images/A.jpg", Some("thumbnails/A.jpg")).await;
        self.add_media("B", FileType::Video, "videos/B.mp4", None).await;
        self.add_tags(&[("crow", "A", 3), ("crow", "B", 1), ("owl", "A", 2)]).await;
    }
}

pub fn test_config(storage_path: &std::path::Path) -> Config {
    Config {
        store_backend: StoreBackend::Memory,
        storage_backend: StorageBackend::Local,
        local_storage_path: Some(storage_path.display().to_string()),
        local_storage_base_url: Some(BASE_URL.to_string()),
        store_call_timeout_ms: 500,
        signing_timeout_ms: 500,
        ..Config::default()
    }
}

/// Setup a test app over fresh in-memory stores.
pub async fn setup_test_app() -> TestApp {
    let index = InMemoryTagIndex::new();
    setup_test_app_with_index(index.clone(), Arc::new(index)).await
}

/// Setup a test app whose router reads the tag index through `tag_index`
/// (e.g. a failure-injecting wrapper around `index`).
pub async fn setup_test_app_with_index(
    index: InMemoryTagIndex,
    tag_index: Arc<dyn TagIndexStore>,
) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let storage = LocalStorage::new(temp_dir.path(), BASE_URL.to_string())
        .await
        .expect("Failed to create local storage");
    let catalog = InMemoryMediaCatalog::new();
    let config = test_config(temp_dir.path());

    let state = Arc::new(AppState::new(
        config.clone(),
        tag_index,
        Arc::new(catalog.clone()),
        Arc::new(storage),
        Arc::new(LogNotificationSink),
    ));
    let router = routes::setup_routes(&config, state).expect("Failed to build routes");
    let server = TestServer::new(router).expect("Failed to start test server");

    TestApp {
        server,
        index,
        catalog,
        _temp_dir: temp_dir,
    }
}

pub fn user_header() -> (&'static str, &'static str) {
    (USER_ID_HEADER, TEST_USER)
}
