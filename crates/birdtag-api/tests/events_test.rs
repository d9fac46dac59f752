//! Upload, pipeline event, health and OpenAPI integration tests.
//!
//! Run with: `cargo test -p birdtag-api --test events_test`

mod helpers;

use birdtag_core::{MediaId, TagIndexRow};
use birdtag_db::{MediaCatalogStore, TagIndexStore};
use helpers::{api_path, media_url, setup_test_app, user_header};
use serde_json::{json, Value};

#[tokio::test]
async fn test_upload_issues_url_and_registers_media() {
    let app = setup_test_app().await;
    let (name, value) = user_header();

    let response = app
        .client()
        .post(&api_path("/uploads"))
        .add_header(name, value)
        .json(&json!({ "file_name": "dawn-chorus.WAV", "content_type": "audio/wav" }))
        .await;

    assert_eq!(response.status_code(), 200);
    let data: Value = response.json();
    assert_eq!(data["file_type"], "audio");
    let key = data["storage_key"].as_str().unwrap();
    assert!(key.starts_with("audio/") && key.ends_with(".wav"));

    let media_id = MediaId::new(data["media_id"].as_str().unwrap());
    let record = app.catalog.get(&media_id).await.unwrap().unwrap();
    assert_eq!(record.uploader, helpers::TEST_USER);
    assert_eq!(record.media_url, media_url(key));
}

#[tokio::test]
async fn test_upload_rejects_unsupported_files() {
    let app = setup_test_app().await;
    let (name, value) = user_header();

    let response = app
        .client()
        .post(&api_path("/uploads"))
        .add_header(name, value)
        .json(&json!({ "file_name": "notes.pdf", "content_type": "application/pdf" }))
        .await;

    assert_eq!(response.status_code(), 400);
    assert!(app.catalog.is_empty());
}

#[tokio::test]
async fn test_detection_event_tags_media_without_identity() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .post(&api_path("/events/detections"))
        .json(&json!({
            "event": { "Records": [{ "s3": {
                "bucket": { "name": "local" },
                "object": { "key": "videos/clip9.mp4" }
            }}]},
            "frames": [["crow"], ["crow", "crow", "owl"], []]
        }))
        .await;

    assert_eq!(response.status_code(), 200);
    let data: Value = response.json();
    assert_eq!(data["media_id"], "clip9");
    assert_eq!(data["tags"], json!({ "crow": 2, "owl": 1 }));

    let rows = app.index.rows_for_media(&MediaId::new("clip9")).await.unwrap();
    assert!(rows.contains(&TagIndexRow::new("crow", MediaId::new("clip9"), 2)));

    // Now searchable.
    let (name, value) = user_header();
    let search = app
        .client()
        .get(&api_path("/media/search"))
        .add_header(name, value)
        .add_query_param("crow", "2")
        .await;
    let data: Value = search.json();
    assert_eq!(data["results"][0]["media_id"], "clip9");
}

#[tokio::test]
async fn test_detection_event_with_unknown_shape_is_rejected() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .post(&api_path("/events/detections"))
        .json(&json!({ "event": { "something": "else" } }))
        .await;

    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_thumbnail_event_sets_thumbnail_once() {
    let app = setup_test_app().await;
    app.add_media("P", birdtag_core::FileType::Image, "images/P.png", None)
        .await;

    let event = json!({ "detail": {
        "bucket": { "name": "local" },
        "object": { "key": "thumbnails/P.png" }
    }});
    let first = app
        .client()
        .post(&api_path("/events/thumbnails"))
        .json(&event)
        .await;
    assert_eq!(first.status_code(), 200);
    let data: Value = first.json();
    assert_eq!(data["updated"], true);
    assert_eq!(data["thumbnail_url"], media_url("thumbnails/P.png"));

    let second = app
        .client()
        .post(&api_path("/events/thumbnails"))
        .json(&event)
        .await;
    let data: Value = second.json();
    assert_eq!(data["updated"], false);

    let outside = app
        .client()
        .post(&api_path("/events/thumbnails"))
        .json(&json!({ "detail": {
            "bucket": { "name": "local" },
            "object": { "key": "images/P.png" }
        }}))
        .await;
    assert_eq!(outside.status_code(), 400);
}

#[tokio::test]
async fn test_health_probes() {
    let app = setup_test_app().await;

    let live = app.client().get("/health/live").await;
    assert_eq!(live.status_code(), 200);

    let ready = app.client().get("/health/ready").await;
    assert_eq!(ready.status_code(), 200);
    let data: Value = ready.json();
    assert_eq!(data["status"], "ready");
}

#[tokio::test]
async fn test_openapi_document_lists_search() {
    let app = setup_test_app().await;

    let response = app.client().get(&api_path("/openapi.json")).await;

    assert_eq!(response.status_code(), 200);
    let data: Value = response.json();
    assert!(data["paths"]["/api/v0/media/search"].is_object());
    assert!(data["paths"]["/api/v0/tags"].is_object());
}
