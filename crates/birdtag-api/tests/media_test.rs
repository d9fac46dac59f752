//! Media lookup, tag edit and deletion integration tests.
//!
//! Run with: `cargo test -p birdtag-api --test media_test`

mod helpers;

use birdtag_core::{FileType, MediaId, TagIndexRow};
use birdtag_db::{FailingTagIndex, InMemoryTagIndex, MediaCatalogStore, TagIndexStore};
use helpers::{api_path, media_url, setup_test_app, setup_test_app_with_index, user_header};
use serde_json::{json, Value};
use std::sync::Arc;

#[tokio::test]
async fn test_tags_of_media() {
    let app = setup_test_app().await;
    app.seed_birds().await;
    let (name, value) = user_header();

    let response = app
        .client()
        .get(&api_path("/media/A/tags"))
        .add_header(name, value)
        .await;

    assert_eq!(response.status_code(), 200);
    let data: Value = response.json();
    assert_eq!(data["media_id"], "A");
    let mut tags: Vec<(String, u64)> = data["tags"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| {
            (
                t["tag_name"].as_str().unwrap().to_string(),
                t["tag_value"].as_u64().unwrap(),
            )
        })
        .collect();
    tags.sort();
    assert_eq!(tags, vec![("crow".to_string(), 3), ("owl".to_string(), 2)]);
}

#[tokio::test]
async fn test_media_by_signed_thumbnail_url() {
    let app = setup_test_app().await;
    app.seed_birds().await;
    let (name, value) = user_header();

    let signed = format!("{}?expires=1700000000&sig=abc", media_url("thumbnails/A.jpg"));
    let response = app
        .client()
        .post(&api_path("/media/by-thumbnail"))
        .add_header(name, value)
        .json(&json!({ "thumbnail": signed }))
        .await;

    assert_eq!(response.status_code(), 200);
    let data: Value = response.json();
    assert_eq!(data["media_id"], "A");
    assert_eq!(data["uploader"], helpers::TEST_USER);
}

#[tokio::test]
async fn test_media_by_unknown_thumbnail_is_not_found() {
    let app = setup_test_app().await;
    app.seed_birds().await;
    let (name, value) = user_header();

    let response = app
        .client()
        .post(&api_path("/media/by-thumbnail"))
        .add_header(name, value)
        .json(&json!({ "thumbnail": media_url("thumbnails/nope.jpg") }))
        .await;
    assert_eq!(response.status_code(), 404);

    let malformed = app
        .client()
        .post(&api_path("/media/by-thumbnail"))
        .add_header(name, value)
        .json(&json!({ "thumbnail": "not a url" }))
        .await;
    assert_eq!(malformed.status_code(), 400);
}

#[tokio::test]
async fn test_add_tags_replaces_counts_and_drops_bad_tokens() {
    let app = setup_test_app().await;
    app.seed_birds().await;
    let (name, value) = user_header();

    let response = app
        .client()
        .post(&api_path("/tags"))
        .add_header(name, value)
        .json(&json!({
            "urls": [media_url("thumbnails/A.jpg"), media_url("videos/B.mp4")],
            "tags": ["crow,5", "magpie,1", "crow", "123,2"],
            "operation": 1
        }))
        .await;

    assert_eq!(response.status_code(), 200);
    let data: Value = response.json();
    assert_eq!(data["message"], "Tags in 2 file(s) modified successfully");
    assert_eq!(data["rows_changed"], 4);

    let rows = app.index.rows_for_media(&MediaId::new("B")).await.unwrap();
    assert!(rows.contains(&TagIndexRow::new("crow", MediaId::new("B"), 5)));
    assert!(rows.contains(&TagIndexRow::new("magpie", MediaId::new("B"), 1)));
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn test_tag_edit_lists_items_that_failed() {
    let index = InMemoryTagIndex::new();
    let failing = FailingTagIndex::new(index.clone()).failing("magpie");
    let app = setup_test_app_with_index(index, Arc::new(failing)).await;
    app.seed_birds().await;
    let (name, value) = user_header();

    let response = app
        .client()
        .post(&api_path("/tags"))
        .add_header(name, value)
        .json(&json!({
            "media_ids": ["A", "B"],
            "tags": ["crow,5", "magpie,1"],
            "operation": 1
        }))
        .await;

    assert_eq!(response.status_code(), 200);
    let data: Value = response.json();
    assert_eq!(data["message"], "Tags in 0 file(s) modified successfully");
    let failed: Vec<&str> = data["failed"]
        .as_array()
        .expect("failed should be an array")
        .iter()
        .map(|f| f["media_id"].as_str().unwrap_or_default())
        .collect();
    assert_eq!(failed, vec!["A", "B"]);

    let rows = app.index.rows_for_media(&MediaId::new("B")).await.unwrap();
    assert_eq!(rows, vec![TagIndexRow::new("crow", MediaId::new("B"), 5)]);
}

#[tokio::test]
async fn test_remove_tags_by_media_id() {
    let app = setup_test_app().await;
    app.seed_birds().await;
    let (name, value) = user_header();

    let response = app
        .client()
        .post(&api_path("/tags"))
        .add_header(name, value)
        .json(&json!({
            "media_ids": ["A"],
            "tags": ["owl,1", "heron,1"],
            "operation": 0
        }))
        .await;

    assert_eq!(response.status_code(), 200);
    let data: Value = response.json();
    assert_eq!(data["rows_changed"], 1);

    let rows = app.index.rows_for_media(&MediaId::new("A")).await.unwrap();
    assert_eq!(rows, vec![TagIndexRow::new("crow", MediaId::new("A"), 3)]);
}

#[tokio::test]
async fn test_tag_edit_rejects_invalid_requests() {
    let app = setup_test_app().await;
    app.seed_birds().await;
    let (name, value) = user_header();

    for body in [
        json!({ "media_ids": ["A"], "tags": ["crow,1"], "operation": 2 }),
        json!({ "media_ids": ["A"], "tags": ["crow,1"] }),
        json!({ "media_ids": ["A"], "tags": [], "operation": 1 }),
        json!({ "tags": ["crow,1"], "operation": 1 }),
    ] {
        let response = app
            .client()
            .post(&api_path("/tags"))
            .add_header(name, value)
            .json(&body)
            .await;
        assert_eq!(response.status_code(), 400, "body: {}", body);
    }

    let malformed = app
        .client()
        .post(&api_path("/tags"))
        .add_header(name, value)
        .json(&json!({ "media_ids": "A", "tags": ["crow,1"], "operation": 1 }))
        .await;
    assert_eq!(malformed.status_code(), 400);
    let data: Value = malformed.json();
    assert_eq!(data["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_delete_media_cascades_to_tags_and_objects() {
    let app = setup_test_app().await;
    app.seed_birds().await;
    app.store_object("images/A.jpg");
    app.store_object("thumbnails/A.jpg");
    let (name, value) = user_header();

    let response = app
        .client()
        .delete(&api_path("/media"))
        .add_header(name, value)
        .json(&json!({
            "urls": [
                format!("{}?expires=1", media_url("images/A.jpg")),
                media_url("images/unknown.jpg")
            ]
        }))
        .await;

    assert_eq!(response.status_code(), 200);
    let data: Value = response.json();
    assert_eq!(data["message"], "1 media file(s) got deleted successfully.");
    assert_eq!(data["deleted"], json!(["A"]));

    assert!(app.index.rows_for_media(&MediaId::new("A")).await.unwrap().is_empty());
    assert!(app.catalog.get(&MediaId::new("A")).await.unwrap().is_none());
    assert!(!app.storage_path("images/A.jpg").exists());
    assert!(!app.storage_path("thumbnails/A.jpg").exists());

    // B is untouched and still found by a query.
    let search = app
        .client()
        .get(&api_path("/media/search"))
        .add_header(name, value)
        .add_query_param("crow", "1")
        .await;
    let data: Value = search.json();
    assert_eq!(data["results"][0]["media_id"], "B");
    assert_eq!(data["results"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_delete_requires_urls() {
    let app = setup_test_app().await;
    let (name, value) = user_header();

    let response = app
        .client()
        .delete(&api_path("/media"))
        .add_header(name, value)
        .json(&json!({ "urls": [] }))
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_audio_media_has_no_thumbnail() {
    let app = setup_test_app().await;
    app.add_media("S", FileType::Audio, "audio/S.wav", None).await;
    app.add_tags(&[("kookaburra", "S", 1)]).await;
    let (name, value) = user_header();

    let response = app
        .client()
        .get(&api_path("/media/search"))
        .add_header(name, value)
        .add_query_param("kookaburra", "1")
        .await;

    let data: Value = response.json();
    assert_eq!(data["results"][0]["file_type"], "audio");
    assert_eq!(data["results"][0]["thumbnail_url"], "");
}
