//! OpenAPI documentation

use utoipa::OpenApi;

use crate::error::ErrorResponse;
use crate::handlers;
use birdtag_core::events::{BucketNotificationRecord, BucketRef, DetectionEvent, ObjectKeyRef, S3Entity, UploadEvent};
use birdtag_core::{FileType, MediaRecord, TagIndexRow};
use birdtag_services::PresignedUpload;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Birdtag API",
        version = "0.1.0",
        description = "Tag-based discovery of bird media. Media items are tagged with detected species and counts; queries return the items that carry every requested tag with at least the requested count. All endpoints are versioned under /api/v0/."
    ),
    paths(
        // Search
        handlers::search::search_media,
        handlers::search::search_by_detections,
        // Media
        handlers::media::media_by_thumbnail,
        handlers::media::media_tags,
        handlers::media::delete_media,
        // Tags
        handlers::tags::edit_tags,
        // Uploads
        handlers::uploads::create_upload,
        // Pipeline events
        handlers::events::ingest_detections,
        handlers::events::ingest_thumbnail,
    ),
    components(schemas(
        ErrorResponse,
        MediaRecord,
        FileType,
        TagIndexRow,
        PresignedUpload,
        DetectionEvent,
        UploadEvent,
        BucketNotificationRecord,
        S3Entity,
        BucketRef,
        ObjectKeyRef,
        handlers::search::SearchResponse,
        handlers::search::DetectionSearchRequest,
        handlers::media::ThumbnailLookupRequest,
        handlers::media::MediaTagsResponse,
        handlers::media::DeleteMediaRequest,
        handlers::media::DeleteMediaResponse,
        handlers::media::FailedDeletion,
        handlers::media::FailedUrl,
        handlers::tags::TagEditRequest,
        handlers::tags::TagEditResponse,
        handlers::tags::FailedTagEdit,
        handlers::uploads::UploadRequest,
        handlers::events::DetectionIngestResponse,
        handlers::events::ThumbnailIngestResponse,
    )),
    tags(
        (name = "search", description = "Multi-tag intersection queries"),
        (name = "media", description = "Media lookup and deletion"),
        (name = "tags", description = "Manual tag edits"),
        (name = "uploads", description = "Presigned uploads"),
        (name = "events", description = "Callbacks from the detection and thumbnail pipeline")
    )
)]
pub struct ApiDoc;

pub fn get_openapi_spec() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
