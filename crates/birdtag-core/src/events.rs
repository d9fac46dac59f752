//! Upload events delivered by the storage pipeline
//!
//! Two payload shapes reach the service: a direct bucket notification
//! (`Records[].s3`) and a notification relayed through an event bus
//! (`detail`). Both are normalized into an [`ObjectRef`] before anything else
//! looks at them.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::models::{FileType, MediaId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BucketRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ObjectKeyRef {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct S3Entity {
    pub bucket: BucketRef,
    pub object: ObjectKeyRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BucketNotificationRecord {
    pub s3: S3Entity,
}

/// Upload event as delivered by the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum UploadEvent {
    /// Direct bucket notification; only the first record is used.
    BucketNotification {
        #[serde(rename = "Records")]
        records: Vec<BucketNotificationRecord>,
    },
    /// Notification relayed through an event bus.
    EventBus { detail: S3Entity },
}

/// The uploaded object an event refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    /// Media id derived from the object key's file stem.
    pub fn media_id(&self) -> Result<MediaId, AppError> {
        MediaId::from_object_key(&self.key).ok_or_else(|| {
            AppError::InvalidInput(format!("Cannot derive a media id from key '{}'", self.key))
        })
    }

    pub fn file_type(&self) -> Result<FileType, AppError> {
        FileType::from_file_name(&self.key).ok_or_else(|| {
            AppError::InvalidInput(format!("Unsupported media type for key '{}'", self.key))
        })
    }
}

impl UploadEvent {
    pub fn object(&self) -> Result<ObjectRef, AppError> {
        let entity = match self {
            UploadEvent::BucketNotification { records } => records
                .first()
                .map(|r| &r.s3)
                .ok_or_else(|| AppError::InvalidInput("Event has no records".to_string()))?,
            UploadEvent::EventBus { detail } => detail,
        };

        let bucket = entity.bucket.name.trim();
        let key = decode_object_key(entity.object.key.trim())?;
        if bucket.is_empty() || key.is_empty() {
            return Err(AppError::InvalidInput(
                "Event is missing the bucket name or object key".to_string(),
            ));
        }

        Ok(ObjectRef {
            bucket: bucket.to_string(),
            key,
        })
    }
}

/// Bucket notifications deliver keys form-encoded (`+` for space, `%XX`).
fn decode_object_key(raw: &str) -> Result<String, AppError> {
    urlencoding::decode(&raw.replace('+', " "))
        .map(|key| key.into_owned())
        .map_err(|e| {
            AppError::InvalidInput(format!("Object key '{}' is not valid UTF-8: {}", raw, e))
        })
}

/// Detector output for one uploaded object, together with its upload event.
///
/// Which field is read depends on the file type: `frames` for video (labels
/// detected per frame), `labels` for an image, `species` for audio.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DetectionEvent {
    #[schema(value_type = Object)]
    pub event: UploadEvent,
    #[serde(default)]
    pub frames: Vec<Vec<String>>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub species: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bucket_notification_normalizes_to_object_ref() {
        let event: UploadEvent = serde_json::from_value(json!({
            "Records": [{
                "s3": {
                    "bucket": { "name": "birdtag-media" },
                    "object": { "key": "videos/abc.mp4" }
                }
            }]
        }))
        .unwrap();
        let object = event.object().unwrap();
        assert_eq!(object.bucket, "birdtag-media");
        assert_eq!(object.key, "videos/abc.mp4");
        assert_eq!(object.media_id().unwrap().as_str(), "abc");
        assert_eq!(object.file_type().unwrap(), FileType::Video);
    }

    #[test]
    fn event_bus_detail_normalizes_to_object_ref() {
        let event: UploadEvent = serde_json::from_value(json!({
            "detail": {
                "bucket": { "name": "birdtag-media" },
                "object": { "key": "images/my+bird%21.jpg" }
            }
        }))
        .unwrap();
        let object = event.object().unwrap();
        assert_eq!(object.key, "images/my bird!.jpg");
        assert_eq!(object.file_type().unwrap(), FileType::Image);
    }

    fn detail_event(key: &str) -> UploadEvent {
        serde_json::from_value(json!({
            "detail": {
                "bucket": { "name": "birdtag-media" },
                "object": { "key": key }
            }
        }))
        .unwrap()
    }

    #[test]
    fn multibyte_escapes_decode_to_utf8() {
        let object = detail_event("images/my+bird%28%e2%82%ac%29.jpg").object().unwrap();
        assert_eq!(object.key, "images/my bird(€).jpg");
    }

    #[test]
    fn key_that_is_not_utf8_is_invalid_input() {
        assert!(matches!(
            detail_event("images/bad%ff.jpg").object(),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn empty_records_is_invalid_input() {
        let event = UploadEvent::BucketNotification { records: vec![] };
        assert!(matches!(event.object(), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn detection_event_defaults_missing_outputs() {
        let detection: DetectionEvent = serde_json::from_value(json!({
            "event": { "detail": {
                "bucket": { "name": "b" },
                "object": { "key": "audio/x.wav" }
            }},
            "species": ["Kookaburra"]
        }))
        .unwrap();
        assert!(detection.frames.is_empty());
        assert_eq!(detection.species, vec!["Kookaburra".to_string()]);
    }
}
