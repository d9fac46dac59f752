use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Globally unique media identifier.
///
/// Uploaded objects are named `{media_id}.{ext}`, so the id is recovered from
/// an object key by taking its file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[serde(transparent)]
pub struct MediaId(String);

impl MediaId {
    pub fn new(id: impl Into<String>) -> Self {
        MediaId(id.into())
    }

    /// Fresh random id for a new upload.
    pub fn generate() -> Self {
        MediaId(uuid::Uuid::new_v4().to_string())
    }

    /// Derive the media id from an object key such as `images/abc.jpg`.
    pub fn from_object_key(key: &str) -> Option<Self> {
        let file_name = key.rsplit('/').next()?;
        let stem = match file_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => file_name,
        };
        if stem.is_empty() {
            None
        } else {
            Some(MediaId(stem.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MediaId {
    fn from(value: String) -> Self {
        MediaId(value)
    }
}

impl From<&str> for MediaId {
    fn from(value: &str) -> Self {
        MediaId(value.to_string())
    }
}

/// Kind of uploaded media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "media_file_type", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Image,
    Video,
    Audio,
}

impl FileType {
    const IMAGE_EXTENSIONS: &'static [&'static str] =
        &["jpg", "jpeg", "png", "gif", "webp", "bmp"];
    const VIDEO_EXTENSIONS: &'static [&'static str] = &["mp4", "mov", "avi", "mkv", "webm"];
    const AUDIO_EXTENSIONS: &'static [&'static str] = &["wav", "mp3", "flac", "ogg", "m4a"];

    /// Classify a file name by extension. Unknown extensions yield `None`.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        let ext = ext.to_lowercase();
        if Self::IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(FileType::Image)
        } else if Self::VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(FileType::Video)
        } else if Self::AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Some(FileType::Audio)
        } else {
            None
        }
    }

    /// Top-level folder objects of this type are uploaded under.
    pub fn storage_folder(&self) -> &'static str {
        match self {
            FileType::Image => "images",
            FileType::Video => "videos",
            FileType::Audio => "audio",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Image => "image",
            FileType::Video => "video",
            FileType::Audio => "audio",
        }
    }
}

/// One catalog entry per uploaded media item.
///
/// `media_url` and `thumbnail_url` are canonical (unsigned) storage URLs.
/// `thumbnail_url` is empty until thumbnail generation reports back, and stays
/// empty for audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct MediaRecord {
    #[schema(value_type = String)]
    pub media_id: MediaId,
    pub file_type: FileType,
    pub media_url: String,
    pub thumbnail_url: String,
    pub uploader: String,
    pub uploaded_at: DateTime<Utc>,
}

impl MediaRecord {
    pub fn new(
        media_id: MediaId,
        file_type: FileType,
        media_url: impl Into<String>,
        uploader: impl Into<String>,
    ) -> Self {
        Self {
            media_id,
            file_type,
            media_url: media_url.into(),
            thumbnail_url: String::new(),
            uploader: uploader.into(),
            uploaded_at: Utc::now(),
        }
    }

    pub fn with_thumbnail(mut self, thumbnail_url: impl Into<String>) -> Self {
        self.thumbnail_url = thumbnail_url.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_id_from_object_key_takes_file_stem() {
        assert_eq!(
            MediaId::from_object_key("videos/5b1c.mp4"),
            Some(MediaId::new("5b1c"))
        );
        assert_eq!(
            MediaId::from_object_key("thumbnails/a.b.jpg"),
            Some(MediaId::new("a.b"))
        );
        assert_eq!(MediaId::from_object_key("plain"), Some(MediaId::new("plain")));
        assert_eq!(MediaId::from_object_key("images/"), None);
    }

    #[test]
    fn file_type_from_extension() {
        assert_eq!(FileType::from_file_name("x.JPG"), Some(FileType::Image));
        assert_eq!(FileType::from_file_name("clip.mp4"), Some(FileType::Video));
        assert_eq!(FileType::from_file_name("song.wav"), Some(FileType::Audio));
        assert_eq!(FileType::from_file_name("notes.txt"), None);
        assert_eq!(FileType::from_file_name("noext"), None);
    }

    #[test]
    fn file_type_serializes_lowercase() {
        let json = serde_json::to_string(&FileType::Video).unwrap();
        assert_eq!(json, "\"video\"");
    }
}
