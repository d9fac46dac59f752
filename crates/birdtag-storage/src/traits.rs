//! Object storage abstraction
//!
//! Every backend (S3, local filesystem) implements [`ObjectStorage`].

use crate::StorageBackend;
use async_trait::async_trait;
use birdtag_core::AppError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("Object not found: {}", key)),
            StorageError::InvalidKey(msg) => AppError::InvalidInput(msg),
            other => AppError::Storage(other.to_string()),
        }
    }
}

/// Address of one stored object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Object storage abstraction trait
///
/// Backends own the URL convention for their objects: [`object_url`] and
/// [`locate`] are inverses for every location the backend produces.
///
/// [`object_url`]: ObjectStorage::object_url
/// [`locate`]: ObjectStorage::locate
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Bucket new uploads are written to
    fn default_bucket(&self) -> &str;

    /// Canonical (unsigned) URL of an object
    fn object_url(&self, location: &ObjectLocation) -> String;

    /// Derive `(bucket, key)` from a canonical URL. `None` when the URL does
    /// not follow this backend's convention.
    fn locate(&self, canonical_url: &str) -> Option<ObjectLocation>;

    /// Generate a presigned URL for direct access (GET)
    async fn presigned_get_url(
        &self,
        location: &ObjectLocation,
        expires_in: Duration,
    ) -> StorageResult<String>;

    /// Generate a presigned PUT URL for direct uploads
    async fn presigned_put_url(
        &self,
        location: &ObjectLocation,
        content_type: &str,
        expires_in: Duration,
    ) -> StorageResult<String>;

    /// Delete an object. Deleting a missing object succeeds.
    async fn delete(&self, location: &ObjectLocation) -> StorageResult<()>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
