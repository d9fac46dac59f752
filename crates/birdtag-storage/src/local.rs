use crate::traits::{ObjectLocation, ObjectStorage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;

/// Bucket name reported for every object of the local backend
pub const LOCAL_BUCKET: &str = "local";

/// Local filesystem storage implementation
///
/// Objects are files under `base_path`, served at `{base_url}/{key}`. There is
/// no real signing; "presigned" URLs carry only an `expires` marker.
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for file storage (e.g., "/var/lib/birdtag/media")
    /// * `base_url` - Base URL for serving files (e.g., "http://localhost:4000/media")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Convert storage key to filesystem path, rejecting keys that would
    /// escape the base directory.
    pub fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        if storage_key.is_empty()
            || storage_key.contains("..")
            || storage_key.starts_with('/')
            || storage_key.contains('\\')
        {
            return Err(StorageError::InvalidKey(format!(
                "Storage key '{}' contains invalid characters",
                storage_key
            )));
        }

        Ok(self.base_path.join(storage_key))
    }

    fn expiring_url(&self, key: &str, expires_in: Duration) -> String {
        let expires_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d + expires_in)
            .unwrap_or(expires_in)
            .as_secs();
        format!("{}/{}?expires={}", self.base_url, key, expires_at)
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    fn default_bucket(&self) -> &str {
        LOCAL_BUCKET
    }

    fn object_url(&self, location: &ObjectLocation) -> String {
        format!("{}/{}", self.base_url, location.key)
    }

    fn locate(&self, canonical_url: &str) -> Option<ObjectLocation> {
        let key = canonical_url
            .strip_prefix(&self.base_url)?
            .strip_prefix('/')?;
        if key.is_empty() {
            return None;
        }
        Some(ObjectLocation::new(LOCAL_BUCKET, key))
    }

    async fn presigned_get_url(
        &self,
        location: &ObjectLocation,
        expires_in: Duration,
    ) -> StorageResult<String> {
        let path = self.key_to_path(&location.key)?;
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(location.key.clone()));
        }
        Ok(self.expiring_url(&location.key, expires_in))
    }

    async fn presigned_put_url(
        &self,
        location: &ObjectLocation,
        _content_type: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        self.key_to_path(&location.key)?;
        Ok(self.expiring_url(&location.key, expires_in))
    }

    async fn delete(&self, location: &ObjectLocation) -> StorageResult<()> {
        let path = self.key_to_path(&location.key)?;
        let start = std::time::Instant::now();

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }

        fs::remove_file(&path).await.map_err(|e| {
            StorageError::DeleteFailed(format!("Failed to delete file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            key = %location.key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn storage(dir: &TempDir) -> LocalStorage {
        LocalStorage::new(dir.path(), "http://localhost:4000/media/".to_string())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn url_and_locate_are_inverse() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir).await;
        let location = ObjectLocation::new(LOCAL_BUCKET, "images/a.jpg");
        let url = storage.object_url(&location);
        assert_eq!(url, "http://localhost:4000/media/images/a.jpg");
        assert_eq!(storage.locate(&url), Some(location));
        assert_eq!(storage.locate("http://elsewhere/images/a.jpg"), None);
    }

    #[tokio::test]
    async fn delete_removes_file_and_tolerates_missing() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir).await;
        let location = ObjectLocation::new(LOCAL_BUCKET, "images/a.jpg");
        let path = storage.key_to_path(&location.key).unwrap();
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, b"jpeg").await.unwrap();

        storage.delete(&location).await.unwrap();
        assert!(!path.exists());
        storage.delete(&location).await.unwrap();
    }

    #[tokio::test]
    async fn presigned_get_requires_existing_object() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir).await;
        let location = ObjectLocation::new(LOCAL_BUCKET, "images/missing.jpg");
        let err = storage
            .presigned_get_url(&location, Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir).await;
        assert!(matches!(
            storage.key_to_path("../etc/passwd"),
            Err(StorageError::InvalidKey(_))
        ));
    }
}
