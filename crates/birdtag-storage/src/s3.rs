use crate::traits::{ObjectLocation, ObjectStorage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use http::{Method, Uri};
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::{ObjectStoreExt, Result as ObjectResult};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

/// S3 storage implementation
///
/// Objects may live in buckets other than the configured one (URLs stored in
/// the catalog carry their own bucket), so one client is kept per bucket.
pub struct S3Storage {
    bucket: String,
    region: String,
    endpoint_url: Option<String>, // Custom endpoint for S3-compatible providers
    stores: RwLock<HashMap<String, AmazonS3>>,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - default S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    pub fn new(bucket: String, region: String, endpoint_url: Option<String>) -> StorageResult<Self> {
        let storage = S3Storage {
            bucket,
            region,
            endpoint_url,
            stores: RwLock::new(HashMap::new()),
        };
        // Fail fast on credentials/config problems for the default bucket.
        let default_bucket = storage.bucket.clone();
        storage.store_for(&default_bucket)?;
        Ok(storage)
    }

    fn build_store(&self, bucket: &str) -> StorageResult<AmazonS3> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(self.region.clone())
            .with_bucket_name(bucket.to_string());

        if let Some(ref endpoint) = self.endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))
    }

    fn store_for(&self, bucket: &str) -> StorageResult<AmazonS3> {
        if let Ok(stores) = self.stores.read() {
            if let Some(store) = stores.get(bucket) {
                return Ok(store.clone());
            }
        }

        let store = self.build_store(bucket)?;
        if let Ok(mut stores) = self.stores.write() {
            stores.insert(bucket.to_string(), store.clone());
        }
        Ok(store)
    }

    async fn sign(
        &self,
        method: Method,
        location: &ObjectLocation,
        expires_in: Duration,
    ) -> StorageResult<String> {
        let store = self.store_for(&location.bucket)?;
        let path = Path::from(location.key.clone());
        let url_result: ObjectResult<_> = store.signed_url(method, &path, expires_in).await;

        let url = url_result
            .map_err(|e| StorageError::SigningFailed(e.to_string()))?
            .to_string();

        Ok(url)
    }
}

/// Split a virtual-hosted-style S3 URL: bucket is the first host label, key is
/// the path without its leading `/`.
pub(crate) fn locate_virtual_hosted(canonical_url: &str) -> Option<ObjectLocation> {
    let uri: Uri = canonical_url.parse().ok()?;
    let host = uri.host()?;
    if !host.ends_with(".amazonaws.com") {
        return None;
    }
    let bucket = host.split('.').next().filter(|b| !b.is_empty())?;
    let key = uri.path().trim_start_matches('/');
    if key.is_empty() {
        return None;
    }
    Some(ObjectLocation::new(bucket, key))
}

#[async_trait]
impl ObjectStorage for S3Storage {
    fn default_bucket(&self) -> &str {
        &self.bucket
    }

    /// For AWS S3, uses the standard format: https://{bucket}.s3.{region}.amazonaws.com/{key}
    /// For S3-compatible providers, path-style under the endpoint: {endpoint}/{bucket}/{key}
    fn object_url(&self, location: &ObjectLocation) -> String {
        match self.endpoint_url {
            Some(ref endpoint) => format!(
                "{}/{}/{}",
                endpoint.trim_end_matches('/'),
                location.bucket,
                location.key
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                location.bucket, self.region, location.key
            ),
        }
    }

    fn locate(&self, canonical_url: &str) -> Option<ObjectLocation> {
        if let Some(ref endpoint) = self.endpoint_url {
            let prefix = format!("{}/", endpoint.trim_end_matches('/'));
            if let Some(rest) = canonical_url.strip_prefix(&prefix) {
                let (bucket, key) = rest.split_once('/')?;
                if bucket.is_empty() || key.is_empty() {
                    return None;
                }
                return Some(ObjectLocation::new(bucket, key));
            }
        }
        locate_virtual_hosted(canonical_url)
    }

    async fn presigned_get_url(
        &self,
        location: &ObjectLocation,
        expires_in: Duration,
    ) -> StorageResult<String> {
        self.sign(Method::GET, location, expires_in).await
    }

    async fn presigned_put_url(
        &self,
        location: &ObjectLocation,
        _content_type: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        self.sign(Method::PUT, location, expires_in).await
    }

    async fn delete(&self, location: &ObjectLocation) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let store = self.store_for(&location.bucket)?;
        let path = Path::from(location.key.clone());

        let result: ObjectResult<_> = store.delete(&path).await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %location.bucket,
                key = %location.key,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 delete failed"
            );
            StorageError::DeleteFailed(e.to_string())
        })?;

        tracing::info!(
            bucket = %location.bucket,
            key = %location.key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_hosted_url_splits_into_bucket_and_key() {
        let location = locate_virtual_hosted(
            "https://birdtag-media.s3.us-east-1.amazonaws.com/thumbnails/abc.jpg",
        )
        .unwrap();
        assert_eq!(location, ObjectLocation::new("birdtag-media", "thumbnails/abc.jpg"));
    }

    #[test]
    fn non_s3_hosts_are_not_located() {
        assert_eq!(locate_virtual_hosted("https://example.com/a.jpg"), None);
        assert_eq!(
            locate_virtual_hosted("https://bucket.s3.us-east-1.amazonaws.com/"),
            None
        );
    }
}
