//! Translation between stored URLs and deliverable signed URLs

use crate::traits::{ObjectLocation, ObjectStorage};
use http::Uri;
use std::sync::Arc;
use std::time::Duration;

const LEGACY_S3_HOST_SUFFIX: &str = ".s3.amazonaws.com";

/// Region assumed for legacy global S3 hosts when none is configured.
pub const DEFAULT_S3_REGION: &str = "us-east-1";

/// Canonical form of a possibly-signed URL: `scheme://host/path`.
///
/// Query string and fragment are dropped, and the legacy global S3 host is
/// rewritten to its form in `region`. Canonicalizing a canonical URL returns
/// it unchanged. Returns `None` for anything that is not an absolute URL.
pub fn canonicalize(url: &str, region: &str) -> Option<String> {
    let url = url.trim();
    let url = url.split('#').next().unwrap_or(url);
    let url = url.split('?').next().unwrap_or(url);
    if url.is_empty() {
        return None;
    }

    let uri: Uri = url.parse().ok()?;
    let scheme = uri.scheme_str()?;
    let authority = uri.authority()?.as_str();
    if authority.is_empty() {
        return None;
    }

    let authority = match authority.strip_suffix(LEGACY_S3_HOST_SUFFIX) {
        Some(bucket) => format!("{}.s3.{}.amazonaws.com", bucket, region),
        None => authority.to_string(),
    };

    Some(format!("{}://{}{}", scheme, authority, uri.path()))
}

/// Resolves stored URLs into freshly signed delivery URLs.
///
/// Resolution never fails: a malformed URL yields an empty string and a
/// signing failure or timeout yields the unsigned canonical URL.
#[derive(Clone)]
pub struct UrlResolver {
    storage: Arc<dyn ObjectStorage>,
    signing_timeout: Duration,
    region: String,
}

impl UrlResolver {
    pub fn new(storage: Arc<dyn ObjectStorage>, signing_timeout: Duration) -> Self {
        Self {
            storage,
            signing_timeout,
            region: DEFAULT_S3_REGION.to_string(),
        }
    }

    /// Region that legacy global S3 hosts are rewritten to.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Canonical form of `url` for this deployment's region.
    pub fn canonicalize(&self, url: &str) -> Option<String> {
        canonicalize(url, &self.region)
    }

    pub fn storage(&self) -> &Arc<dyn ObjectStorage> {
        &self.storage
    }

    /// Bucket and key behind a (possibly signed) URL.
    pub fn locate(&self, url: &str) -> Option<ObjectLocation> {
        let canonical = self.canonicalize(url)?;
        self.storage.locate(&canonical)
    }

    /// Canonical URL for an object location.
    pub fn url_for(&self, location: &ObjectLocation) -> String {
        self.storage.object_url(location)
    }

    /// Re-sign a URL for delivery with the given lifetime.
    pub async fn resolve(&self, url: &str, expires_in: Duration) -> String {
        if url.trim().is_empty() {
            return String::new();
        }

        let Some(canonical) = self.canonicalize(url) else {
            tracing::warn!(url = %url, "Unparseable media URL, returning empty URL");
            return String::new();
        };

        let Some(location) = self.storage.locate(&canonical) else {
            tracing::debug!(url = %canonical, "URL outside object storage, returning it unsigned");
            return canonical;
        };

        match tokio::time::timeout(
            self.signing_timeout,
            self.storage.presigned_get_url(&location, expires_in),
        )
        .await
        {
            Ok(Ok(signed)) => signed,
            Ok(Err(e)) => {
                tracing::warn!(
                    error = %e,
                    bucket = %location.bucket,
                    key = %location.key,
                    "Failed to sign URL, returning canonical URL"
                );
                canonical
            }
            Err(_) => {
                tracing::warn!(
                    bucket = %location.bucket,
                    key = %location.key,
                    timeout_ms = self.signing_timeout.as_millis() as u64,
                    "URL signing timed out, returning canonical URL"
                );
                canonical
            }
        }
    }
}
