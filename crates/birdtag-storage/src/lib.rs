//! Birdtag Storage Library
//!
//! Object storage behind the media catalog: presigned delivery and upload
//! URLs, object deletion, and translation between stored URLs and
//! `(bucket, key)` locations.
//!
//! # URL forms
//!
//! The catalog stores *canonical* URLs: `scheme://host/path` with no query
//! string. A URL that arrives already signed is canonicalized by
//! [`UrlResolver::canonicalize`] before it is used as a lookup key, and is
//! re-signed by [`UrlResolver::resolve`] on the way out.

pub mod factory;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod resolver;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use birdtag_core::StorageBackend;
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use resolver::{canonicalize, UrlResolver, DEFAULT_S3_REGION};
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{ObjectLocation, ObjectStorage, StorageError, StorageResult};
