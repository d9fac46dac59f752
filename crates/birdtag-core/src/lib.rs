//! Birdtag Core Library
//!
//! Domain models, error types, configuration, and input parsing shared by
//! every Birdtag crate.

pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod validation;

// Re-export commonly used types
pub use config::{Config, StorageBackend, StoreBackend};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{
    FileType, MediaId, MediaRecord, TagConstraints, TagCounts, TagIndexRow,
};
