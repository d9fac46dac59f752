//! Data models for the application
//!
//! `media` holds the catalog side (one record per uploaded item), `tag` holds
//! the tag-partitioned index side and the query/aggregation value types.

mod media;
mod tag;

pub use media::{FileType, MediaId, MediaRecord};
pub use tag::{TagConstraints, TagCounts, TagIndexRow};
