//! Store interfaces and repositories
//!
//! `catalog` is the primary store (`media_id -> MediaRecord`), `tag_index` is
//! the secondary index partitioned by tag. Each has a PostgreSQL repository
//! and an in-memory implementation in `memory`.
//!
//! Neither store offers cross-row transactions. Consistency between them is
//! maintained by the services.

pub mod catalog;
pub mod memory;
pub mod tag_index;

pub use catalog::{MediaCatalogRepository, MediaCatalogStore};
pub use memory::{FailingMediaCatalog, FailingTagIndex, InMemoryMediaCatalog, InMemoryTagIndex};
pub use tag_index::{TagIndexRepository, TagIndexStore, TagPage};
