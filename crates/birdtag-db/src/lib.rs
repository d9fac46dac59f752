//! Birdtag DB Library
//!
//! Store interfaces for the media catalog and the tag-partitioned index,
//! with PostgreSQL and in-memory implementations.

pub mod db;

pub use db::{
    FailingMediaCatalog, FailingTagIndex, InMemoryMediaCatalog, InMemoryTagIndex,
    MediaCatalogRepository, MediaCatalogStore, TagIndexRepository, TagIndexStore, TagPage,
};
