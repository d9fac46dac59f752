use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use super::MediaId;

/// `tag -> count` for one media item, as produced by aggregation.
pub type TagCounts = BTreeMap<String, u32>;

/// One row of the tag-partitioned index.
///
/// At most one row exists per `(tag_name, media_id)`; writing a row replaces
/// its `tag_value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TagIndexRow {
    pub tag_name: String,
    #[schema(value_type = String)]
    pub media_id: MediaId,
    pub tag_value: u32,
}

impl TagIndexRow {
    pub fn new(tag_name: impl Into<String>, media_id: MediaId, tag_value: u32) -> Self {
        Self {
            tag_name: tag_name.into(),
            media_id,
            tag_value,
        }
    }
}

/// Ordered `tag -> minimum count` constraints of an intersection query.
///
/// Tags are lower-cased and unique. Insertion order is preserved: a repeated
/// tag keeps its first position and takes the latest count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagConstraints {
    entries: Vec<(String, u32)>,
}

impl TagConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or overwrite a constraint. Blank tags and zero counts are ignored.
    pub fn insert(&mut self, tag: &str, min_count: u32) {
        let tag = tag.trim().to_lowercase();
        if tag.is_empty() || min_count == 0 {
            return;
        }
        match self.entries.iter_mut().find(|(t, _)| *t == tag) {
            Some(entry) => entry.1 = min_count,
            None => self.entries.push((tag, min_count)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, tag: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, count)| *count)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> + '_ {
        self.entries.iter().map(|(t, c)| (t.as_str(), *c))
    }
}

impl From<TagCounts> for TagConstraints {
    fn from(counts: TagCounts) -> Self {
        let mut constraints = TagConstraints::new();
        for (tag, count) in counts {
            constraints.insert(&tag, count);
        }
        constraints
    }
}

impl<'a> FromIterator<(&'a str, u32)> for TagConstraints {
    fn from_iter<I: IntoIterator<Item = (&'a str, u32)>>(iter: I) -> Self {
        let mut constraints = TagConstraints::new();
        for (tag, count) in iter {
            constraints.insert(tag, count);
        }
        constraints
    }
}
