//! Detection labels to per-tag counts
//!
//! Labels arrive already filtered by the detector's confidence threshold.
//! Tags are lower-cased and trimmed; blank labels are ignored.

use birdtag_core::{FileType, TagCounts};

/// How repeated observations of one media item are merged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationPolicy {
    /// Count within each call (one frame), keep the maximum across calls.
    FrameMax,
    /// Count raw occurrences.
    Flat,
    /// Every detected tag counts once.
    Presence,
}

impl AggregationPolicy {
    pub fn for_file_type(file_type: FileType) -> Self {
        match file_type {
            FileType::Video => AggregationPolicy::FrameMax,
            FileType::Image => AggregationPolicy::Flat,
            FileType::Audio => AggregationPolicy::Presence,
        }
    }
}

fn normalize(label: &str) -> Option<String> {
    let tag = label.trim().to_lowercase();
    (!tag.is_empty()).then_some(tag)
}

/// Flat count of one call's labels.
pub fn count_labels<I, S>(labels: I) -> TagCounts
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut counts = TagCounts::new();
    for label in labels {
        if let Some(tag) = normalize(label.as_ref()) {
            *counts.entry(tag).or_insert(0) += 1;
        }
    }
    counts
}

/// Accumulates the labels of one media item under a policy.
///
/// ```
/// use birdtag_services::{AggregationPolicy, TagAggregator};
///
/// let mut aggregator = TagAggregator::new(AggregationPolicy::FrameMax);
/// aggregator.observe(["Crow", "crow", "owl"]);
/// aggregator.observe(["crow"]);
/// let counts = aggregator.finish();
/// assert_eq!(counts["crow"], 2);
/// assert_eq!(counts["owl"], 1);
/// ```
#[derive(Debug, Clone)]
pub struct TagAggregator {
    policy: AggregationPolicy,
    counts: TagCounts,
}

impl TagAggregator {
    pub fn new(policy: AggregationPolicy) -> Self {
        Self {
            policy,
            counts: TagCounts::new(),
        }
    }

    /// Feed the labels of one call (one image, one frame or one clip).
    pub fn observe<I, S>(&mut self, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        match self.policy {
            AggregationPolicy::FrameMax => {
                for (tag, count) in count_labels(labels) {
                    let current = self.counts.entry(tag).or_insert(0);
                    *current = (*current).max(count);
                }
            }
            AggregationPolicy::Flat => {
                for (tag, count) in count_labels(labels) {
                    *self.counts.entry(tag).or_insert(0) += count;
                }
            }
            AggregationPolicy::Presence => {
                for label in labels {
                    if let Some(tag) = normalize(label.as_ref()) {
                        self.counts.insert(tag, 1);
                    }
                }
            }
        }
    }

    pub fn finish(self) -> TagCounts {
        self.counts
    }

    /// Aggregate a whole sequence of calls in one go.
    pub fn aggregate<F, I, S>(policy: AggregationPolicy, calls: F) -> TagCounts
    where
        F: IntoIterator<Item = I>,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut aggregator = TagAggregator::new(policy);
        for call in calls {
            aggregator.observe(call);
        }
        aggregator.finish()
    }
}
