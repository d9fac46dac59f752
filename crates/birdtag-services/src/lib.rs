//! Birdtag Services Layer
//!
//! Business logic between the HTTP handlers and the stores: tag aggregation,
//! the multi-tag intersection query, tag mutation with cascading deletes,
//! ingestion of detector output and tag notifications. Handlers in
//! birdtag-api stay thin and call into this crate.
//!
//! Every store and signing call made here is bounded by a timeout.

pub mod aggregator;
pub mod bounded;
pub mod ingest;
pub mod lookup;
pub mod mutation;
pub mod notify;
pub mod query;
pub mod upload;

pub use aggregator::{count_labels, AggregationPolicy, TagAggregator};
pub use bounded::bounded;
pub use ingest::{DetectionIngestService, IngestReport, ThumbnailOutcome};
pub use lookup::MediaLookupService;
pub use mutation::{
    CascadeReport, DeletionReport, EditReport, MutationOptions, MutationReport, TagMutationService,
    TagOperation,
};
#[cfg(feature = "webhook")]
pub use notify::WebhookNotificationSink;
pub use notify::{topic_for, LogNotificationSink, NotificationSink, TagNotification};
pub use query::{IntersectionQueryEngine, QueryOptions, QueryOutcome};
pub use upload::{PresignedUpload, UploadService};
