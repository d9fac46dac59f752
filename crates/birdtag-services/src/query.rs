//! Multi-tag intersection query
//!
//! The index is partitioned by tag, so a query with N constraints reads N
//! partitions and intersects the qualifying media ids in application code.
//! Hydration against the catalog and URL signing happen only for the final
//! intersection.

use birdtag_core::{AppError, Config, MediaId, MediaRecord, TagConstraints};
use birdtag_db::{MediaCatalogStore, TagIndexStore};
use birdtag_storage::UrlResolver;
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::bounded::bounded;
use crate::lookup::resolve_record;

/// Tuning for query execution
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Rows requested per partition page.
    pub page_size: usize,
    /// Look up all constrained tags concurrently instead of one by one.
    pub parallel_lookups: bool,
    /// Bound on every single store call.
    pub store_timeout: Duration,
    /// Catalog reads in flight during hydration.
    pub hydration_concurrency: usize,
    /// Lifetime of the signed URLs handed back.
    pub url_expiration: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions::from(&Config::default())
    }
}

impl From<&Config> for QueryOptions {
    fn from(config: &Config) -> Self {
        Self {
            page_size: config.index_page_size.max(1),
            parallel_lookups: config.query_parallel_lookups,
            store_timeout: Duration::from_millis(config.store_call_timeout_ms),
            hydration_concurrency: config.hydration_concurrency.max(1),
            url_expiration: Duration::from_secs(config.presigned_url_expiration_secs),
        }
    }
}

/// Result of an intersection query
///
/// An empty constraint set is not the same as a query that matched nothing;
/// callers present the two differently.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    EmptyQuery,
    NoMatches,
    /// Hydrated records with signed URLs, ordered by media id.
    Matches(Vec<MediaRecord>),
}

impl QueryOutcome {
    pub fn records(&self) -> &[MediaRecord] {
        match self {
            QueryOutcome::Matches(records) => records,
            _ => &[],
        }
    }
}

#[derive(Clone)]
pub struct IntersectionQueryEngine {
    tag_index: Arc<dyn TagIndexStore>,
    catalog: Arc<dyn MediaCatalogStore>,
    resolver: UrlResolver,
    options: QueryOptions,
}

impl IntersectionQueryEngine {
    pub fn new(
        tag_index: Arc<dyn TagIndexStore>,
        catalog: Arc<dyn MediaCatalogStore>,
        resolver: UrlResolver,
        options: QueryOptions,
    ) -> Self {
        Self {
            tag_index,
            catalog,
            resolver,
            options,
        }
    }

    /// Run the full query: intersect, hydrate, sign.
    #[tracing::instrument(skip(self, constraints), fields(constraints = constraints.len()))]
    pub async fn execute(&self, constraints: &TagConstraints) -> Result<QueryOutcome, AppError> {
        let Some(ids) = self.matching_ids(constraints).await? else {
            return Ok(QueryOutcome::EmptyQuery);
        };
        if ids.is_empty() {
            return Ok(QueryOutcome::NoMatches);
        }

        let records = self.hydrate(ids).await;
        // Every match may have been deleted since it was indexed.
        if records.is_empty() {
            return Ok(QueryOutcome::NoMatches);
        }
        Ok(QueryOutcome::Matches(records))
    }

    /// Media ids satisfying every constraint. `None` for an empty constraint
    /// set.
    ///
    /// A failed or timed-out lookup for any constrained tag fails the whole
    /// call with `AppError::ConstraintLookup`; an intersection that skipped a
    /// tag would be too large.
    pub async fn matching_ids(
        &self,
        constraints: &TagConstraints,
    ) -> Result<Option<BTreeSet<MediaId>>, AppError> {
        if constraints.is_empty() {
            return Ok(None);
        }

        let result = if self.options.parallel_lookups {
            let lookups = constraints
                .iter()
                .map(|(tag, min_count)| self.qualifying_ids(tag, min_count));
            let sets = futures::future::try_join_all(lookups).await?;

            let mut sets = sets.into_iter();
            let first = sets.next().unwrap_or_default();
            sets.fold(first, |running, set| {
                running.intersection(&set).cloned().collect()
            })
        } else {
            let mut running: Option<BTreeSet<MediaId>> = None;
            for (tag, min_count) in constraints.iter() {
                let set = self.qualifying_ids(tag, min_count).await?;
                let next = match running {
                    None => set,
                    Some(running) => running.intersection(&set).cloned().collect(),
                };
                if next.is_empty() {
                    tracing::debug!(tag = %tag, "Intersection empty, skipping remaining tags");
                    running = Some(next);
                    break;
                }
                running = Some(next);
            }
            running.unwrap_or_default()
        };

        tracing::debug!(matches = result.len(), "Intersection computed");
        Ok(Some(result))
    }

    /// Media ids in the partition of `tag` with a value of at least
    /// `min_count`, following the partition cursor to the end.
    async fn qualifying_ids(&self, tag: &str, min_count: u32) -> Result<BTreeSet<MediaId>, AppError> {
        let mut ids = BTreeSet::new();
        let mut cursor: Option<MediaId> = None;
        let mut pages = 0usize;

        loop {
            let page = bounded(
                "tag_index.query_partition",
                self.options.store_timeout,
                self.tag_index
                    .query_partition(tag, cursor.as_ref(), self.options.page_size),
            )
            .await
            .map_err(|e| {
                tracing::warn!(tag = %tag, error = %e, "Tag lookup failed, failing the intersection");
                AppError::ConstraintLookup {
                    tag: tag.to_string(),
                    message: e.to_string(),
                }
            })?;
            pages += 1;

            ids.extend(
                page.rows
                    .into_iter()
                    .filter(|row| row.tag_value >= min_count)
                    .map(|row| row.media_id),
            );

            match page.next_cursor {
                // A cursor that does not advance would loop forever.
                Some(next) if cursor.as_ref() != Some(&next) => cursor = Some(next),
                _ => break,
            }
        }

        tracing::debug!(tag = %tag, min_count, pages, qualifying = ids.len(), "Tag partition scanned");
        Ok(ids)
    }

    /// Fetch and sign the records of `ids`. Missing or unreadable records
    /// are skipped.
    pub async fn hydrate(&self, ids: BTreeSet<MediaId>) -> Vec<MediaRecord> {
        let mut records: Vec<MediaRecord> = stream::iter(ids)
            .map(|media_id| async move {
                let fetched = bounded(
                    "catalog.get",
                    self.options.store_timeout,
                    self.catalog.get(&media_id),
                )
                .await;

                match fetched {
                    Ok(Some(record)) => Some(
                        resolve_record(&self.resolver, record, self.options.url_expiration).await,
                    ),
                    Ok(None) => {
                        tracing::debug!(media_id = %media_id, "Indexed media missing from catalog, skipping");
                        None
                    }
                    Err(e) => {
                        tracing::warn!(media_id = %media_id, error = %e, "Hydration failed, skipping");
                        None
                    }
                }
            })
            .buffer_unordered(self.options.hydration_concurrency)
            .filter_map(|record| async move { record })
            .collect()
            .await;

        records.sort_by(|a, b| a.media_id.cmp(&b.media_id));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use birdtag_core::{FileType, TagIndexRow};
    use birdtag_db::{FailingTagIndex, InMemoryMediaCatalog, InMemoryTagIndex};
    use birdtag_storage::LocalStorage;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::{BTreeMap, HashMap};
    use tempfile::TempDir;

    const BASE_URL: &str = "http://localhost:4000/media";

    fn id(s: &str) -> MediaId {
        MediaId::new(s)
    }

    async fn resolver(dir: &TempDir) -> UrlResolver {
        let storage = LocalStorage::new(dir.path(), BASE_URL.to_string())
            .await
            .unwrap();
        UrlResolver::new(Arc::new(storage), Duration::from_millis(200))
    }

    fn options(parallel: bool, page_size: usize) -> QueryOptions {
        QueryOptions {
            page_size,
            parallel_lookups: parallel,
            store_timeout: Duration::from_millis(100),
            hydration_concurrency: 4,
            url_expiration: Duration::from_secs(60),
        }
    }

    async fn seeded(rows: &[(&str, &str, u32)]) -> (InMemoryTagIndex, InMemoryMediaCatalog) {
        let index = InMemoryTagIndex::new();
        let catalog = InMemoryMediaCatalog::new();
        for (tag, media, value) in rows {
            index
                .put_row(&TagIndexRow::new(*tag, id(media), *value))
                .await
                .unwrap();
            let url = format!("{}/images/{}.jpg", BASE_URL, media);
            catalog
                .put(&MediaRecord::new(id(media), FileType::Image, url, "tester"))
                .await
                .unwrap();
        }
        (index, catalog)
    }

    async fn engine_over<S: TagIndexStore + 'static>(
        index: S,
        catalog: InMemoryMediaCatalog,
        dir: &TempDir,
        options: QueryOptions,
    ) -> IntersectionQueryEngine {
        IntersectionQueryEngine::new(Arc::new(index), Arc::new(catalog), resolver(dir).await, options)
    }

    fn constraints(pairs: &[(&str, u32)]) -> TagConstraints {
        pairs.iter().copied().collect()
    }

    fn ids_of(outcome: &QueryOutcome) -> Vec<String> {
        outcome
            .records()
            .iter()
            .map(|r| r.media_id.to_string())
            .collect()
    }

    const SCENARIO: &[(&str, &str, u32)] = &[("crow", "A", 3), ("crow", "B", 1), ("owl", "A", 2)];

    #[tokio::test]
    async fn crow_and_owl_matches_only_a() {
        for parallel in [true, false] {
            let dir = TempDir::new().unwrap();
            let (index, catalog) = seeded(SCENARIO).await;
            let engine = engine_over(index, catalog, &dir, options(parallel, 100)).await;

            let outcome = engine
                .execute(&constraints(&[("crow", 2), ("owl", 1)]))
                .await
                .unwrap();
            assert_eq!(ids_of(&outcome), vec!["A"]);
        }
    }

    #[tokio::test]
    async fn missing_tag_partition_gives_no_matches() {
        for parallel in [true, false] {
            let dir = TempDir::new().unwrap();
            let (index, catalog) = seeded(SCENARIO).await;
            let engine = engine_over(index, catalog, &dir, options(parallel, 100)).await;

            let outcome = engine
                .execute(&constraints(&[("crow", 2), ("sparrow", 1)]))
                .await
                .unwrap();
            assert_eq!(outcome, QueryOutcome::NoMatches);
        }
    }

    #[tokio::test]
    async fn empty_query_is_distinct_from_no_matches() {
        let dir = TempDir::new().unwrap();
        let (index, catalog) = seeded(SCENARIO).await;
        let engine = engine_over(index, catalog, &dir, options(true, 100)).await;

        assert_eq!(
            engine.execute(&TagConstraints::new()).await.unwrap(),
            QueryOutcome::EmptyQuery
        );
        assert_eq!(
            engine.execute(&constraints(&[("owl", 100)])).await.unwrap(),
            QueryOutcome::NoMatches
        );
    }

    #[tokio::test]
    async fn minimum_count_is_inclusive() {
        let dir = TempDir::new().unwrap();
        let (index, catalog) = seeded(SCENARIO).await;
        let engine = engine_over(index, catalog, &dir, options(true, 100)).await;

        let outcome = engine.execute(&constraints(&[("crow", 3)])).await.unwrap();
        assert_eq!(ids_of(&outcome), vec!["A"]);
    }

    #[tokio::test]
    async fn pagination_is_followed_to_the_end() {
        let rows: Vec<(String, u32)> = (0..23).map(|i| (format!("m{:02}", i), 1)).collect();
        let borrowed: Vec<(&str, &str, u32)> =
            rows.iter().map(|(m, v)| ("owl", m.as_str(), *v)).collect();
        let dir = TempDir::new().unwrap();
        let (index, catalog) = seeded(&borrowed).await;
        let engine = engine_over(index, catalog, &dir, options(false, 5)).await;

        let ids = engine
            .matching_ids(&constraints(&[("owl", 1)]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ids.len(), 23);
    }

    #[tokio::test]
    async fn hydration_miss_is_skipped() {
        let dir = TempDir::new().unwrap();
        let (index, catalog) = seeded(SCENARIO).await;
        catalog.delete(&id("A")).await.unwrap();
        let engine = engine_over(index, catalog, &dir, options(true, 100)).await;

        let outcome = engine.execute(&constraints(&[("crow", 1)])).await.unwrap();
        assert_eq!(ids_of(&outcome), vec!["B"]);
    }

    #[tokio::test]
    async fn failed_lookup_fails_the_whole_query() {
        for parallel in [true, false] {
            let dir = TempDir::new().unwrap();
            let (index, catalog) = seeded(SCENARIO).await;
            let failing = FailingTagIndex::new(index).failing("owl");
            let engine = engine_over(failing, catalog, &dir, options(parallel, 100)).await;

            let err = engine
                .execute(&constraints(&[("crow", 1), ("owl", 1)]))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::ConstraintLookup { ref tag, .. } if tag == "owl"));
        }
    }

    #[tokio::test]
    async fn timed_out_lookup_fails_the_whole_query() {
        let dir = TempDir::new().unwrap();
        let (index, catalog) = seeded(SCENARIO).await;
        let slow = FailingTagIndex::new(index).slow("owl", Duration::from_secs(5));
        let engine = engine_over(slow, catalog, &dir, options(true, 100)).await;

        let err = engine
            .execute(&constraints(&[("crow", 1), ("owl", 1)]))
            .await
            .unwrap_err();
        match err {
            AppError::ConstraintLookup { tag, message } => {
                assert_eq!(tag, "owl");
                assert!(message.contains("timed out"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn signing_failure_keeps_canonical_url() {
        let dir = TempDir::new().unwrap();
        let (index, catalog) = seeded(SCENARIO).await;
        let engine = engine_over(index, catalog, &dir, options(true, 100)).await;

        // No file exists under the local storage root, so signing fails.
        let outcome = engine.execute(&constraints(&[("owl", 1)])).await.unwrap();
        assert_eq!(
            outcome.records()[0].media_url,
            format!("{}/images/A.jpg", BASE_URL)
        );
    }

    /// Brute-force reference: the set of media satisfying every constraint.
    fn reference(
        rows: &HashMap<(String, String), u32>,
        constraints: &[(String, u32)],
    ) -> BTreeSet<String> {
        let media: BTreeSet<String> = rows.keys().map(|(_, m)| m.clone()).collect();
        media
            .into_iter()
            .filter(|m| {
                constraints.iter().all(|(tag, min)| {
                    rows.get(&(tag.clone(), m.clone()))
                        .is_some_and(|value| value >= min)
                })
            })
            .collect()
    }

    #[tokio::test]
    async fn intersection_matches_brute_force_reference() {
        const TAGS: &[&str] = &["crow", "owl", "sparrow", "magpie", "wren"];
        let mut rng = StdRng::seed_from_u64(0x5eed_b1d5);

        for round in 0..40 {
            let mut rows: HashMap<(String, String), u32> = HashMap::new();
            for _ in 0..rng.random_range(0..60) {
                let tag = TAGS[rng.random_range(0..TAGS.len())].to_string();
                let media = format!("m{}", rng.random_range(0..20));
                rows.insert((tag, media), rng.random_range(1..6));
            }

            let index = InMemoryTagIndex::new();
            let catalog = InMemoryMediaCatalog::new();
            for ((tag, media), value) in &rows {
                index
                    .put_row(&TagIndexRow::new(tag.clone(), id(media), *value))
                    .await
                    .unwrap();
            }

            let mut wanted: BTreeMap<String, u32> = BTreeMap::new();
            for _ in 0..rng.random_range(1..4) {
                let tag = TAGS[rng.random_range(0..TAGS.len())].to_string();
                wanted.insert(tag, rng.random_range(1..6));
            }
            let wanted: Vec<(String, u32)> = wanted.into_iter().collect();
            let query: TagConstraints = wanted.iter().map(|(t, c)| (t.as_str(), *c)).collect();

            let dir = TempDir::new().unwrap();
            let parallel = round % 2 == 0;
            let page_size = rng.random_range(1..8);
            let engine = engine_over(index, catalog, &dir, options(parallel, page_size)).await;

            let got: BTreeSet<String> = engine
                .matching_ids(&query)
                .await
                .unwrap()
                .unwrap()
                .into_iter()
                .map(|m| m.to_string())
                .collect();
            assert_eq!(got, reference(&rows, &wanted), "round {round}");
        }
    }
}
