//! The caller-facing aggregation pipeline:
//! cache → fan-out → dedup → rank → cache store → paginated response.

use crate::cache::CacheStore;
use crate::config::Config;
use crate::dedup::Deduplicator;
use crate::error::Result;
use crate::fanout::FanoutCoordinator;
use crate::guard::GuardRegistry;
use crate::metrics::{emit_counter, emit_histogram, MetricName};
use crate::providers::ProviderAdapter;
use crate::query::{self, RawQueryParams};
use crate::ranking::RelevanceRanker;
use crate::types::{CanonicalEvent, ProviderResult, SearchQuery, SearchResponse};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

pub struct Aggregator {
    coordinator: FanoutCoordinator,
    dedup: Deduplicator,
    ranker: RelevanceRanker,
    cache: Arc<dyn CacheStore>,
    cache_ttl: Duration,
}

impl Aggregator {
    pub fn new(
        config: &Config,
        providers: Vec<Arc<dyn ProviderAdapter>>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        let ids: Vec<&str> = providers.iter().map(|p| p.provider_id()).collect();
        let guards = Arc::new(GuardRegistry::from_config(config, &ids));
        Self {
            coordinator: FanoutCoordinator::new(providers, guards, &config.fanout),
            dedup: Deduplicator::new(),
            ranker: RelevanceRanker::new(config.ranking.clone()),
            cache,
            cache_ttl: Duration::from_secs(config.cache.ttl_seconds),
        }
    }

    /// Validate raw parameters and run the search.
    pub async fn search_raw(&self, params: &RawQueryParams) -> Result<SearchResponse> {
        let query = query::validate(params).map_err(|e| {
            emit_counter(MetricName::SearchValidationFailures, 1);
            e
        })?;
        self.search(&query).await
    }

    /// Run one aggregation call for an already-validated query.
    #[instrument(skip(self, query), fields(keyword = query.keyword.as_deref().unwrap_or("")))]
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        let started = std::time::Instant::now();
        emit_counter(MetricName::SearchRequests, 1);

        let signature = query::signature(query);

        if query.force_refresh {
            emit_counter(MetricName::CacheBypasses, 1);
        } else if let Some(events) = self.cache.get(&signature).await {
            emit_counter(MetricName::CacheHits, 1);
            info!("Serving {} events from cache", events.len());
            let sources = sources_from_merged(&events);
            return Ok(paginate(events, query, sources));
        } else {
            emit_counter(MetricName::CacheMisses, 1);
        }

        let results = self.coordinator.dispatch(query).await?;
        let sources = sources_from_results(&results);

        let deduped = self.dedup.dedupe(&results);
        let filtered = filter_by_price(deduped, query);
        let ranked = self.ranker.rank(filtered, query);

        if !query.force_refresh {
            self.cache
                .set(&signature, ranked.clone(), self.cache_ttl)
                .await;
            emit_counter(MetricName::CacheStores, 1);
        }

        emit_histogram(MetricName::SearchDuration, started.elapsed().as_secs_f64());
        info!(
            "Search complete: {} canonical events from {} providers in {:.0}ms",
            ranked.len(),
            sources.len(),
            started.elapsed().as_millis()
        );

        Ok(paginate(ranked, query, sources))
    }
}

/// Per-provider raw event counts from a fresh fan-out; failed providers
/// are present with zero so observability can see the gap.
fn sources_from_results(results: &[ProviderResult]) -> HashMap<String, usize> {
    results
        .iter()
        .map(|r| (r.provider_id.clone(), r.events.len()))
        .collect()
}

/// On a cache hit the fan-out never ran; reconstruct contribution counts
/// from the merge provenance instead.
fn sources_from_merged(events: &[CanonicalEvent]) -> HashMap<String, usize> {
    let mut sources = HashMap::new();
    for event in events {
        for provider in &event.merged_from {
            *sources.entry(provider.clone()).or_insert(0) += 1;
        }
    }
    sources
}

/// True unless the event's known price range falls entirely outside the
/// query's bounds. Events without price data pass through; providers often
/// omit pricing and a hard bound must not silence whole sources.
fn within_price_bounds(event: &CanonicalEvent, query: &SearchQuery) -> bool {
    if let (Some(max), Some(event_min)) = (query.max_price, event.min_price) {
        if event_min > max {
            return false;
        }
    }
    if let (Some(min), Some(event_max)) = (query.min_price, event.max_price) {
        if event_max < min {
            return false;
        }
    }
    true
}

/// Enforce the query's price bounds locally. The provider APIs in use have
/// no price-range search parameter, so this is the stage that makes the
/// bounds effective.
fn filter_by_price(events: Vec<CanonicalEvent>, query: &SearchQuery) -> Vec<CanonicalEvent> {
    if query.min_price.is_none() && query.max_price.is_none() {
        return events;
    }
    let before = events.len();
    let kept: Vec<CanonicalEvent> = events
        .into_iter()
        .filter(|e| within_price_bounds(e, query))
        .collect();
    if kept.len() < before {
        debug!("Price filter dropped {} of {} events", before - kept.len(), before);
    }
    kept
}

fn paginate(
    events: Vec<CanonicalEvent>,
    query: &SearchQuery,
    sources: HashMap<String, usize>,
) -> SearchResponse {
    let total_count = events.len();
    let page: Vec<CanonicalEvent> = events
        .into_iter()
        .skip(query.offset)
        .take(query.limit)
        .collect();
    let has_more = query.offset + page.len() < total_count;

    SearchResponse {
        events: page,
        total_count,
        has_more,
        sources,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::error::AggregatorError;
    use crate::types::RawEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        id: &'static str,
        calls: Arc<AtomicUsize>,
        fail: bool,
        events: Vec<RawEvent>,
    }

    impl CountingProvider {
        fn new(id: &'static str, titles: Vec<&'static str>) -> (Arc<Self>, Arc<AtomicUsize>) {
            let events = titles.iter().map(|t| RawEvent::new(*t, id)).collect();
            Self::with_events(id, events)
        }

        fn with_events(id: &'static str, events: Vec<RawEvent>) -> (Arc<Self>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Arc::new(Self {
                    id,
                    calls: calls.clone(),
                    fail: false,
                    events,
                }),
                calls,
            )
        }

        fn failing(id: &'static str) -> Arc<Self> {
            Arc::new(Self {
                id,
                calls: Arc::new(AtomicUsize::new(0)),
                fail: true,
                events: Vec::new(),
            })
        }
    }

    #[async_trait::async_trait]
    impl ProviderAdapter for CountingProvider {
        fn provider_id(&self) -> &'static str {
            self.id
        }

        async fn search(&self, _query: &SearchQuery) -> Result<Vec<RawEvent>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AggregatorError::Provider {
                    message: "stub failure".into(),
                });
            }
            Ok(self.events.clone())
        }

        async fn test_connection(&self) -> bool {
            !self.fail
        }
    }

    fn priced(title: &str, min: Option<f64>, max: Option<f64>) -> RawEvent {
        let mut event = RawEvent::new(title, "a");
        event.min_price = min;
        event.max_price = max;
        event
    }

    fn aggregator(providers: Vec<Arc<dyn ProviderAdapter>>) -> Aggregator {
        Aggregator::new(&Config::default(), providers, Arc::new(InMemoryCache::new()))
    }

    fn params(keyword: &str) -> RawQueryParams {
        RawQueryParams {
            keyword: Some(keyword.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn repeated_query_is_served_from_cache() {
        let (provider, calls) = CountingProvider::new("a", vec!["Jazz Night"]);
        let agg = aggregator(vec![provider]);

        let first = agg.search_raw(&params("jazz")).await.unwrap();
        let second = agg.search_raw(&params("jazz")).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.events[0].title, second.events[0].title);
        assert_eq!(second.sources.get("a"), Some(&1));
    }

    #[tokio::test]
    async fn force_refresh_bypasses_cache_read_and_write() {
        let (provider, calls) = CountingProvider::new("a", vec!["Jazz Night"]);
        let agg = aggregator(vec![provider]);

        agg.search_raw(&params("jazz")).await.unwrap();

        let mut refresh = params("jazz");
        refresh.force_refresh = Some("true".to_string());
        agg.search_raw(&refresh).await.unwrap();
        agg.search_raw(&refresh).await.unwrap();

        // One cached call plus two forced fan-outs.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn partial_failure_reports_zero_counts() {
        let (good, _) = CountingProvider::new("good", vec!["Jazz Night", "Blues Jam"]);
        let agg = aggregator(vec![
            good,
            CountingProvider::failing("bad1"),
            CountingProvider::failing("bad2"),
        ]);

        let response = agg.search_raw(&params("jazz")).await.unwrap();
        assert!(response.error.is_none());
        assert_eq!(response.total_count, 2);
        assert_eq!(response.sources.get("good"), Some(&2));
        assert_eq!(response.sources.get("bad1"), Some(&0));
        assert_eq!(response.sources.get("bad2"), Some(&0));
    }

    #[tokio::test]
    async fn total_failure_propagates() {
        let agg = aggregator(vec![
            CountingProvider::failing("bad1"),
            CountingProvider::failing("bad2"),
        ]);
        let err = agg.search_raw(&params("jazz")).await.unwrap_err();
        assert!(matches!(err, AggregatorError::AllProvidersFailed));
    }

    #[tokio::test]
    async fn invalid_query_never_reaches_providers() {
        let (provider, calls) = CountingProvider::new("a", vec!["Jazz Night"]);
        let agg = aggregator(vec![provider]);

        let bad = RawQueryParams {
            lat: Some("not-a-number".to_string()),
            ..Default::default()
        };
        let err = agg.search_raw(&bad).await.unwrap_err();
        assert!(matches!(err, AggregatorError::Validation(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn max_price_excludes_expensive_events() {
        let (provider, _) = CountingProvider::with_events(
            "a",
            vec![
                priced("Gala Night", Some(500.0), Some(900.0)),
                priced("Open Mic", Some(10.0), Some(20.0)),
                priced("Mystery Show", None, None),
            ],
        );
        let agg = aggregator(vec![provider]);

        let mut p = params("");
        p.keyword = None;
        p.max_price = Some("50".to_string());

        let response = agg.search_raw(&p).await.unwrap();
        let titles: Vec<&str> = response.events.iter().map(|e| e.title.as_str()).collect();
        assert!(!titles.contains(&"Gala Night"));
        assert!(titles.contains(&"Open Mic"));
        // Events with no price data are never excluded by a price bound.
        assert!(titles.contains(&"Mystery Show"));
        assert_eq!(response.total_count, 2);
    }

    #[tokio::test]
    async fn min_price_excludes_cheap_events() {
        let (provider, _) = CountingProvider::with_events(
            "a",
            vec![
                priced("Gala Night", Some(500.0), Some(900.0)),
                priced("Open Mic", Some(10.0), Some(20.0)),
            ],
        );
        let agg = aggregator(vec![provider]);

        let mut p = params("");
        p.keyword = None;
        p.min_price = Some("100".to_string());

        let response = agg.search_raw(&p).await.unwrap();
        assert_eq!(response.total_count, 1);
        assert_eq!(response.events[0].title, "Gala Night");
    }

    #[tokio::test]
    async fn pagination_slices_the_ranked_set() {
        let (provider, _) =
            CountingProvider::new("a", vec!["One", "Two", "Three", "Four", "Five"]);
        let agg = aggregator(vec![provider]);

        let mut page = params("");
        page.keyword = None;
        page.limit = Some("2".to_string());
        page.offset = Some("2".to_string());

        let response = agg.search_raw(&page).await.unwrap();
        assert_eq!(response.total_count, 5);
        assert_eq!(response.events.len(), 2);
        assert!(response.has_more);
    }
}
