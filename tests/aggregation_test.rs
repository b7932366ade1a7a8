//! End-to-end tests of the aggregation pipeline with stub providers.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use event_aggregator::aggregator::Aggregator;
use event_aggregator::cache::InMemoryCache;
use event_aggregator::config::{CacheConfig, Config, GuardConfig};
use event_aggregator::error::{AggregatorError, Result};
use event_aggregator::providers::ProviderAdapter;
use event_aggregator::query::RawQueryParams;
use event_aggregator::types::{RawEvent, SearchQuery};

struct StubProvider {
    id: &'static str,
    calls: Arc<AtomicUsize>,
    fail: bool,
    events: Vec<RawEvent>,
}

impl StubProvider {
    fn serving(id: &'static str, events: Vec<RawEvent>) -> Arc<Self> {
        Arc::new(Self {
            id,
            calls: Arc::new(AtomicUsize::new(0)),
            fail: false,
            events,
        })
    }

    fn failing(id: &'static str) -> Arc<Self> {
        Arc::new(Self {
            id,
            calls: Arc::new(AtomicUsize::new(0)),
            fail: true,
            events: Vec::new(),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for StubProvider {
    fn provider_id(&self) -> &'static str {
        self.id
    }

    async fn search(&self, _query: &SearchQuery) -> Result<Vec<RawEvent>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AggregatorError::Provider {
                message: "stub outage".into(),
            });
        }
        Ok(self.events.clone())
    }

    async fn test_connection(&self) -> bool {
        !self.fail
    }
}

fn aggregator_with(config: Config, providers: Vec<Arc<dyn ProviderAdapter>>) -> Aggregator {
    Aggregator::new(&config, providers, Arc::new(InMemoryCache::new()))
}

fn jazz_query() -> RawQueryParams {
    RawQueryParams {
        keyword: Some("jazz".to_string()),
        lat: Some("40.71".to_string()),
        lng: Some("-74.00".to_string()),
        radius: Some("25".to_string()),
        ..Default::default()
    }
}

/// The cross-provider merge scenario: two providers list the same show with
/// stop-word and casing drift in the title; the merged event carries the
/// real image and the coordinates, and credits both providers.
#[tokio::test]
async fn overlapping_providers_merge_into_one_event() {
    let mut from_a = RawEvent::new("Jazz Night at The Blue Room", "provider_a");
    from_a.start_time = Some(Utc.with_ymd_and_hms(2025, 6, 1, 20, 0, 0).unwrap());
    from_a.image_url = Some("https://cdn.example.com/img/placeholder.png".to_string());
    from_a.ticket_urls = vec!["https://a.example.com/tickets/1".to_string()];

    let mut from_b = RawEvent::new("The Jazz Night At Blue Room", "provider_b");
    from_b.start_time = Some(Utc.with_ymd_and_hms(2025, 6, 1, 19, 30, 0).unwrap());
    from_b.image_url = Some("https://cdn.example.com/img/blue-room-poster.jpg".to_string());
    from_b.latitude = Some(40.7128);
    from_b.longitude = Some(-74.0060);

    let agg = aggregator_with(
        Config::default(),
        vec![
            StubProvider::serving("provider_a", vec![from_a]),
            StubProvider::serving("provider_b", vec![from_b]),
        ],
    );

    let response = agg.search_raw(&jazz_query()).await.unwrap();

    assert_eq!(response.total_count, 1);
    let merged = &response.events[0];
    assert_eq!(
        merged.image_url.as_deref(),
        Some("https://cdn.example.com/img/blue-room-poster.jpg")
    );
    assert_eq!(merged.latitude, Some(40.7128));
    assert_eq!(merged.longitude, Some(-74.0060));
    assert_eq!(merged.merged_from, vec!["provider_a", "provider_b"]);
    // Ticket link from the losing record survives the merge.
    assert!(merged
        .ticket_urls
        .contains(&"https://a.example.com/tickets/1".to_string()));
    // Keyword in title, real image, close by: a meaningful composite score.
    assert!(merged.relevance_score > 0.0);
}

#[tokio::test]
async fn two_of_three_providers_failing_is_not_an_error() {
    let good = StubProvider::serving(
        "good",
        vec![RawEvent::new("Jazz Night", "good")],
    );
    let agg = aggregator_with(
        Config::default(),
        vec![
            good,
            StubProvider::failing("down_one"),
            StubProvider::failing("down_two"),
        ],
    );

    let response = agg.search_raw(&jazz_query()).await.unwrap();
    assert!(response.error.is_none());
    assert_eq!(response.total_count, 1);
    assert_eq!(response.sources.get("good"), Some(&1));
    assert_eq!(response.sources.get("down_one"), Some(&0));
    assert_eq!(response.sources.get("down_two"), Some(&0));
}

#[tokio::test]
async fn all_providers_failing_is_an_aggregate_error() {
    let agg = aggregator_with(
        Config::default(),
        vec![
            StubProvider::failing("down_one"),
            StubProvider::failing("down_two"),
        ],
    );
    let err = agg.search_raw(&jazz_query()).await.unwrap_err();
    assert!(matches!(err, AggregatorError::AllProvidersFailed));
}

#[tokio::test]
async fn cache_hit_skips_the_fanout_until_ttl_expires() {
    let provider = StubProvider::serving("a", vec![RawEvent::new("Jazz Night", "a")]);
    let agg = aggregator_with(Config::default(), vec![provider.clone()]);

    agg.search_raw(&jazz_query()).await.unwrap();
    agg.search_raw(&jazz_query()).await.unwrap();
    assert_eq!(provider.call_count(), 1);

    // With a zero TTL every entry is expired on arrival, so each call
    // triggers a fresh fan-out.
    let provider = StubProvider::serving("a", vec![RawEvent::new("Jazz Night", "a")]);
    let config = Config {
        cache: CacheConfig { ttl_seconds: 0 },
        ..Default::default()
    };
    let agg = aggregator_with(config, vec![provider.clone()]);
    agg.search_raw(&jazz_query()).await.unwrap();
    agg.search_raw(&jazz_query()).await.unwrap();
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn repeated_failures_trip_the_circuit_and_stop_network_calls() {
    let flaky = StubProvider::failing("flaky");
    let steady = StubProvider::serving("steady", vec![RawEvent::new("Jazz Night", "steady")]);
    let config = Config {
        guard: GuardConfig {
            failure_threshold: 2,
            ..Default::default()
        },
        // Disable caching so every search reaches the fan-out.
        cache: CacheConfig { ttl_seconds: 0 },
        ..Default::default()
    };
    let agg = aggregator_with(config, vec![flaky.clone(), steady.clone()]);

    agg.search_raw(&jazz_query()).await.unwrap();
    agg.search_raw(&jazz_query()).await.unwrap();
    assert_eq!(flaky.call_count(), 2);

    // Threshold reached: further searches never touch the flaky provider.
    agg.search_raw(&jazz_query()).await.unwrap();
    agg.search_raw(&jazz_query()).await.unwrap();
    assert_eq!(flaky.call_count(), 2);
    assert_eq!(steady.call_count(), 4);
}
