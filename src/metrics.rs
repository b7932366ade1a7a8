//! Metrics for the aggregation engine.
//!
//! Provides a straightforward API for recording metrics using the standard
//! Prometheus naming conventions.

use std::fmt;

/// Enum representing all metric names used in the system
/// This eliminates magic strings and provides compile-time safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Search pipeline
    SearchRequests,
    SearchValidationFailures,
    SearchDuration,
    AggregateFailures,

    // Result cache
    CacheHits,
    CacheMisses,
    CacheBypasses,
    CacheStores,

    // Fan-out
    FanoutDuration,
    ProviderCallsOk,
    ProviderCallsTimeout,
    ProviderCallsError,
    ProviderCallsRateLimited,
    ProviderCallsCircuitOpen,
    ProviderEventsFetched,
    ProviderCallDuration,

    // Circuit breaker
    CircuitOpened,
    CircuitHalfOpened,
    CircuitClosed,

    // Dedup / ranking
    DedupInputEvents,
    DedupCanonicalEvents,
    DedupMerges,
    RankingDuration,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricName::SearchRequests => "agg_search_requests_total",
            MetricName::SearchValidationFailures => "agg_search_validation_failures_total",
            MetricName::SearchDuration => "agg_search_duration_seconds",
            MetricName::AggregateFailures => "agg_aggregate_failures_total",

            MetricName::CacheHits => "agg_cache_hits_total",
            MetricName::CacheMisses => "agg_cache_misses_total",
            MetricName::CacheBypasses => "agg_cache_bypasses_total",
            MetricName::CacheStores => "agg_cache_stores_total",

            MetricName::FanoutDuration => "agg_fanout_duration_seconds",
            MetricName::ProviderCallsOk => "agg_provider_calls_ok_total",
            MetricName::ProviderCallsTimeout => "agg_provider_calls_timeout_total",
            MetricName::ProviderCallsError => "agg_provider_calls_error_total",
            MetricName::ProviderCallsRateLimited => "agg_provider_calls_rate_limited_total",
            MetricName::ProviderCallsCircuitOpen => "agg_provider_calls_circuit_open_total",
            MetricName::ProviderEventsFetched => "agg_provider_events_fetched_total",
            MetricName::ProviderCallDuration => "agg_provider_call_duration_seconds",

            MetricName::CircuitOpened => "agg_circuit_opened_total",
            MetricName::CircuitHalfOpened => "agg_circuit_half_opened_total",
            MetricName::CircuitClosed => "agg_circuit_closed_total",

            MetricName::DedupInputEvents => "agg_dedup_input_events_total",
            MetricName::DedupCanonicalEvents => "agg_dedup_canonical_events_total",
            MetricName::DedupMerges => "agg_dedup_merges_total",
            MetricName::RankingDuration => "agg_ranking_duration_seconds",
        };
        write!(f, "{}", name)
    }
}

/// Increment a counter by the given amount.
pub fn emit_counter(name: MetricName, value: u64) {
    metrics::counter!(name.to_string()).increment(value);
}

/// Record a histogram observation.
pub fn emit_histogram(name: MetricName, value: f64) {
    metrics::histogram!(name.to_string()).record(value);
}
