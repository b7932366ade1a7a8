//! Concurrent fan-out of one logical query to every enabled provider.

use crate::config::FanoutConfig;
use crate::error::{AggregatorError, Result};
use crate::guard::{GuardRegistry, GuardRejection, ProviderGuard};
use crate::metrics::{emit_counter, emit_histogram, MetricName};
use crate::providers::ProviderAdapter;
use crate::types::{ProviderResult, ProviderStatus, SearchQuery};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Issues the same query to every provider concurrently, bounded by a
/// per-call timeout and a fan-out-wide deadline. One slow or failing
/// provider never blocks the others; its outcome is classified and the
/// rest of the pipeline proceeds with whatever arrived.
pub struct FanoutCoordinator {
    providers: Vec<Arc<dyn ProviderAdapter>>,
    guards: Arc<GuardRegistry>,
    per_call_timeout: Duration,
    deadline: Duration,
}

impl FanoutCoordinator {
    pub fn new(
        providers: Vec<Arc<dyn ProviderAdapter>>,
        guards: Arc<GuardRegistry>,
        config: &FanoutConfig,
    ) -> Self {
        Self {
            providers,
            guards,
            per_call_timeout: Duration::from_millis(config.per_call_timeout_ms),
            deadline: Duration::from_millis(config.deadline_ms),
        }
    }

    /// Run the fan-out. Always yields one [`ProviderResult`] per provider;
    /// the only error is total failure of every provider.
    #[instrument(skip(self, query))]
    pub async fn dispatch(&self, query: &SearchQuery) -> Result<Vec<ProviderResult>> {
        if self.providers.is_empty() {
            warn!("No providers enabled, nothing to dispatch");
            return Err(AggregatorError::AllProvidersFailed);
        }

        let started = std::time::Instant::now();
        let deadline = Instant::now() + self.deadline;

        let mut handles = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let provider = provider.clone();
            let guard = self.guards.guard_for(provider.provider_id());
            let query = query.clone();
            let per_call_timeout = self.per_call_timeout;
            let id = provider.provider_id();
            handles.push((
                id,
                tokio::spawn(async move {
                    call_provider(provider, guard, &query, per_call_timeout).await
                }),
            ));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (provider_id, mut handle) in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(join_error)) => {
                    warn!(provider = %provider_id, "provider task panicked: {}", join_error);
                    emit_counter(MetricName::ProviderCallsError, 1);
                    results.push(ProviderResult::failed(provider_id, ProviderStatus::Error));
                }
                Err(_) => {
                    // Fan-out deadline hit; abandon the task and move on.
                    // Its eventual late result is discarded.
                    handle.abort();
                    warn!(provider = %provider_id, "fan-out deadline expired, abandoning call");
                    emit_counter(MetricName::ProviderCallsTimeout, 1);
                    results.push(ProviderResult::failed(provider_id, ProviderStatus::Timeout));
                }
            }
        }

        emit_histogram(MetricName::FanoutDuration, started.elapsed().as_secs_f64());

        let ok_count = results.iter().filter(|r| r.is_ok()).count();
        info!(
            "Fan-out complete: {}/{} providers ok in {:.0}ms",
            ok_count,
            results.len(),
            started.elapsed().as_millis()
        );

        if ok_count == 0 {
            emit_counter(MetricName::AggregateFailures, 1);
            return Err(AggregatorError::AllProvidersFailed);
        }
        Ok(results)
    }
}

/// One guarded provider call. Never returns an error; every outcome is
/// folded into a classified [`ProviderResult`].
async fn call_provider(
    provider: Arc<dyn ProviderAdapter>,
    guard: Option<Arc<ProviderGuard>>,
    query: &SearchQuery,
    per_call_timeout: Duration,
) -> ProviderResult {
    let provider_id = provider.provider_id();

    if let Some(guard) = &guard {
        match guard.acquire().await {
            Ok(()) => {}
            Err(GuardRejection::RateLimited) => {
                warn!(provider = %provider_id, "call rejected by rate limiter");
                emit_counter(MetricName::ProviderCallsRateLimited, 1);
                return ProviderResult::failed(provider_id, ProviderStatus::RateLimited);
            }
            Err(GuardRejection::CircuitOpen) => {
                warn!(provider = %provider_id, "call rejected, circuit open");
                emit_counter(MetricName::ProviderCallsCircuitOpen, 1);
                return ProviderResult::failed(provider_id, ProviderStatus::CircuitOpen);
            }
        }
    }

    let started = std::time::Instant::now();
    match tokio::time::timeout(per_call_timeout, provider.search(query)).await {
        Ok(Ok(events)) => {
            if let Some(guard) = &guard {
                guard.record_success();
            }
            emit_counter(MetricName::ProviderCallsOk, 1);
            emit_counter(MetricName::ProviderEventsFetched, events.len() as u64);
            emit_histogram(
                MetricName::ProviderCallDuration,
                started.elapsed().as_secs_f64(),
            );
            debug!(provider = %provider_id, "provider returned {} events", events.len());
            ProviderResult::ok(provider_id, events)
        }
        Ok(Err(e)) => {
            if let Some(guard) = &guard {
                guard.record_failure();
            }
            warn!(provider = %provider_id, "provider call failed: {}", e);
            emit_counter(MetricName::ProviderCallsError, 1);
            ProviderResult::failed(provider_id, ProviderStatus::Error)
        }
        Err(_) => {
            if let Some(guard) = &guard {
                guard.record_failure();
            }
            warn!(
                provider = %provider_id,
                "provider call exceeded {}ms timeout",
                per_call_timeout.as_millis()
            );
            emit_counter(MetricName::ProviderCallsTimeout, 1);
            ProviderResult::failed(provider_id, ProviderStatus::Timeout)
        }
    }
}
