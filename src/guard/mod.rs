//! Per-provider call guards: rate limiting and circuit breaking.
//!
//! Every outbound provider call passes through a [`ProviderGuard`] first.
//! The guard either admits the call or rejects it immediately with a
//! classification the fan-out coordinator can report, so a failing or
//! rate-limited provider never queues work behind itself.

pub mod circuit_breaker;
pub mod rate_limiter;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use rate_limiter::RateLimiter;

use crate::config::{Config, GuardConfig};
use std::collections::HashMap;
use std::sync::Arc;

/// Why a call was refused without touching the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardRejection {
    RateLimited,
    CircuitOpen,
}

/// Combined guard for one provider.
#[derive(Debug)]
pub struct ProviderGuard {
    limiter: RateLimiter,
    breaker: CircuitBreaker,
}

impl ProviderGuard {
    pub fn new(provider_id: &str, config: &GuardConfig) -> Self {
        Self {
            limiter: RateLimiter::new(config.requests_per_min, config.max_wait()),
            breaker: CircuitBreaker::new(
                provider_id,
                config.failure_threshold,
                config.failure_window(),
                config.cooldown(),
                config.backoff_multiplier,
                config.max_cooldown(),
            ),
        }
    }

    /// Admit or reject one call. Circuit state is checked first so an open
    /// circuit never consumes rate-limit tokens.
    pub async fn acquire(&self) -> Result<(), GuardRejection> {
        if !self.breaker.try_acquire() {
            return Err(GuardRejection::CircuitOpen);
        }
        if !self.limiter.acquire().await {
            // The admitted call never happens; free a HALF_OPEN trial slot.
            self.breaker.cancel_trial();
            return Err(GuardRejection::RateLimited);
        }
        Ok(())
    }

    pub fn record_success(&self) {
        self.breaker.record_success();
    }

    pub fn record_failure(&self) {
        self.breaker.record_failure();
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }
}

/// One guard per provider id, built once at startup and shared by all
/// concurrent aggregation calls.
#[derive(Debug, Default)]
pub struct GuardRegistry {
    guards: HashMap<String, Arc<ProviderGuard>>,
}

impl GuardRegistry {
    pub fn from_config(config: &Config, provider_ids: &[&str]) -> Self {
        let guards = provider_ids
            .iter()
            .map(|id| {
                let guard = ProviderGuard::new(id, &config.guard_for(id));
                (id.to_string(), Arc::new(guard))
            })
            .collect();
        Self { guards }
    }

    pub fn guard_for(&self, provider_id: &str) -> Option<Arc<ProviderGuard>> {
        self.guards.get(provider_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuardConfig;

    #[tokio::test]
    async fn rate_limited_rejection_does_not_trip_breaker() {
        let config = GuardConfig {
            requests_per_min: 1,
            max_wait_ms: 0,
            failure_threshold: 1,
            ..GuardConfig::default()
        };
        let guard = ProviderGuard::new("p1", &config);

        assert!(guard.acquire().await.is_ok());
        assert_eq!(guard.acquire().await, Err(GuardRejection::RateLimited));
        // Breaker still closed: rate limiting is not a provider failure.
        assert_eq!(guard.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn open_circuit_rejects_before_rate_limiting() {
        let config = GuardConfig {
            failure_threshold: 1,
            ..GuardConfig::default()
        };
        let guard = ProviderGuard::new("p1", &config);
        guard.record_failure();
        assert_eq!(guard.acquire().await, Err(GuardRejection::CircuitOpen));
    }

    #[test]
    fn registry_builds_guard_per_provider() {
        let config = Config::default();
        let registry = GuardRegistry::from_config(&config, &["a", "b"]);
        assert!(registry.guard_for("a").is_some());
        assert!(registry.guard_for("b").is_some());
        assert!(registry.guard_for("c").is_none());
    }
}
