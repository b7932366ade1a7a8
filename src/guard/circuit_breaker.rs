use crate::metrics::{emit_counter, MetricName};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Per-provider health state. Transitions are the only place provider
/// health is mutated, always under the breaker's lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    /// Timestamps of recent failures, pruned to the trailing window.
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    /// Current cooldown, grows on repeated HALF_OPEN failures.
    cooldown: Duration,
    /// Whether the single HALF_OPEN trial call is already in flight.
    trial_in_flight: bool,
}

/// Circuit breaker for one provider, shared across concurrent callers.
#[derive(Debug)]
pub struct CircuitBreaker {
    provider_id: String,
    failure_threshold: u32,
    failure_window: Duration,
    base_cooldown: Duration,
    backoff_multiplier: f64,
    max_cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(
        provider_id: impl Into<String>,
        failure_threshold: u32,
        failure_window: Duration,
        cooldown: Duration,
        backoff_multiplier: f64,
        max_cooldown: Duration,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            failure_threshold: failure_threshold.max(1),
            failure_window,
            base_cooldown: cooldown,
            backoff_multiplier,
            max_cooldown,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                cooldown,
                trial_in_flight: false,
            }),
        }
    }

    /// Ask permission to make a call. OPEN circuits reject immediately;
    /// an OPEN circuit whose cooldown has elapsed admits exactly one
    /// HALF_OPEN trial.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= inner.cooldown {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    emit_counter(MetricName::CircuitHalfOpened, 1);
                    info!(provider = %self.provider_id, "circuit half-open, admitting trial call");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
        }
    }

    /// Release the HALF_OPEN trial slot without recording an outcome.
    /// Used when an admitted call is dropped before reaching the network
    /// (e.g. rejected by the rate limiter).
    pub fn cancel_trial(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == CircuitState::HalfOpen {
            inner.trial_in_flight = false;
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == CircuitState::HalfOpen {
            info!(provider = %self.provider_id, "trial call succeeded, circuit closed");
            emit_counter(MetricName::CircuitClosed, 1);
        }
        inner.state = CircuitState::Closed;
        inner.failures.clear();
        inner.opened_at = None;
        inner.cooldown = self.base_cooldown;
        inner.trial_in_flight = false;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        match inner.state {
            CircuitState::HalfOpen => {
                let grown = inner.cooldown.as_secs_f64() * self.backoff_multiplier;
                inner.cooldown = Duration::from_secs_f64(grown).min(self.max_cooldown);
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
                inner.trial_in_flight = false;
                emit_counter(MetricName::CircuitOpened, 1);
                warn!(
                    provider = %self.provider_id,
                    cooldown_secs = inner.cooldown.as_secs_f64(),
                    "trial call failed, circuit re-opened"
                );
            }
            CircuitState::Closed => {
                inner.failures.push_back(now);
                let window = self.failure_window;
                while let Some(front) = inner.failures.front() {
                    if now.duration_since(*front) > window {
                        inner.failures.pop_front();
                    } else {
                        break;
                    }
                }
                if inner.failures.len() as u32 >= self.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                    inner.cooldown = self.base_cooldown;
                    emit_counter(MetricName::CircuitOpened, 1);
                    warn!(
                        provider = %self.provider_id,
                        failures = inner.failures.len(),
                        "failure threshold exceeded, circuit opened"
                    );
                }
            }
            // Failures reported after the circuit already opened (e.g. a
            // late timeout) carry no new information.
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }
}
