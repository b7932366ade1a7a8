use crate::error::{AggregatorError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::time::Duration;
use tracing::info;

/// Fan-out timing knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    /// Per-provider call timeout in milliseconds.
    pub per_call_timeout_ms: u64,
    /// Fan-out-wide deadline in milliseconds.
    pub deadline_ms: u64,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            per_call_timeout_ms: 5_000,
            deadline_ms: 8_000,
        }
    }
}

/// Result cache knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_seconds: 300 }
    }
}

/// Per-provider rate limiting and circuit breaking. One table applies to
/// every provider unless a provider block overrides it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub requests_per_min: u64,
    /// Longest a caller will wait for a rate-limit token before being rejected.
    pub max_wait_ms: u64,
    /// Failures within the trailing window that trip the circuit.
    pub failure_threshold: u32,
    pub failure_window_secs: u64,
    pub cooldown_secs: u64,
    /// Cooldown growth factor applied when a HALF_OPEN trial fails.
    pub backoff_multiplier: f64,
    pub max_cooldown_secs: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            requests_per_min: 60,
            max_wait_ms: 250,
            failure_threshold: 5,
            failure_window_secs: 60,
            cooldown_secs: 30,
            backoff_multiplier: 2.0,
            max_cooldown_secs: 300,
        }
    }
}

impl GuardConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn failure_window(&self) -> Duration {
        Duration::from_secs(self.failure_window_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn max_cooldown(&self) -> Duration {
        Duration::from_secs(self.max_cooldown_secs)
    }
}

/// One external event source.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Environment variable holding the API key. A missing key disables
    /// the provider with a warning rather than failing startup.
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    /// Overrides the global guard table for this provider.
    pub guard: Option<GuardConfig>,
}

fn default_true() -> bool {
    true
}

/// Relevance scoring weights. Heuristic constants, tunable per deployment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub distance_base: f64,
    pub keyword_title: f64,
    pub keyword_description: f64,
    pub category_match: f64,
    pub image_quality: f64,
    pub recency_base: f64,
    pub recency_horizon_days: i64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            distance_base: 50.0,
            keyword_title: 30.0,
            keyword_description: 10.0,
            category_match: 25.0,
            image_quality: 15.0,
            recency_base: 10.0,
            recency_horizon_days: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub fanout: FanoutConfig,
    pub cache: CacheConfig,
    pub guard: GuardConfig,
    pub ranking: RankingConfig,
    pub providers: HashMap<String, ProviderConfig>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            AggregatorError::Config(format!("Failed to read config file '{}': {}", path, e))
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from the given path, falling back to defaults when the file
    /// does not exist.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if std::path::Path::new(path).exists() {
            Self::load(path)
        } else {
            info!("No config file at '{}', using defaults", path);
            Ok(Self::default())
        }
    }

    /// Guard table for one provider, falling back to the global table.
    pub fn guard_for(&self, provider_id: &str) -> GuardConfig {
        self.providers
            .get(provider_id)
            .and_then(|p| p.guard.clone())
            .unwrap_or_else(|| self.guard.clone())
    }
}
