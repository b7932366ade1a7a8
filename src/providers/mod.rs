//! Provider adapters: one uniform contract per external event source.

pub mod eventbrite;
pub mod ticketmaster;

pub use eventbrite::EventbriteAdapter;
pub use ticketmaster::TicketmasterAdapter;

use crate::config::Config;
use crate::error::Result;
use crate::types::{RawEvent, SearchQuery};
use std::sync::Arc;
use tracing::{info, warn};

/// Core trait every external event source implements.
///
/// `search` must complete or fail within the caller's timeout and must not
/// error for ordinary "no results"; that is a valid empty list. Adapters do
/// no caching and no retrying; both are the coordinator's and the guard's
/// job. Outcome classification (ok/timeout/error) also happens in the
/// coordinator, not here.
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Unique identifier for this provider.
    fn provider_id(&self) -> &'static str;

    /// Fetch events matching the query from this source.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawEvent>>;

    /// Lightweight reachability probe for external health-check tooling.
    async fn test_connection(&self) -> bool;
}

/// Build the enabled adapter set from config and environment. A provider
/// whose API key is missing is skipped with a warning rather than failing
/// startup.
pub fn enabled_providers(config: &Config) -> Vec<Arc<dyn ProviderAdapter>> {
    let mut providers: Vec<Arc<dyn ProviderAdapter>> = Vec::new();

    for (id, provider_config) in &config.providers {
        if !provider_config.enabled {
            info!(provider = %id, "provider disabled in config");
            continue;
        }
        let api_key = match &provider_config.api_key_env {
            Some(env_name) => match std::env::var(env_name) {
                Ok(key) if !key.is_empty() => Some(key),
                _ => {
                    warn!(provider = %id, env = %env_name, "API key not set, skipping provider");
                    continue;
                }
            },
            None => None,
        };

        match id.as_str() {
            "ticketmaster" => {
                let Some(key) = api_key else {
                    warn!(provider = %id, "ticketmaster requires api_key_env");
                    continue;
                };
                let mut adapter = TicketmasterAdapter::new(key);
                if let Some(base) = &provider_config.base_url {
                    adapter = adapter.with_base_url(base.clone());
                }
                providers.push(Arc::new(adapter));
            }
            "eventbrite" => {
                let Some(key) = api_key else {
                    warn!(provider = %id, "eventbrite requires api_key_env");
                    continue;
                };
                let mut adapter = EventbriteAdapter::new(key);
                if let Some(base) = &provider_config.base_url {
                    adapter = adapter.with_base_url(base.clone());
                }
                providers.push(Arc::new(adapter));
            }
            other => warn!(provider = %other, "unknown provider id in config"),
        }
    }

    info!("Enabled {} provider(s)", providers.len());
    providers
}
