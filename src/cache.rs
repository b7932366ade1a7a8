//! TTL-keyed result cache in front of the aggregation pipeline.

use crate::types::CanonicalEvent;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Keyed store collaborator. May be in-process or external; the
/// aggregation engine does not care which. Store failures must surface as
/// misses, never as pipeline errors.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<CanonicalEvent>>;
    async fn set(&self, key: &str, events: Vec<CanonicalEvent>, ttl: Duration);
}

#[derive(Debug, Clone)]
struct CacheEntry {
    events: Vec<CanonicalEvent>,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() >= self.ttl
    }
}

/// In-memory cache implementation for single-process deployments and tests.
/// Entries are replaced whole on insert, never mutated in place; expired
/// entries are invisible to readers and physically purged on the next write.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Option<Vec<CanonicalEvent>> {
        let entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                debug!("Cache hit for {}", key);
                Some(entry.events.clone())
            }
            _ => None,
        }
    }

    async fn set(&self, key: &str, events: Vec<CanonicalEvent>, ttl: Duration) {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|_, entry| !entry.is_expired());
        entries.insert(
            key.to_string(),
            CacheEntry {
                events,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }
}
