//! In-process response cache backed by DashMap for lock-free concurrent access.
//! Keys are content hashes of fully rendered prompts; entries expire after a TTL
//! measured on the monotonic clock, so wall-clock jumps cannot extend them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use gamelens_core::config::CacheConfig;
use tokio::time::Instant;
use tracing::debug;

/// One cached provider response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub content_hash: String,
    pub serialized_response: String,
    pub created_at: DateTime<Utc>,
    /// Tokens the original provider call consumed.
    pub token_cost: u32,
    pub model: String,
    inserted_at: Instant,
}

impl CacheEntry {
    pub fn age(&self) -> Duration {
        self.inserted_at.elapsed()
    }
}

/// Process-wide TTL cache for validated provider responses.
pub struct ResponseCache {
    store: Arc<DashMap<String, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl ResponseCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            store: Arc::new(DashMap::with_capacity(max_entries.min(1024))),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_secs), config.max_entries)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get an entry; expired entries are removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let Some(entry) = self.store.get(key) else {
            metrics::counter!("insights.cache.miss").increment(1);
            return None;
        };
        if self.is_expired(&entry) {
            drop(entry);
            self.remove_expired(key);
            return None;
        }
        metrics::counter!("insights.cache.hit").increment(1);
        Some(entry.clone())
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        entry.inserted_at.elapsed() >= self.ttl
    }

    /// Remove `key` only if the entry stored under it is still expired. A
    /// fresh entry written after the stale read is left in place.
    fn remove_expired(&self, key: &str) -> bool {
        let removed = self
            .store
            .remove_if(key, |_, entry| self.is_expired(entry))
            .is_some();
        if removed {
            metrics::counter!("insights.cache.expired").increment(1);
            debug!(key = key, "Cache entry expired");
        }
        removed
    }

    /// Insert or replace an entry. At capacity, expired entries go first,
    /// then the oldest entry.
    pub fn put(&self, key: String, serialized_response: String, token_cost: u32, model: String) {
        if self.store.len() >= self.max_entries && !self.store.contains_key(&key) {
            self.evict_expired();
            if self.store.len() >= self.max_entries {
                self.evict_oldest();
            }
        }
        self.store.insert(
            key.clone(),
            CacheEntry {
                content_hash: key,
                serialized_response,
                created_at: Utc::now(),
                token_cost,
                model,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn remove(&self, key: &str) -> bool {
        self.store.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    /// Remove expired entries. Call this periodically from a background task.
    pub fn evict_expired(&self) -> usize {
        let before = self.store.len();
        self.store.retain(|_, entry| !self.is_expired(entry));
        before - self.store.len()
    }

    fn evict_oldest(&self) {
        let oldest = self
            .store
            .iter()
            .min_by_key(|e| e.value().inserted_at)
            .map(|e| e.key().clone());
        if let Some(key) = oldest {
            self.store.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
