//! UnderstandingCache implementations

use async_trait::async_trait;
use chrono::Duration;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use cadence_core::store::{CacheEntry, StoreError, UnderstandingCache};
use cadence_core::types::{Clock, SystemClock, Understanding};

pub const DEFAULT_TTL_SECS: i64 = 300;
pub const DEFAULT_MAX_ENTRIES: usize = 1_000;

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Keys in insertion order, oldest at the front.
    order: VecDeque<String>,
}

impl CacheState {
    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
        self.order.retain(|existing| existing != key);
    }
}

/// In-memory cache with insertion-order eviction.
///
/// Not an LRU: reads neither refresh the TTL nor move an entry in the
/// eviction order. Re-setting an existing key replaces the plan and its
/// timestamp but keeps the original eviction position.
pub struct InMemoryUnderstandingCache {
    state: Mutex<CacheState>,
    ttl: Duration,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl InMemoryUnderstandingCache {
    pub fn new() -> Self {
        Self::with_limits(Duration::seconds(DEFAULT_TTL_SECS), DEFAULT_MAX_ENTRIES)
    }

    pub fn with_limits(ttl: Duration, max_entries: usize) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            ttl,
            max_entries: max_entries.max(1),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Keys currently held, oldest insertion first.
    pub fn keys(&self) -> Result<Vec<String>, StoreError> {
        let state = self
            .state
            .lock()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(state.order.iter().cloned().collect())
    }
}

impl Default for InMemoryUnderstandingCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UnderstandingCache for InMemoryUnderstandingCache {
    async fn get(&self, key: &str) -> Result<Option<Understanding>, StoreError> {
        let now = self.clock.now();
        let mut state = self
            .state
            .lock()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        let expired = match state.entries.get(key) {
            None => return Ok(None),
            Some(entry) => now - entry.timestamp > self.ttl,
        };
        if expired {
            state.remove(key);
            tracing::debug!(key = %key, "cache entry expired");
            return Ok(None);
        }
        Ok(state.entries.get(key).map(|entry| entry.understanding.clone()))
    }

    async fn set(&self, key: &str, understanding: Understanding) -> Result<(), StoreError> {
        let entry = CacheEntry {
            key: key.to_string(),
            understanding,
            timestamp: self.clock.now(),
        };
        let mut state = self
            .state
            .lock()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        if let Some(existing) = state.entries.get_mut(key) {
            *existing = entry;
            return Ok(());
        }

        while state.entries.len() >= self.max_entries {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
            tracing::debug!(key = %oldest, "cache evicted oldest entry");
        }
        state.order.push_back(key.to_string());
        state.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        let state = self
            .state
            .lock()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(state.entries.len())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        state.entries.clear();
        state.order.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::types::{Execution, FixedClock, IntentSummary};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn plan(label: &str) -> Understanding {
        Understanding::new(
            IntentSummary::new(label, 0.9, ""),
            Execution::single("schedule_view", json!({})),
        )
    }

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 7, 10, 9, 0, 0).unwrap()))
    }

    #[test]
    fn test_eviction_follows_insertion_order_not_access() {
        tokio_test::block_on(async {
            let cache = InMemoryUnderstandingCache::with_limits(Duration::minutes(5), 3)
                .with_clock(clock());
            for key in ["k1", "k2", "k3"] {
                cache.set(key, plan(key)).await.unwrap();
            }
            // Reading k1 must not protect it from eviction.
            assert!(cache.get("k1").await.unwrap().is_some());

            cache.set("k4", plan("k4")).await.unwrap();

            assert_eq!(cache.len().await.unwrap(), 3);
            assert!(cache.get("k1").await.unwrap().is_none());
            assert!(cache.get("k2").await.unwrap().is_some());
            assert_eq!(cache.keys().unwrap(), vec!["k2", "k3", "k4"]);
        });
    }

    #[test]
    fn test_entries_expire_after_ttl() {
        tokio_test::block_on(async {
            let clock = clock();
            let cache = InMemoryUnderstandingCache::with_limits(Duration::minutes(5), 10)
                .with_clock(clock.clone());
            cache.set("k1", plan("k1")).await.unwrap();

            clock.advance(Duration::minutes(4));
            assert_eq!(cache.get("k1").await.unwrap(), Some(plan("k1")));

            clock.advance(Duration::minutes(2));
            assert!(cache.get("k1").await.unwrap().is_none());
            assert_eq!(cache.len().await.unwrap(), 0);
            assert!(cache.keys().unwrap().is_empty());
        });
    }

    #[test]
    fn test_reset_existing_key_keeps_position() {
        tokio_test::block_on(async {
            let cache = InMemoryUnderstandingCache::with_limits(Duration::minutes(5), 2)
                .with_clock(clock());
            cache.set("k1", plan("first")).await.unwrap();
            cache.set("k2", plan("k2")).await.unwrap();
            cache.set("k1", plan("second")).await.unwrap();

            assert_eq!(cache.len().await.unwrap(), 2);
            assert_eq!(cache.get("k1").await.unwrap().unwrap().intent.primary, "second");

            cache.set("k3", plan("k3")).await.unwrap();
            assert!(cache.get("k1").await.unwrap().is_none());
        });
    }
}
