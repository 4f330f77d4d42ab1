//! UnderstandingCache - plan cache trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::types::Understanding;

/// A cached plan and when it was stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub understanding: Understanding,
    pub timestamp: DateTime<Utc>,
}

/// Bounded, time-expiring map from fingerprint to plan.
///
/// Eviction follows insertion order only; reads never refresh an entry.
#[async_trait]
pub trait UnderstandingCache: Send + Sync {
    /// Fresh entry for `key`; expired entries are removed and reported absent
    async fn get(&self, key: &str) -> Result<Option<Understanding>, StoreError>;

    /// Store a plan, evicting the oldest insertion when full
    async fn set(&self, key: &str, understanding: Understanding) -> Result<(), StoreError>;

    async fn len(&self) -> Result<usize, StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;
}
