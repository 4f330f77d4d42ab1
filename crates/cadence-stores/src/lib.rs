//! # Cadence Stores
//!
//! In-process store implementations for the Cadence pipeline.
//!
//! This crate provides:
//! - InMemory OperationLedger (bounded, newest-first)
//! - InMemory UnderstandingCache (TTL + insertion-order eviction)

mod cache;
mod ledger;

pub use cache::InMemoryUnderstandingCache;
pub use ledger::InMemoryOperationLedger;

// Re-export core traits for convenience
pub use cadence_core::store::{CacheEntry, OperationLedger, StoreError, UnderstandingCache};
