//! Store module
//!
//! This module provides storage abstractions:
//! - OperationLedger: bounded, newest-first log of tracked operations (async trait)
//! - UnderstandingCache: time-expiring plan cache (async trait)
//! - ReferenceResolver: pronoun antecedent lookup over ledger data
//!
//! Note: Implementations are in cadence-stores crate

mod cache;
mod ledger;
mod reference;

pub use cache::{CacheEntry, UnderstandingCache};
pub use ledger::OperationLedger;
pub use reference::{ReferenceResolver, ReferenceSource, ResolvedReference};

use thiserror::Error;

/// Store error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
