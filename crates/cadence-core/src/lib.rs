//! # Cadence Core
//!
//! Core abstractions and deterministic logic for the Cadence assistant.
//!
//! This crate contains:
//! - Context snapshot / Understanding / TrackedOperation definitions
//! - Capability contract, registry and the plan Dispatcher
//! - Plan normalization and the IntentResolver abstraction
//! - Ledger and cache traits plus pronoun reference resolution
//!
//! This crate does NOT care about:
//! - Where schedule, task and email data is stored
//! - Which language model produces plans
//! - How results are displayed

pub mod capability;
pub mod codes;
pub mod executor;
pub mod normalizer;
pub mod planner;
pub mod store;
pub mod types;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::capability::{
        Capability, CapabilityContext, CapabilityInput, CapabilityMeta, CapabilityResult,
        EntityField, EntitySource,
    };
    pub use crate::executor::{
        AffectedEntityTable, CapabilityRegistry, Dispatcher, PrefixRule, MULTI_STEP_OPERATION,
    };
    pub use crate::normalizer::{UnderstandingNormalizer, ValidationError};
    pub use crate::planner::{IntentResolver, UnderstandingError};
    pub use crate::store::{
        CacheEntry, OperationLedger, ReferenceResolver, ReferenceSource, ResolvedReference,
        StoreError, UnderstandingCache,
    };
    pub use crate::types::{
        Ambiguity, Clock, ContextSnapshot, ConversationMemory, ConversationTurn, EmailItem,
        EntityKind, EntityRefs, Execution, ExecutionError, ExecutionResult, FixedClock,
        IntentSummary, PlanSource, PlanStep, ResolvedEntities, ResolvedValue, ScheduleBlock,
        StepReport, StepStatus, SystemClock, TaskItem, TemporalFrame, TrackedOperation,
        Understanding, UserPatterns,
    };
}

// Re-export key types at crate root
pub use capability::{Capability, CapabilityContext, CapabilityInput, CapabilityResult};
pub use executor::{CapabilityRegistry, Dispatcher};
pub use normalizer::UnderstandingNormalizer;
pub use planner::IntentResolver;
pub use store::{OperationLedger, StoreError, UnderstandingCache};
pub use types::{ContextSnapshot, ExecutionResult, TrackedOperation, Understanding};
