//! Core type definitions for Cadence
//!
//! This module contains the data model shared by every pipeline stage:
//! - ContextSnapshot: read-only view of the user's world at request time
//! - Understanding: structured plan produced by intent resolution
//! - TrackedOperation / ExecutionResult: what dispatch did and recorded
//! - EntityRefs: typed entity identifiers touched or mentioned
//! - Clock: injectable time source

mod clock;
mod context;
mod entity;
mod operation;
mod understanding;

pub use clock::{Clock, FixedClock, SystemClock};
pub use context::{
    BreakPreferences, ContextSnapshot, ConversationMemory, ConversationTurn, EmailItem,
    MeetingPreferences, ScheduleBlock, TaskItem, TemporalFrame, UserPatterns, WorkHours,
    WorkspaceState,
};
pub use entity::{EntityKind, EntityRefs};
pub use operation::{ExecutionError, ExecutionResult, StepReport, StepStatus, TrackedOperation};
pub use understanding::{
    Ambiguity, Execution, IntentSummary, PlanSource, PlanStep, ResolvedEntities, ResolvedValue,
    Understanding, UnderstandingMetadata,
};
