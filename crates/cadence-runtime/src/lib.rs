//! # Cadence Runtime
//!
//! The assistant pipeline and its bootstrap.
//!
//! This crate provides:
//! - `Assistant`: context assembly → understanding → ambiguity gate → dispatch
//! - `AssistantApp`: wiring of stores, registry, planner and assembler from `cadence.yaml`
//! - one-time tracing initialisation

mod assistant;
mod bootstrap;

pub use assistant::{Assistant, AssistantResponse, MessageRequest};
pub use bootstrap::{build_llm_client, init_tracing, AssistantApp, BootstrapError};

// Re-export core types for convenience
pub use cadence_core::prelude::*;
