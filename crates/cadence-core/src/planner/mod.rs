//! Intent resolution abstraction
//!
//! An [`IntentResolver`] turns an utterance plus a context snapshot into an
//! [`Understanding`]. Resolution is infallible at this boundary: every
//! implementation degrades to a fallback plan instead of returning an error.

use async_trait::async_trait;
use thiserror::Error;

use crate::normalizer::ValidationError;
use crate::types::{ContextSnapshot, Understanding};

/// Reasons a model-backed resolution attempt is abandoned for the fallback.
#[derive(Debug, Error)]
pub enum UnderstandingError {
    #[error("language model call failed: {0}")]
    Llm(String),

    #[error("model response contained no JSON object")]
    MissingJson,

    #[error("model response did not match the plan schema: {0}")]
    InvalidJson(String),

    #[error("plan validation failed: {0}")]
    Validation(#[from] ValidationError),
}

#[async_trait]
pub trait IntentResolver: Send + Sync {
    /// Produce a plan for the utterance. Never fails; see module docs.
    async fn understand(&self, utterance: &str, context: &ContextSnapshot) -> Understanding;
}
