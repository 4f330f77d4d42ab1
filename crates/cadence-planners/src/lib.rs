//! Intent resolution for Cadence.
//!
//! This crate provides:
//! - LLM clients (OpenAI-compatible HTTP, mock, offline)
//! - The deterministic entity extractor and keyword fallback
//! - Prompt construction and the cache fingerprint
//! - `LlmUnderstandingEngine`, the model-backed `IntentResolver`

mod engine;
mod extractor;
mod fallback;
mod fingerprint;
mod llm;
mod prompt;

pub use engine::{LlmUnderstandingEngine, UnderstandingEngineConfig};
pub use extractor::{
    expected_entity_kind, extract_entities, find_pronoun, ExtractedEntities, BARE_HOUR_CONFIDENCE,
};
pub use fallback::{
    fallback_understanding, CONVERSATION_CAPABILITY, CONVERSATION_CONFIDENCE, KEYWORD_CONFIDENCE,
};
pub use fingerprint::{cache_key, normalize_utterance};
pub use llm::{
    HttpLlmClient, HttpLlmClientConfig, LlmClient, LlmError, LlmRequest, MockLlmClient,
    OfflineLlmClient,
};
pub use prompt::{PromptBuilder, DEFAULT_MAX_HISTORY_TURNS, DEFAULT_MAX_RECENT_OPERATIONS};
