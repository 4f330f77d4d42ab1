//! CapabilityResult type definition

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codes;

/// Capability outcome. Recoverability is declared by the capability itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CapabilityResult {
    Success {
        #[serde(default)]
        output: Value,
    },

    /// Transient or local failure; a multi-step plan continues past it
    RecoverableError { message: String, code: String },

    /// Contract violation or permanent failure; a multi-step plan aborts
    Error { message: String, code: String },
}

impl CapabilityResult {
    pub fn success(output: Value) -> Self {
        Self::Success { output }
    }

    pub fn recoverable(message: impl Into<String>) -> Self {
        Self::recoverable_with_code(codes::EXECUTION_FAILED, message)
    }

    pub fn recoverable_with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RecoverableError {
            message: message.into(),
            code: code.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::error_with_code(codes::EXECUTION_FAILED, message)
    }

    pub fn error_with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            code: code.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::RecoverableError { .. })
    }
}
