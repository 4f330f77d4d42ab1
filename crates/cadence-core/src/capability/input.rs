//! CapabilityInput type definition

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Input data for capability execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityInput {
    /// Parameters from the plan, already schema-validated
    #[serde(default)]
    pub params: Value,
}

impl CapabilityInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(params: Value) -> Self {
        Self { params }
    }

    /// Get a parameter by JSON pointer (e.g., "/foo/bar")
    pub fn get_param(&self, pointer: &str) -> Option<&Value> {
        self.params.pointer(pointer)
    }

    /// Top-level string parameter, trimmed; empty strings count as absent.
    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn u64_param(&self, key: &str) -> Option<u64> {
        self.params.get(key).and_then(Value::as_u64)
    }
}
