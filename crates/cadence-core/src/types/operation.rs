//! Tracked operations and dispatch results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::entity::EntityRefs;

/// Record of one dispatch, immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedOperation {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub capability: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub succeeded: bool,
    #[serde(default)]
    pub affected_entities: EntityRefs,
    pub user_id: String,
}

impl TrackedOperation {
    pub fn new(
        user_id: impl Into<String>,
        capability: impl Into<String>,
        params: Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            capability: capability.into(),
            params,
            result: Value::Null,
            succeeded: false,
            affected_entities: EntityRefs::default(),
            user_id: user_id.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_result(mut self, result: Value, succeeded: bool) -> Self {
        self.result = result;
        self.succeeded = succeeded;
        self
    }

    pub fn with_affected(mut self, affected: EntityRefs) -> Self {
        self.affected_entities = affected;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub message: String,
    pub code: String,
    pub recoverable: bool,
}

impl ExecutionError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            recoverable,
        }
    }
}

/// Outcome of one dispatch call (or one step of a multi-step plan).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    pub operation: TrackedOperation,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepReport>,
}

impl ExecutionResult {
    pub fn succeeded(result: Value, operation: TrackedOperation) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            operation,
            steps: Vec::new(),
        }
    }

    pub fn failed(error: ExecutionError, operation: TrackedOperation) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error),
            operation,
            steps: Vec::new(),
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|error| error.code.as_str())
    }

    /// Failed with an error the caller may continue past.
    pub fn is_recoverable_failure(&self) -> bool {
        self.error.as_ref().is_some_and(|error| error.recoverable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    /// Not executed because a dependency did not succeed.
    Skipped,
    /// Not executed because an earlier step failed fatally.
    Aborted,
}

/// Per-step outcome embedded in a multi-step result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub index: usize,
    pub capability: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ExecutionResult>,
}

impl StepReport {
    pub fn executed(index: usize, capability: impl Into<String>, outcome: ExecutionResult) -> Self {
        let status = if outcome.success {
            StepStatus::Succeeded
        } else {
            StepStatus::Failed
        };
        Self {
            index,
            capability: capability.into(),
            status,
            outcome: Some(outcome),
        }
    }

    pub fn not_run(index: usize, capability: impl Into<String>, status: StepStatus) -> Self {
        Self {
            index,
            capability: capability.into(),
            status,
            outcome: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == StepStatus::Succeeded
    }

    /// Compact form stored in the parent operation's `result`.
    pub fn summary(&self) -> Value {
        let mut summary = json!({
            "index": self.index,
            "capability": self.capability,
            "status": self.status,
        });
        if let Some(outcome) = &self.outcome {
            if let Some(result) = &outcome.result {
                summary["result"] = result.clone();
            }
            if let Some(error) = &outcome.error {
                summary["error"] = json!(error);
            }
            summary["affectedEntities"] = json!(outcome.operation.affected_entities);
        }
        summary
    }
}
