//! CapabilityContext type definition

use chrono::{DateTime, NaiveDate, Utc};

use crate::types::TemporalFrame;

/// Execution context handed to a capability
#[derive(Debug, Clone)]
pub struct CapabilityContext {
    pub user_id: String,
    /// Id of the tracked operation this invocation belongs to
    pub operation_id: String,
    /// Position inside a multi-step plan, if any
    pub step_index: Option<usize>,
    /// Temporal frame of the request (now, viewing date, timezone)
    pub temporal: TemporalFrame,
}

impl CapabilityContext {
    pub fn new(
        user_id: impl Into<String>,
        operation_id: impl Into<String>,
        temporal: TemporalFrame,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            operation_id: operation_id.into(),
            step_index: None,
            temporal,
        }
    }

    pub fn with_step_index(mut self, index: usize) -> Self {
        self.step_index = Some(index);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.temporal.now
    }

    pub fn viewing_date(&self) -> NaiveDate {
        self.temporal.viewing_date
    }

    /// Generate a new id for an entity created by a capability
    pub fn new_entity_id(prefix: &str) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        format!("{}_{}", prefix, &id[..8])
    }
}
