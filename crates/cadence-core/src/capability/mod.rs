//! Capability abstraction module
//!
//! This module defines the Capability trait and related types:
//! - Capability: a named, schema-described unit the dispatcher can invoke
//! - CapabilityInput: validated parameters for one invocation
//! - CapabilityContext: who is asking and when
//! - CapabilityResult: outcome with declared recoverability

mod context;
mod input;
mod result;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::EntityKind;

pub use context::CapabilityContext;
pub use input::CapabilityInput;
pub use result::CapabilityResult;

/// Capability trait - the unit of work the dispatcher runs
///
/// Capabilities are black boxes to the dispatcher. They may call external
/// stores or services; the dispatcher only relies on the name, the parameter
/// schema and the declared outcome.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Globally unique name, conventionally `<category>_<verb>`
    fn name(&self) -> &str;

    /// Human-readable description (shown to the language model)
    fn description(&self) -> &str;

    /// Metadata used for validation, prompting and entity tracking
    fn metadata(&self) -> CapabilityMeta {
        CapabilityMeta::new(self.name(), self.description())
    }

    /// Execute the capability
    async fn execute(&self, input: CapabilityInput, ctx: CapabilityContext) -> CapabilityResult;
}

/// Capability metadata for the registry, prompt and dispatcher
#[derive(Debug, Clone)]
pub struct CapabilityMeta {
    pub name: String,
    pub description: String,
    /// Grouping used in the prompt catalog; defaults to the name prefix
    pub category: String,
    /// JSON-schema subset the parameters must satisfy. `Null` accepts anything.
    pub parameter_schema: serde_json::Value,
    /// Where affected entity ids live in params/output.
    pub entity_fields: Vec<EntityField>,
}

impl CapabilityMeta {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        let category = default_category(&name);
        Self {
            name,
            description: description.into(),
            category,
            parameter_schema: serde_json::Value::Null,
            entity_fields: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_parameter_schema(mut self, schema: serde_json::Value) -> Self {
        self.parameter_schema = schema;
        self
    }

    pub fn with_entity_field(mut self, field: EntityField) -> Self {
        self.entity_fields.push(field);
        self
    }
}

fn default_category(name: &str) -> String {
    name.split('_').next().unwrap_or(name).to_string()
}

/// Which half of an invocation an entity id is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitySource {
    /// Ids the caller passed in; must already exist.
    Params,
    /// Ids the capability reports; treated as newly created or touched.
    Output,
}

/// Declared location of an entity id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityField {
    pub kind: EntityKind,
    pub source: EntitySource,
    /// JSON pointer, e.g. "/blockId" or "/created/id"
    pub pointer: String,
}

impl EntityField {
    pub fn param(kind: EntityKind, pointer: impl Into<String>) -> Self {
        Self {
            kind,
            source: EntitySource::Params,
            pointer: pointer.into(),
        }
    }

    pub fn output(kind: EntityKind, pointer: impl Into<String>) -> Self {
        Self {
            kind,
            source: EntitySource::Output,
            pointer: pointer.into(),
        }
    }
}

/// Extract metadata from a Capability implementation
pub fn extract_meta<C: Capability + ?Sized>(capability: &C) -> CapabilityMeta {
    capability.metadata()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_defaults_to_name_prefix() {
        let meta = CapabilityMeta::new("schedule_move_block", "Move a block");
        assert_eq!(meta.category, "schedule");
        assert!(meta.parameter_schema.is_null());

        let meta = CapabilityMeta::new("noop", "Nothing").with_category("system");
        assert_eq!(meta.category, "system");
    }
}
