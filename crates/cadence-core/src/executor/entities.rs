//! Affected-entity extraction
//!
//! Lookup order for a capability: its own declared `entity_fields`, then an
//! explicit table entry, then the first matching name-prefix rule.

use serde_json::Value;
use std::collections::HashMap;

use crate::capability::{CapabilityMeta, EntityField, EntitySource};
use crate::types::{ContextSnapshot, EntityKind, EntityRefs};

/// Name-prefix inference rule, e.g. `schedule_` -> block ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixRule {
    pub prefix: String,
    pub kind: EntityKind,
    pub param_pointers: Vec<String>,
    pub output_pointers: Vec<String>,
}

impl PrefixRule {
    /// Rule reading `<noun>Id`, `<noun>Ids` and `<noun>/id` fields.
    pub fn conventional(prefix: impl Into<String>, kind: EntityKind, noun: &str) -> Self {
        let single = format!("/{}Id", noun);
        let many = format!("/{}Ids", noun);
        Self {
            prefix: prefix.into(),
            kind,
            param_pointers: vec![single.clone(), many.clone()],
            output_pointers: vec![single, many, format!("/{}/id", noun)],
        }
    }

    fn fields(&self) -> Vec<EntityField> {
        let params = self
            .param_pointers
            .iter()
            .map(|p| EntityField::param(self.kind, p.clone()));
        let outputs = self
            .output_pointers
            .iter()
            .map(|p| EntityField::output(self.kind, p.clone()));
        params.chain(outputs).collect()
    }
}

/// Configurable mapping from capability to entity id locations.
#[derive(Debug, Clone)]
pub struct AffectedEntityTable {
    explicit: HashMap<String, Vec<EntityField>>,
    prefix_rules: Vec<PrefixRule>,
}

impl AffectedEntityTable {
    /// Table with no rules at all.
    pub fn empty() -> Self {
        Self {
            explicit: HashMap::new(),
            prefix_rules: Vec::new(),
        }
    }

    pub fn with_capability(mut self, name: impl Into<String>, fields: Vec<EntityField>) -> Self {
        self.explicit.insert(name.into(), fields);
        self
    }

    pub fn with_prefix_rule(mut self, rule: PrefixRule) -> Self {
        self.prefix_rules.push(rule);
        self
    }

    /// Fields that apply to a capability, empty when nothing matches.
    pub fn fields_for(&self, meta: &CapabilityMeta) -> Vec<EntityField> {
        if !meta.entity_fields.is_empty() {
            return meta.entity_fields.clone();
        }
        if let Some(fields) = self.explicit.get(&meta.name) {
            return fields.clone();
        }
        self.prefix_rules
            .iter()
            .find(|rule| meta.name.starts_with(&rule.prefix))
            .map(PrefixRule::fields)
            .unwrap_or_default()
    }

    /// Collect affected ids. Param ids survive only when known to the snapshot
    /// or produced earlier in the same dispatch; output ids always survive.
    pub fn extract(
        &self,
        meta: &CapabilityMeta,
        params: &Value,
        output: Option<&Value>,
        snapshot: &ContextSnapshot,
        produced: &EntityRefs,
    ) -> EntityRefs {
        let mut affected = EntityRefs::new();
        for field in self.fields_for(meta) {
            let source = match field.source {
                EntitySource::Params => Some(params),
                EntitySource::Output => output,
            };
            let Some(found) = source.and_then(|value| value.pointer(&field.pointer)) else {
                continue;
            };
            for id in ids_at(found) {
                let keep = match field.source {
                    EntitySource::Output => true,
                    EntitySource::Params => {
                        snapshot.contains_entity(field.kind, &id)
                            || produced.contains(field.kind, &id)
                    }
                };
                if keep {
                    affected.push(field.kind, id);
                } else {
                    tracing::debug!(
                        capability = %meta.name,
                        kind = %field.kind,
                        id = %id,
                        "dropping unknown entity id from affected set"
                    );
                }
            }
        }
        affected
    }
}

impl Default for AffectedEntityTable {
    fn default() -> Self {
        Self::empty()
            .with_prefix_rule(PrefixRule::conventional("schedule_", EntityKind::Block, "block"))
            .with_prefix_rule(PrefixRule::conventional("task_", EntityKind::Task, "task"))
            .with_prefix_rule(PrefixRule::conventional("email_", EntityKind::Email, "email"))
            .with_prefix_rule(PrefixRule::conventional(
                "calendar_",
                EntityKind::Meeting,
                "meeting",
            ))
    }
}

fn ids_at(value: &Value) -> Vec<String> {
    match value {
        Value::String(id) => vec![id.clone()],
        Value::Number(n) => vec![n.to_string()],
        Value::Array(items) => items.iter().flat_map(ids_at).collect(),
        _ => Vec::new(),
    }
}
