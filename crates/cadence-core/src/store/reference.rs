//! Reference resolution for pronouns ("it", "that one")
//!
//! Precedence: recent operations (newest first), then mentioned entities,
//! then the visible state when it holds exactly one candidate.

use serde::{Deserialize, Serialize};

use crate::types::{ContextSnapshot, EntityKind, EntityRefs, TrackedOperation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSource {
    RecentOperation,
    MentionedEntity,
    VisibleState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedReference {
    pub kind: EntityKind,
    pub id: String,
    pub source: ReferenceSource,
}

/// Stateless resolver over snapshot data.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceResolver;

impl ReferenceResolver {
    /// Resolve an antecedent of the expected kind, or of any kind when unknown.
    pub fn resolve(
        expected: Option<EntityKind>,
        snapshot: &ContextSnapshot,
    ) -> Option<ResolvedReference> {
        Self::from_operations(expected, &snapshot.memory.recent_operations)
            .or_else(|| Self::from_mentions(expected, &snapshot.memory.mentioned_entities))
            .or_else(|| Self::from_visible(expected, snapshot))
    }

    /// Walk operations newest-first and return the first matching entity.
    pub fn from_operations(
        expected: Option<EntityKind>,
        operations: &[TrackedOperation],
    ) -> Option<ResolvedReference> {
        operations.iter().find_map(|op| {
            candidate_kinds(expected).into_iter().find_map(|kind| {
                op.affected_entities.first(kind).map(|id| ResolvedReference {
                    kind,
                    id: id.to_string(),
                    source: ReferenceSource::RecentOperation,
                })
            })
        })
    }

    pub fn from_mentions(
        expected: Option<EntityKind>,
        mentioned: &EntityRefs,
    ) -> Option<ResolvedReference> {
        candidate_kinds(expected).into_iter().find_map(|kind| {
            mentioned.first(kind).map(|id| ResolvedReference {
                kind,
                id: id.to_string(),
                source: ReferenceSource::MentionedEntity,
            })
        })
    }

    /// Only an unambiguous single visible item counts. Unknown kind means blocks.
    pub fn from_visible(
        expected: Option<EntityKind>,
        snapshot: &ContextSnapshot,
    ) -> Option<ResolvedReference> {
        let kind = expected.unwrap_or(EntityKind::Block);
        match snapshot.visible_ids(kind).as_slice() {
            [only] => Some(ResolvedReference {
                kind,
                id: only.to_string(),
                source: ReferenceSource::VisibleState,
            }),
            _ => None,
        }
    }
}

fn candidate_kinds(expected: Option<EntityKind>) -> Vec<EntityKind> {
    match expected {
        Some(kind) => vec![kind],
        None => EntityKind::ALL.to_vec(),
    }
}
