//! Entity kinds and typed identifier sets

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of user-visible entity an operation can touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Block,
    Task,
    Email,
    Meeting,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [Self::Block, Self::Task, Self::Email, Self::Meeting];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Task => "task",
            Self::Email => "email",
            Self::Meeting => "meeting",
        }
    }

    /// Parse a kind name, accepting plural forms ("blocks").
    pub fn parse(value: &str) -> Option<Self> {
        let lowered = value.trim().to_ascii_lowercase();
        let singular = lowered.strip_suffix('s').unwrap_or(&lowered);
        match singular {
            "block" => Some(Self::Block),
            "task" => Some(Self::Task),
            "email" => Some(Self::Email),
            "meeting" => Some(Self::Meeting),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifiers grouped by entity kind, in insertion order per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityRefs(BTreeMap<EntityKind, Vec<String>>);

impl EntityRefs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, kind: EntityKind, id: impl Into<String>) -> Self {
        self.push(kind, id);
        self
    }

    /// Append an id unless it is already listed for that kind.
    pub fn push(&mut self, kind: EntityKind, id: impl Into<String>) {
        let id = id.into();
        if id.trim().is_empty() {
            return;
        }
        let ids = self.0.entry(kind).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    /// Merge another set into this one, keeping first-seen order.
    pub fn extend(&mut self, other: &EntityRefs) {
        for (kind, ids) in &other.0 {
            for id in ids {
                self.push(*kind, id.clone());
            }
        }
    }

    /// Append every id of another set, duplicates included.
    pub fn concat(&mut self, other: &EntityRefs) {
        for (kind, ids) in &other.0 {
            self.0.entry(*kind).or_default().extend(ids.iter().cloned());
        }
    }

    pub fn ids(&self, kind: EntityKind) -> &[String] {
        self.0.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn first(&self, kind: EntityKind) -> Option<&str> {
        self.ids(kind).first().map(String::as_str)
    }

    /// Most recently appended id of a kind.
    pub fn last(&self, kind: EntityKind) -> Option<&str> {
        self.ids(kind).last().map(String::as_str)
    }

    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.ids(kind).iter().any(|existing| existing == id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityKind, &str)> {
        self.0
            .iter()
            .flat_map(|(kind, ids)| ids.iter().map(move |id| (*kind, id.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_refs_dedupes_and_keeps_order() {
        let mut refs = EntityRefs::new()
            .with(EntityKind::Block, "B2")
            .with(EntityKind::Block, "B1");
        refs.push(EntityKind::Block, "B2");
        refs.push(EntityKind::Task, "T1");

        assert_eq!(refs.ids(EntityKind::Block), &["B2".to_string(), "B1".to_string()]);
        assert_eq!(refs.last(EntityKind::Block), Some("B1"));
        assert_eq!(refs.len(), 3);
        assert!(refs.contains(EntityKind::Task, "T1"));
        assert!(refs.ids(EntityKind::Email).is_empty());
    }

    #[test]
    fn test_entity_refs_concat_keeps_duplicates() {
        let mut aggregate = EntityRefs::new().with(EntityKind::Block, "B1");
        aggregate.concat(&EntityRefs::new().with(EntityKind::Block, "B1"));
        assert_eq!(aggregate.ids(EntityKind::Block).len(), 2);
    }

    #[test]
    fn test_entity_refs_serializes_as_kind_map() {
        let refs = EntityRefs::new().with(EntityKind::Meeting, "M1");
        let value = serde_json::to_value(&refs).unwrap();
        assert_eq!(value, serde_json::json!({"meeting": ["M1"]}));

        let parsed: EntityRefs = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, refs);
    }

    #[test]
    fn test_entity_kind_parse_accepts_plural() {
        assert_eq!(EntityKind::parse("Blocks"), Some(EntityKind::Block));
        assert_eq!(EntityKind::parse("email"), Some(EntityKind::Email));
        assert_eq!(EntityKind::parse("calendar"), None);
    }
}
