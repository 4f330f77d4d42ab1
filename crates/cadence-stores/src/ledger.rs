//! OperationLedger implementations

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::RwLock;

use cadence_core::store::{OperationLedger, StoreError};
use cadence_core::types::{EntityKind, TrackedOperation};

pub const DEFAULT_MAX_OPERATIONS: usize = 50;

/// In-memory ledger, front of the deque is the newest operation
pub struct InMemoryOperationLedger {
    operations: RwLock<VecDeque<TrackedOperation>>,
    max_operations: usize,
}

impl InMemoryOperationLedger {
    pub fn new() -> Self {
        Self::with_max_operations(DEFAULT_MAX_OPERATIONS)
    }

    /// Create a ledger with a hard capacity limit.
    pub fn with_max_operations(max_operations: usize) -> Self {
        let max_operations = max_operations.max(1);
        Self {
            operations: RwLock::new(VecDeque::with_capacity(max_operations)),
            max_operations,
        }
    }

    pub fn max_operations(&self) -> usize {
        self.max_operations
    }
}

impl Default for InMemoryOperationLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OperationLedger for InMemoryOperationLedger {
    async fn record(&self, operation: TrackedOperation) -> Result<(), StoreError> {
        let mut operations = self
            .operations
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        operations.push_front(operation);
        if operations.len() > self.max_operations {
            let evicted = operations.len() - self.max_operations;
            operations.truncate(self.max_operations);
            tracing::debug!(evicted, retained = self.max_operations, "ledger evicted oldest operations");
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<TrackedOperation>, StoreError> {
        let operations = self
            .operations
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(operations.iter().take(limit).cloned().collect())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        let operations = self
            .operations
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(operations.len())
    }

    async fn recent_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<TrackedOperation>, StoreError> {
        let operations = self
            .operations
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(operations
            .iter()
            .filter(|op| op.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_by_entity(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> Result<Option<TrackedOperation>, StoreError> {
        let operations = self
            .operations
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(operations
            .iter()
            .find(|op| op.affected_entities.contains(kind, id))
            .cloned())
    }

    async fn most_recent_entity_of_type(
        &self,
        kind: EntityKind,
    ) -> Result<Option<String>, StoreError> {
        let operations = self
            .operations
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(operations
            .iter()
            .find_map(|op| op.affected_entities.first(kind).map(str::to_string)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::types::EntityRefs;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    fn operation(n: usize, refs: EntityRefs) -> TrackedOperation {
        let at = Utc.with_ymd_and_hms(2024, 7, 10, 9, 0, 0).unwrap() + Duration::seconds(n as i64);
        TrackedOperation::new("u1", "schedule_create_block", json!({"n": n}), at)
            .with_id(format!("op-{}", n))
            .with_affected(refs)
    }

    #[test]
    fn test_ledger_keeps_fifty_most_recent_newest_first() {
        tokio_test::block_on(async {
            let ledger = InMemoryOperationLedger::new();
            for n in 1..=51 {
                ledger.record(operation(n, EntityRefs::new())).await.unwrap();
            }

            assert_eq!(ledger.len().await.unwrap(), 50);
            let recent = ledger.recent(usize::MAX).await.unwrap();
            assert_eq!(recent.first().unwrap().id, "op-51");
            assert_eq!(recent.last().unwrap().id, "op-2");
            assert!(recent.iter().all(|op| op.id != "op-1"));
        });
    }

    #[test]
    fn test_find_by_entity_returns_newest_match() {
        tokio_test::block_on(async {
            let ledger = InMemoryOperationLedger::new();
            ledger
                .record(operation(1, EntityRefs::new().with(EntityKind::Block, "B1")))
                .await
                .unwrap();
            ledger
                .record(operation(2, EntityRefs::new().with(EntityKind::Task, "T1")))
                .await
                .unwrap();
            ledger
                .record(operation(3, EntityRefs::new().with(EntityKind::Block, "B1")))
                .await
                .unwrap();

            let found = ledger.find_by_entity(EntityKind::Block, "B1").await.unwrap();
            assert_eq!(found.unwrap().id, "op-3");
            assert!(ledger
                .find_by_entity(EntityKind::Email, "B1")
                .await
                .unwrap()
                .is_none());
        });
    }

    #[test]
    fn test_most_recent_entity_of_type_returns_first_id_of_newest_operation() {
        tokio_test::block_on(async {
            let ledger = InMemoryOperationLedger::new();
            ledger
                .record(operation(1, EntityRefs::new().with(EntityKind::Block, "B0")))
                .await
                .unwrap();
            let refs = EntityRefs::new()
                .with(EntityKind::Block, "B7")
                .with(EntityKind::Block, "B8");
            ledger.record(operation(2, refs)).await.unwrap();
            ledger
                .record(operation(3, EntityRefs::new().with(EntityKind::Task, "T1")))
                .await
                .unwrap();

            assert_eq!(
                ledger.most_recent_entity_of_type(EntityKind::Block).await.unwrap(),
                Some("B7".to_string())
            );
            assert_eq!(
                ledger.most_recent_entity_of_type(EntityKind::Email).await.unwrap(),
                None
            );
        });
    }

    #[test]
    fn test_recent_for_user_filters_other_users() {
        tokio_test::block_on(async {
            let ledger = InMemoryOperationLedger::with_max_operations(10);
            ledger.record(operation(1, EntityRefs::new())).await.unwrap();
            let mut other = operation(2, EntityRefs::new());
            other.user_id = "u2".to_string();
            ledger.record(other).await.unwrap();

            let mine = ledger.recent_for_user("u1", 5).await.unwrap();
            assert_eq!(mine.len(), 1);
            assert_eq!(mine[0].id, "op-1");
        });
    }
}
