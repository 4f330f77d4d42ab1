//! OperationLedger - tracked operation log trait

use async_trait::async_trait;

use super::StoreError;
use crate::types::{EntityKind, TrackedOperation};

/// Bounded log of executed operations, ordered most-recent-first.
#[async_trait]
pub trait OperationLedger: Send + Sync {
    /// Prepend an operation, evicting the oldest beyond capacity
    async fn record(&self, operation: TrackedOperation) -> Result<(), StoreError>;

    /// Up to `limit` operations, newest first
    async fn recent(&self, limit: usize) -> Result<Vec<TrackedOperation>, StoreError>;

    /// Number of retained operations
    async fn len(&self) -> Result<usize, StoreError>;

    async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }

    /// Most recent operations of one user, newest first.
    async fn recent_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<TrackedOperation>, StoreError> {
        let operations = self.recent(usize::MAX).await?;
        Ok(operations
            .into_iter()
            .filter(|op| op.user_id == user_id)
            .take(limit)
            .collect())
    }

    /// Newest operation whose affected entities of `kind` include `id`.
    async fn find_by_entity(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> Result<Option<TrackedOperation>, StoreError> {
        let operations = self.recent(usize::MAX).await?;
        Ok(operations
            .into_iter()
            .find(|op| op.affected_entities.contains(kind, id)))
    }

    /// First affected id of `kind` in the newest operation that touched that kind.
    async fn most_recent_entity_of_type(
        &self,
        kind: EntityKind,
    ) -> Result<Option<String>, StoreError> {
        let operations = self.recent(usize::MAX).await?;
        Ok(operations
            .iter()
            .find_map(|op| op.affected_entities.first(kind).map(str::to_string)))
    }
}
