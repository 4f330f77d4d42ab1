//! # Cadence Context
//!
//! Context assembly layer for Cadence.
//! Builds one read-only [`ContextSnapshot`] per request from independent
//! user data sources and the operation ledger, fetched concurrently.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use cadence_core::store::{OperationLedger, StoreError};
use cadence_core::types::{
    Clock, ContextSnapshot, ConversationMemory, ConversationTurn, EmailItem, EntityKind,
    EntityRefs, ScheduleBlock, SystemClock, TaskItem, TemporalFrame, TrackedOperation,
    UserPatterns, WorkspaceState,
};

/// Minimum title length considered when scanning conversation for mentions
const MIN_MENTION_TITLE_CHARS: usize = 3;

/// Data source errors
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Context assembly errors (only ever logged; assembly itself degrades)
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("source error: {0}")]
    Source(#[from] SourceError),
    #[error("{0} fetch timed out")]
    Timeout(&'static str),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Read access to the user's schedule, tasks, inbox and learned patterns
#[async_trait]
pub trait UserDataSource: Send + Sync {
    async fn schedule_for(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<ScheduleBlock>, SourceError>;

    async fn open_tasks(&self, user_id: &str) -> Result<Vec<TaskItem>, SourceError>;

    async fn recent_emails(&self, user_id: &str, limit: usize)
        -> Result<Vec<EmailItem>, SourceError>;

    async fn patterns(&self, user_id: &str) -> Result<UserPatterns, SourceError>;
}

/// Context request input
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextRequest {
    pub user_id: String,
    #[serde(default)]
    pub conversation: Vec<ConversationTurn>,
    /// Date the user is looking at; defaults to today in the user's timezone
    #[serde(default)]
    pub viewing_date: Option<NaiveDate>,
    /// Ids the caller already knows the user is talking about (e.g. a selection)
    #[serde(default)]
    pub mentioned: EntityRefs,
    #[serde(default)]
    pub active_proposals: Vec<Value>,
}

impl ContextRequest {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn with_conversation(mut self, conversation: Vec<ConversationTurn>) -> Self {
        self.conversation = conversation;
        self
    }

    pub fn with_viewing_date(mut self, viewing_date: Option<NaiveDate>) -> Self {
        self.viewing_date = viewing_date;
        self
    }

    pub fn with_mentioned(mut self, mentioned: EntityRefs) -> Self {
        self.mentioned = mentioned;
        self
    }

    pub fn with_active_proposals(mut self, proposals: Vec<Value>) -> Self {
        self.active_proposals = proposals;
        self
    }
}

/// Context assembler configuration
#[derive(Debug, Clone)]
pub struct ContextAssemblerConfig {
    /// IANA timezone of the user
    pub timezone: String,
    /// Per-source fetch timeout
    pub fetch_timeout: Duration,
    pub email_limit: usize,
    /// Ledger operations copied into the snapshot
    pub recent_operation_limit: usize,
    /// Conversation turns kept in the snapshot
    pub history_limit: usize,
}

impl Default for ContextAssemblerConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            fetch_timeout: Duration::from_millis(2_000),
            email_limit: 20,
            recent_operation_limit: 10,
            history_limit: 10,
        }
    }
}

/// Context assembler trait. Always yields a usable snapshot.
#[async_trait]
pub trait ContextAssembler: Send + Sync {
    async fn build_context(&self, request: &ContextRequest) -> ContextSnapshot;
}

/// Fan-out/join assembler over a [`UserDataSource`] and an [`OperationLedger`]
pub struct BasicContextAssembler {
    source: Arc<dyn UserDataSource>,
    ledger: Arc<dyn OperationLedger>,
    clock: Arc<dyn Clock>,
    config: ContextAssemblerConfig,
}

impl BasicContextAssembler {
    pub fn new(source: Arc<dyn UserDataSource>, ledger: Arc<dyn OperationLedger>) -> Self {
        Self::with_config(source, ledger, ContextAssemblerConfig::default())
    }

    pub fn with_config(
        source: Arc<dyn UserDataSource>,
        ledger: Arc<dyn OperationLedger>,
        config: ContextAssemblerConfig,
    ) -> Self {
        Self {
            source,
            ledger,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn fetch<T, E, F>(&self, user_id: &str, label: &'static str, future: F) -> Option<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<ContextError>,
    {
        let outcome = match tokio::time::timeout(self.config.fetch_timeout, future).await {
            Ok(Ok(value)) => return Some(value),
            Ok(Err(error)) => error.into(),
            Err(_) => ContextError::Timeout(label),
        };
        tracing::warn!(
            user_id = %user_id,
            source = label,
            error = %outcome,
            "context source failed, using default"
        );
        None
    }

    fn minimal(&self, request: &ContextRequest, temporal: TemporalFrame) -> ContextSnapshot {
        let mut snapshot = ContextSnapshot::minimal(
            &request.user_id,
            temporal.now,
            &temporal.timezone,
            Some(temporal.viewing_date),
        );
        snapshot.memory.recent_messages = self.recent_turns(&request.conversation);
        snapshot.memory.mentioned_entities = request.mentioned.clone();
        snapshot
    }

    fn recent_turns(&self, conversation: &[ConversationTurn]) -> Vec<ConversationTurn> {
        let skip = conversation.len().saturating_sub(self.config.history_limit);
        conversation[skip..].to_vec()
    }
}

#[async_trait]
impl ContextAssembler for BasicContextAssembler {
    async fn build_context(&self, request: &ContextRequest) -> ContextSnapshot {
        let temporal = TemporalFrame::new(
            self.clock.now(),
            &self.config.timezone,
            request.viewing_date,
        );

        if request.user_id.trim().is_empty() {
            let error = ContextError::InvalidRequest("user_id must not be empty".to_string());
            tracing::warn!(error = %error, "returning minimal context");
            return self.minimal(request, temporal);
        }

        let user_id = request.user_id.as_str();
        let date = temporal.viewing_date;
        let (schedule, tasks, emails, patterns, operations) = tokio::join!(
            self.fetch(user_id, "schedule", self.source.schedule_for(user_id, date)),
            self.fetch(user_id, "tasks", self.source.open_tasks(user_id)),
            self.fetch(
                user_id,
                "emails",
                self.source.recent_emails(user_id, self.config.email_limit)
            ),
            self.fetch(user_id, "patterns", self.source.patterns(user_id)),
            self.fetch(
                user_id,
                "ledger",
                self.ledger
                    .recent_for_user(user_id, self.config.recent_operation_limit)
            ),
        );

        if schedule.is_none()
            && tasks.is_none()
            && emails.is_none()
            && patterns.is_none()
            && operations.is_none()
        {
            tracing::warn!(user_id = %user_id, "all context sources failed, returning minimal context");
            return self.minimal(request, temporal);
        }

        let mut schedule = schedule.unwrap_or_default();
        schedule.sort_by_key(|block| block.start);
        let tasks: Vec<TaskItem> = tasks
            .unwrap_or_default()
            .into_iter()
            .filter(|task| !task.completed)
            .collect();
        let emails: Vec<EmailItem> = emails
            .unwrap_or_default()
            .into_iter()
            .filter(|email| !email.archived)
            .take(self.config.email_limit)
            .collect();
        let operations: Vec<TrackedOperation> = operations.unwrap_or_default();

        let recent_messages = self.recent_turns(&request.conversation);
        let mentioned_entities =
            mentioned_entities(&request.mentioned, &recent_messages, &schedule, &tasks);

        tracing::debug!(
            user_id = %user_id,
            viewing_date = %date,
            is_today = temporal.is_today,
            blocks = schedule.len(),
            tasks = tasks.len(),
            emails = emails.len(),
            operations = operations.len(),
            mentioned = mentioned_entities.len(),
            "context assembled"
        );

        ContextSnapshot {
            user_id: request.user_id.clone(),
            temporal,
            state: WorkspaceState {
                schedule,
                tasks,
                emails,
            },
            memory: ConversationMemory {
                recent_messages,
                recent_operations: operations,
                active_proposals: request.active_proposals.clone(),
                mentioned_entities,
            },
            patterns: patterns.unwrap_or_default(),
        }
    }
}

/// Request-supplied mentions first, then blocks/tasks whose title appears in
/// the recent conversation (newest turn first).
fn mentioned_entities(
    supplied: &EntityRefs,
    turns: &[ConversationTurn],
    schedule: &[ScheduleBlock],
    tasks: &[TaskItem],
) -> EntityRefs {
    let mut mentioned = supplied.clone();
    for turn in turns.iter().rev() {
        let content = turn.content.to_lowercase();
        for block in schedule {
            if title_mentioned(&content, &block.title) {
                mentioned.push(EntityKind::Block, block.id.clone());
                if block.is_meeting() {
                    mentioned.push(EntityKind::Meeting, block.id.clone());
                }
            }
        }
        for task in tasks {
            if title_mentioned(&content, &task.title) {
                mentioned.push(EntityKind::Task, task.id.clone());
            }
        }
    }
    mentioned
}

fn title_mentioned(content: &str, title: &str) -> bool {
    let title = title.trim().to_lowercase();
    title.chars().count() >= MIN_MENTION_TITLE_CHARS && content.contains(&title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::types::FixedClock;
    use cadence_stores::InMemoryOperationLedger;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[derive(Clone, Default)]
    struct FakeSource {
        fail_schedule: bool,
        fail_everything: bool,
        slow_tasks: bool,
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 4).unwrap()
    }

    fn block(id: &str, title: &str, hour: u32) -> ScheduleBlock {
        ScheduleBlock {
            id: id.to_string(),
            block_type: "meeting".to_string(),
            title: title.to_string(),
            start: day().and_hms_opt(hour, 0, 0).unwrap(),
            end: day().and_hms_opt(hour, 30, 0).unwrap(),
        }
    }

    #[async_trait]
    impl UserDataSource for FakeSource {
        async fn schedule_for(
            &self,
            _user_id: &str,
            _date: NaiveDate,
        ) -> Result<Vec<ScheduleBlock>, SourceError> {
            if self.fail_schedule || self.fail_everything {
                return Err(SourceError::Unavailable("calendar down".to_string()));
            }
            Ok(vec![block("B2", "Design Review", 14), block("B1", "Team Standup", 9)])
        }

        async fn open_tasks(&self, _user_id: &str) -> Result<Vec<TaskItem>, SourceError> {
            if self.fail_everything {
                return Err(SourceError::Internal("boom".to_string()));
            }
            if self.slow_tasks {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Ok(vec![TaskItem {
                id: "T1".to_string(),
                title: "Quarterly report".to_string(),
                priority: None,
                due_date: None,
                estimated_minutes: Some(60),
                completed: false,
            }])
        }

        async fn recent_emails(
            &self,
            _user_id: &str,
            _limit: usize,
        ) -> Result<Vec<EmailItem>, SourceError> {
            if self.fail_everything {
                return Err(SourceError::Internal("boom".to_string()));
            }
            Ok(Vec::new())
        }

        async fn patterns(&self, _user_id: &str) -> Result<UserPatterns, SourceError> {
            if self.fail_everything {
                return Err(SourceError::Internal("boom".to_string()));
            }
            Ok(UserPatterns::default())
        }
    }

    /// Ledger whose reads always fail
    struct BrokenLedger;

    #[async_trait]
    impl OperationLedger for BrokenLedger {
        async fn record(&self, _operation: TrackedOperation) -> Result<(), StoreError> {
            Err(StoreError::Internal("offline".to_string()))
        }

        async fn recent(&self, _limit: usize) -> Result<Vec<TrackedOperation>, StoreError> {
            Err(StoreError::Internal("offline".to_string()))
        }

        async fn len(&self) -> Result<usize, StoreError> {
            Err(StoreError::Internal("offline".to_string()))
        }
    }

    fn assembler(source: FakeSource, ledger: Arc<dyn OperationLedger>) -> BasicContextAssembler {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 7, 10, 15, 0, 0).unwrap()));
        let config = ContextAssemblerConfig {
            fetch_timeout: Duration::from_millis(50),
            ..ContextAssemblerConfig::default()
        };
        BasicContextAssembler::with_config(Arc::new(source), ledger, config).with_clock(clock)
    }

    #[test]
    fn test_build_context_orders_schedule_and_anchors_viewing_date() {
        tokio_test::block_on(async {
            let assembler = assembler(FakeSource::default(), Arc::new(InMemoryOperationLedger::new()));
            let request = ContextRequest::new("u1").with_viewing_date(Some(day()));

            let snapshot = assembler.build_context(&request).await;

            assert_eq!(snapshot.temporal.viewing_date, day());
            assert!(!snapshot.temporal.is_today);
            let ids: Vec<&str> = snapshot.state.schedule.iter().map(|b| b.id.as_str()).collect();
            assert_eq!(ids, vec!["B1", "B2"]);
            assert_eq!(snapshot.state.tasks.len(), 1);
        });
    }

    #[test]
    fn test_one_failed_source_does_not_block_the_others() {
        tokio_test::block_on(async {
            let source = FakeSource {
                fail_schedule: true,
                ..FakeSource::default()
            };
            let assembler = assembler(source, Arc::new(InMemoryOperationLedger::new()));
            let snapshot = assembler.build_context(&ContextRequest::new("u1")).await;

            assert!(snapshot.state.schedule.is_empty());
            assert_eq!(snapshot.state.tasks[0].id, "T1");
        });
    }

    #[test]
    fn test_total_failure_returns_minimal_context() {
        tokio_test::block_on(async {
            let source = FakeSource {
                fail_everything: true,
                ..FakeSource::default()
            };
            let assembler = assembler(source, Arc::new(BrokenLedger));
            let request = ContextRequest::new("u1")
                .with_conversation(vec![ConversationTurn::user("hello")]);

            let snapshot = assembler.build_context(&request).await;

            assert!(snapshot.state.schedule.is_empty());
            assert!(snapshot.state.tasks.is_empty());
            assert_eq!(snapshot.patterns, UserPatterns::default());
            assert_eq!(snapshot.temporal.now, Utc.with_ymd_and_hms(2024, 7, 10, 15, 0, 0).unwrap());
            assert_eq!(snapshot.memory.recent_messages.len(), 1);
        });
    }

    #[tokio::test]
    async fn test_slow_source_times_out_and_degrades() {
        let source = FakeSource {
            slow_tasks: true,
            ..FakeSource::default()
        };
        let assembler = assembler(source, Arc::new(InMemoryOperationLedger::new()));
        let snapshot = assembler.build_context(&ContextRequest::new("u1")).await;

        assert!(snapshot.state.tasks.is_empty());
        assert_eq!(snapshot.state.schedule.len(), 2);
    }

    #[test]
    fn test_recent_operations_and_mentions_are_collected() {
        tokio_test::block_on(async {
            let ledger = Arc::new(InMemoryOperationLedger::new());
            let at = Utc.with_ymd_and_hms(2024, 7, 10, 14, 0, 0).unwrap();
            ledger
                .record(
                    TrackedOperation::new("u1", "schedule_create_block", json!({}), at)
                        .with_affected(EntityRefs::new().with(EntityKind::Block, "B1")),
                )
                .await
                .unwrap();
            ledger
                .record(TrackedOperation::new("u2", "task_create", json!({}), at))
                .await
                .unwrap();

            let assembler = assembler(FakeSource::default(), ledger);
            let request = ContextRequest::new("u1")
                .with_viewing_date(Some(day()))
                .with_conversation(vec![
                    ConversationTurn::user("How long is the design review?"),
                    ConversationTurn::assistant("Thirty minutes."),
                ])
                .with_mentioned(EntityRefs::new().with(EntityKind::Task, "T1"));

            let snapshot = assembler.build_context(&request).await;

            assert_eq!(snapshot.memory.recent_operations.len(), 1);
            assert_eq!(snapshot.memory.recent_operations[0].user_id, "u1");
            let mentioned = &snapshot.memory.mentioned_entities;
            assert_eq!(mentioned.first(EntityKind::Task), Some("T1"));
            assert_eq!(mentioned.first(EntityKind::Block), Some("B2"));
            assert_eq!(mentioned.first(EntityKind::Meeting), Some("B2"));
        });
    }
}
