//! # Cadence Capabilities
//!
//! Built-in capabilities and the in-memory calendar they act on.
//!
//! This crate provides:
//! - `InMemoryCalendar`, seeded from a JSON fixture and readable as a `UserDataSource`
//! - schedule, task and email capabilities
//! - the `daily_planning` workflow and the `conversation_reply` catch-all

mod calendar;
mod email;
mod planning;
mod schedule;
mod support;
mod tasks;

use std::sync::Arc;

use cadence_core::{Capability, CapabilityRegistry};

pub use calendar::{CalendarError, CalendarFixture, InMemoryCalendar, UserFixture};
pub use email::{EmailArchive, EmailList};
pub use planning::{free_slots, ConversationReply, DailyPlanning, FreeSlot};
pub use schedule::{ScheduleCreateBlock, ScheduleDeleteBlock, ScheduleMoveBlock, ScheduleView};
pub use support::{BLOCK_NOT_FOUND, EMAIL_NOT_FOUND, SCHEDULE_CONFLICT, TASK_NOT_FOUND};
pub use tasks::{TaskComplete, TaskCreate, TaskList};

/// Every built-in capability bound to `calendar`.
pub fn builtin_capabilities(calendar: Arc<InMemoryCalendar>) -> Vec<Arc<dyn Capability>> {
    vec![
        Arc::new(ScheduleView::new(calendar.clone())),
        Arc::new(ScheduleCreateBlock::new(calendar.clone())),
        Arc::new(ScheduleMoveBlock::new(calendar.clone())),
        Arc::new(ScheduleDeleteBlock::new(calendar.clone())),
        Arc::new(TaskList::new(calendar.clone())),
        Arc::new(TaskCreate::new(calendar.clone())),
        Arc::new(TaskComplete::new(calendar.clone())),
        Arc::new(EmailList::new(calendar.clone())),
        Arc::new(EmailArchive::new(calendar.clone())),
        Arc::new(DailyPlanning::new(calendar)),
        Arc::new(ConversationReply),
    ]
}

pub fn register_builtin_capabilities(
    registry: &mut CapabilityRegistry,
    calendar: Arc<InMemoryCalendar>,
) {
    for capability in builtin_capabilities(calendar) {
        if let Some(previous) = registry.register(capability) {
            tracing::warn!(
                capability = %previous.name(),
                "built-in capability replaced an existing registration"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::store::OperationLedger;
    use cadence_core::types::{EntityKind, Execution, IntentSummary, Understanding};
    use cadence_core::{ContextSnapshot, Dispatcher};
    use cadence_stores::InMemoryOperationLedger;
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::json;

    const DEMO_FIXTURE: &str = include_str!("../fixtures/demo.json");

    #[test]
    fn test_registers_all_builtins() {
        let mut registry = CapabilityRegistry::new();
        register_builtin_capabilities(&mut registry, Arc::new(InMemoryCalendar::new()));
        assert_eq!(registry.len(), 11);
        for name in [
            "schedule_view",
            "schedule_create_block",
            "schedule_move_block",
            "schedule_delete_block",
            "task_list",
            "task_create",
            "task_complete",
            "email_list",
            "email_archive",
            "daily_planning",
            "conversation_reply",
        ] {
            assert!(registry.contains(name), "missing {name}");
        }
    }

    #[test]
    fn test_schemas_cover_every_builtin() {
        for capability in builtin_capabilities(Arc::new(InMemoryCalendar::new())) {
            let meta = capability.metadata();
            assert_eq!(meta.name, capability.name());
            assert_eq!(meta.parameter_schema["type"], "object", "{}", meta.name);
        }
    }

    #[test]
    fn test_demo_fixture_dispatch_records_block() {
        let calendar = Arc::new(InMemoryCalendar::from_json(DEMO_FIXTURE).unwrap());
        let mut registry = CapabilityRegistry::new();
        register_builtin_capabilities(&mut registry, calendar.clone());
        let ledger = Arc::new(InMemoryOperationLedger::new());
        let dispatcher = Dispatcher::new(registry, ledger.clone());

        let now = Utc.with_ymd_and_hms(2024, 7, 10, 8, 0, 0).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 7, 10).unwrap();
        let mut snapshot = ContextSnapshot::minimal("demo", now, "UTC", None);
        snapshot.state.schedule = calendar.blocks_on("demo", date).unwrap();

        let plan = Understanding::new(
            IntentSummary::new("move_block", 0.9, "move standup"),
            Execution::single(
                "schedule_move_block",
                json!({"blockId": "blk_standup", "newStartTime": "15:00"}),
            ),
        );
        let result = tokio_test::block_on(dispatcher.execute(&plan, &snapshot));
        assert!(result.success, "{:?}", result.error);

        let recent = tokio_test::block_on(ledger.recent(1)).unwrap();
        assert_eq!(
            recent[0].affected_entities.first(EntityKind::Block),
            Some("blk_standup")
        );
    }
}
