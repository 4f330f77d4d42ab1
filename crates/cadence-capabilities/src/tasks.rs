//! Task capabilities: list, create, complete

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;

use cadence_core::capability::CapabilityMeta;
use cadence_core::types::TaskItem;
use cadence_core::{Capability, CapabilityContext, CapabilityInput, CapabilityResult};

use crate::calendar::InMemoryCalendar;
use crate::support::{calendar_failure, date_param, invalid, required_str};

const PRIORITIES: [&str; 3] = ["high", "medium", "low"];

pub struct TaskList {
    calendar: Arc<InMemoryCalendar>,
}

impl TaskList {
    pub fn new(calendar: Arc<InMemoryCalendar>) -> Self {
        Self { calendar }
    }
}

#[async_trait]
impl Capability for TaskList {
    fn name(&self) -> &str {
        "task_list"
    }

    fn description(&self) -> &str {
        "List open tasks, flagging those due on or before the given date"
    }

    fn metadata(&self) -> CapabilityMeta {
        CapabilityMeta::new(self.name(), self.description()).with_parameter_schema(json!({
            "type": "object",
            "properties": {
                "date": {"type": "string", "description": "YYYY-MM-DD"},
                "includeCompleted": {"type": "boolean"}
            },
            "additionalProperties": false
        }))
    }

    async fn execute(&self, input: CapabilityInput, ctx: CapabilityContext) -> CapabilityResult {
        let date = match date_param(&input, "date", &ctx) {
            Ok(date) => date,
            Err(result) => return result,
        };
        let include_completed = input
            .get_param("/includeCompleted")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        match self.calendar.tasks(&ctx.user_id, include_completed) {
            Ok(mut tasks) => {
                tasks.sort_by_key(|task| (priority_rank(task), task.due_date));
                let due: Vec<&str> = tasks
                    .iter()
                    .filter(|task| !task.completed && task.due_date.is_some_and(|d| d <= date))
                    .map(|task| task.id.as_str())
                    .collect();
                CapabilityResult::success(json!({
                    "date": date.to_string(),
                    "count": tasks.len(),
                    "dueIds": due,
                    "tasks": tasks,
                }))
            }
            Err(error) => calendar_failure(error),
        }
    }
}

/// high < medium < low < unset
pub(crate) fn priority_rank(task: &TaskItem) -> usize {
    task.priority
        .as_deref()
        .and_then(|p| PRIORITIES.iter().position(|known| known.eq_ignore_ascii_case(p)))
        .unwrap_or(PRIORITIES.len())
}

pub struct TaskCreate {
    calendar: Arc<InMemoryCalendar>,
}

impl TaskCreate {
    pub fn new(calendar: Arc<InMemoryCalendar>) -> Self {
        Self { calendar }
    }
}

#[async_trait]
impl Capability for TaskCreate {
    fn name(&self) -> &str {
        "task_create"
    }

    fn description(&self) -> &str {
        "Add a task to the user's list"
    }

    fn metadata(&self) -> CapabilityMeta {
        CapabilityMeta::new(self.name(), self.description()).with_parameter_schema(json!({
            "type": "object",
            "required": ["title"],
            "properties": {
                "title": {"type": "string", "minLength": 1},
                "priority": {"type": "string", "enum": PRIORITIES},
                "dueDate": {"type": "string", "description": "YYYY-MM-DD"},
                "estimatedMinutes": {"type": "integer", "minimum": 1}
            },
            "additionalProperties": false
        }))
    }

    async fn execute(&self, input: CapabilityInput, ctx: CapabilityContext) -> CapabilityResult {
        let title = match required_str(&input, "title") {
            Ok(title) => title.to_string(),
            Err(result) => return result,
        };
        let due_date = match input.str_param("dueDate") {
            None => None,
            Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => return invalid(format!("dueDate must be YYYY-MM-DD, got '{raw}'")),
            },
        };
        let task = TaskItem {
            id: CapabilityContext::new_entity_id("task"),
            title,
            priority: input.str_param("priority").map(str::to_string),
            due_date,
            estimated_minutes: input.u64_param("estimatedMinutes").map(|m| m as u32),
            completed: false,
        };

        match self.calendar.insert_task(&ctx.user_id, task.clone()) {
            Ok(()) => CapabilityResult::success(json!({ "task": task })),
            Err(error) => calendar_failure(error),
        }
    }
}

pub struct TaskComplete {
    calendar: Arc<InMemoryCalendar>,
}

impl TaskComplete {
    pub fn new(calendar: Arc<InMemoryCalendar>) -> Self {
        Self { calendar }
    }
}

#[async_trait]
impl Capability for TaskComplete {
    fn name(&self) -> &str {
        "task_complete"
    }

    fn description(&self) -> &str {
        "Mark a task as done"
    }

    fn metadata(&self) -> CapabilityMeta {
        CapabilityMeta::new(self.name(), self.description()).with_parameter_schema(json!({
            "type": "object",
            "required": ["taskId"],
            "properties": {
                "taskId": {"type": "string", "minLength": 1}
            },
            "additionalProperties": false
        }))
    }

    async fn execute(&self, input: CapabilityInput, ctx: CapabilityContext) -> CapabilityResult {
        let Some(task_id) = input.str_param("taskId") else {
            return invalid("taskId is required");
        };
        match self.calendar.complete_task(&ctx.user_id, task_id) {
            Ok(task) => CapabilityResult::success(json!({ "task": task })),
            Err(error) => calendar_failure(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::TASK_NOT_FOUND;
    use cadence_core::types::TemporalFrame;
    use chrono::{TimeZone, Utc};

    fn ctx() -> CapabilityContext {
        let now = Utc.with_ymd_and_hms(2024, 7, 10, 8, 0, 0).unwrap();
        CapabilityContext::new("u1", "op-1", TemporalFrame::new(now, "UTC", None))
    }

    fn run<C: Capability>(capability: &C, params: serde_json::Value) -> CapabilityResult {
        tokio_test::block_on(capability.execute(CapabilityInput::with_params(params), ctx()))
    }

    #[test]
    fn test_create_list_complete() {
        let calendar = Arc::new(InMemoryCalendar::new());
        run(
            &TaskCreate::new(calendar.clone()),
            json!({"title": "Later", "priority": "low"}),
        );
        let created = run(
            &TaskCreate::new(calendar.clone()),
            json!({"title": "Urgent", "priority": "high", "dueDate": "2024-07-09"}),
        );
        let CapabilityResult::Success { output } = created else {
            panic!("expected success");
        };
        let urgent_id = output["task"]["id"].as_str().unwrap().to_string();

        let listed = run(&TaskList::new(calendar.clone()), json!({}));
        let CapabilityResult::Success { output } = listed else {
            panic!("expected success");
        };
        assert_eq!(output["tasks"][0]["title"], "Urgent");
        assert_eq!(output["dueIds"], json!([urgent_id.clone()]));

        let done = run(
            &TaskComplete::new(calendar.clone()),
            json!({"taskId": urgent_id}),
        );
        assert!(done.is_success());
        assert_eq!(calendar.tasks("u1", false).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_task_is_not_recoverable() {
        let result = run(
            &TaskComplete::new(Arc::new(InMemoryCalendar::new())),
            json!({"taskId": "T404"}),
        );
        assert!(matches!(result, CapabilityResult::Error { ref code, .. } if code == TASK_NOT_FOUND));
    }
}
