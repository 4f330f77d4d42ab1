//! Day-level workflow and the conversational catch-all

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::json;

use cadence_core::capability::CapabilityMeta;
use cadence_core::types::{ScheduleBlock, TaskItem, WorkHours};
use cadence_core::{Capability, CapabilityContext, CapabilityInput, CapabilityResult};

use crate::calendar::{CalendarError, InMemoryCalendar};
use crate::support::{calendar_failure, date_param};
use crate::tasks::priority_rank;

/// Gaps shorter than this are not offered as free time.
const MIN_SLOT_MINUTES: i64 = 15;
const MAX_SUGGESTED_TASKS: usize = 5;
const DEFAULT_TASK_MINUTES: u32 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeSlot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub minutes: i64,
}

/// Summarises one day: blocks, free time inside work hours, tasks that fit
/// and emails awaiting a reply. Read-only.
pub struct DailyPlanning {
    calendar: Arc<InMemoryCalendar>,
}

impl DailyPlanning {
    pub fn new(calendar: Arc<InMemoryCalendar>) -> Self {
        Self { calendar }
    }

    fn plan(&self, user_id: &str, date: NaiveDate) -> Result<serde_json::Value, CalendarError> {
        let blocks = self.calendar.blocks_on(user_id, date)?;
        let patterns = self.calendar.user_patterns(user_id)?;
        let tasks = self.calendar.tasks(user_id, false)?;
        let emails = self.calendar.inbox(user_id, usize::MAX)?;

        let slots = free_slots(&blocks, date, &patterns.work_hours);
        let free_minutes: i64 = slots.iter().map(|slot| slot.minutes).sum();
        let suggested = suggest_tasks(tasks, free_minutes);
        let awaiting_reply = emails.iter().filter(|email| email.needs_response).count();

        Ok(json!({
            "date": date.to_string(),
            "blocks": blocks,
            "freeSlots": slots,
            "freeMinutes": free_minutes,
            "suggestedTasks": suggested,
            "emailsNeedingResponse": awaiting_reply,
        }))
    }
}

#[async_trait]
impl Capability for DailyPlanning {
    fn name(&self) -> &str {
        "daily_planning"
    }

    fn description(&self) -> &str {
        "Plan a day: existing blocks, free slots in work hours, tasks to fit in, emails needing a reply"
    }

    fn metadata(&self) -> CapabilityMeta {
        CapabilityMeta::new(self.name(), self.description())
            .with_category("workflow")
            .with_parameter_schema(json!({
                "type": "object",
                "properties": {
                    "date": {"type": "string", "description": "YYYY-MM-DD"}
                },
                "additionalProperties": false
            }))
    }

    async fn execute(&self, input: CapabilityInput, ctx: CapabilityContext) -> CapabilityResult {
        let date = match date_param(&input, "date", &ctx) {
            Ok(date) => date,
            Err(result) => return result,
        };
        match self.plan(&ctx.user_id, date) {
            Ok(output) => {
                tracing::debug!(
                    user_id = %ctx.user_id,
                    date = %date,
                    free_minutes = output["freeMinutes"].as_i64().unwrap_or(0),
                    "daily plan built"
                );
                CapabilityResult::success(output)
            }
            Err(error) => calendar_failure(error),
        }
    }
}

/// Gaps between `blocks` inside work hours on `date`.
pub fn free_slots(blocks: &[ScheduleBlock], date: NaiveDate, hours: &WorkHours) -> Vec<FreeSlot> {
    let day_start = date.and_time(hours.start);
    let day_end = date.and_time(hours.end);
    let mut busy: Vec<(NaiveDateTime, NaiveDateTime)> = blocks
        .iter()
        .filter(|block| block.end > day_start && block.start < day_end)
        .map(|block| (block.start.max(day_start), block.end.min(day_end)))
        .collect();
    busy.sort();

    let mut slots = Vec::new();
    let mut cursor = day_start;
    for (start, end) in busy {
        push_slot(&mut slots, cursor, start);
        cursor = cursor.max(end);
    }
    push_slot(&mut slots, cursor, day_end);
    slots
}

fn push_slot(slots: &mut Vec<FreeSlot>, start: NaiveDateTime, end: NaiveDateTime) {
    let minutes = (end - start).num_minutes();
    if minutes >= MIN_SLOT_MINUTES {
        slots.push(FreeSlot { start, end, minutes });
    }
}

/// Highest priority first, earliest due date breaking ties, while the
/// estimates still fit in `free_minutes`.
fn suggest_tasks(mut tasks: Vec<TaskItem>, free_minutes: i64) -> Vec<TaskItem> {
    tasks.sort_by_key(|task| (priority_rank(task), task.due_date));
    let mut remaining = free_minutes;
    let mut picked = Vec::new();
    for task in tasks {
        if picked.len() == MAX_SUGGESTED_TASKS {
            break;
        }
        let needed = i64::from(task.estimated_minutes.unwrap_or(DEFAULT_TASK_MINUTES));
        if needed <= remaining {
            remaining -= needed;
            picked.push(task);
        }
    }
    picked
}

/// Low-confidence catch-all when nothing actionable was understood.
pub struct ConversationReply;

#[async_trait]
impl Capability for ConversationReply {
    fn name(&self) -> &str {
        "conversation_reply"
    }

    fn description(&self) -> &str {
        "Reply conversationally when the message asks for no calendar, task or email action"
    }

    fn metadata(&self) -> CapabilityMeta {
        CapabilityMeta::new(self.name(), self.description()).with_parameter_schema(json!({
            "type": "object",
            "properties": {
                "message": {"type": "string"}
            },
            "additionalProperties": false
        }))
    }

    async fn execute(&self, input: CapabilityInput, _ctx: CapabilityContext) -> CapabilityResult {
        let reply = match input.str_param("message") {
            Some(message) => format!(
                "I'm not sure what to do with \"{message}\". I can view, create, move or delete blocks, manage tasks, archive email, or plan your day."
            ),
            None => "How can I help with your schedule?".to_string(),
        };
        CapabilityResult::success(json!({ "reply": reply }))
    }
}
