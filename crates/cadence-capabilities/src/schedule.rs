//! Schedule capabilities: view, create, move, delete

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use serde_json::json;

use cadence_core::capability::CapabilityMeta;
use cadence_core::types::ScheduleBlock;
use cadence_core::{Capability, CapabilityContext, CapabilityInput, CapabilityResult};

use crate::calendar::InMemoryCalendar;
use crate::support::{
    calendar_failure, date_param, invalid, required_str, time_param, SCHEDULE_CONFLICT,
};

const DEFAULT_BLOCK_MINUTES: i64 = 60;
const BLOCK_TYPES: [&str; 5] = ["work", "meeting", "focus", "break", "personal"];

pub struct ScheduleView {
    calendar: Arc<InMemoryCalendar>,
}

impl ScheduleView {
    pub fn new(calendar: Arc<InMemoryCalendar>) -> Self {
        Self { calendar }
    }
}

#[async_trait]
impl Capability for ScheduleView {
    fn name(&self) -> &str {
        "schedule_view"
    }

    fn description(&self) -> &str {
        "Show the schedule blocks of one day (defaults to the viewing date)"
    }

    fn metadata(&self) -> CapabilityMeta {
        CapabilityMeta::new(self.name(), self.description()).with_parameter_schema(json!({
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
        match self.calendar.blocks_on(&ctx.user_id, date) {
            Ok(blocks) => CapabilityResult::success(json!({
                "date": date.to_string(),
                "count": blocks.len(),
                "blocks": blocks,
            })),
            Err(error) => calendar_failure(error),
        }
    }
}

pub struct ScheduleCreateBlock {
    calendar: Arc<InMemoryCalendar>,
}

impl ScheduleCreateBlock {
    pub fn new(calendar: Arc<InMemoryCalendar>) -> Self {
        Self { calendar }
    }
}

#[async_trait]
impl Capability for ScheduleCreateBlock {
    fn name(&self) -> &str {
        "schedule_create_block"
    }

    fn description(&self) -> &str {
        "Create a time block. Overlapping an existing block fails unless allowOverlap is true"
    }

    fn metadata(&self) -> CapabilityMeta {
        CapabilityMeta::new(self.name(), self.description()).with_parameter_schema(json!({
            "type": "object",
            "required": ["title", "startTime"],
            "properties": {
                "title": {"type": "string", "minLength": 1},
                "date": {"type": "string", "description": "YYYY-MM-DD, defaults to the viewing date"},
                "startTime": {"type": "string", "description": "HH:MM, 24-hour"},
                "durationMinutes": {"type": "integer", "minimum": 5, "maximum": 720},
                "type": {"type": "string", "enum": BLOCK_TYPES},
                "allowOverlap": {"type": "boolean"}
            },
            "additionalProperties": false
        }))
    }

    async fn execute(&self, input: CapabilityInput, ctx: CapabilityContext) -> CapabilityResult {
        let parsed = (|| {
            let title = required_str(&input, "title")?.to_string();
            let date = date_param(&input, "date", &ctx)?;
            let start_time = time_param(&input, "startTime")?;
            Ok::<_, CapabilityResult>((title, date, start_time))
        })();
        let (title, date, start_time) = match parsed {
            Ok(values) => values,
            Err(result) => return result,
        };
        let minutes = input
            .u64_param("durationMinutes")
            .map(|m| m as i64)
            .unwrap_or(DEFAULT_BLOCK_MINUTES);
        let start = date.and_time(start_time);
        let block = ScheduleBlock {
            id: CapabilityContext::new_entity_id("blk"),
            block_type: input.str_param("type").unwrap_or("work").to_string(),
            title,
            start,
            end: start + Duration::minutes(minutes),
        };

        let allow_overlap = input
            .get_param("/allowOverlap")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if !allow_overlap {
            match self
                .calendar
                .overlapping(&ctx.user_id, block.start, block.end, None)
            {
                Ok(conflicts) if !conflicts.is_empty() => {
                    let titles: Vec<&str> = conflicts.iter().map(|b| b.title.as_str()).collect();
                    return CapabilityResult::recoverable_with_code(
                        SCHEDULE_CONFLICT,
                        format!("overlaps with {}", titles.join(", ")),
                    );
                }
                Ok(_) => {}
                Err(error) => return calendar_failure(error),
            }
        }

        match self.calendar.insert_block(&ctx.user_id, block.clone()) {
            Ok(()) => {
                tracing::debug!(user_id = %ctx.user_id, block_id = %block.id, "block created");
                CapabilityResult::success(json!({ "block": block }))
            }
            Err(error) => calendar_failure(error),
        }
    }
}

pub struct ScheduleMoveBlock {
    calendar: Arc<InMemoryCalendar>,
}

impl ScheduleMoveBlock {
    pub fn new(calendar: Arc<InMemoryCalendar>) -> Self {
        Self { calendar }
    }
}

#[async_trait]
impl Capability for ScheduleMoveBlock {
    fn name(&self) -> &str {
        "schedule_move_block"
    }

    fn description(&self) -> &str {
        "Move an existing block to a new start time, keeping its duration. The date defaults to the block's current day"
    }

    fn metadata(&self) -> CapabilityMeta {
        CapabilityMeta::new(self.name(), self.description()).with_parameter_schema(json!({
            "type": "object",
            "required": ["blockId", "newStartTime"],
            "properties": {
                "blockId": {"type": "string", "minLength": 1},
                "newStartTime": {"type": "string", "description": "HH:MM, 24-hour"},
                "date": {"type": "string", "description": "YYYY-MM-DD"}
            },
            "additionalProperties": false
        }))
    }

    async fn execute(&self, input: CapabilityInput, ctx: CapabilityContext) -> CapabilityResult {
        let parsed = (|| {
            let block_id = required_str(&input, "blockId")?.to_string();
            let start_time = time_param(&input, "newStartTime")?;
            Ok::<_, CapabilityResult>((block_id, start_time))
        })();
        let (block_id, start_time) = match parsed {
            Ok(values) => values,
            Err(result) => return result,
        };

        let current = match self.calendar.block(&ctx.user_id, &block_id) {
            Ok(block) => block,
            Err(error) => return calendar_failure(error),
        };
        let date = match input.str_param("date") {
            Some(_) => match date_param(&input, "date", &ctx) {
                Ok(date) => date,
                Err(result) => return result,
            },
            None => current.start.date(),
        };

        match self
            .calendar
            .move_block(&ctx.user_id, &block_id, date.and_time(start_time))
        {
            Ok(block) => CapabilityResult::success(json!({
                "block": block,
                "previousStart": current.start,
            })),
            Err(error) => calendar_failure(error),
        }
    }
}

pub struct ScheduleDeleteBlock {
    calendar: Arc<InMemoryCalendar>,
}

impl ScheduleDeleteBlock {
    pub fn new(calendar: Arc<InMemoryCalendar>) -> Self {
        Self { calendar }
    }
}

#[async_trait]
impl Capability for ScheduleDeleteBlock {
    fn name(&self) -> &str {
        "schedule_delete_block"
    }

    fn description(&self) -> &str {
        "Remove a block from the schedule"
    }

    fn metadata(&self) -> CapabilityMeta {
        CapabilityMeta::new(self.name(), self.description()).with_parameter_schema(json!({
            "type": "object",
            "required": ["blockId"],
            "properties": {
                "blockId": {"type": "string", "minLength": 1}
            },
            "additionalProperties": false
        }))
    }

    async fn execute(&self, input: CapabilityInput, ctx: CapabilityContext) -> CapabilityResult {
        let Some(block_id) = input.str_param("blockId") else {
            return invalid("blockId is required");
        };
        match self.calendar.delete_block(&ctx.user_id, block_id) {
            Ok(block) => CapabilityResult::success(json!({
                "blockId": block.id,
                "title": block.title,
                "deleted": true,
            })),
            Err(error) => calendar_failure(error),
        }
    }
}
