//! Prompt construction for the understanding call
//!
//! One system prompt (rules, output schema, capability catalog) and one user
//! prompt (temporal frame, schedule, memory, pre-extracted entities).

use std::fmt::Write;

use cadence_core::capability::CapabilityMeta;
use cadence_core::types::ContextSnapshot;

use crate::extractor::ExtractedEntities;

pub const DEFAULT_MAX_HISTORY_TURNS: usize = 3;
pub const DEFAULT_MAX_RECENT_OPERATIONS: usize = 3;

const PLAN_SCHEMA: &str = r#"{"intent":{"primary":"...","confidence":0.0,"reasoning":"..."},"execution":{"type":"single","capability":"name","parameters":{}} | {"type":"workflow","workflowName":"name","parameters":{}} | {"type":"multi_step","steps":[{"capability":"name","parameters":{},"dependsOn":[0],"description":"..."}]},"resolved":{"dates":[{"original":"...","value":"YYYY-MM-DD","confidence":0.0}],"times":[{"original":"...","value":"HH:MM","confidence":0.0}],"entities":[{"original":"...","value":"id","confidence":0.0,"kind":"block"}]},"ambiguities":[{"original":"...","question":"...","candidates":["..."]}]}"#;

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    pub max_history_turns: usize,
    pub max_recent_operations: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            max_history_turns: DEFAULT_MAX_HISTORY_TURNS,
            max_recent_operations: DEFAULT_MAX_RECENT_OPERATIONS,
        }
    }
}

impl PromptBuilder {
    pub fn new(max_history_turns: usize, max_recent_operations: usize) -> Self {
        Self {
            max_history_turns,
            max_recent_operations,
        }
    }

    /// Returns `(system, user)`.
    pub fn build(
        &self,
        utterance: &str,
        context: &ContextSnapshot,
        catalog: &[CapabilityMeta],
        extracted: &ExtractedEntities,
    ) -> (String, String) {
        let system = build_system_prompt(catalog);
        let user = self.build_user_prompt(utterance, context, extracted);
        (system, user)
    }

    fn build_user_prompt(
        &self,
        utterance: &str,
        context: &ContextSnapshot,
        extracted: &ExtractedEntities,
    ) -> String {
        let temporal = &context.temporal;
        let mut user = String::new();

        user.push_str("Time:\n");
        let _ = writeln!(
            user,
            "- now: {} ({})",
            temporal.local_now().format("%A %Y-%m-%d %H:%M"),
            temporal.timezone
        );
        let _ = writeln!(
            user,
            "- viewing date: {} ({})",
            temporal.viewing_date.format("%A %Y-%m-%d"),
            if temporal.is_today {
                "today"
            } else {
                "NOT today; relative dates are relative to this date"
            }
        );

        user.push_str("\nSchedule for the viewing date:\n");
        if context.state.schedule.is_empty() {
            user.push_str("- (empty)\n");
        }
        let mut blocks: Vec<_> = context.state.schedule.iter().collect();
        blocks.sort_by_key(|block| block.start);
        for block in blocks {
            let _ = writeln!(
                user,
                "- [{}] {}-{} {} \"{}\" ({} min)",
                block.id,
                block.start.format("%H:%M"),
                block.end.format("%H:%M"),
                block.block_type,
                block.title,
                block.duration_minutes()
            );
        }

        if !context.state.tasks.is_empty() {
            user.push_str("\nOpen tasks:\n");
            for task in &context.state.tasks {
                let _ = write!(user, "- [{}] \"{}\"", task.id, task.title);
                if let Some(priority) = &task.priority {
                    let _ = write!(user, " priority={priority}");
                }
                if let Some(due) = &task.due_date {
                    let _ = write!(user, " due={due}");
                }
                user.push('\n');
            }
        }

        let history = &context.memory.recent_messages;
        if !history.is_empty() {
            user.push_str("\nRecent conversation:\n");
            let skip = history.len().saturating_sub(self.max_history_turns);
            for turn in history.iter().skip(skip) {
                let _ = writeln!(user, "- {}: {}", turn.role, turn.content);
            }
        }

        let operations = &context.memory.recent_operations;
        if !operations.is_empty() {
            user.push_str("\nRecent operations (newest first):\n");
            for op in operations.iter().take(self.max_recent_operations) {
                let affected =
                    serde_json::to_string(&op.affected_entities).unwrap_or_default();
                let _ = writeln!(
                    user,
                    "- {} params={} affected={}",
                    op.capability, op.params, affected
                );
            }
        }

        if !context.memory.mentioned_entities.is_empty() {
            let mentioned =
                serde_json::to_string(&context.memory.mentioned_entities).unwrap_or_default();
            let _ = writeln!(user, "\nMentioned entities: {mentioned}");
        }

        let patterns = &context.patterns;
        user.push_str("\nUser patterns:\n");
        let _ = writeln!(
            user,
            "- work hours: {}-{}",
            patterns.work_hours.start.format("%H:%M"),
            patterns.work_hours.end.format("%H:%M")
        );
        let _ = writeln!(user, "- lunch: {}", patterns.lunch_time.format("%H:%M"));
        let _ = writeln!(
            user,
            "- breaks: {} min every {} min",
            patterns.break_preferences.duration_minutes,
            patterns.break_preferences.interval_minutes
        );
        let _ = writeln!(
            user,
            "- meeting buffer: {} min",
            patterns.meeting_preferences.buffer_minutes
        );
        for (phrase, meaning) in &patterns.common_phrases {
            let _ = writeln!(user, "- \"{phrase}\" means {meaning}");
        }

        if !extracted.is_empty() {
            user.push_str("\nPre-extracted values:\n");
            for value in extracted
                .dates
                .iter()
                .chain(&extracted.times)
                .chain(&extracted.durations)
                .chain(&extracted.people)
            {
                let _ = writeln!(
                    user,
                    "- \"{}\" -> {} ({}, confidence {:.2})",
                    value.original,
                    value.value,
                    value.kind.as_deref().unwrap_or("value"),
                    value.confidence
                );
            }
        }

        let _ = write!(user, "\nUser message:\n{utterance}\n");
        user
    }
}

fn build_system_prompt(catalog: &[CapabilityMeta]) -> String {
    let mut system = String::new();
    system.push_str(
        "You are the command-understanding component of a personal scheduling assistant. \
         Turn the user message into one fully resolved execution plan.\n",
    );

    system.push_str("\nRules:\n");
    system.push_str("1) Return ONLY one JSON object matching the plan schema below.\n");
    system.push_str("2) Use only capability or workflow names listed in the Capability Catalog.\n");
    system.push_str("3) parameters must satisfy the capability parameter schema.\n");
    system.push_str(
        "4) Use \"single\" for one action, \"workflow\" for a named workflow, \"multi_step\" for ordered steps; dependsOn lists indices of earlier steps.\n",
    );
    system.push_str("5) Every entity id in parameters must be an id shown in the context.\n");
    system.push_str(
        "6) If a reference cannot be resolved, add an ambiguity with a question instead of guessing.\n",
    );

    system.push_str("\nReference resolution order for \"it\", \"that\", \"this one\":\n");
    system.push_str("1) the most recent operation's affected entities\n");
    system.push_str("2) entities mentioned in the conversation\n");
    system.push_str("3) the only visible block of the expected kind\n");
    system.push_str("4) otherwise ask for clarification\n");

    system.push_str("\nDate and time normalization:\n");
    system.push_str("- dates as YYYY-MM-DD, times as 24-hour HH:MM, durations in minutes\n");
    system.push_str(
        "- \"today\", \"tomorrow\" and weekday names are relative to the viewing date, not the current date\n",
    );
    system.push_str("- a bare hour from 1 to 7 without am/pm means the afternoon\n");
    system.push_str("- pre-extracted values are reliable; reuse them unless the message contradicts them\n");

    system.push_str("\nPlan schema:\n");
    system.push_str(PLAN_SCHEMA);
    system.push('\n');

    system.push_str("\nCapability Catalog:\n");
    for meta in catalog {
        append_catalog_entry(&mut system, meta);
    }
    system
}

fn append_catalog_entry(buf: &mut String, meta: &CapabilityMeta) {
    let _ = writeln!(buf, "- name: {}", meta.name);
    let _ = writeln!(buf, "  category: {}", meta.category);
    let _ = writeln!(buf, "  description: {}", meta.description);
    if !meta.parameter_schema.is_null() {
        let _ = writeln!(buf, "  parameters: {}", meta.parameter_schema);
    }
}
