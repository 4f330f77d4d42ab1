//! Deterministic keyword fallback
//!
//! Produces a plan without the language model. Used whenever the model call,
//! JSON extraction or validation fails, so the caller always gets a plan.

use serde_json::{json, Map, Value};

use cadence_core::store::ReferenceResolver;
use cadence_core::types::{
    Ambiguity, ContextSnapshot, EntityKind, Execution, IntentSummary, PlanSource, Understanding,
};

use crate::extractor::{contains_word, find_pronoun, ExtractedEntities};

/// Confidence of a plan picked by keyword rules.
pub const KEYWORD_CONFIDENCE: f32 = 0.5;
/// Confidence of the conversational catch-all.
pub const CONVERSATION_CONFIDENCE: f32 = 0.3;

/// Capability that answers anything the keyword rules do not cover.
pub const CONVERSATION_CAPABILITY: &str = "conversation_reply";

const MOVE_VERBS: [&str; 5] = ["move", "reschedule", "push", "shift", "bump"];
const VIEW_VERBS: [&str; 4] = ["show", "view", "see", "display"];
const VIEW_NOUNS: [&str; 11] = [
    "schedule", "calendar", "day", "agenda", "today", "tomorrow", "task", "tasks", "email",
    "emails", "inbox",
];
const COMPLETE_VERBS: [&str; 5] = ["complete", "finish", "done", "mark", "finished"];
const DELETE_VERBS: [&str; 3] = ["delete", "cancel", "remove"];
const CREATE_VERBS: [&str; 5] = ["schedule", "add", "create", "book", "block"];

/// Words that end a free-text title.
const TITLE_STOPS: [&str; 10] = [
    " at ", " on ", " for ", " from ", " tomorrow", " today", " tonight", " next ", " this ",
    " with ",
];

/// Build a plan from keywords alone.
pub fn fallback_understanding(
    utterance: &str,
    context: &ContextSnapshot,
    extracted: &ExtractedEntities,
) -> Understanding {
    let lowered = utterance.to_lowercase();
    let pronoun = find_pronoun(utterance);
    let date = extracted
        .first_date()
        .unwrap_or(context.temporal.viewing_date)
        .to_string();

    let plan = if has_word(&lowered, "approve") && lowered.contains("schedule") {
        keyword_plan(
            "approve_schedule",
            "approval keywords",
            Execution::workflow("approve_schedule", json!({ "date": date })),
        )
    } else if ["plan my day", "plan the day", "plan my week"]
        .iter()
        .any(|phrase| lowered.contains(phrase))
    {
        keyword_plan(
            "plan_day",
            "day planning keywords",
            Execution::workflow("daily_planning", json!({ "date": date })),
        )
    } else if has_word(&lowered, "triage")
        && has_any(&lowered, &["email", "emails", "inbox", "mail"])
    {
        keyword_plan(
            "triage_email",
            "triage keywords",
            Execution::workflow("email_triage", json!({})),
        )
    } else if has_any(&lowered, &MOVE_VERBS) {
        move_block_plan(&lowered, context, extracted, &date)
    } else if is_view_request(&lowered) {
        view_plan(&lowered, &date)
    } else if has_any(&lowered, &COMPLETE_VERBS)
        && (has_any(&lowered, &["task", "tasks", "todo"])
            || pronoun.is_some()
            || title_match(&lowered, context, EntityKind::Task).is_some())
    {
        target_plan(
            "complete_task",
            "task_complete",
            "taskId",
            EntityKind::Task,
            &lowered,
            context,
            "Which task did you finish?",
        )
    } else if has_word(&lowered, "archive") {
        target_plan(
            "archive_email",
            "email_archive",
            "emailId",
            EntityKind::Email,
            &lowered,
            context,
            "Which email should I archive?",
        )
    } else if has_any(&lowered, &DELETE_VERBS) {
        target_plan(
            "delete_block",
            "schedule_delete_block",
            "blockId",
            EntityKind::Block,
            &lowered,
            context,
            "Which block should I remove?",
        )
    } else if has_any(&lowered, &["add", "create"])
        && has_any(&lowered, &["task", "todo", "to-do"])
    {
        let title = derive_title(utterance, &["task", "todo", "to-do"])
            .unwrap_or_else(|| "New task".to_string());
        keyword_plan(
            "create_task",
            "task creation keywords",
            Execution::single("task_create", json!({ "title": title })),
        )
    } else if has_any(&lowered, &CREATE_VERBS) {
        create_block_plan(utterance, context, extracted, pronoun.as_deref(), &date)
    } else {
        Understanding::new(
            IntentSummary::new(
                "conversation",
                CONVERSATION_CONFIDENCE,
                "no keyword rule matched",
            ),
            Execution::single(CONVERSATION_CAPABILITY, json!({ "message": utterance })),
        )
    };

    let mut plan = plan.with_source(PlanSource::Fallback);
    plan.resolved = extracted.clone().into_resolved();
    plan
}

fn has_word(lowered: &str, word: &str) -> bool {
    contains_word(lowered, word)
}

fn has_any(lowered: &str, words: &[&str]) -> bool {
    words.iter().any(|w| contains_word(lowered, w))
}

fn keyword_plan(intent: &str, reasoning: &str, execution: Execution) -> Understanding {
    Understanding::new(
        IntentSummary::new(intent, KEYWORD_CONFIDENCE, format!("matched {reasoning}")),
        execution,
    )
}

fn is_view_request(lowered: &str) -> bool {
    let asks = VIEW_VERBS.iter().any(|v| contains_word(lowered, v))
        || lowered.contains("what's on")
        || lowered.contains("whats on")
        || lowered.contains("what do i have");
    asks && has_any(lowered, &VIEW_NOUNS)
}

fn view_plan(lowered: &str, date: &str) -> Understanding {
    let (intent, capability) = if has_any(lowered, &["task", "tasks", "todo"]) {
        ("view_tasks", "task_list")
    } else if has_any(lowered, &["email", "emails", "inbox"]) {
        ("view_email", "email_list")
    } else {
        ("view_schedule", "schedule_view")
    };
    keyword_plan(
        intent,
        "view keywords",
        Execution::single(capability, json!({ "date": date })),
    )
}

fn move_block_plan(
    lowered: &str,
    context: &ContextSnapshot,
    extracted: &ExtractedEntities,
    date: &str,
) -> Understanding {
    let mut params = Map::new();
    let block = find_target(lowered, context, EntityKind::Block);
    if let Some(id) = &block {
        params.insert("blockId".into(), Value::String(id.clone()));
    }
    if let Some(time) = extracted.first_time() {
        params.insert("newStartTime".into(), Value::String(time.to_string()));
    }
    if extracted.first_date().is_some() {
        params.insert("date".into(), Value::String(date.to_string()));
    }

    let mut plan = keyword_plan(
        "move_block",
        "reschedule keywords",
        Execution::single("schedule_move_block", Value::Object(params)),
    );
    if block.is_none() {
        plan = plan.with_ambiguity(
            Ambiguity::new("it", "Which block should I move?")
                .with_candidates(visible_candidates(context, EntityKind::Block)),
        );
    }
    if extracted.first_time().is_none() {
        plan = plan.with_ambiguity(Ambiguity::new("", "What time should I move it to?"));
    }
    plan
}

fn target_plan(
    intent: &str,
    capability: &str,
    param: &str,
    kind: EntityKind,
    lowered: &str,
    context: &ContextSnapshot,
    question: &str,
) -> Understanding {
    match find_target(lowered, context, kind) {
        Some(id) => keyword_plan(
            intent,
            "target keywords",
            Execution::single(capability, json!({ param: id })),
        ),
        None => keyword_plan(
            intent,
            "target keywords",
            Execution::single(capability, json!({})),
        )
        .with_ambiguity(
            Ambiguity::new("it", question).with_candidates(visible_candidates(context, kind)),
        ),
    }
}

fn create_block_plan(
    utterance: &str,
    context: &ContextSnapshot,
    extracted: &ExtractedEntities,
    pronoun: Option<&str>,
    date: &str,
) -> Understanding {
    let mut params = Map::new();
    let mut ambiguities = Vec::new();

    let title = match pronoun {
        Some(word) => match ReferenceResolver::resolve(None, context) {
            Some(reference) => entity_title(context, reference.kind, &reference.id),
            None => {
                ambiguities.push(Ambiguity::new(word, "What would you like me to schedule?"));
                None
            }
        },
        None => derive_title(utterance, &CREATE_VERBS),
    };
    params.insert(
        "title".into(),
        Value::String(title.unwrap_or_else(|| "Focus time".to_string())),
    );
    params.insert("date".into(), Value::String(date.to_string()));
    match extracted.first_time() {
        Some(time) => {
            params.insert("startTime".into(), Value::String(time.to_string()));
        }
        None => ambiguities.push(Ambiguity::new("", "What time should I schedule it?")),
    }
    if let Some(minutes) = extracted.first_duration_minutes() {
        params.insert("durationMinutes".into(), json!(minutes));
    }

    let mut plan = keyword_plan(
        "create_block",
        "scheduling keywords",
        Execution::single("schedule_create_block", Value::Object(params)),
    );
    plan.ambiguities = ambiguities;
    plan
}

/// Title match against visible items first, then pronoun resolution.
fn find_target(lowered: &str, context: &ContextSnapshot, kind: EntityKind) -> Option<String> {
    title_match(lowered, context, kind)
        .or_else(|| ReferenceResolver::resolve(Some(kind), context).map(|r| r.id))
}

/// Longest visible title (or id) mentioned verbatim in the utterance.
fn title_match(lowered: &str, context: &ContextSnapshot, kind: EntityKind) -> Option<String> {
    let titled: Vec<(&str, String)> = match kind {
        EntityKind::Block | EntityKind::Meeting => context
            .state
            .schedule
            .iter()
            .map(|b| (b.id.as_str(), b.title.to_lowercase()))
            .collect(),
        EntityKind::Task => context
            .state
            .tasks
            .iter()
            .filter(|t| !t.completed)
            .map(|t| (t.id.as_str(), t.title.to_lowercase()))
            .collect(),
        EntityKind::Email => context
            .state
            .emails
            .iter()
            .map(|e| (e.id.as_str(), e.subject.to_lowercase()))
            .collect(),
    };

    titled
        .iter()
        .filter(|(id, title)| {
            (!title.trim().is_empty() && lowered.contains(title.as_str()))
                || contains_word(lowered, &id.to_lowercase())
        })
        .max_by_key(|(_, title)| title.len())
        .map(|(id, _)| id.to_string())
}

fn entity_title(context: &ContextSnapshot, kind: EntityKind, id: &str) -> Option<String> {
    match kind {
        EntityKind::Block | EntityKind::Meeting => context.block(id).map(|b| b.title.clone()),
        EntityKind::Task => context.task(id).map(|t| t.title.clone()),
        EntityKind::Email => context
            .state
            .emails
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.subject.clone()),
    }
}

fn visible_candidates(context: &ContextSnapshot, kind: EntityKind) -> Vec<String> {
    context
        .visible_ids(kind)
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Free text after the first trigger word, cut at the first date/time phrase.
fn derive_title(utterance: &str, triggers: &[&str]) -> Option<String> {
    let lowered = utterance.to_ascii_lowercase();
    let start = triggers
        .iter()
        .filter_map(|t| find_word(&lowered, t).map(|at| at + t.len()))
        .min()?;
    let rest = &lowered[start..];
    let end = TITLE_STOPS
        .iter()
        .filter_map(|stop| format!(" {rest}").find(stop).map(|at| at.saturating_sub(1)))
        .min()
        .unwrap_or(rest.len());

    let mut title = utterance.get(start..start + end)?.trim();
    for article in ["a ", "an ", "the ", "my ", "to ", "some "] {
        let starts = title
            .get(..article.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(article));
        if starts && title.len() > article.len() {
            title = title[article.len()..].trim_start();
        }
    }
    let title = title.trim_end_matches(['.', '!', '?']).trim();
    (!title.is_empty()).then(|| title.to_string())
}

fn find_word(haystack: &str, word: &str) -> Option<usize> {
    haystack.match_indices(word).map(|(at, _)| at).find(|&at| {
        let before = haystack[..at].chars().next_back();
        let after = haystack[at + word.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::extract_entities;
    use cadence_core::types::{EntityRefs, ScheduleBlock, TaskItem, TrackedOperation};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 10).unwrap()
    }

    fn context() -> ContextSnapshot {
        let now = Utc.with_ymd_and_hms(2024, 7, 10, 9, 0, 0).unwrap();
        ContextSnapshot::minimal("u1", now, "UTC", None)
    }

    fn block(id: &str, title: &str, hour: u32) -> ScheduleBlock {
        ScheduleBlock {
            id: id.to_string(),
            block_type: "meeting".to_string(),
            title: title.to_string(),
            start: day().and_hms_opt(hour, 0, 0).unwrap(),
            end: day().and_hms_opt(hour + 1, 0, 0).unwrap(),
        }
    }

    fn plan(utterance: &str, ctx: &ContextSnapshot) -> Understanding {
        let extracted = extract_entities(utterance, &ctx.temporal);
        fallback_understanding(utterance, ctx, &extracted)
    }

    fn single(plan: &Understanding) -> (&str, Value) {
        match &plan.execution {
            Execution::Single {
                capability,
                parameters,
            } => (capability.as_str(), parameters.clone().unwrap_or(Value::Null)),
            other => panic!("expected single execution, got {other:?}"),
        }
    }

    #[test]
    fn test_unmatched_utterance_becomes_conversation() {
        let plan = plan("hello there", &context());
        assert_eq!(plan.intent.confidence, CONVERSATION_CONFIDENCE);
        assert_eq!(plan.metadata.source, PlanSource::Fallback);
        let (capability, params) = single(&plan);
        assert_eq!(capability, CONVERSATION_CAPABILITY);
        assert_eq!(params["message"], "hello there");
    }

    #[test]
    fn test_workflow_keywords() {
        let approve = plan("Approve the schedule", &context());
        assert_eq!(approve.execution.capability_names(), vec!["approve_schedule"]);

        let planning = plan("plan my day", &context());
        assert_eq!(
            planning.execution,
            Execution::workflow("daily_planning", json!({ "date": "2024-07-10" }))
        );
    }

    #[test]
    fn test_move_uses_ledger_antecedent() {
        let mut ctx = context();
        ctx.state.schedule = vec![block("B1", "Standup", 9), block("B2", "Review", 11)];
        ctx.memory.recent_operations = vec![TrackedOperation::new(
            "u1",
            "schedule_create_block",
            json!({}),
            Utc.with_ymd_and_hms(2024, 7, 10, 8, 0, 0).unwrap(),
        )
        .with_affected(EntityRefs::new().with(EntityKind::Block, "B1"))];

        let plan = plan("move it to 3pm", &ctx);
        assert!(plan.ambiguities.is_empty());
        let (capability, params) = single(&plan);
        assert_eq!(capability, "schedule_move_block");
        assert_eq!(params["blockId"], "B1");
        assert_eq!(params["newStartTime"], "15:00");
    }

    #[test]
    fn test_move_by_title_and_missing_target() {
        let mut ctx = context();
        ctx.state.schedule = vec![block("B1", "Standup", 9), block("B2", "Design review", 11)];
        let moved = plan("push design review to 4pm", &ctx);
        let (_, params) = single(&moved);
        assert_eq!(params["blockId"], "B2");

        let unresolved = plan("move it to 4pm", &ctx);
        assert_eq!(unresolved.ambiguities.len(), 1);
        assert_eq!(unresolved.ambiguities[0].candidates, vec!["B1", "B2"]);
    }

    #[test]
    fn test_view_and_complete() {
        let mut ctx = context();
        let view = plan("show my schedule for tomorrow", &ctx);
        let (capability, params) = single(&view);
        assert_eq!(capability, "schedule_view");
        assert_eq!(params["date"], "2024-07-11");

        ctx.state.tasks = vec![TaskItem {
            id: "T1".to_string(),
            title: "Write report".to_string(),
            priority: None,
            due_date: None,
            estimated_minutes: None,
            completed: false,
        }];
        let done = plan("mark write report as done", &ctx);
        let (capability, params) = single(&done);
        assert_eq!(capability, "task_complete");
        assert_eq!(params["taskId"], "T1");
    }

    #[test]
    fn test_create_block_derives_title_and_time() {
        let plan = plan("Book a dentist appointment tomorrow at 2pm for 45 minutes", &context());
        let (capability, params) = single(&plan);
        assert_eq!(capability, "schedule_create_block");
        assert_eq!(params["title"], "dentist appointment");
        assert_eq!(params["date"], "2024-07-11");
        assert_eq!(params["startTime"], "14:00");
        assert_eq!(params["durationMinutes"], 45);
        assert!(plan.ambiguities.is_empty());
    }

    #[test]
    fn test_schedule_pronoun_without_antecedent_is_ambiguous() {
        let plan = plan("Schedule it", &context());
        assert!(plan.needs_clarification());
        assert_eq!(plan.ambiguities[0].original, "it");
    }
}
