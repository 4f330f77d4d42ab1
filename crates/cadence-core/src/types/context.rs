//! Context snapshot types
//!
//! A [`ContextSnapshot`] is built once per request and is read-only afterwards.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::entity::{EntityKind, EntityRefs};
use super::operation::TrackedOperation;

/// Everything needed to interpret one utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub user_id: String,
    pub temporal: TemporalFrame,
    #[serde(default)]
    pub state: WorkspaceState,
    #[serde(default)]
    pub memory: ConversationMemory,
    #[serde(default)]
    pub patterns: UserPatterns,
}

impl ContextSnapshot {
    /// Empty state, default patterns, current time. Used when assembly fails.
    pub fn minimal(
        user_id: impl Into<String>,
        now: DateTime<Utc>,
        timezone: &str,
        viewing_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            temporal: TemporalFrame::new(now, timezone, viewing_date),
            state: WorkspaceState::default(),
            memory: ConversationMemory::default(),
            patterns: UserPatterns::default(),
        }
    }

    pub fn block(&self, id: &str) -> Option<&ScheduleBlock> {
        self.state.schedule.iter().find(|block| block.id == id)
    }

    pub fn task(&self, id: &str) -> Option<&TaskItem> {
        self.state.tasks.iter().find(|task| task.id == id)
    }

    /// Whether an id of the given kind is present in the snapshot state.
    pub fn contains_entity(&self, kind: EntityKind, id: &str) -> bool {
        match kind {
            EntityKind::Block | EntityKind::Meeting => self.block(id).is_some(),
            EntityKind::Task => self.task(id).is_some(),
            EntityKind::Email => self.state.emails.iter().any(|email| email.id == id),
        }
    }

    /// Ids of the given kind currently visible to the user.
    pub fn visible_ids(&self, kind: EntityKind) -> Vec<&str> {
        match kind {
            EntityKind::Block => self.state.schedule.iter().map(|b| b.id.as_str()).collect(),
            EntityKind::Meeting => self
                .state
                .schedule
                .iter()
                .filter(|b| b.is_meeting())
                .map(|b| b.id.as_str())
                .collect(),
            EntityKind::Task => self
                .state
                .tasks
                .iter()
                .filter(|t| !t.completed)
                .map(|t| t.id.as_str())
                .collect(),
            EntityKind::Email => self.state.emails.iter().map(|e| e.id.as_str()).collect(),
        }
    }
}

/// "Now" versus the date the user is looking at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalFrame {
    pub now: DateTime<Utc>,
    pub viewing_date: NaiveDate,
    pub timezone: String,
    pub is_today: bool,
}

impl TemporalFrame {
    /// Build a frame; the viewing date defaults to the local date of `now`.
    pub fn new(now: DateTime<Utc>, timezone: &str, viewing_date: Option<NaiveDate>) -> Self {
        let tz = parse_timezone(timezone);
        let today = now.with_timezone(&tz).date_naive();
        let viewing_date = viewing_date.unwrap_or(today);
        Self {
            now,
            viewing_date,
            timezone: tz.name().to_string(),
            is_today: viewing_date == today,
        }
    }

    pub fn tz(&self) -> Tz {
        parse_timezone(&self.timezone)
    }

    pub fn local_now(&self) -> DateTime<Tz> {
        self.now.with_timezone(&self.tz())
    }

    /// Local calendar date of `now`.
    pub fn today(&self) -> NaiveDate {
        self.local_now().date_naive()
    }
}

fn parse_timezone(value: &str) -> Tz {
    value.parse::<Tz>().unwrap_or(Tz::UTC)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceState {
    #[serde(default)]
    pub schedule: Vec<ScheduleBlock>,
    #[serde(default)]
    pub tasks: Vec<TaskItem>,
    #[serde(default)]
    pub emails: Vec<EmailItem>,
}

/// A block on the user's calendar, in local wall-clock time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleBlock {
    pub id: String,
    #[serde(rename = "type", default = "default_block_type")]
    pub block_type: String,
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

fn default_block_type() -> String {
    "work".to_string()
}

impl ScheduleBlock {
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn is_meeting(&self) -> bool {
        self.block_type.eq_ignore_ascii_case("meeting")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskItem {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_minutes: Option<u32>,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailItem {
    pub id: String,
    pub from: String,
    pub subject: String,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub needs_response: bool,
    #[serde(default)]
    pub archived: bool,
}

/// One prior conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ConversationTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMemory {
    #[serde(default)]
    pub recent_messages: Vec<ConversationTurn>,
    /// Newest first.
    #[serde(default)]
    pub recent_operations: Vec<TrackedOperation>,
    #[serde(default)]
    pub active_proposals: Vec<Value>,
    #[serde(default)]
    pub mentioned_entities: EntityRefs,
}

/// Learned user habits, surfaced to the prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatterns {
    #[serde(default)]
    pub work_hours: WorkHours,
    #[serde(default = "default_lunch_time")]
    pub lunch_time: NaiveTime,
    #[serde(default)]
    pub break_preferences: BreakPreferences,
    #[serde(default)]
    pub meeting_preferences: MeetingPreferences,
    #[serde(default)]
    pub common_phrases: BTreeMap<String, String>,
}

impl Default for UserPatterns {
    fn default() -> Self {
        Self {
            work_hours: WorkHours::default(),
            lunch_time: default_lunch_time(),
            break_preferences: BreakPreferences::default(),
            meeting_preferences: MeetingPreferences::default(),
            common_phrases: BTreeMap::new(),
        }
    }
}

fn default_lunch_time() -> NaiveTime {
    NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Default for WorkHours {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakPreferences {
    pub interval_minutes: u32,
    pub duration_minutes: u32,
}

impl Default for BreakPreferences {
    fn default() -> Self {
        Self {
            interval_minutes: 90,
            duration_minutes: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingPreferences {
    pub buffer_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_window: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_per_day: Option<u32>,
}

impl Default for MeetingPreferences {
    fn default() -> Self {
        Self {
            buffer_minutes: 10,
            preferred_window: None,
            max_per_day: None,
        }
    }
}
