//! In-memory per-user calendar, task list and inbox
//!
//! Reference implementation of the external data the capabilities act on.
//! Doubles as the `UserDataSource` read by the context assembler.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use thiserror::Error;

use cadence_context::{SourceError, UserDataSource};
use cadence_core::types::{EmailItem, ScheduleBlock, TaskItem, UserPatterns};

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },
    #[error("fixture IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("fixture parse error: {0}")]
    Fixture(#[from] serde_json::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<CalendarError> for SourceError {
    fn from(error: CalendarError) -> Self {
        match error {
            CalendarError::NotFound { .. } => SourceError::NotFound(error.to_string()),
            other => SourceError::Internal(other.to_string()),
        }
    }
}

/// Seed data for one user.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFixture {
    #[serde(default)]
    pub schedule: Vec<ScheduleBlock>,
    #[serde(default)]
    pub tasks: Vec<TaskItem>,
    #[serde(default)]
    pub emails: Vec<EmailItem>,
    #[serde(default)]
    pub patterns: Option<UserPatterns>,
}

/// `{"users": {"<user id>": {...}}}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CalendarFixture {
    #[serde(default)]
    pub users: HashMap<String, UserFixture>,
}

#[derive(Debug, Clone, Default)]
struct UserData {
    blocks: Vec<ScheduleBlock>,
    tasks: Vec<TaskItem>,
    emails: Vec<EmailItem>,
    patterns: UserPatterns,
}

impl From<UserFixture> for UserData {
    fn from(fixture: UserFixture) -> Self {
        Self {
            blocks: fixture.schedule,
            tasks: fixture.tasks,
            emails: fixture.emails,
            patterns: fixture.patterns.unwrap_or_default(),
        }
    }
}

/// Unknown users read as empty.
#[derive(Default)]
pub struct InMemoryCalendar {
    users: RwLock<HashMap<String, UserData>>,
}

impl InMemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: CalendarFixture) -> Self {
        let users = fixture
            .users
            .into_iter()
            .map(|(user, data)| (user, UserData::from(data)))
            .collect();
        Self {
            users: RwLock::new(users),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, CalendarError> {
        Ok(Self::from_fixture(serde_json::from_str(json)?))
    }

    pub fn from_fixture_file(path: &Path) -> Result<Self, CalendarError> {
        let content = std::fs::read_to_string(path)?;
        let calendar = Self::from_json(&content)?;
        tracing::info!(
            path = %path.display(),
            users = calendar.user_count(),
            "calendar fixture loaded"
        );
        Ok(calendar)
    }

    /// Replace one user's data.
    pub fn seed_user(&self, user_id: &str, fixture: UserFixture) -> Result<(), CalendarError> {
        self.write(|users| {
            users.insert(user_id.to_string(), fixture.into());
        })
    }

    pub fn user_count(&self) -> usize {
        self.users.read().map(|users| users.len()).unwrap_or(0)
    }

    /// Blocks starting on `date`, ordered by start.
    pub fn blocks_on(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<ScheduleBlock>, CalendarError> {
        self.read(user_id, |data| {
            let mut blocks: Vec<ScheduleBlock> = data
                .blocks
                .iter()
                .filter(|block| block.start.date() == date)
                .cloned()
                .collect();
            blocks.sort_by_key(|block| block.start);
            blocks
        })
    }

    pub fn block(&self, user_id: &str, block_id: &str) -> Result<ScheduleBlock, CalendarError> {
        self.read(user_id, |data| data.blocks.iter().find(|b| b.id == block_id).cloned())?
            .ok_or_else(|| not_found("block", block_id))
    }

    /// Blocks on the same day overlapping `[start, end)`, excluding `ignore`.
    pub fn overlapping(
        &self,
        user_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        ignore: Option<&str>,
    ) -> Result<Vec<ScheduleBlock>, CalendarError> {
        self.read(user_id, |data| {
            data.blocks
                .iter()
                .filter(|b| Some(b.id.as_str()) != ignore)
                .filter(|b| b.start < end && start < b.end)
                .cloned()
                .collect()
        })
    }

    pub fn insert_block(&self, user_id: &str, block: ScheduleBlock) -> Result<(), CalendarError> {
        self.write_user(user_id, |data| data.blocks.push(block))
    }

    /// Move a block keeping its duration. Returns the updated block.
    pub fn move_block(
        &self,
        user_id: &str,
        block_id: &str,
        new_start: NaiveDateTime,
    ) -> Result<ScheduleBlock, CalendarError> {
        self.write_user(user_id, |data| {
            let block = data.blocks.iter_mut().find(|b| b.id == block_id)?;
            let duration = block.end - block.start;
            block.start = new_start;
            block.end = new_start + duration;
            Some(block.clone())
        })?
        .ok_or_else(|| not_found("block", block_id))
    }

    pub fn delete_block(
        &self,
        user_id: &str,
        block_id: &str,
    ) -> Result<ScheduleBlock, CalendarError> {
        self.write_user(user_id, |data| {
            let index = data.blocks.iter().position(|b| b.id == block_id)?;
            Some(data.blocks.remove(index))
        })?
        .ok_or_else(|| not_found("block", block_id))
    }

    pub fn tasks(
        &self,
        user_id: &str,
        include_completed: bool,
    ) -> Result<Vec<TaskItem>, CalendarError> {
        self.read(user_id, |data| {
            data.tasks
                .iter()
                .filter(|task| include_completed || !task.completed)
                .cloned()
                .collect()
        })
    }

    pub fn insert_task(&self, user_id: &str, task: TaskItem) -> Result<(), CalendarError> {
        self.write_user(user_id, |data| data.tasks.push(task))
    }

    pub fn complete_task(&self, user_id: &str, task_id: &str) -> Result<TaskItem, CalendarError> {
        self.write_user(user_id, |data| {
            let task = data.tasks.iter_mut().find(|t| t.id == task_id)?;
            task.completed = true;
            Some(task.clone())
        })?
        .ok_or_else(|| not_found("task", task_id))
    }

    /// Non-archived emails, newest first.
    pub fn inbox(&self, user_id: &str, limit: usize) -> Result<Vec<EmailItem>, CalendarError> {
        self.read(user_id, |data| {
            let mut emails: Vec<EmailItem> =
                data.emails.iter().filter(|e| !e.archived).cloned().collect();
            emails.sort_by(|a, b| b.received_at.cmp(&a.received_at));
            emails.truncate(limit);
            emails
        })
    }

    pub fn archive_email(&self, user_id: &str, email_id: &str) -> Result<EmailItem, CalendarError> {
        self.write_user(user_id, |data| {
            let email = data.emails.iter_mut().find(|e| e.id == email_id)?;
            email.archived = true;
            Some(email.clone())
        })?
        .ok_or_else(|| not_found("email", email_id))
    }

    pub fn user_patterns(&self, user_id: &str) -> Result<UserPatterns, CalendarError> {
        self.read(user_id, |data| data.patterns.clone())
    }

    fn read<T>(&self, user_id: &str, f: impl FnOnce(&UserData) -> T) -> Result<T, CalendarError> {
        let users = self
            .users
            .read()
            .map_err(|e| CalendarError::Internal(e.to_string()))?;
        match users.get(user_id) {
            Some(data) => Ok(f(data)),
            None => Ok(f(&UserData::default())),
        }
    }

    fn write_user<T>(
        &self,
        user_id: &str,
        f: impl FnOnce(&mut UserData) -> T,
    ) -> Result<T, CalendarError> {
        self.write(|users| f(users.entry(user_id.to_string()).or_default()))
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, UserData>) -> T,
    ) -> Result<T, CalendarError> {
        let mut users = self
            .users
            .write()
            .map_err(|e| CalendarError::Internal(e.to_string()))?;
        Ok(f(&mut users))
    }
}

fn not_found(kind: &'static str, id: &str) -> CalendarError {
    CalendarError::NotFound {
        kind,
        id: id.to_string(),
    }
}

#[async_trait]
impl UserDataSource for InMemoryCalendar {
    async fn schedule_for(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<ScheduleBlock>, SourceError> {
        Ok(self.blocks_on(user_id, date)?)
    }

    async fn open_tasks(&self, user_id: &str) -> Result<Vec<TaskItem>, SourceError> {
        Ok(self.tasks(user_id, false)?)
    }

    async fn recent_emails(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<EmailItem>, SourceError> {
        Ok(self.inbox(user_id, limit)?)
    }

    async fn patterns(&self, user_id: &str) -> Result<UserPatterns, SourceError> {
        Ok(self.user_patterns(user_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "users": {
            "u1": {
                "schedule": [
                    {"id": "B2", "type": "meeting", "title": "Review", "start": "2024-07-10T14:00:00", "end": "2024-07-10T15:00:00"},
                    {"id": "B1", "title": "Deep work", "start": "2024-07-10T09:00:00", "end": "2024-07-10T11:00:00"},
                    {"id": "B3", "title": "Tomorrow", "start": "2024-07-11T09:00:00", "end": "2024-07-11T10:00:00"}
                ],
                "tasks": [
                    {"id": "T1", "title": "Write report"},
                    {"id": "T2", "title": "Old task", "completed": true}
                ],
                "emails": [
                    {"id": "E1", "from": "a@x.io", "subject": "Older", "receivedAt": "2024-07-09T08:00:00Z"},
                    {"id": "E2", "from": "b@x.io", "subject": "Newer", "receivedAt": "2024-07-10T08:00:00Z"}
                ]
            }
        }
    }"#;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 10).unwrap()
    }

    #[test]
    fn test_fixture_reads() {
        let calendar = InMemoryCalendar::from_json(FIXTURE).unwrap();
        let blocks = calendar.blocks_on("u1", day()).unwrap();
        let ids: Vec<&str> = blocks.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["B1", "B2"]);
        assert_eq!(blocks[0].block_type, "work");

        assert_eq!(calendar.tasks("u1", false).unwrap().len(), 1);
        assert_eq!(calendar.inbox("u1", 10).unwrap()[0].id, "E2");
        assert!(calendar.blocks_on("nobody", day()).unwrap().is_empty());
    }

    #[test]
    fn test_move_keeps_duration() {
        let calendar = InMemoryCalendar::from_json(FIXTURE).unwrap();
        let moved = calendar
            .move_block("u1", "B1", day().and_hms_opt(15, 0, 0).unwrap())
            .unwrap();
        assert_eq!(moved.end, day().and_hms_opt(17, 0, 0).unwrap());

        let err = calendar
            .move_block("u1", "missing", day().and_hms_opt(15, 0, 0).unwrap())
            .unwrap_err();
        assert!(matches!(err, CalendarError::NotFound { kind: "block", .. }));
    }

    #[test]
    fn test_mutations_are_per_user() {
        let calendar = InMemoryCalendar::from_json(FIXTURE).unwrap();
        calendar.complete_task("u1", "T1").unwrap();
        calendar.archive_email("u1", "E2").unwrap();
        assert!(calendar.tasks("u1", false).unwrap().is_empty());
        assert_eq!(calendar.inbox("u1", 10).unwrap().len(), 1);
        assert!(calendar.complete_task("u2", "T1").is_err());
    }

    #[test]
    fn test_data_source_view() {
        tokio_test::block_on(async {
            let calendar = InMemoryCalendar::from_json(FIXTURE).unwrap();
            let tasks = calendar.open_tasks("u1").await.unwrap();
            assert_eq!(tasks[0].id, "T1");
            let emails = calendar.recent_emails("u1", 1).await.unwrap();
            assert_eq!(emails.len(), 1);
        });
    }
}
