//! Inbox capabilities

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use cadence_core::capability::CapabilityMeta;
use cadence_core::{Capability, CapabilityContext, CapabilityInput, CapabilityResult};

use crate::calendar::InMemoryCalendar;
use crate::support::{calendar_failure, date_param, invalid};

const DEFAULT_EMAIL_LIMIT: usize = 20;

pub struct EmailList {
    calendar: Arc<InMemoryCalendar>,
}

impl EmailList {
    pub fn new(calendar: Arc<InMemoryCalendar>) -> Self {
        Self { calendar }
    }
}

#[async_trait]
impl Capability for EmailList {
    fn name(&self) -> &str {
        "email_list"
    }

    fn description(&self) -> &str {
        "List inbox emails, newest first; with a date, only emails received that day"
    }

    fn metadata(&self) -> CapabilityMeta {
        CapabilityMeta::new(self.name(), self.description()).with_parameter_schema(json!({
            "type": "object",
            "properties": {
                "date": {"type": "string", "description": "YYYY-MM-DD"},
                "limit": {"type": "integer", "minimum": 1, "maximum": 100},
                "unreadOnly": {"type": "boolean"}
            },
            "additionalProperties": false
        }))
    }

    async fn execute(&self, input: CapabilityInput, ctx: CapabilityContext) -> CapabilityResult {
        let day = match input.str_param("date") {
            Some(_) => match date_param(&input, "date", &ctx) {
                Ok(date) => Some(date),
                Err(result) => return result,
            },
            None => None,
        };
        let limit = input
            .u64_param("limit")
            .map(|l| l as usize)
            .unwrap_or(DEFAULT_EMAIL_LIMIT);
        let unread_only = input
            .get_param("/unreadOnly")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let tz = ctx.temporal.tz();
        match self.calendar.inbox(&ctx.user_id, usize::MAX) {
            Ok(emails) => {
                let emails: Vec<_> = emails
                    .into_iter()
                    .filter(|e| !unread_only || !e.is_read)
                    .filter(|e| {
                        day.map_or(true, |d| e.received_at.with_timezone(&tz).date_naive() == d)
                    })
                    .take(limit)
                    .collect();
                let needs_response = emails.iter().filter(|e| e.needs_response).count();
                CapabilityResult::success(json!({
                    "count": emails.len(),
                    "needsResponse": needs_response,
                    "emails": emails,
                }))
            }
            Err(error) => calendar_failure(error),
        }
    }
}

pub struct EmailArchive {
    calendar: Arc<InMemoryCalendar>,
}

impl EmailArchive {
    pub fn new(calendar: Arc<InMemoryCalendar>) -> Self {
        Self { calendar }
    }
}

#[async_trait]
impl Capability for EmailArchive {
    fn name(&self) -> &str {
        "email_archive"
    }

    fn description(&self) -> &str {
        "Archive one email"
    }

    fn metadata(&self) -> CapabilityMeta {
        CapabilityMeta::new(self.name(), self.description()).with_parameter_schema(json!({
            "type": "object",
            "required": ["emailId"],
            "properties": {
                "emailId": {"type": "string", "minLength": 1}
            },
            "additionalProperties": false
        }))
    }

    async fn execute(&self, input: CapabilityInput, ctx: CapabilityContext) -> CapabilityResult {
        let Some(email_id) = input.str_param("emailId") else {
            return invalid("emailId is required");
        };
        match self.calendar.archive_email(&ctx.user_id, email_id) {
            Ok(email) => CapabilityResult::success(json!({ "email": email })),
            Err(error) => calendar_failure(error),
        }
    }
}
