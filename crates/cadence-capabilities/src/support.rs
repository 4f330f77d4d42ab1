//! Parameter parsing and error mapping shared by the built-ins

use chrono::{NaiveDate, NaiveTime};

use cadence_core::codes;
use cadence_core::{CapabilityContext, CapabilityInput, CapabilityResult};

use crate::calendar::CalendarError;

pub const BLOCK_NOT_FOUND: &str = "BLOCK_NOT_FOUND";
pub const TASK_NOT_FOUND: &str = "TASK_NOT_FOUND";
pub const EMAIL_NOT_FOUND: &str = "EMAIL_NOT_FOUND";
pub const SCHEDULE_CONFLICT: &str = "SCHEDULE_CONFLICT";

pub(crate) fn invalid(message: impl Into<String>) -> CapabilityResult {
    CapabilityResult::error_with_code(codes::INVALID_PARAMETERS, message)
}

/// `date` parameter, defaulting to the viewing date.
pub(crate) fn date_param(
    input: &CapabilityInput,
    key: &str,
    ctx: &CapabilityContext,
) -> Result<NaiveDate, CapabilityResult> {
    match input.str_param(key) {
        None => Ok(ctx.viewing_date()),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| invalid(format!("{key} must be YYYY-MM-DD, got '{raw}'"))),
    }
}

pub(crate) fn time_param(
    input: &CapabilityInput,
    key: &str,
) -> Result<NaiveTime, CapabilityResult> {
    let raw = input
        .str_param(key)
        .ok_or_else(|| invalid(format!("{key} is required")))?;
    parse_time(raw).ok_or_else(|| invalid(format!("{key} must be HH:MM, got '{raw}'")))
}

pub(crate) fn required_str<'a>(
    input: &'a CapabilityInput,
    key: &str,
) -> Result<&'a str, CapabilityResult> {
    input
        .str_param(key)
        .ok_or_else(|| invalid(format!("{key} is required")))
}

pub(crate) fn parse_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

/// Missing entities are the caller's mistake; lock failures may clear up.
pub(crate) fn calendar_failure(error: CalendarError) -> CapabilityResult {
    match &error {
        CalendarError::NotFound { kind, .. } => {
            let code = match *kind {
                "block" => BLOCK_NOT_FOUND,
                "task" => TASK_NOT_FOUND,
                "email" => EMAIL_NOT_FOUND,
                _ => codes::EXECUTION_FAILED,
            };
            CapabilityResult::error_with_code(code, error.to_string())
        }
        _ => CapabilityResult::recoverable(error.to_string()),
    }
}
