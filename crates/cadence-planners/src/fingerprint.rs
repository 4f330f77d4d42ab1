//! Response cache key

use chrono::Timelike;
use sha2::{Digest, Sha256};

use cadence_core::types::ContextSnapshot;

/// Lower-case, collapse whitespace, strip trailing punctuation.
pub fn normalize_utterance(utterance: &str) -> String {
    utterance
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .trim_end_matches(['.', '?', '!'])
        .trim_end()
        .to_string()
}

/// SHA-256 hex over the user, the normalized utterance and the context
/// fields that change how it should be read. Plans carry entity ids, so keys
/// never cross users.
pub fn cache_key(utterance: &str, context: &ContextSnapshot) -> String {
    let material = format!(
        "{}|{}|{}|{}|{}|{}",
        context.user_id,
        normalize_utterance(utterance),
        context.temporal.local_now().hour(),
        !context.state.schedule.is_empty(),
        context.state.tasks.len(),
        context.temporal.viewing_date,
    );
    hex::encode(Sha256::digest(material.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn context_at(hour: u32) -> ContextSnapshot {
        let now = Utc.with_ymd_and_hms(2024, 7, 10, hour, 15, 0).unwrap();
        ContextSnapshot::minimal("u1", now, "UTC", None)
    }

    #[test]
    fn test_normalization() {
        assert_eq!(normalize_utterance("  Move   IT to 3pm?! "), "move it to 3pm");
    }

    #[test]
    fn test_equivalent_utterances_share_a_key() {
        let ctx = context_at(9);
        assert_eq!(cache_key("Plan my day.", &ctx), cache_key("plan  my day", &ctx));
        assert_eq!(cache_key("plan my day", &ctx).len(), 64);
    }

    #[test]
    fn test_context_changes_the_key() {
        let base = cache_key("plan my day", &context_at(9));
        assert_ne!(base, cache_key("plan my day", &context_at(10)));

        let mut other_day = context_at(9);
        other_day.temporal.viewing_date = NaiveDate::from_ymd_opt(2024, 7, 11).unwrap();
        assert_ne!(base, cache_key("plan my day", &other_day));
    }

    #[test]
    fn test_users_never_share_a_key() {
        let alice = context_at(9);
        let mut bob = context_at(9);
        bob.user_id = "u2".to_string();
        assert_ne!(
            cache_key("move sync to 3pm", &alice),
            cache_key("move sync to 3pm", &bob)
        );
    }
}
