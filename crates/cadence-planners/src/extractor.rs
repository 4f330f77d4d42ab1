//! Deterministic entity extraction
//!
//! Pure functions over the utterance and the temporal frame. Every relative
//! date is anchored on the viewing date, never on the wall clock.

use std::ops::Range;
use std::sync::OnceLock;

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use regex::Regex;

use cadence_core::types::{EntityKind, ResolvedEntities, ResolvedValue, TemporalFrame};

/// Confidence of a bare "at N" time, which is below the logging threshold.
pub const BARE_HOUR_CONFIDENCE: f32 = 0.6;

/// Entities found in one utterance, grouped by category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedEntities {
    pub dates: Vec<ResolvedValue>,
    pub times: Vec<ResolvedValue>,
    /// Values are whole minutes.
    pub durations: Vec<ResolvedValue>,
    pub people: Vec<ResolvedValue>,
}

impl ExtractedEntities {
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates
            .first()
            .and_then(|d| NaiveDate::parse_from_str(&d.value, "%Y-%m-%d").ok())
    }

    pub fn first_time(&self) -> Option<&str> {
        self.times.first().map(|t| t.value.as_str())
    }

    pub fn first_duration_minutes(&self) -> Option<u32> {
        self.durations.first().and_then(|d| d.value.parse().ok())
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
            && self.times.is_empty()
            && self.durations.is_empty()
            && self.people.is_empty()
    }

    /// Durations and people go to `entities`, tagged with their kind.
    pub fn into_resolved(self) -> ResolvedEntities {
        let mut entities = self.durations;
        entities.extend(self.people);
        ResolvedEntities {
            dates: self.dates,
            times: self.times,
            entities,
        }
    }
}

fn iso_date_regex() -> &'static Regex {
    static ISO_DATE_RE: OnceLock<Regex> = OnceLock::new();
    ISO_DATE_RE.get_or_init(|| {
        Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("iso date regex must compile")
    })
}

fn relative_day_regex() -> &'static Regex {
    static RELATIVE_DAY_RE: OnceLock<Regex> = OnceLock::new();
    RELATIVE_DAY_RE.get_or_init(|| {
        Regex::new(r"(?i)\b(today|tonight|tomorrow|yesterday)\b")
            .expect("relative day regex must compile")
    })
}

fn weekday_regex() -> &'static Regex {
    static WEEKDAY_RE: OnceLock<Regex> = OnceLock::new();
    WEEKDAY_RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:(next|this)\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b",
        )
        .expect("weekday regex must compile")
    })
}

fn month_day_regex() -> &'static Regex {
    static MONTH_DAY_RE: OnceLock<Regex> = OnceLock::new();
    MONTH_DAY_RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?\s+(\d{1,2})(?:st|nd|rd|th)?\b",
        )
        .expect("month day regex must compile")
    })
}

fn meridiem_time_regex() -> &'static Regex {
    static MERIDIEM_TIME_RE: OnceLock<Regex> = OnceLock::new();
    MERIDIEM_TIME_RE.get_or_init(|| {
        Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*([ap])\.?m\b\.?")
            .expect("meridiem time regex must compile")
    })
}

fn clock_time_regex() -> &'static Regex {
    static CLOCK_TIME_RE: OnceLock<Regex> = OnceLock::new();
    CLOCK_TIME_RE.get_or_init(|| {
        Regex::new(r"\b([01]?\d|2[0-3]):([0-5]\d)\b").expect("clock time regex must compile")
    })
}

fn named_time_regex() -> &'static Regex {
    static NAMED_TIME_RE: OnceLock<Regex> = OnceLock::new();
    NAMED_TIME_RE.get_or_init(|| {
        Regex::new(r"(?i)\b(noon|midday|midnight)\b").expect("named time regex must compile")
    })
}

fn bare_hour_regex() -> &'static Regex {
    static BARE_HOUR_RE: OnceLock<Regex> = OnceLock::new();
    BARE_HOUR_RE.get_or_init(|| {
        Regex::new(r"(?i)\bat\s+(\d{1,2})\b").expect("bare hour regex must compile")
    })
}

fn duration_regex() -> &'static Regex {
    static DURATION_RE: OnceLock<Regex> = OnceLock::new();
    DURATION_RE.get_or_init(|| {
        Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s*(minutes?|mins?|hours?|hrs?|h)\b")
            .expect("duration regex must compile")
    })
}

fn worded_duration_regex() -> &'static Regex {
    static WORDED_DURATION_RE: OnceLock<Regex> = OnceLock::new();
    WORDED_DURATION_RE.get_or_init(|| {
        Regex::new(r"(?i)\b(half an hour|an hour and a half|an hour|a quarter of an hour)\b")
            .expect("worded duration regex must compile")
    })
}

fn person_regex() -> &'static Regex {
    static PERSON_RE: OnceLock<Regex> = OnceLock::new();
    PERSON_RE.get_or_init(|| {
        Regex::new(r"\b[Ww]ith\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)")
            .expect("person regex must compile")
    })
}

fn pronoun_regex() -> &'static Regex {
    static PRONOUN_RE: OnceLock<Regex> = OnceLock::new();
    PRONOUN_RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(it|them|that one|this one|the same one)\b|\b(that|this)\s*(?:(?:to|at|until|from|for|on|off)\b|[.?!]|$)",
        )
        .expect("pronoun regex must compile")
    })
}

/// Words that are never names even when capitalised after "with".
const NON_NAMES: [&str; 8] = [
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday", "Team",
];

/// Extract dates, times, durations and people from an utterance.
pub fn extract_entities(utterance: &str, temporal: &TemporalFrame) -> ExtractedEntities {
    let anchor = temporal.viewing_date;
    let mut extracted = ExtractedEntities::default();

    for caps in iso_date_regex().captures_iter(utterance) {
        let parsed = (|| {
            let year = caps.get(1)?.as_str().parse().ok()?;
            let month = caps.get(2)?.as_str().parse().ok()?;
            let day = caps.get(3)?.as_str().parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        })();
        if let (Some(date), Some(whole)) = (parsed, caps.get(0)) {
            extracted.dates.push(date_value(whole.as_str(), date, 0.99));
        }
    }

    for caps in relative_day_regex().captures_iter(utterance) {
        let Some(word) = caps.get(1) else { continue };
        let offset = match word.as_str().to_ascii_lowercase().as_str() {
            "today" | "tonight" => 0,
            "tomorrow" => 1,
            _ => -1,
        };
        extracted
            .dates
            .push(date_value(word.as_str(), anchor + Duration::days(offset), 0.95));
    }

    for caps in weekday_regex().captures_iter(utterance) {
        let (Some(whole), Some(day)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        let Ok(target) = day.as_str().parse::<Weekday>() else {
            continue;
        };
        let forced_next = caps
            .get(1)
            .is_some_and(|m| m.as_str().eq_ignore_ascii_case("next"));
        let date = next_weekday(anchor, target, forced_next);
        extracted.dates.push(date_value(whole.as_str(), date, 0.9));
    }

    for caps in month_day_regex().captures_iter(utterance) {
        let (Some(whole), Some(month), Some(day)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let Some(month) = month_number(month.as_str()) else {
            continue;
        };
        let Ok(day) = day.as_str().parse::<u32>() else {
            continue;
        };
        if let Some(date) = NaiveDate::from_ymd_opt(anchor.year(), month, day) {
            extracted.dates.push(date_value(whole.as_str(), date, 0.9));
        }
    }

    extracted.times = extract_times(utterance);
    extracted.durations = extract_durations(utterance);

    for caps in person_regex().captures_iter(utterance) {
        let Some(name) = caps.get(1) else { continue };
        let first_word = name.as_str().split_whitespace().next().unwrap_or_default();
        if NON_NAMES.contains(&first_word) {
            continue;
        }
        extracted.people.push(
            ResolvedValue::new(name.as_str(), name.as_str(), 0.8).with_kind("person"),
        );
    }

    extracted
}

fn extract_times(utterance: &str) -> Vec<ResolvedValue> {
    let mut taken: Vec<Range<usize>> = Vec::new();
    let mut times: Vec<(usize, ResolvedValue)> = Vec::new();

    for caps in meridiem_time_regex().captures_iter(utterance) {
        let Some(whole) = caps.get(0) else { continue };
        let hour: u32 = caps.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(99);
        let minute: u32 = caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
        let pm = caps
            .get(3)
            .is_some_and(|m| m.as_str().eq_ignore_ascii_case("p"));
        if !(1..=12).contains(&hour) {
            continue;
        }
        let hour24 = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, true) => h + 12,
            (h, false) => h,
        };
        if let Some(time) = NaiveTime::from_hms_opt(hour24, minute, 0) {
            taken.push(whole.range());
            times.push((whole.start(), time_value(whole.as_str().trim(), time, 0.95)));
        }
    }

    for caps in clock_time_regex().captures_iter(utterance) {
        let Some(whole) = caps.get(0) else { continue };
        if overlaps(&taken, &whole.range()) {
            continue;
        }
        let (Some(hour_digits), Some(minute_digits)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let (Ok(hour), Ok(minute)) = (
            hour_digits.as_str().parse::<u32>(),
            minute_digits.as_str().parse::<u32>(),
        ) else {
            continue;
        };
        // "3:30" reads like "at 3"; "03:30" is an explicit 24-hour time.
        let unpadded_afternoon = hour_digits.as_str().len() == 1 && (1..=7).contains(&hour);
        let (hour24, confidence) = if unpadded_afternoon {
            (hour + 12, BARE_HOUR_CONFIDENCE)
        } else {
            (hour, 0.9)
        };
        if let Some(time) = NaiveTime::from_hms_opt(hour24, minute, 0) {
            taken.push(whole.range());
            times.push((whole.start(), time_value(whole.as_str(), time, confidence)));
        }
    }

    for caps in named_time_regex().captures_iter(utterance) {
        let Some(word) = caps.get(1) else { continue };
        let hour = if word.as_str().eq_ignore_ascii_case("midnight") {
            0
        } else {
            12
        };
        if let Some(time) = NaiveTime::from_hms_opt(hour, 0, 0) {
            taken.push(word.range());
            times.push((word.start(), time_value(word.as_str(), time, 0.95)));
        }
    }

    for caps in bare_hour_regex().captures_iter(utterance) {
        let (Some(whole), Some(digits)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if overlaps(&taken, &digits.range()) || followed_by_duration_unit(utterance, whole.end()) {
            continue;
        }
        let Ok(hour) = digits.as_str().parse::<u32>() else {
            continue;
        };
        // 1-7 without am/pm almost always means afternoon.
        let hour24 = match hour {
            1..=7 => hour + 12,
            8..=23 => hour,
            _ => continue,
        };
        if let Some(time) = NaiveTime::from_hms_opt(hour24, 0, 0) {
            times.push((
                whole.start(),
                time_value(whole.as_str(), time, BARE_HOUR_CONFIDENCE),
            ));
        }
    }

    times.sort_by_key(|(start, _)| *start);
    times.into_iter().map(|(_, value)| value).collect()
}

fn extract_durations(utterance: &str) -> Vec<ResolvedValue> {
    let mut durations: Vec<(usize, ResolvedValue)> = Vec::new();
    let mut taken: Vec<Range<usize>> = Vec::new();

    for caps in worded_duration_regex().captures_iter(utterance) {
        let Some(phrase) = caps.get(1) else { continue };
        let minutes = match phrase.as_str().to_ascii_lowercase().as_str() {
            "half an hour" => 30,
            "an hour and a half" => 90,
            "a quarter of an hour" => 15,
            _ => 60,
        };
        taken.push(phrase.range());
        durations.push((phrase.start(), duration_value(phrase.as_str(), minutes)));
    }

    for caps in duration_regex().captures_iter(utterance) {
        let (Some(whole), Some(amount), Some(unit)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        if overlaps(&taken, &whole.range()) {
            continue;
        }
        let Ok(amount) = amount.as_str().parse::<f64>() else {
            continue;
        };
        let per_unit = if unit.as_str().to_ascii_lowercase().starts_with('h') {
            60.0
        } else {
            1.0
        };
        let minutes = (amount * per_unit).round();
        if minutes >= 1.0 {
            durations.push((whole.start(), duration_value(whole.as_str(), minutes as u32)));
        }
    }

    durations.sort_by_key(|(start, _)| *start);
    durations.into_iter().map(|(_, value)| value).collect()
}

/// The bare pronoun in an utterance, if any ("it", "that one", ...).
pub fn find_pronoun(utterance: &str) -> Option<String> {
    pronoun_regex()
        .captures_iter(utterance)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        // skip contractions such as "it's"
        .find(|m| !matches!(utterance[m.end()..].chars().next(), Some('\'' | '\u{2019}')))
        .map(|m| m.as_str().to_string())
}

/// Entity kind an utterance is most likely about, from its vocabulary.
pub fn expected_entity_kind(utterance: &str) -> Option<EntityKind> {
    let lowered = utterance.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| contains_word(&lowered, w));
    if has(&["task", "tasks", "todo", "to-do", "complete", "finish", "done"]) {
        Some(EntityKind::Task)
    } else if has(&["email", "emails", "inbox", "reply", "archive", "mail"]) {
        Some(EntityKind::Email)
    } else if has(&[
        "move", "reschedule", "push", "shift", "block", "meeting", "cancel", "delete", "extend",
        "schedule", "calendar",
    ]) {
        Some(EntityKind::Block)
    } else {
        None
    }
}

/// Whole-word containment over an already lower-cased haystack.
pub(crate) fn contains_word(haystack: &str, word: &str) -> bool {
    haystack
        .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '\''))
        .any(|token| token == word)
}

fn next_weekday(anchor: NaiveDate, target: Weekday, forced_next: bool) -> NaiveDate {
    let current = anchor.weekday().num_days_from_monday() as i64;
    let wanted = target.num_days_from_monday() as i64;
    let mut delta = (wanted - current).rem_euclid(7);
    if forced_next && delta == 0 {
        delta = 7;
    }
    anchor + Duration::days(delta)
}

fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.to_ascii_lowercase().chars().take(3).collect();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn overlaps(taken: &[Range<usize>], candidate: &Range<usize>) -> bool {
    taken
        .iter()
        .any(|range| range.start < candidate.end && candidate.start < range.end)
}

fn followed_by_duration_unit(utterance: &str, end: usize) -> bool {
    let rest = utterance[end..].trim_start().to_ascii_lowercase();
    ["min", "hour", "hr", "h "].iter().any(|unit| rest.starts_with(unit))
}

fn date_value(original: &str, date: NaiveDate, confidence: f32) -> ResolvedValue {
    ResolvedValue::new(original, date.format("%Y-%m-%d").to_string(), confidence).with_kind("date")
}

fn time_value(original: &str, time: NaiveTime, confidence: f32) -> ResolvedValue {
    ResolvedValue::new(original, time.format("%H:%M").to_string(), confidence).with_kind("time")
}

fn duration_value(original: &str, minutes: u32) -> ResolvedValue {
    ResolvedValue::new(original, minutes.to_string(), 0.9).with_kind("duration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    /// now = Wednesday 2024-07-10, viewing Thursday 2024-07-04
    fn frame() -> TemporalFrame {
        let now = Utc.with_ymd_and_hms(2024, 7, 10, 15, 0, 0).unwrap();
        TemporalFrame::new(now, "UTC", NaiveDate::from_ymd_opt(2024, 7, 4))
    }

    fn dates(utterance: &str) -> Vec<String> {
        extract_entities(utterance, &frame())
            .dates
            .into_iter()
            .map(|d| d.value)
            .collect()
    }

    fn times(utterance: &str) -> Vec<String> {
        extract_entities(utterance, &frame())
            .times
            .into_iter()
            .map(|t| t.value)
            .collect()
    }

    #[test]
    fn test_today_resolves_to_viewing_date_not_now() {
        assert_eq!(dates("what do I have today"), vec!["2024-07-04"]);
        assert_eq!(dates("Tomorrow please"), vec!["2024-07-05"]);
        assert_eq!(dates("like yesterday"), vec!["2024-07-03"]);
    }

    #[test]
    fn test_weekdays_anchor_on_viewing_date() {
        assert_eq!(dates("on friday"), vec!["2024-07-05"]);
        assert_eq!(dates("thursday works"), vec!["2024-07-04"]);
        assert_eq!(dates("next thursday"), vec!["2024-07-11"]);
        assert_eq!(dates("monday"), vec!["2024-07-08"]);
    }

    #[test]
    fn test_explicit_dates() {
        assert_eq!(dates("on 2024-08-01"), vec!["2024-08-01"]);
        assert_eq!(dates("July 20th"), vec!["2024-07-20"]);
        assert!(dates("on 2024-02-30").is_empty());
    }

    #[test]
    fn test_times_in_all_shapes() {
        assert_eq!(times("move it to 3pm"), vec!["15:00"]);
        assert_eq!(times("at 9:30 am"), vec!["09:30"]);
        assert_eq!(times("12am or 12 p.m."), vec!["00:00", "12:00"]);
        assert_eq!(times("from 14:15"), vec!["14:15"]);
        assert_eq!(times("lunch at noon"), vec!["12:00"]);
    }

    #[test]
    fn test_bare_hour_is_low_confidence_afternoon() {
        let extracted = extract_entities("call at 3", &frame());
        assert_eq!(extracted.times.len(), 1);
        assert_eq!(extracted.times[0].value, "15:00");
        assert!(extracted.times[0].confidence < 0.7);

        assert_eq!(times("at 10"), vec!["10:00"]);
        assert!(times("at 2 hours").is_empty());
    }

    #[test]
    fn test_unpadded_clock_time_reads_as_afternoon() {
        let extracted = extract_entities("move team standup to 3:30", &frame());
        assert_eq!(extracted.times[0].value, "15:30");
        assert!(extracted.times[0].confidence < 0.7);

        assert_eq!(times("at 03:30"), vec!["03:30"]);
        assert_eq!(times("at 9:45"), vec!["09:45"]);
        assert_eq!(times("at 3:30 am"), vec!["03:30"]);
    }

    #[test]
    fn test_durations_and_people() {
        let extracted = extract_entities("Meet with Sarah Chen for half an hour then 2 hours of focus", &frame());
        let minutes: Vec<&str> = extracted.durations.iter().map(|d| d.value.as_str()).collect();
        assert_eq!(minutes, vec!["30", "120"]);
        assert_eq!(extracted.people[0].value, "Sarah Chen");
        assert_eq!(extracted.first_duration_minutes(), Some(30));

        let resolved = extracted.into_resolved();
        assert_eq!(resolved.entities.len(), 3);
        assert!(extract_entities("sync with Friday team", &frame()).people.is_empty());
    }

    #[test]
    fn test_pronoun_detection() {
        assert_eq!(find_pronoun("Schedule it").as_deref(), Some("it"));
        assert_eq!(find_pronoun("move that to 4pm").as_deref(), Some("that"));
        assert_eq!(find_pronoun("delete this one").as_deref(), Some("this one"));
        assert!(find_pronoun("this friday looks busy").is_none());
        assert!(find_pronoun("show my items").is_none());
        assert!(find_pronoun("it's a busy day").is_none());
        assert_eq!(find_pronoun("it's late, cancel it").as_deref(), Some("it"));
    }

    #[test]
    fn test_expected_kind_from_vocabulary() {
        assert_eq!(expected_entity_kind("mark it done"), Some(EntityKind::Task));
        assert_eq!(expected_entity_kind("archive that"), Some(EntityKind::Email));
        assert_eq!(expected_entity_kind("move it to 3pm"), Some(EntityKind::Block));
        assert_eq!(expected_entity_kind("what about it"), None);
    }
}
