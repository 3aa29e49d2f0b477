use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use atrium_store::TaskPriority;

/// Strip a trailing `high`/`low` token from a task description.
pub fn split_priority(rest: &str) -> (&str, TaskPriority) {
    if let Some(stripped) = strip_suffix_token(rest, "high") {
        return (stripped, TaskPriority::High);
    }
    if let Some(stripped) = strip_suffix_token(rest, "low") {
        return (stripped, TaskPriority::Low);
    }
    (rest, TaskPriority::Normal)
}

fn strip_suffix_token<'a>(text: &'a str, token: &str) -> Option<&'a str> {
    let trimmed = text.trim_end();
    let stripped = trimmed
        .strip_suffix(token)
        .or_else(|| trimmed.strip_suffix(&token.to_ascii_uppercase()))?;
    // The token must stand alone, not end a longer word.
    let stripped = stripped.strip_suffix(' ')?;
    let stripped = stripped.trim_end();
    if stripped.is_empty() {
        return None;
    }
    Some(stripped)
}

/// Split a trailing "when" clause off an event description.
///
/// Recognized suffixes, checked longest-first by simple token stripping:
/// `today`/`tomorrow` plus an optional time (`15`, `3pm`, `9:30`,
/// `9:30am`), or a literal `YYYY-MM-DD` date. Anything unparseable is
/// left in the description and the event lands "now".
pub fn split_when(rest: &str, now: DateTime<Utc>) -> (String, DateTime<Utc>) {
    let tokens: Vec<&str> = rest.split_whitespace().collect();

    // day + time
    if tokens.len() >= 3 {
        let day = tokens[tokens.len() - 2];
        let time = tokens[tokens.len() - 1];
        if let (Some(date), Some(time)) = (parse_day(day, now), parse_time(time)) {
            let description = tokens[..tokens.len() - 2].join(" ");
            return (description, date.and_time(time).and_utc());
        }
    }

    if tokens.len() >= 2 {
        let last = tokens[tokens.len() - 1];
        let description = tokens[..tokens.len() - 1].join(" ");

        // bare day: keep the current time of day
        if let Some(date) = parse_day(last, now) {
            return (description, date.and_time(now.time()).and_utc());
        }
        // literal date
        if let Ok(date) = NaiveDate::parse_from_str(last, "%Y-%m-%d") {
            let start = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
            return (description, date.and_time(start).and_utc());
        }
    }

    (rest.trim().to_string(), now)
}

fn parse_day(token: &str, now: DateTime<Utc>) -> Option<NaiveDate> {
    match token.to_ascii_lowercase().as_str() {
        "today" => Some(now.date_naive()),
        "tomorrow" => Some(now.date_naive() + Duration::days(1)),
        _ => None,
    }
}

/// Parse `H`, `H:MM`, `Ham/pm`, or `H:MMam/pm` into a time of day.
fn parse_time(token: &str) -> Option<NaiveTime> {
    let lower = token.to_ascii_lowercase();
    let (clock, meridiem) = if let Some(stripped) = lower.strip_suffix("am") {
        (stripped, Some(false))
    } else if let Some(stripped) = lower.strip_suffix("pm") {
        (stripped, Some(true))
    } else {
        (lower.as_str(), None)
    };

    let (hour_part, minute_part) = match clock.split_once(':') {
        Some((h, m)) => (h, Some(m)),
        None => (clock, None),
    };

    let mut hour: u32 = hour_part.parse().ok()?;
    let minute: u32 = match minute_part {
        Some(m) => m.parse().ok()?,
        None => 0,
    };

    match meridiem {
        Some(pm) => {
            if hour == 0 || hour > 12 {
                return None;
            }
            if pm && hour != 12 {
                hour += 12;
            } else if !pm && hour == 12 {
                hour = 0;
            }
        }
        None => {
            if hour > 23 {
                return None;
            }
        }
    }

    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn kv_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(\w+)=("([^"]*)"|\S+)"#).unwrap())
}

/// Tokenize a `/skill` remainder into invocation parameters.
///
/// One regex pass extracts `key=value` pairs (values may be quoted). If
/// none are present, the whole remainder becomes a single `input`
/// parameter.
pub fn parse_skill_params(rest: &str) -> Map<String, Value> {
    let mut params = Map::new();
    for capture in kv_regex().captures_iter(rest) {
        let key = capture[1].to_string();
        let value = capture
            .get(3)
            .map(|quoted| quoted.as_str())
            .unwrap_or(&capture[2]);
        params.insert(key, Value::String(value.to_string()));
    }

    if params.is_empty() && !rest.trim().is_empty() {
        params.insert(
            "input".to_string(),
            Value::String(rest.trim().to_string()),
        );
    }
    params
}
