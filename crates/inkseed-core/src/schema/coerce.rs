//! Bounded coercions from loosely-typed JSON values.
//!
//! Optional fields that cannot be coerced are dropped with a warning; numeric
//! fields outside their valid range are clamped with a warning. Only the
//! extractors in the record modules decide when a record must be rejected.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::warn;

static FIRST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());

static FOUR_DIGIT_YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d{4})\b").unwrap());

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

static NON_SLUG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Trimmed non-empty string from a string, number or bool.
pub fn as_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// List of strings from an array, or a comma/semicolon separated string.
///
/// Array items may be strings or objects carrying a `name` field.
pub fn as_text_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(obj) => obj.get("name").and_then(as_text),
                other => as_text(other),
            })
            .collect(),
        Value::String(s) => s
            .split(|c: char| c == ',' || c == ';')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Object(obj) => obj.get("name").and_then(as_text).into_iter().collect(),
        other => as_text(other).into_iter().collect(),
    }
}

/// Number from a JSON number, a numeric string, or the first number in a
/// label such as `"Chapter 12.5"`.
pub fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed.parse::<f64>().ok().or_else(|| {
                FIRST_NUMBER
                    .find(trimmed)
                    .and_then(|m| m.as_str().parse::<f64>().ok())
            })
        }
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

/// Clamp `value` into `[min, max]`, warning when it had to move.
pub fn clamp_f64(value: f64, min: f64, max: f64, field: &str, record: &str) -> f64 {
    if value < min || value > max {
        let clamped = value.clamp(min, max);
        warn!(
            "{}: {} value {} out of range [{}, {}], clamped to {}",
            record, field, value, min, max, clamped
        );
        clamped
    } else {
        value
    }
}

/// Clamp an integer into `[min, max]`, warning when it had to move.
pub fn clamp_i64(value: i64, min: i64, max: i64, field: &str, record: &str) -> i64 {
    if value < min || value > max {
        let clamped = value.clamp(min, max);
        warn!(
            "{}: {} value {} out of range [{}, {}], clamped to {}",
            record, field, value, min, max, clamped
        );
        clamped
    } else {
        value
    }
}

/// Year from a number, a date string, or any text containing a 4-digit year.
pub fn as_year(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => FOUR_DIGIT_YEAR
            .captures(s)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok()),
        _ => None,
    }
}

/// Timestamp from RFC 3339, a plain `YYYY-MM-DD` date, or unix seconds/millis.
pub fn as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let raw = n.as_i64()?;
            // Values this large are milliseconds
            if raw.abs() >= 100_000_000_000 {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            let date_part = s.get(..10).unwrap_or(s);
            NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        _ => None,
    }
}

/// Lowercased email, or `None` when it does not look like an address.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    EMAIL.is_match(&email).then_some(email)
}

/// URL-safe slug: lowercase ASCII alphanumerics separated by single hyphens.
pub fn slugify(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    NON_SLUG
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// Render an episode number without a trailing `.0`.
pub fn format_number(number: f64) -> String {
    if number.fract() == 0.0 {
        format!("{}", number as i64)
    } else {
        format!("{}", number)
    }
}
