//! Timestamp parsing and interval checks used by the `compare_time`
//! validators.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

const FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Inequality {
    GreaterThan,
    LessThan,
    Equals,
}

impl Inequality {
    pub fn holds(self, actual: i64, expected: i64) -> bool {
        match self {
            Inequality::GreaterThan => actual > expected,
            Inequality::LessThan => actual < expected,
            Inequality::Equals => actual == expected,
        }
    }
}

impl fmt::Display for Inequality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Inequality::GreaterThan => "greater than",
            Inequality::LessThan => "less than",
            Inequality::Equals => "equal to",
        })
    }
}

/// Parse a textual timestamp: ISO date-time (with `T` or space), RFC 3339
/// or a plain date at midnight.
pub fn parse(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.naive_utc()))
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Interpret a JSON value as a timestamp. Arrays follow the
/// `[year, month, day, hour, minute, second, nanos]` layout, where every
/// element after the day is optional.
pub fn from_json(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::String(text) => parse(text),
        Value::Array(items) => {
            let numbers: Vec<i64> = items.iter().map(Value::as_i64).collect::<Option<_>>()?;
            let field = |idx: usize| numbers.get(idx).copied().unwrap_or(0);
            if numbers.len() < 3 {
                return None;
            }
            let date = NaiveDate::from_ymd_opt(
                i32::try_from(field(0)).ok()?,
                u32::try_from(field(1)).ok()?,
                u32::try_from(field(2)).ok()?,
            )?;
            date.and_hms_nano_opt(
                u32::try_from(field(3)).ok()?,
                u32::try_from(field(4)).ok()?,
                u32::try_from(field(5)).ok()?,
                u32::try_from(field(6)).ok()?,
            )
        }
        _ => None,
    }
}

/// Absolute difference between two timestamps in milliseconds.
pub fn difference_ms(first: NaiveDateTime, second: NaiveDateTime) -> i64 {
    (second - first).num_milliseconds().abs()
}

/// Check that the distance between `first` and `second` relates to
/// `interval` (milliseconds) as `inequality` demands.
pub fn check_interval(
    first: NaiveDateTime,
    second: NaiveDateTime,
    interval: i64,
    inequality: Inequality,
) -> Result<(), String> {
    let difference = difference_ms(first, second);
    if inequality.holds(difference, interval) {
        Ok(())
    } else {
        Err(format!(
            "The interval is {difference} ms, expected {inequality} {interval} ms"
        ))
    }
}
