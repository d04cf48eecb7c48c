//! Calendar date canonicalization.
//!
//! Two tiers: [`canonicalize_date`] is the lenient best-effort path for
//! caller-supplied input and never fails; [`parse_strict_date`] validates a
//! canonical `YYYY-MM-DD` string for trusted internal paths.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde_json::Value;
use thiserror::Error;

const CANONICAL_FORMAT: &str = "%Y-%m-%d";

/// Loose date formats tried after RFC 3339 / RFC 2822.
const LENIENT_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d %Y",
    "%B %d %Y",
    "%b %d, %Y",
    "%B %d, %Y",
];

/// Heterogeneous date input accepted by [`canonicalize_date`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateInput<'a> {
    Absent,
    Text(&'a str),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    EpochMillis(i64),
    /// A value with no date reading (booleans, arrays, objects).
    Unparsable,
}

impl<'a> From<Option<&'a Value>> for DateInput<'a> {
    fn from(value: Option<&'a Value>) -> Self {
        match value {
            None | Some(Value::Null) | Some(Value::Bool(false)) => Self::Absent,
            Some(Value::String(text)) if text.is_empty() => Self::Absent,
            Some(Value::String(text)) => Self::Text(text.as_str()),
            Some(Value::Number(number)) => {
                let millis = number
                    .as_i64()
                    .or_else(|| number.as_f64().filter(|value| value.is_finite()).map(|value| value as i64));
                match millis {
                    Some(0) => Self::Absent,
                    Some(millis) => Self::EpochMillis(millis),
                    None => Self::Unparsable,
                }
            }
            Some(Value::Bool(true) | Value::Array(_) | Value::Object(_)) => Self::Unparsable,
        }
    }
}

impl<'a> From<&'a Value> for DateInput<'a> {
    fn from(value: &'a Value) -> Self {
        Self::from(Some(value))
    }
}

impl<'a> From<&'a str> for DateInput<'a> {
    fn from(value: &'a str) -> Self {
        if value.is_empty() {
            Self::Absent
        } else {
            Self::Text(value)
        }
    }
}

impl<'a> From<Option<&'a str>> for DateInput<'a> {
    fn from(value: Option<&'a str>) -> Self {
        value.map_or(Self::Absent, Self::from)
    }
}

impl From<NaiveDate> for DateInput<'_> {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<DateTime<Utc>> for DateInput<'_> {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

/// Strict-tier date errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateError {
    #[error("date_malformed:{0}")]
    Malformed(String),
    #[error("date_out_of_range:{0}")]
    OutOfRange(String),
}

/// Converts any date-ish input into a 10-character `YYYY-MM-DD` string.
///
/// Order matters: absent input yields `today`; text of at least ten characters
/// containing a hyphen is cut to its first ten characters without further
/// checks; anything else is parsed and falls back to `today` on failure.
pub fn canonicalize_date<'a>(input: impl Into<DateInput<'a>>, today: NaiveDate) -> String {
    let fallback = || format_date(today).unwrap_or_else(|| today.format(CANONICAL_FORMAT).to_string());
    match input.into() {
        DateInput::Absent | DateInput::Unparsable => fallback(),
        DateInput::Text(text) => {
            if text.chars().count() >= 10 && text.contains('-') {
                return text.chars().take(10).collect();
            }
            parse_lenient(text)
                .and_then(format_date)
                .unwrap_or_else(fallback)
        }
        DateInput::Date(date) => format_date(date).unwrap_or_else(fallback),
        DateInput::Timestamp(timestamp) => {
            format_date(timestamp.date_naive()).unwrap_or_else(fallback)
        }
        DateInput::EpochMillis(millis) => DateTime::from_timestamp_millis(millis)
            .and_then(|timestamp| format_date(timestamp.date_naive()))
            .unwrap_or_else(fallback),
    }
}

/// Best-effort parse of free-form date text.
pub fn parse_lenient(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(text) {
        return Some(timestamp.with_timezone(&Utc).date_naive());
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc2822(text) {
        return Some(timestamp.with_timezone(&Utc).date_naive());
    }
    if let Some(date) = LENIENT_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
    {
        return Some(date);
    }
    if text.len() == 4 && text.bytes().all(|byte| byte.is_ascii_digit()) {
        return text
            .parse::<i32>()
            .ok()
            .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1));
    }
    None
}

/// Returns true when `text` starts with a syntactic `YYYY-MM-DD` prefix.
pub fn has_canonical_prefix(text: &str) -> bool {
    let bytes = text.as_bytes();
    if bytes.len() < 10 {
        return false;
    }
    bytes.iter().take(10).enumerate().all(|(index, byte)| match index {
        4 | 7 => *byte == b'-',
        _ => byte.is_ascii_digit(),
    })
}

/// The `YYYY-MM-DD` prefix of `text`, if it has one.
pub fn canonical_prefix(text: &str) -> Option<&str> {
    if has_canonical_prefix(text) {
        text.get(..10)
    } else {
        None
    }
}

/// Parses an exact `YYYY-MM-DD` string into a calendar date.
pub fn parse_strict_date(text: &str) -> Result<NaiveDate, DateError> {
    if text.len() != 10 || !has_canonical_prefix(text) {
        return Err(DateError::Malformed(text.to_string()));
    }
    NaiveDate::parse_from_str(text, CANONICAL_FORMAT)
        .map_err(|_| DateError::OutOfRange(text.to_string()))
}

fn format_date(date: NaiveDate) -> Option<String> {
    if (0..=9999).contains(&date.year()) {
        Some(date.format(CANONICAL_FORMAT).to_string())
    } else {
        None
    }
}
