//! Display formatting of table cells.
//!
//! Only the first column is interpreted as a timestamp. Numbers above `1e12`
//! are epoch milliseconds, smaller ones epoch seconds. Digit strings of 10 to
//! 13 characters follow the same split keyed on their length, and strings
//! starting with `YYYY-MM-DDTHH:MM` are parsed as ISO date-times. Anything that
//! cannot be turned into a valid instant is shown as plain text.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde_json::Value;

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const MS_THRESHOLD: f64 = 1e12;

pub fn format_cell(value: &Value, position: usize) -> String {
    format_cell_in(value, position, &Local)
}

/// Same as [`format_cell`] but renders dates in the given time zone.
pub fn format_cell_in<Tz: TimeZone>(value: &Value, position: usize, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    if position == 0
        && let Some(instant) = parse_instant(value, tz)
    {
        return instant.format(DATE_FORMAT).to_string();
    }
    plain_text(value)
}

/// Text form of a cell. Null renders empty, strings without quotes.
pub fn plain_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn parse_instant<Tz: TimeZone>(value: &Value, tz: &Tz) -> Option<DateTime<Tz>> {
    match value {
        Value::Number(n) => {
            let v = n.as_f64()?;
            let ms = if v.abs() >= MS_THRESHOLD { v } else { v * 1000.0 };
            from_epoch_ms(ms, tz)
        }
        Value::String(s) if is_epoch_numeral(s) => {
            let v: f64 = s.parse().ok()?;
            let ms = if s.len() >= 13 { v } else { v * 1000.0 };
            from_epoch_ms(ms, tz)
        }
        Value::String(s) if has_iso_prefix(s) => parse_iso(s, tz),
        _ => None,
    }
}

fn from_epoch_ms<Tz: TimeZone>(ms: f64, tz: &Tz) -> Option<DateTime<Tz>> {
    if !ms.is_finite() {
        return None;
    }
    let ms = ms.trunc();
    if ms.abs() > i64::MAX as f64 {
        return None;
    }
    tz.timestamp_millis_opt(ms as i64).single()
}

fn is_epoch_numeral(s: &str) -> bool {
    (10..=13).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit())
}

fn has_iso_prefix(s: &str) -> bool {
    let b = s.as_bytes();
    if b.len() < 16 {
        return false;
    }
    let digits = |r: std::ops::Range<usize>| b[r].iter().all(u8::is_ascii_digit);
    digits(0..4)
        && b[4] == b'-'
        && digits(5..7)
        && b[7] == b'-'
        && digits(8..10)
        && b[10] == b'T'
        && digits(11..13)
        && b[13] == b':'
        && digits(14..16)
}

// Strings with an offset are absolute, naive ones are read in `tz`.
fn parse_iso<Tz: TimeZone>(s: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(tz));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(tz));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return tz.from_local_datetime(&naive).earliest();
        }
    }
    None
}
