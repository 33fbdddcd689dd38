// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log Line Parser: timestamp extraction (with year inference), syslog
//! envelope parsing, level classification, and the monotonic-timestamp
//! hack, applied in sequence to one raw log line.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;

use crate::command::LogLevel;
use crate::timefmt::{self, TimeFormatDescr, TimeLayoutKind};

/// A malformed timestamp prefix: either the line is shorter than the
/// detected layout, or the prefix does not parse as that layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedTimestamp;

impl std::fmt::Display for MalformedTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("malformed timestamp prefix")
    }
}

impl std::error::Error for MalformedTimestamp {}

struct ParsedPrefix {
    time: DateTime<Utc>,
    consumed: usize,
}

// All patterns below are fixed string literals; a failure here is a
// compile-time typo, not a runtime condition, so the panic is acceptable.
#[allow(clippy::expect_used)]
mod patterns {
    use super::*;

    pub static RFC3339_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})T(\d{2}):(\d{2}):(\d{2})(Z|[+-]\d{2}:?\d{2})").expect("static regex"));
    pub static ISO_SPACE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})\s(\d{2}):(\d{2}):(\d{2})").expect("static regex"));
    pub static TRADITIONAL_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^([A-Z][a-z]{2})\s+(\d{1,2})\s(\d{2}):(\d{2}):(\d{2})").expect("static regex"));

    /// Syslog-style envelope: `host program[pid]: message`, pid optional.
    pub static ENVELOPE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^(\S+)\s+(\S+?)(?:\[(\d+)\])?:\s+(.*)").expect("static regex"));

    pub static ERROR_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)\b(error|erro|err|crit|critical|fatal)\b").expect("static regex"));
    pub static WARN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b(warn|warning)\b").expect("static regex"));
    pub static INFO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b(info)\b").expect("static regex"));
    pub static DEBUG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b(debug|debu)\b").expect("static regex"));
}
use patterns::{DEBUG_RE, ENVELOPE_RE, ERROR_RE, INFO_RE, ISO_SPACE_RE, RFC3339_RE, TRADITIONAL_RE, WARN_RE};

const MONTH_NAMES: [&str; 12] =
    ["Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec"];

fn month_from_name(name: &str) -> Option<u32> {
    MONTH_NAMES.iter().position(|m| m.eq_ignore_ascii_case(name)).map(|i| i as u32 + 1)
}

fn localize(naive: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    tz.from_local_datetime(&naive).single().unwrap_or_else(|| tz.from_utc_datetime(&naive)).with_timezone(&Utc)
}

fn parse_offset(raw: &str) -> Option<FixedOffset> {
    if raw == "Z" {
        return FixedOffset::east_opt(0);
    }
    let sign = if raw.starts_with('-') { -1 } else { 1 };
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 4 {
        return None;
    }
    let hours: i32 = digits[0..2].parse().ok()?;
    let mins: i32 = digits[2..4].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + mins * 60))
}

fn parse_rfc3339(line: &str) -> Option<ParsedPrefix> {
    let caps = RFC3339_RE.captures(line)?;
    let whole = caps.get(0)?;
    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    let hour: u32 = caps[4].parse().ok()?;
    let min: u32 = caps[5].parse().ok()?;
    let sec: u32 = caps[6].parse().ok()?;
    let offset = parse_offset(&caps[7])?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::from_hms_opt(hour, min, sec)?;
    let naive = NaiveDateTime::new(date, time);
    let dt = offset.from_local_datetime(&naive).single()?;
    Some(ParsedPrefix { time: dt.with_timezone(&Utc), consumed: whole.end() })
}

fn parse_iso_space(line: &str, tz: Tz) -> Option<ParsedPrefix> {
    let caps = ISO_SPACE_RE.captures(line)?;
    let whole = caps.get(0)?;
    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    let hour: u32 = caps[4].parse().ok()?;
    let min: u32 = caps[5].parse().ok()?;
    let sec: u32 = caps[6].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::from_hms_opt(hour, min, sec)?;
    let naive = NaiveDateTime::new(date, time);
    Some(ParsedPrefix { time: localize(naive, tz), consumed: whole.end() })
}

fn parse_traditional(line: &str, tz: Tz, now: DateTime<Tz>) -> Option<ParsedPrefix> {
    let caps = TRADITIONAL_RE.captures(line)?;
    let whole = caps.get(0)?;
    let month = month_from_name(&caps[1])?;
    let day: u32 = caps[2].parse().ok()?;
    let hour: u32 = caps[3].parse().ok()?;
    let min: u32 = caps[4].parse().ok()?;
    let sec: u32 = caps[5].parse().ok()?;
    let year = timefmt::infer_year(month, now.month(), now.year());
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::from_hms_opt(hour, min, sec)?;
    let naive = NaiveDateTime::new(date, time);
    Some(ParsedPrefix { time: localize(naive, tz), consumed: whole.end() })
}

/// Parse the leading timestamp of `line` per `descr`, returning the parsed
/// UTC time and the line with the timestamp prefix stripped and leading
/// whitespace removed.
fn parse_timestamp(line: &str, descr: &TimeFormatDescr, tz: Tz) -> Result<(DateTime<Utc>, &str), MalformedTimestamp> {
    let now = Utc::now().with_timezone(&tz);
    let parsed = match descr.kind {
        TimeLayoutKind::Rfc3339 => parse_rfc3339(line),
        TimeLayoutKind::IsoSpace => parse_iso_space(line, tz),
        TimeLayoutKind::TraditionalSyslog => parse_traditional(line, tz, now),
    }
    .ok_or(MalformedTimestamp)?;
    Ok((parsed.time, line[parsed.consumed..].trim_start()))
}

/// Envelope fields extracted from the residual message.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    pub hostname: Option<String>,
    pub program: Option<String>,
    pub pid: Option<String>,
}

fn parse_envelope(message: &str) -> (Envelope, String) {
    match ENVELOPE_RE.captures(message) {
        Some(caps) => {
            let envelope = Envelope {
                hostname: Some(caps[1].to_string()),
                program: Some(caps[2].to_string()),
                pid: caps.get(3).map(|m| m.as_str().to_string()),
            };
            (envelope, caps[4].to_string())
        }
        None => (Envelope::default(), message.to_string()),
    }
}

fn classify_level(message: &str) -> LogLevel {
    let lower = message.to_ascii_lowercase();
    for (needle, level) in [("[f]", LogLevel::Error), ("[e]", LogLevel::Error), ("[w]", LogLevel::Warn), ("[i]", LogLevel::Info), ("[d]", LogLevel::Debug)] {
        if lower.contains(needle) {
            return level;
        }
    }
    if ERROR_RE.is_match(message) {
        LogLevel::Error
    } else if WARN_RE.is_match(message) {
        LogLevel::Warn
    } else if INFO_RE.is_match(message) {
        LogLevel::Info
    } else if DEBUG_RE.is_match(message) {
        LogLevel::Debug
    } else {
        LogLevel::Unknown
    }
}

/// Result of parsing one raw log line.
pub struct ParsedLine {
    pub time: DateTime<Utc>,
    pub message: String,
    pub level: LogLevel,
    pub envelope: Envelope,
}

/// Run the timestamp, envelope, and level passes on one raw log line.
/// Does not apply the monotonic-timestamp hack; see [`apply_monotonic_hack`].
pub fn parse(line: &str, descr: &TimeFormatDescr, tz: Tz) -> Result<ParsedLine, MalformedTimestamp> {
    let (time, rest) = parse_timestamp(line, descr, tz)?;
    let (envelope, message) = parse_envelope(rest);
    let level = classify_level(&message);
    Ok(ParsedLine { time, message, level, envelope })
}

/// Enforce non-decreasing timestamps within one response: if `time` is
/// strictly before `prev`, returns `(prev, true)`; otherwise `(time, false)`.
pub fn apply_monotonic_hack(time: DateTime<Utc>, prev: Option<DateTime<Utc>>) -> (DateTime<Utc>, bool) {
    match prev {
        Some(p) if time < p => (p, true),
        _ => (time, false),
    }
}

#[cfg(test)]
#[path = "logline_tests.rs"]
mod tests;
