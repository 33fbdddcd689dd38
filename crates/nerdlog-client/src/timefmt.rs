// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timestamp layout detection.
//!
//! Upstream detects the on-host log timestamp format from a handful of
//! example lines collected during bootstrap; the detector itself was not
//! among the retrieved reference sources, so this module implements a
//! small, explicitly ordered set of layout probes rather than a general
//! format sniffer. New formats are added by extending [`PROBES`].

use chrono_tz::Tz;
use regex::Regex;
use std::sync::LazyLock;

/// Which parsing routine in [`crate::logline`] applies to a detected
/// layout. The textual `timestamp_layout` on [`TimeFormatDescr`] is kept
/// for display/logging; actual parsing dispatches on this discriminant so
/// the `Z07[:00]`-shortening edge case (§4.4) can be handled exactly rather
/// than through a general-purpose strftime parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeLayoutKind {
    /// `2006-01-02T15:04:05Z07:00`-style, with a year.
    Rfc3339,
    /// `2006-01-02 15:04:05`-style, with a year.
    IsoSpace,
    /// `Jan _2 15:04:05`-style, no year (requires year inference).
    TraditionalSyslog,
}

/// Detected textual layout for a log stream's timestamps, plus the
/// agent-side AWK expressions that extract the same calendar fields
/// on-host (used to build minute-resolution histogram keys without
/// shipping every raw line back to the client).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeFormatDescr {
    pub kind: TimeLayoutKind,
    /// Human-readable rendering of the layout, for logging and diagnostics.
    pub timestamp_layout: String,
    /// Layout used to parse `s:<minuteKey>,<count>` histogram lines.
    /// Fixed regardless of the detected per-line layout.
    pub minute_key_layout: String,
    /// Whether `timestamp_layout` includes a year field.
    pub has_year: bool,
    pub awktime_month: String,
    pub awktime_year: String,
    pub awktime_day: String,
    pub awktime_hhmm: String,
    pub awktime_minute_key: String,
}

/// Wire format for `s:<...>` histogram lines; fixed across all detected
/// per-line layouts.
pub const MINUTE_KEY_LAYOUT: &str = "%Y-%m-%d-%H:%M";

struct Probe {
    pattern: &'static str,
    kind: TimeLayoutKind,
    timestamp_layout: &'static str,
    has_year: bool,
    awktime_month: &'static str,
    awktime_year: &'static str,
    awktime_day: &'static str,
    awktime_hhmm: &'static str,
    awktime_minute_key: &'static str,
}

static PROBES: &[Probe] = &[
    Probe {
        pattern: r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(Z|[+-]\d{2}:\d{2})",
        kind: TimeLayoutKind::Rfc3339,
        timestamp_layout: "%Y-%m-%dT%H:%M:%SZ07:00",
        has_year: true,
        awktime_month: "substr($0,6,2)",
        awktime_year: "substr($0,1,4)",
        awktime_day: "substr($0,9,2)",
        awktime_hhmm: "substr($0,12,5)",
        awktime_minute_key: "substr($0,1,16)",
    },
    Probe {
        pattern: r"^\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}",
        kind: TimeLayoutKind::IsoSpace,
        timestamp_layout: "%Y-%m-%d %H:%M:%S",
        has_year: true,
        awktime_month: "substr($0,6,2)",
        awktime_year: "substr($0,1,4)",
        awktime_day: "substr($0,9,2)",
        awktime_hhmm: "substr($0,12,5)",
        awktime_minute_key: "substr($0,1,16)",
    },
    Probe {
        pattern: r"^[A-Z][a-z]{2}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2}",
        kind: TimeLayoutKind::TraditionalSyslog,
        timestamp_layout: "%b %e %H:%M:%S",
        has_year: false,
        awktime_month: "substr($0,1,3)",
        awktime_year: "\"\"",
        awktime_day: "substr($0,5,2)",
        awktime_hhmm: "substr($0,8,5)",
        awktime_minute_key: "substr($0,1,12)",
    },
];

// Patterns are fixed string literals in this file; a failure here is a
// compile-time typo, not a runtime condition, so the panic is acceptable.
#[allow(clippy::expect_used)]
static COMPILED: LazyLock<Vec<Regex>> =
    LazyLock::new(|| PROBES.iter().map(|p| Regex::new(p.pattern).expect("static probe regex")).collect());

/// Run the ordered probe list against the first non-empty example line.
///
/// Returns `None` if no example line is available or none of the probes
/// match; the caller (bootstrap completion in the client state machine)
/// treats this as a bootstrap failure.
pub fn detect(example_lines: &[String]) -> Option<TimeFormatDescr> {
    let line = example_lines.iter().find(|l| !l.trim().is_empty())?;
    for (probe, re) in PROBES.iter().zip(COMPILED.iter()) {
        if re.is_match(line) {
            return Some(TimeFormatDescr {
                kind: probe.kind,
                timestamp_layout: probe.timestamp_layout.to_string(),
                minute_key_layout: MINUTE_KEY_LAYOUT.to_string(),
                has_year: probe.has_year,
                awktime_month: probe.awktime_month.to_string(),
                awktime_year: probe.awktime_year.to_string(),
                awktime_day: probe.awktime_day.to_string(),
                awktime_hhmm: probe.awktime_hhmm.to_string(),
                awktime_minute_key: probe.awktime_minute_key.to_string(),
            });
        }
    }
    None
}

/// Year inference for timestamp layouts with no year field.
///
/// - Same month as wall clock → current year.
/// - Parsed December while wall clock is January → previous year.
/// - Parsed January while wall clock is December → next year.
/// - Otherwise → current year.
pub fn infer_year(parsed_month: u32, now_month: u32, now_year: i32) -> i32 {
    match (parsed_month, now_month) {
        (m, n) if m == n => now_year,
        (12, 1) => now_year - 1,
        (1, 12) => now_year + 1,
        _ => now_year,
    }
}

/// Resolve an IANA zone name, falling back to UTC when it does not resolve.
/// Never fails the calling command.
pub fn resolve_timezone(name: &str) -> Tz {
    name.parse().unwrap_or(chrono_tz::UTC)
}

#[cfg(test)]
#[path = "timefmt_tests.rs"]
mod tests;
