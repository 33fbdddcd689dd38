use super::*;
use crate::timefmt::{TimeFormatDescr, TimeLayoutKind};

fn traditional_descr() -> TimeFormatDescr {
    TimeFormatDescr {
        kind: TimeLayoutKind::TraditionalSyslog,
        timestamp_layout: "%b %e %H:%M:%S".into(),
        minute_key_layout: crate::timefmt::MINUTE_KEY_LAYOUT.into(),
        has_year: false,
        awktime_month: "".into(),
        awktime_year: "".into(),
        awktime_day: "".into(),
        awktime_hhmm: "".into(),
        awktime_minute_key: "".into(),
    }
}

fn iso_descr() -> TimeFormatDescr {
    TimeFormatDescr { kind: TimeLayoutKind::IsoSpace, ..traditional_descr() }
}

fn rfc3339_descr() -> TimeFormatDescr {
    TimeFormatDescr { kind: TimeLayoutKind::Rfc3339, ..traditional_descr() }
}

#[test]
fn parses_traditional_syslog_line() {
    let line = "Mar 26 17:08:34 h p[1]: foo";
    let parsed = parse(line, &traditional_descr(), chrono_tz::UTC).unwrap();
    assert_eq!(parsed.time.format("%m-%d %H:%M:%S").to_string(), "03-26 17:08:34");
    assert_eq!(parsed.envelope.hostname.as_deref(), Some("h"));
    assert_eq!(parsed.envelope.program.as_deref(), Some("p"));
    assert_eq!(parsed.envelope.pid.as_deref(), Some("1"));
    assert_eq!(parsed.message, "foo");
}

#[test]
fn parses_iso_space_line_with_year() {
    let line = "2024-03-26 17:08:34 h p[1]: foo";
    let parsed = parse(line, &iso_descr(), chrono_tz::UTC).unwrap();
    assert_eq!(parsed.time.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-03-26 17:08:34");
}

#[test]
fn parses_rfc3339_with_literal_z() {
    let line = "2024-03-26T17:08:34Z h p[1]: foo";
    let parsed = parse(line, &rfc3339_descr(), chrono_tz::UTC).unwrap();
    assert_eq!(parsed.time.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-03-26 17:08:34");
}

#[test]
fn parses_rfc3339_with_numeric_offset() {
    let line = "2024-03-26T17:08:34+02:00 h p[1]: foo";
    let parsed = parse(line, &rfc3339_descr(), chrono_tz::UTC).unwrap();
    assert_eq!(parsed.time.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-03-26 15:08:34");
}

#[test]
fn envelope_pid_is_optional() {
    let line = "Mar 26 17:08:34 h cron: job ran";
    let parsed = parse(line, &traditional_descr(), chrono_tz::UTC).unwrap();
    assert_eq!(parsed.envelope.pid, None);
    assert_eq!(parsed.message, "job ran");
}

#[test]
fn non_matching_envelope_passes_through() {
    let line = "Mar 26 17:08:34 not an envelope at all";
    let parsed = parse(line, &traditional_descr(), chrono_tz::UTC).unwrap();
    assert_eq!(parsed.envelope.hostname, None);
    assert_eq!(parsed.message, "not an envelope at all");
}

#[test]
fn malformed_timestamp_is_reported() {
    let line = "not a timestamp at all";
    assert!(parse(line, &traditional_descr(), chrono_tz::UTC).is_err());
}

#[test]
fn level_bracket_rules_win_first() {
    assert_eq!(classify_level("[E] something went wrong"), LogLevel::Error);
    assert_eq!(classify_level("[W] heads up"), LogLevel::Warn);
    assert_eq!(classify_level("[I] started"), LogLevel::Info);
    assert_eq!(classify_level("[D] verbose"), LogLevel::Debug);
}

#[test]
fn level_word_boundary_fallback() {
    assert_eq!(classify_level("a fatal exception occurred"), LogLevel::Error);
    assert_eq!(classify_level("warning: disk almost full"), LogLevel::Warn);
    assert_eq!(classify_level("info: service started"), LogLevel::Info);
    assert_eq!(classify_level("debug trace enabled"), LogLevel::Debug);
    assert_eq!(classify_level("nothing special here"), LogLevel::Unknown);
}

#[test]
fn level_word_boundary_does_not_match_inside_larger_word() {
    assert_eq!(classify_level("the errors table was empty"), LogLevel::Unknown);
}

#[test]
fn monotonic_hack_overwrites_decrease() {
    let prev = chrono::DateTime::parse_from_rfc3339("2024-03-26T17:08:34.500Z").unwrap().with_timezone(&chrono::Utc);
    let cur = chrono::DateTime::parse_from_rfc3339("2024-03-26T17:08:34Z").unwrap().with_timezone(&chrono::Utc);
    let (time, decreased) = apply_monotonic_hack(cur, Some(prev));
    assert_eq!(time, prev);
    assert!(decreased);
}

#[test]
fn monotonic_hack_leaves_non_decreasing_time_alone() {
    let prev = chrono::DateTime::parse_from_rfc3339("2024-03-26T17:08:34Z").unwrap().with_timezone(&chrono::Utc);
    let cur = chrono::DateTime::parse_from_rfc3339("2024-03-26T17:08:35Z").unwrap().with_timezone(&chrono::Utc);
    let (time, decreased) = apply_monotonic_hack(cur, Some(prev));
    assert_eq!(time, cur);
    assert!(!decreased);
}

#[test]
fn monotonic_hack_with_no_prior_time() {
    let cur = chrono::DateTime::parse_from_rfc3339("2024-03-26T17:08:34Z").unwrap().with_timezone(&chrono::Utc);
    let (time, decreased) = apply_monotonic_hack(cur, None);
    assert_eq!(time, cur);
    assert!(!decreased);
}
