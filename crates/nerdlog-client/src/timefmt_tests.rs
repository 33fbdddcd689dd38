use super::*;

#[test]
fn detects_traditional_syslog() {
    let lines = vec!["Mar 26 17:08:34 h p[1]: foo".to_string()];
    let descr = detect(&lines).expect("should match");
    assert_eq!(descr.timestamp_layout, "%b %e %H:%M:%S");
    assert!(!descr.has_year);
    assert_eq!(descr.minute_key_layout, MINUTE_KEY_LAYOUT);
}

#[test]
fn detects_rfc3339_with_offset() {
    let lines = vec!["2024-03-26T17:08:34Z host: hello".to_string()];
    let descr = detect(&lines).expect("should match");
    assert!(descr.has_year);
    assert_eq!(descr.timestamp_layout, "%Y-%m-%dT%H:%M:%SZ07:00");
}

#[test]
fn detects_iso_space() {
    let lines = vec!["2024-03-26 17:08:34 host: hello".to_string()];
    let descr = detect(&lines).expect("should match");
    assert!(descr.has_year);
    assert_eq!(descr.timestamp_layout, "%Y-%m-%d %H:%M:%S");
}

#[test]
fn skips_leading_blank_lines() {
    let lines = vec!["".to_string(), "   ".to_string(), "Mar 26 17:08:34 h p[1]: foo".to_string()];
    assert!(detect(&lines).is_some());
}

#[test]
fn none_when_nothing_matches() {
    let lines = vec!["not a timestamp at all".to_string()];
    assert!(detect(&lines).is_none());
}

#[test]
fn none_when_no_lines() {
    assert!(detect(&[]).is_none());
}

#[test]
fn year_inference_same_month() {
    assert_eq!(infer_year(6, 6, 2024), 2024);
}

#[test]
fn year_inference_december_rollback() {
    assert_eq!(infer_year(12, 1, 2025), 2024);
}

#[test]
fn year_inference_january_rollforward() {
    assert_eq!(infer_year(1, 12, 2024), 2025);
}

#[test]
fn year_inference_other_months_use_current_year() {
    assert_eq!(infer_year(3, 9, 2024), 2024);
}

#[test]
fn resolve_timezone_falls_back_to_utc() {
    assert_eq!(resolve_timezone("Not/AZone"), chrono_tz::UTC);
    assert_eq!(resolve_timezone("UTC"), chrono_tz::UTC);
}
