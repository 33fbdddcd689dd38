use super::*;
use crate::command::QueryLogsArgs;
use crate::logstream::{ConfigHost, LogStream};
use chrono::TimeZone;

fn host() -> ConfigHost {
    ConfigHost { addr: "10.0.0.1".into(), port: 22, user: "root".into() }
}

fn stream() -> LogStream {
    LogStream::new("web1", host(), "/var/log/syslog")
}

#[test]
fn shell_quote_wraps_plain_word() {
    assert_eq!(shell_quote("hello"), "'hello'");
}

#[test]
fn shell_quote_escapes_embedded_apostrophe() {
    assert_eq!(shell_quote("it's"), "'it'\\''s'");
}

#[test]
fn shell_quote_handles_empty_string() {
    assert_eq!(shell_quote(""), "''");
}

#[test]
fn filepath_to_id_replaces_separators() {
    assert_eq!(filepath_to_id("/var/log/syslog"), "_var_log_syslog");
    assert_eq!(filepath_to_id(r"C:\logs\a.log"), "C:_logs_a.log");
}

#[test]
fn bootstrap_emits_reset_then_heredoc_then_sentinels() {
    let out = encode_bootstrap("client1", &stream(), 0, "#!/bin/sh\necho hi\n");
    assert!(out.starts_with("echo 'reset_output'\necho 'reset_output' >&2\n"));
    assert!(out.contains("cat > '/tmp/nerdlog_agent_client1__var_log_syslog.sh' <<'NERDLOG_AGENT_EOF'"));
    assert!(out.contains("#!/bin/sh\necho hi\n"));
    assert!(out.contains("NERDLOG_AGENT_EOF\n"));
    assert!(out.contains("logstream_info --logfile-last '/var/log/syslog'"));
    assert!(out.contains(") && echo 'bootstrap ok' || echo 'bootstrap failed'\n"));
    assert!(out.contains("echo \"exit_code:$?\"\n"));
    assert!(out.ends_with("echo 'command_done:0'\necho 'command_done:0' >&2\n"));
}

#[test]
fn bootstrap_includes_logfile_prev_when_present() {
    let s = stream().with_log_file_prev("/var/log/syslog.1");
    let out = encode_bootstrap("client1", &s, 0, "echo hi\n");
    assert!(out.contains("--logfile-prev '/var/log/syslog.1'"));
}

#[test]
fn ping_runs_whoami_and_echoes_exit_code() {
    let out = encode_ping(7);
    assert!(out.starts_with("whoami\necho \"exit_code:$?\"\n"));
    assert!(out.ends_with("echo 'command_done:7'\necho 'command_done:7' >&2\n"));
}

fn descr() -> crate::timefmt::TimeFormatDescr {
    crate::timefmt::TimeFormatDescr {
        kind: crate::timefmt::TimeLayoutKind::TraditionalSyslog,
        timestamp_layout: "%b %e %H:%M:%S".into(),
        minute_key_layout: crate::timefmt::MINUTE_KEY_LAYOUT.into(),
        has_year: false,
        awktime_month: "substr($0,1,3)".into(),
        awktime_year: "\"\"".into(),
        awktime_day: "substr($0,5,2)".into(),
        awktime_hhmm: "substr($0,8,5)".into(),
        awktime_minute_key: "substr($0,1,12)".into(),
    }
}

#[test]
fn query_logs_without_gzip_has_no_markers() {
    let args = QueryLogsArgs { max_num_lines: 100, from: None, to: None, pattern: String::new(), lines_until: None };
    let out = encode_query_logs("client1", &stream(), 3, &args, &descr(), chrono_tz::UTC, false);
    assert!(!out.contains(GZIP_START_MARKER));
    assert!(!out.contains(GZIP_END_MARKER));
    assert!(out.contains("query --index-file"));
    assert!(out.contains("--max-num-lines 100"));
    assert!(!out.contains(" | gzip"));
}

#[test]
fn query_logs_with_gzip_brackets_pipeline() {
    let args = QueryLogsArgs { max_num_lines: 50, from: None, to: None, pattern: "oops".into(), lines_until: None };
    let out = encode_query_logs("client1", &stream(), 3, &args, &descr(), chrono_tz::UTC, true);
    assert!(out.contains("echo 'gzip_start'\n"));
    assert!(out.contains(" | gzip\n"));
    assert!(out.contains("echo 'gzip_end'\n"));
    assert!(out.contains("'oops'"));
}

#[test]
fn query_logs_formats_from_and_to_in_stream_timezone() {
    let from = chrono::Utc.with_ymd_and_hms(2024, 3, 26, 17, 8, 0).unwrap();
    let args = QueryLogsArgs { max_num_lines: 10, from: Some(from), to: None, pattern: String::new(), lines_until: None };
    let out = encode_query_logs("client1", &stream(), 1, &args, &descr(), chrono_tz::UTC, false);
    assert!(out.contains("--from '2024-03-26-17:08'"));
}

#[test]
fn query_logs_omits_pattern_when_empty() {
    let args = QueryLogsArgs { max_num_lines: 10, from: None, to: None, pattern: String::new(), lines_until: None };
    let out = encode_query_logs("client1", &stream(), 1, &args, &descr(), chrono_tz::UTC, false);
    assert!(out.trim_end().ends_with("echo 'command_done:1' >&2"));
}
