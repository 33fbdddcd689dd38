// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command Encoder: turns a [`Command`] into the exact shell fragment
//! written to the remote shell's stdin to drive the agent and mark command
//! boundaries.

use chrono_tz::Tz;

use crate::command::QueryLogsArgs;
use crate::logstream::LogStream;
use crate::timefmt::TimeFormatDescr;

pub const GZIP_START_MARKER: &str = "gzip_start";
pub const GZIP_END_MARKER: &str = "gzip_end";

const AGENT_HEREDOC_DELIM: &str = "NERDLOG_AGENT_EOF";
const QUERY_TIME_LAYOUT: &str = "%Y-%m-%d-%H:%M";

/// Single-quote a shell word, escaping embedded quotes with the `'\''`
/// idiom: close the quote, emit an escaped literal quote, reopen the quote.
pub fn shell_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

/// Map a log file path to a filename-safe id by replacing path separators.
pub fn filepath_to_id(path: &str) -> String {
    path.chars().map(|c| if c == '/' || c == '\\' { '_' } else { c }).collect()
}

fn agent_script_path(client_id: &str, log_file_last: &str) -> String {
    format!("/tmp/nerdlog_agent_{client_id}_{}.sh", filepath_to_id(log_file_last))
}

fn agent_index_path(client_id: &str, log_file_last: &str) -> String {
    format!("/tmp/nerdlog_agent_index_{client_id}_{}", filepath_to_id(log_file_last))
}

fn command_done(idx: u64) -> String {
    format!("echo {}\necho {} >&2\n", shell_quote(&format!("command_done:{idx}")), shell_quote(&format!("command_done:{idx}")))
}

/// Build the shell fragment deploying and invoking the agent's
/// `logstream_info` subcommand.
pub fn encode_bootstrap(client_id: &str, stream: &LogStream, idx: u64, agent_script: &str) -> String {
    let script_path = agent_script_path(client_id, &stream.log_file_last);
    let mut out = String::new();
    out.push_str("echo 'reset_output'\n");
    out.push_str("echo 'reset_output' >&2\n");
    out.push_str(&format!("(\nset -e\ncat > {} <<'{AGENT_HEREDOC_DELIM}'\n", shell_quote(&script_path)));
    out.push_str(agent_script);
    if !agent_script.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(AGENT_HEREDOC_DELIM);
    out.push('\n');
    out.push_str(&format!("chmod +x {}\n", shell_quote(&script_path)));
    out.push_str(&format!("{} logstream_info --logfile-last {}", shell_quote(&script_path), shell_quote(&stream.log_file_last)));
    if let Some(prev) = &stream.log_file_prev {
        out.push_str(&format!(" --logfile-prev {}", shell_quote(prev)));
    }
    out.push('\n');
    out.push_str(") && echo 'bootstrap ok' || echo 'bootstrap failed'\n");
    out.push_str("echo \"exit_code:$?\"\n");
    out.push_str(&command_done(idx));
    out
}

/// Build the shell fragment for a liveness probe.
pub fn encode_ping(idx: u64) -> String {
    let mut out = String::new();
    out.push_str("whoami\n");
    out.push_str("echo \"exit_code:$?\"\n");
    out.push_str(&command_done(idx));
    out
}

/// Build the shell fragment invoking the agent's `query` subcommand,
/// optionally piping its stdout through a gzip-bracketed substream.
pub fn encode_query_logs(
    client_id: &str,
    stream: &LogStream,
    idx: u64,
    args: &QueryLogsArgs,
    descr: &TimeFormatDescr,
    tz: Tz,
    use_gzip: bool,
) -> String {
    let script_path = agent_script_path(client_id, &stream.log_file_last);
    let index_path = agent_index_path(client_id, &stream.log_file_last);

    let mut agent_cmd = format!(
        "{} query --index-file {} --max-num-lines {} --logfile-last {}",
        shell_quote(&script_path),
        shell_quote(&index_path),
        args.max_num_lines,
        shell_quote(&stream.log_file_last),
    );
    if let Some(prev) = &stream.log_file_prev {
        agent_cmd.push_str(&format!(" --logfile-prev {}", shell_quote(prev)));
    }
    if let Some(from) = args.from {
        agent_cmd.push_str(&format!(" --from {}", shell_quote(&from.with_timezone(&tz).format(QUERY_TIME_LAYOUT).to_string())));
    }
    if let Some(to) = args.to {
        agent_cmd.push_str(&format!(" --to {}", shell_quote(&to.with_timezone(&tz).format(QUERY_TIME_LAYOUT).to_string())));
    }
    if let Some(lines_until) = args.lines_until {
        agent_cmd.push_str(&format!(" --lines-until {lines_until}"));
    }
    agent_cmd.push_str(&format!(" --awktime-month {}", shell_quote(&descr.awktime_month)));
    agent_cmd.push_str(&format!(" --awktime-year {}", shell_quote(&descr.awktime_year)));
    agent_cmd.push_str(&format!(" --awktime-day {}", shell_quote(&descr.awktime_day)));
    agent_cmd.push_str(&format!(" --awktime-hhmm {}", shell_quote(&descr.awktime_hhmm)));
    agent_cmd.push_str(&format!(" --awktime-minute-key {}", shell_quote(&descr.awktime_minute_key)));
    if !args.pattern.is_empty() {
        agent_cmd.push(' ');
        agent_cmd.push_str(&shell_quote(&args.pattern));
    }

    let mut out = String::new();
    if use_gzip {
        out.push_str(&format!("echo {}\n", shell_quote(GZIP_START_MARKER)));
        out.push_str(&format!("{agent_cmd} | gzip\n"));
        out.push_str(&format!("echo {}\n", shell_quote(GZIP_END_MARKER)));
    } else {
        out.push_str(&agent_cmd);
        out.push('\n');
    }
    out.push_str(&command_done(idx));
    out
}

#[cfg(test)]
#[path = "encoder_tests.rs"]
mod tests;
