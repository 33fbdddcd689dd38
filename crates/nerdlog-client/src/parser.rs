// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Response Parser: dispatches framing sentinels common to every command,
//! then decodes command-specific payload prefixes.

use chrono_tz::Tz;

use crate::command::{BootstrapCtx, BusyStage, CommandContext, CommandSub, LogMsg, QueryLogsCtx};
use crate::logline;
use crate::timefmt::TimeFormatDescr;

/// Which of the two output streams a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Feed one line from `stream` into `ctx`. Returns `Some` when the line
/// updated the command's progress stage (caller publishes it).
///
/// `descr`/`tz` are required only for `QueryLogs` commands' `m:`/`s:` lines;
/// callers never dispatch a `QueryLogs` command before bootstrap has
/// detected a [`TimeFormatDescr`], so their absence there is an internal
/// invariant violation, not a recoverable parse error.
pub fn process_line(ctx: &mut CommandContext, stream: Stream, line: &str, lstream_name: &str, descr: Option<&TimeFormatDescr>, tz: Tz) -> Option<BusyStage> {
    if try_command_done(ctx, stream, line) {
        return None;
    }
    if try_error(ctx, line) {
        return None;
    }
    if try_reset_output(ctx, stream, line) {
        return None;
    }
    if try_debug(line) {
        return None;
    }
    if try_exit_code(ctx, line) {
        return None;
    }

    let CommandContext { sub, unhandled_stdout, unhandled_stderr, .. } = ctx;
    match (sub, stream) {
        (CommandSub::Bootstrap(b), Stream::Stdout) => {
            dispatch_bootstrap_stdout(b, line, unhandled_stdout);
            None
        }
        (CommandSub::Bootstrap(_), Stream::Stderr) => {
            unhandled_stderr.push(line.to_string());
            None
        }
        (CommandSub::Ping, Stream::Stdout) => {
            unhandled_stdout.push(line.to_string());
            None
        }
        (CommandSub::Ping, Stream::Stderr) => {
            unhandled_stderr.push(line.to_string());
            None
        }
        (CommandSub::QueryLogs(q), Stream::Stdout) => dispatch_query_stdout(q, line, lstream_name, descr, tz, unhandled_stdout),
        (CommandSub::QueryLogs(q), Stream::Stderr) => dispatch_query_stderr(q, line, unhandled_stderr),
    }
}

fn try_command_done(ctx: &mut CommandContext, stream: Stream, line: &str) -> bool {
    let Some(rest) = line.strip_prefix("command_done:") else {
        return false;
    };
    match rest.parse::<u64>() {
        Ok(idx) if idx == ctx.idx => {}
        Ok(idx) => tracing::debug!(expected = ctx.idx, got = idx, "command_done idx mismatch"),
        Err(_) => tracing::debug!(raw = rest, "malformed command_done sentinel"),
    }
    match stream {
        Stream::Stdout => ctx.stdout_done = true,
        Stream::Stderr => ctx.stderr_done = true,
    }
    true
}

fn try_error(ctx: &mut CommandContext, line: &str) -> bool {
    match line.strip_prefix("error:") {
        Some(msg) => {
            ctx.errors.push(msg.to_string());
            true
        }
        None => false,
    }
}

fn try_reset_output(ctx: &mut CommandContext, stream: Stream, line: &str) -> bool {
    if line != "reset_output" {
        return false;
    }
    match stream {
        Stream::Stdout => ctx.unhandled_stdout.clear(),
        Stream::Stderr => ctx.unhandled_stderr.clear(),
    }
    true
}

fn try_debug(line: &str) -> bool {
    line.starts_with("debug:")
}

fn try_exit_code(ctx: &mut CommandContext, line: &str) -> bool {
    match line.strip_prefix("exit_code:") {
        Some(value) => {
            ctx.exit_code = Some(value.to_string());
            true
        }
        None => false,
    }
}

fn dispatch_bootstrap_stdout(b: &mut BootstrapCtx, line: &str, unhandled: &mut Vec<String>) {
    if let Some(tz_name) = line.strip_prefix("host_timezone:") {
        b.timezone = Some(tz_name.to_string());
    } else if let Some(example) = line.strip_prefix("example_log_line:") {
        b.example_log_lines.push(example.to_string());
    } else if line == "bootstrap ok" {
        b.received_success = true;
    } else if line == "bootstrap failed" {
        b.received_failure = true;
    } else {
        unhandled.push(line.to_string());
    }
}

fn dispatch_query_stdout(q: &mut QueryLogsCtx, line: &str, lstream_name: &str, descr: Option<&TimeFormatDescr>, tz: Tz, unhandled: &mut Vec<String>) -> Option<BusyStage> {
    if let Some(rest) = line.strip_prefix("s:") {
        handle_minute_stat(q, rest, descr, tz);
        return None;
    }
    if let Some(rest) = line.strip_prefix("logfile:") {
        handle_logfile_decl(q, rest);
        return None;
    }
    if let Some(rest) = line.strip_prefix("m:") {
        handle_log_message(q, rest, lstream_name, descr, tz);
        return None;
    }
    unhandled.push(line.to_string());
    None
}

fn handle_minute_stat(q: &mut QueryLogsCtx, rest: &str, descr: Option<&TimeFormatDescr>, tz: Tz) {
    let descr = descr.unwrap_or_else(|| unreachable!("QueryLogs dispatched without a detected time format"));
    let Some((key, count)) = rest.split_once(',') else {
        q.response.logs_protocol_error(format!("malformed minute-stat line: {rest:?}"));
        return;
    };
    let Ok(count) = count.parse::<u32>() else {
        q.response.logs_protocol_error(format!("non-numeric minute-stat count: {count:?}"));
        return;
    };
    let Ok(naive) = chrono::NaiveDateTime::parse_from_str(key, &descr.minute_key_layout) else {
        q.response.logs_protocol_error(format!("unparseable minute key: {key:?}"));
        return;
    };
    use chrono::TimeZone;
    let local = tz.from_local_datetime(&naive).single().unwrap_or_else(|| tz.from_utc_datetime(&naive));
    let utc = local.with_timezone(&chrono::Utc);
    let bucket = (utc.timestamp() / 60) * 60;
    *q.response.histogram.entry(bucket).or_insert(0) += count;
}

fn handle_logfile_decl(q: &mut QueryLogsCtx, rest: &str) {
    let Some((name, starting)) = rest.rsplit_once(':') else {
        q.response.logs_protocol_error(format!("malformed logfile declaration: {rest:?}"));
        return;
    };
    let Ok(starting_line_number) = starting.parse::<u64>() else {
        q.response.logs_protocol_error(format!("non-numeric logfile start line: {starting:?}"));
        return;
    };
    q.logfiles.push(crate::command::LogfileDecl { name: name.to_string(), starting_line_number });
}

fn handle_log_message(q: &mut QueryLogsCtx, rest: &str, lstream_name: &str, descr: Option<&TimeFormatDescr>, tz: Tz) {
    let descr = descr.unwrap_or_else(|| unreachable!("QueryLogs dispatched without a detected time format"));
    let Some((combined_str, raw)) = rest.split_once(':') else {
        q.response.logs_protocol_error(format!("malformed message line: {rest:?}"));
        return;
    };
    let Ok(combined_linenumber) = combined_str.parse::<u64>() else {
        q.response.logs_protocol_error(format!("non-numeric combined line number: {combined_str:?}"));
        return;
    };

    let owner = q.logfiles.iter().rev().find(|d| d.starting_line_number < combined_linenumber);
    let (log_filename, log_linenumber) = match owner {
        Some(decl) => (decl.name.clone(), combined_linenumber - decl.starting_line_number),
        None => (String::new(), combined_linenumber),
    };

    match logline::parse(raw, descr, tz) {
        Ok(parsed) => {
            let (time, decreased) = logline::apply_monotonic_hack(parsed.time, q.last_time);
            q.last_time = Some(time);
            let mut context = std::collections::BTreeMap::new();
            context.insert("lstream".to_string(), lstream_name.to_string());
            if let Some(h) = parsed.envelope.hostname {
                context.insert("hostname".to_string(), h);
            }
            if let Some(p) = parsed.envelope.program {
                context.insert("program".to_string(), p);
            }
            if let Some(p) = parsed.envelope.pid {
                context.insert("pid".to_string(), p);
            }
            q.response.logs.push(LogMsg {
                time,
                log_filename,
                log_linenumber,
                combined_linenumber,
                original_line: raw.to_string(),
                message: parsed.message,
                level: parsed.level,
                context,
                decreased_timestamp: decreased,
            });
        }
        Err(e) => q.response.logs_protocol_error(format!("{e}: {raw:?}")),
    }
}

fn dispatch_query_stderr(q: &mut QueryLogsCtx, line: &str, unhandled: &mut Vec<String>) -> Option<BusyStage> {
    if let Some(rest) = line.strip_prefix("p:stage:") {
        let (num_str, title) = rest.split_once(':')?;
        let num: u32 = num_str.parse().ok()?;
        let stage = BusyStage { num, title: title.to_string(), percentage: 0 };
        q.stage = Some(stage.clone());
        return Some(stage);
    }
    if let Some(pct_str) = line.strip_prefix("p:p:") {
        let pct: u8 = pct_str.parse().ok()?;
        if let Some(stage) = q.stage.as_mut() {
            stage.percentage = pct;
            return Some(stage.clone());
        }
        return None;
    }
    unhandled.push(line.to_string());
    None
}

/// Result of a finished command, used by the client state machine to build
/// the summary error: the agent's own `error:` lines take precedence, then
/// any accumulated protocol errors, then a synthesized message for a
/// non-zero exit code with no other explanation.
pub fn summary_error(ctx: &CommandContext, protocol_errors: &[String]) -> Option<String> {
    if !ctx.errors.is_empty() {
        return Some(ctx.errors.join("; "));
    }
    if !protocol_errors.is_empty() {
        return Some(protocol_errors.join("; "));
    }
    match ctx.exit_code.as_deref() {
        Some(code) if code != "0" => {
            let mut parts = Vec::new();
            if !ctx.unhandled_stdout.is_empty() {
                parts.push(format!("stdout: {}", ctx.unhandled_stdout.join(" | ")));
            }
            if !ctx.unhandled_stderr.is_empty() {
                parts.push(format!("stderr: {}", ctx.unhandled_stderr.join(" | ")));
            }
            Some(format!("command exited with code {code}: {}", parts.join("; ")))
        }
        _ => None,
    }
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
