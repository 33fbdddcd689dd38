// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::error::ClientError;

/// Arguments for a `QueryLogs` command.
#[derive(Debug, Clone)]
pub struct QueryLogsArgs {
    pub max_num_lines: u32,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub pattern: String,
    pub lines_until: Option<u64>,
}

/// A logical command. Redesigned from the upstream record-of-three-optional-
/// pointers into a proper tagged union so "exactly one sub-command is set"
/// is a property of the type, not a runtime invariant.
#[derive(Debug, Clone)]
pub enum Command {
    Bootstrap,
    Ping,
    QueryLogs(QueryLogsArgs),
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::Ping => "ping",
            Self::QueryLogs(_) => "query_logs",
        }
    }
}

/// Outcome of a finished command, delivered through its reply channel.
#[derive(Debug)]
pub enum CommandOutcome {
    Bootstrap,
    Ping,
    QueryLogs(QueryResponse),
}

pub type CommandReply = Result<CommandOutcome, ClientError>;

/// A command paired with its optional one-shot reply channel. Kept as a pair
/// rather than a field on [`Command`] so the reply-channel plumbing doesn't
/// have to be repeated per variant.
pub struct Enqueued {
    pub command: Command,
    pub reply: Option<oneshot::Sender<CommandReply>>,
}

impl Enqueued {
    pub fn new(command: Command, reply: Option<oneshot::Sender<CommandReply>>) -> Self {
        Self { command, reply }
    }
}

/// Severity assigned by the Log Line Parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Unknown,
}

/// A single parsed log message.
#[derive(Debug, Clone)]
pub struct LogMsg {
    pub time: DateTime<Utc>,
    pub log_filename: String,
    pub log_linenumber: u64,
    pub combined_linenumber: u64,
    pub original_line: String,
    pub message: String,
    pub level: LogLevel,
    /// At minimum `{lstream}`; after envelope parsing additionally
    /// `{hostname, program, pid}`.
    pub context: BTreeMap<String, String>,
    pub decreased_timestamp: bool,
}

/// Incrementally-built result of a `QueryLogs` command.
#[derive(Debug, Clone, Default)]
pub struct QueryResponse {
    pub logs: Vec<LogMsg>,
    /// Minute-aligned Unix timestamp (UTC, divisible by 60) → message count.
    pub histogram: BTreeMap<i64, u32>,
    /// Malformed payload lines encountered while parsing, kept separate from
    /// [`CommandContext::errors`] since they don't fail the command outright.
    pub protocol_errors: Vec<String>,
    /// Summary error computed once both streams are done (agent errors, then
    /// accumulated protocol errors, then a synthesized non-zero-exit
    /// message); `None` means the command succeeded cleanly.
    pub error: Option<String>,
}

impl QueryResponse {
    pub fn logs_protocol_error(&mut self, detail: String) {
        self.protocol_errors.push(detail);
    }
}

/// Progress within a `QueryLogs` command. Cleared when leaving `ConnectedBusy`.
#[derive(Debug, Clone)]
pub struct BusyStage {
    pub num: u32,
    pub title: String,
    pub percentage: u8,
}

/// A `logfile:<name>:<startingLineNumber>` declaration from the agent.
#[derive(Debug, Clone)]
pub struct LogfileDecl {
    pub name: String,
    pub starting_line_number: u64,
}

/// Bootstrap-specific accumulator.
#[derive(Debug, Clone, Default)]
pub struct BootstrapCtx {
    pub timezone: Option<String>,
    pub example_log_lines: Vec<String>,
    pub received_success: bool,
    pub received_failure: bool,
}

/// `QueryLogs`-specific accumulator.
#[derive(Debug, Clone, Default)]
pub struct QueryLogsCtx {
    pub response: QueryResponse,
    pub logfiles: Vec<LogfileDecl>,
    pub last_time: Option<DateTime<Utc>>,
    /// Most recent `p:stage:<num>:<title>` seen, updated in place by
    /// subsequent `p:p:<percentage>` lines.
    pub stage: Option<BusyStage>,
}

/// Command-kind-specific accumulator held alongside the common
/// [`CommandContext`] fields.
#[derive(Debug, Clone)]
pub enum CommandSub {
    Bootstrap(BootstrapCtx),
    Ping,
    QueryLogs(QueryLogsCtx),
}

/// Per-in-flight-command state. Exists iff the client is `ConnectedBusy`.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub idx: u64,
    pub stdout_done: bool,
    pub stderr_done: bool,
    pub errors: Vec<String>,
    pub exit_code: Option<String>,
    pub unhandled_stdout: Vec<String>,
    pub unhandled_stderr: Vec<String>,
    pub sub: CommandSub,
}

impl CommandContext {
    pub fn new(idx: u64, command: &Command) -> Self {
        let sub = match command {
            Command::Bootstrap => CommandSub::Bootstrap(BootstrapCtx::default()),
            Command::Ping => CommandSub::Ping,
            Command::QueryLogs(_) => CommandSub::QueryLogs(QueryLogsCtx::default()),
        };
        Self {
            idx,
            stdout_done: false,
            stderr_done: false,
            errors: Vec::new(),
            exit_code: None,
            unhandled_stdout: Vec::new(),
            unhandled_stderr: Vec::new(),
            sub,
        }
    }

    pub fn both_done(&self) -> bool {
        self.stdout_done && self.stderr_done
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
