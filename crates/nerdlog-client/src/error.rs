// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Error taxonomy for the per-logstream client.
///
/// The event loop never panics on remote-originated content; every failure
/// a connected host can cause ends up as one of these variants, either
/// published on the updates channel or returned through a command's reply
/// channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Connect or auth failure. Non-fatal: the client retries.
    Connect { detail: String, attempt: u32 },
    /// Agent `error:`, missing `bootstrap ok`, non-zero exit, or time-format
    /// autodetect failure. Fatal for this connection.
    Bootstrap { detail: String },
    /// Malformed line where a prefix was recognized but the payload was not.
    /// Accumulated on the in-flight command; does not tear down the client.
    Protocol { detail: String },
    /// Error surfaced through a command's reply channel.
    Command { detail: String },
    /// Enqueue attempted while not connected.
    NotConnected,
}

impl ClientError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Bootstrap { .. } => "bootstrap",
            Self::Protocol { .. } => "protocol",
            Self::Command { .. } => "command",
            Self::NotConnected => "not_connected",
        }
    }

    pub fn connect(detail: impl Into<String>, attempt: u32) -> Self {
        Self::Connect { detail: detail.into(), attempt }
    }

    pub fn bootstrap(detail: impl Into<String>) -> Self {
        Self::Bootstrap { detail: detail.into() }
    }

    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::Protocol { detail: detail.into() }
    }

    pub fn command(detail: impl Into<String>) -> Self {
        Self::Command { detail: detail.into() }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect { detail, attempt } => write!(f, "connect failed (attempt {attempt}): {detail}"),
            Self::Bootstrap { detail } => write!(f, "bootstrap failed: {detail}"),
            Self::Protocol { detail } => write!(f, "protocol error: {detail}"),
            Self::Command { detail } => write!(f, "{detail}"),
            Self::NotConnected => f.write_str("not connected"),
        }
    }
}

impl std::error::Error for ClientError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
