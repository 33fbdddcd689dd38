// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// A remote host reachable directly or through a jump host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigHost {
    pub addr: String,
    pub port: u16,
    pub user: String,
}

/// Static description of one remote log source.
///
/// Immutable for the lifetime of a client except `name`, which may be
/// updated atomically on teardown to disambiguate a replacement client
/// reusing the old name (see [`crate::client::Client::close`]).
#[derive(Debug, Clone)]
pub struct LogStream {
    pub name: String,
    pub host: ConfigHost,
    pub jumphost: Option<ConfigHost>,
    pub log_file_last: String,
    pub log_file_prev: Option<String>,
}

impl LogStream {
    pub fn new(name: impl Into<String>, host: ConfigHost, log_file_last: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host,
            jumphost: None,
            log_file_last: log_file_last.into(),
            log_file_prev: None,
        }
    }

    pub fn with_jumphost(mut self, jumphost: ConfigHost) -> Self {
        self.jumphost = Some(jumphost);
        self
    }

    pub fn with_log_file_prev(mut self, prev: impl Into<String>) -> Self {
        self.log_file_prev = Some(prev.into());
        self
    }
}
