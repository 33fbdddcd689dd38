// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Serialized query form: `nerdlog --lstreams <v> --time <v> --pattern <v>
//! --selquery <v>`, used to share a query as a single shell-escaped string.

use std::fmt;

pub const EXEC_NAME: &str = "nerdlog";

/// `--selquery` is optional for backward compatibility; this is what an
/// absent flag defaults to.
pub const DEFAULT_SELECT_QUERY: &str = "";

/// Everything that defines a query: the logstreams filter, time range, and
/// pattern, plus the select-query expression.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryFull {
    pub lstreams: String,
    pub time: String,
    pub pattern: String,
    pub select_query: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryParseError {
    Empty,
    WrongProgram { found: String },
    MissingFlag { flag: &'static str },
    Shell(String),
}

impl fmt::Display for QueryParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty command"),
            Self::WrongProgram { found } => write!(f, "command should begin with {EXEC_NAME:?}, but it's {found:?}"),
            Self::MissingFlag { flag } => write!(f, "{flag} is missing"),
            Self::Shell(detail) => write!(f, "shell parse error: {detail}"),
        }
    }
}

impl std::error::Error for QueryParseError {}

impl QueryFull {
    /// Marshal into a single shell-escaped command line.
    pub fn marshal(&self) -> String {
        shell_words::join([EXEC_NAME, "--lstreams", &self.lstreams, "--time", &self.time, "--pattern", &self.pattern, "--selquery", &self.select_query])
    }

    /// Parse a previously-marshaled command line. Flag order is irrelevant;
    /// `--selquery` may be absent (defaults to [`DEFAULT_SELECT_QUERY`]), but
    /// `--lstreams`, `--time`, and `--pattern` are mandatory.
    pub fn unmarshal(cmd: &str) -> Result<Self, QueryParseError> {
        let parts = shell_words::split(cmd).map_err(|e| QueryParseError::Shell(e.to_string()))?;
        let mut iter = parts.into_iter();
        let program = iter.next().ok_or(QueryParseError::Empty)?;
        if program != EXEC_NAME {
            return Err(QueryParseError::WrongProgram { found: program });
        }

        let rest: Vec<String> = iter.collect();
        let mut lstreams = None;
        let mut time = None;
        let mut pattern = None;
        let mut select_query = None;
        for pair in rest.chunks_exact(2) {
            match pair[0].as_str() {
                "--lstreams" => lstreams = Some(pair[1].clone()),
                "--time" => time = Some(pair[1].clone()),
                "--pattern" => pattern = Some(pair[1].clone()),
                "--selquery" => select_query = Some(pair[1].clone()),
                _ => {}
            }
        }

        Ok(QueryFull {
            lstreams: lstreams.ok_or(QueryParseError::MissingFlag { flag: "--lstreams" })?,
            time: time.ok_or(QueryParseError::MissingFlag { flag: "--time" })?,
            pattern: pattern.ok_or(QueryParseError::MissingFlag { flag: "--pattern" })?,
            select_query: select_query.unwrap_or_else(|| DEFAULT_SELECT_QUERY.to_string()),
        })
    }
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
