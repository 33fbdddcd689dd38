// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line Scanner: splits a byte stream into lines on `\n` only (never
//! stripping `\r`, since the compressed substream's raw bytes are
//! indistinguishable from control characters), transparently decompressing
//! a gzip-bracketed window when it closes.

use std::io::Read;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

use crate::encoder::{GZIP_END_MARKER, GZIP_START_MARKER};

const READ_CHUNK: usize = 8192;

/// Stateful line splitter. Kept synchronous and chunk-driven so it can be
/// unit tested without a runtime; [`run`] drives it from an `AsyncRead`.
pub struct LineScanner {
    buf: Vec<u8>,
    in_gzip: bool,
    gzip_buf: Vec<u8>,
    terminated: bool,
}

impl Default for LineScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl LineScanner {
    pub fn new() -> Self {
        Self { buf: Vec::new(), in_gzip: false, gzip_buf: Vec::new(), terminated: false }
    }

    /// Feed newly read bytes; returns any complete lines they produced.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut out = Vec::new();
        if self.terminated {
            return out;
        }
        self.buf.extend_from_slice(chunk);
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            self.handle_line(line, &mut out);
            if self.terminated {
                break;
            }
        }
        out
    }

    fn handle_line(&mut self, line: Vec<u8>, out: &mut Vec<String>) {
        if !self.in_gzip {
            if line == GZIP_START_MARKER.as_bytes() {
                self.in_gzip = true;
                self.gzip_buf.clear();
                return;
            }
            out.push(bytes_to_line(&line));
            return;
        }

        if line.ends_with(GZIP_END_MARKER.as_bytes()) {
            let prefix_len = line.len() - GZIP_END_MARKER.len();
            self.gzip_buf.extend_from_slice(&line[..prefix_len]);
            match decompress_gzip(&self.gzip_buf) {
                Ok(text) => {
                    let mut lines: Vec<&str> = text.split('\n').collect();
                    if lines.last() == Some(&"") {
                        lines.pop();
                    }
                    out.extend(lines.into_iter().map(str::to_string));
                }
                Err(e) => {
                    out.push(format!("error:failed to gunzip data: {e}"));
                    self.terminated = true;
                }
            }
            self.in_gzip = false;
            self.gzip_buf.clear();
        } else {
            self.gzip_buf.extend_from_slice(&line);
            self.gzip_buf.push(b'\n');
        }
    }

    /// Signal end-of-stream. A partial trailing line with no `\n` is
    /// flushed; a scanner still inside a compressed window discards its
    /// buffered bytes rather than yielding undecoded data.
    pub fn finish(&mut self) -> Vec<String> {
        if self.terminated {
            return Vec::new();
        }
        if self.in_gzip {
            self.in_gzip = false;
            self.gzip_buf.clear();
            return Vec::new();
        }
        if self.buf.is_empty() {
            return Vec::new();
        }
        let rest = std::mem::take(&mut self.buf);
        vec![bytes_to_line(&rest)]
    }
}

fn bytes_to_line(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}

fn decompress_gzip(data: &[u8]) -> std::io::Result<String> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut text = String::new();
    decoder.read_to_string(&mut text)?;
    Ok(text)
}

/// Drive a [`LineScanner`] from an async reader, forwarding each yielded
/// line on `tx`. Returns when the reader reaches EOF or the receiver is
/// dropped.
pub async fn run(mut reader: impl AsyncRead + Unpin, tx: mpsc::Sender<String>) {
    let mut scanner = LineScanner::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => {
                for line in scanner.finish() {
                    if tx.send(line).await.is_err() {
                        return;
                    }
                }
                return;
            }
            Ok(n) => {
                for line in scanner.feed(&chunk[..n]) {
                    if tx.send(line).await.is_err() {
                        return;
                    }
                }
            }
            Err(_) => {
                for line in scanner.finish() {
                    let _ = tx.send(line).await;
                }
                return;
            }
        }
    }
}

#[cfg(test)]
#[path = "scanner_tests.rs"]
mod tests;
