// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection Manager: dials a remote shell, optionally through a shared
//! jump host, and exposes an input sink plus two scanned output streams.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use russh::client::{self, Handle};
use russh::ChannelMsg;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::error::ClientError;
use crate::logstream::{ConfigHost, LogStream};
use crate::scanner::LineScanner;

const LINE_CHANNEL_CAPACITY: usize = 256;

/// A live remote shell session: an input sink plus two line-scanned output
/// streams. Dropping it tears down the underlying session.
pub struct Connection {
    input: mpsc::Sender<String>,
    pub stdout: mpsc::Receiver<String>,
    pub stderr: mpsc::Receiver<String>,
    pump: tokio::task::JoinHandle<()>,
}

impl Connection {
    /// Write a shell fragment to the remote session's stdin.
    pub async fn send(&self, fragment: &str) -> Result<(), ClientError> {
        self.input.send(fragment.to_string()).await.map_err(|_| ClientError::connect("connection input closed", 0))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // The pump task may be parked in a channel read rather than noticing
        // the input sink close; abort it directly so teardown is atomic
        // rather than waiting for the remote to notice EOF on its end.
        self.pump.abort();
    }
}

struct Handler;

impl client::Handler for Handler {
    type Error = russh::Error;

    // Host key verification is intentionally permissive for now; a
    // known_hosts-backed mode should replace this before production use.
    async fn check_server_key(&mut self, _server_public_key: &russh::keys::PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Process-wide jump-host session cache, keyed by host identity. The first
/// caller through a given jump host dials it; later callers reuse the
/// session to open additional direct-tcpip channels through it. Acquired
/// only long enough to check/insert; never held across I/O.
static JUMPHOST_CACHE: Mutex<Vec<(ConfigHost, Arc<Handle<Handler>>)>> = Mutex::new(Vec::new());

/// Agent socket path, resolved once per process from `SSH_AUTH_SOCK`.
static AUTH_SOCK: Mutex<Option<Arc<str>>> = Mutex::new(None);

fn auth_socket_path() -> Result<Arc<str>, ClientError> {
    let mut guard = AUTH_SOCK.lock();
    if let Some(path) = guard.as_ref() {
        return Ok(path.clone());
    }
    let path = std::env::var("SSH_AUTH_SOCK")
        .map_err(|_| ClientError::connect("SSH_AUTH_SOCK is not set; agent-forwarded auth is required", 0))?;
    let path: Arc<str> = Arc::from(path.as_str());
    *guard = Some(path.clone());
    Ok(path)
}

fn find_cached_jumphost(jumphost: &ConfigHost) -> Option<Arc<Handle<Handler>>> {
    JUMPHOST_CACHE.lock().iter().find(|(h, _)| h == jumphost).map(|(_, handle)| handle.clone())
}

fn cache_jumphost(jumphost: ConfigHost, handle: Arc<Handle<Handler>>) {
    let mut cache = JUMPHOST_CACHE.lock();
    if !cache.iter().any(|(h, _)| h == &jumphost) {
        cache.push((jumphost, handle));
    }
}

async fn authenticate(handle: &mut Handle<Handler>, user: &str) -> Result<(), ClientError> {
    let sock = auth_socket_path()?;
    let mut agent = russh::keys::agent::client::AgentClient::connect_uds(sock.as_ref())
        .await
        .map_err(|e| ClientError::connect(format!("ssh-agent connect failed: {e}"), 0))?;
    let identities = agent.request_identities().await.map_err(|e| ClientError::connect(format!("ssh-agent listing failed: {e}"), 0))?;
    for key in identities {
        let (_agent_back, accepted) = handle
            .authenticate_publickey_with(user, key, None, &mut agent)
            .await
            .map_err(|e| ClientError::connect(format!("authentication failed: {e}"), 0))?;
        if accepted.success() {
            return Ok(());
        }
    }
    Err(ClientError::connect("no agent identity was accepted", 0))
}

async fn dial_direct(host: &ConfigHost) -> Result<Handle<Handler>, ClientError> {
    let config = Arc::new(client::Config::default());
    let addr = (host.addr.as_str(), host.port);
    let mut handle = client::connect(config, addr, Handler)
        .await
        .map_err(|e| ClientError::connect(format!("dial {}:{} failed: {e}", host.addr, host.port), 0))?;
    authenticate(&mut handle, &host.user).await?;
    Ok(handle)
}

async fn dial_via_jumphost(jumphost: &ConfigHost, target: &ConfigHost) -> Result<Handle<Handler>, ClientError> {
    let jump_handle = match find_cached_jumphost(jumphost) {
        Some(h) => h,
        None => {
            let handle = dial_direct(jumphost).await?;
            let handle = Arc::new(handle);
            cache_jumphost(jumphost.clone(), handle.clone());
            handle
        }
    };

    let tunnel_channel = jump_handle
        .channel_open_direct_tcpip(target.addr.clone(), target.port as u32, "127.0.0.1", 0)
        .await
        .map_err(|e| ClientError::connect(format!("jump-host tunnel to {}:{} failed: {e}", target.addr, target.port), 0))?;

    let config = Arc::new(client::Config::default());
    let mut handle = client::connect_stream(config, tunnel_channel.into_stream(), Handler)
        .await
        .map_err(|e| ClientError::connect(format!("handshake through jump host failed: {e}"), 0))?;
    authenticate(&mut handle, &target.user).await?;
    Ok(handle)
}

/// Dial the stream's host (directly or through its jump host, racing both
/// the outer and inner dials against `connect_timeout`), open a shell, and
/// spawn the pump task that drives the two [`LineScanner`]s.
pub async fn connect(stream: &LogStream, connect_timeout: Duration) -> Result<Connection, ClientError> {
    let dial = async {
        match &stream.jumphost {
            Some(jh) => dial_via_jumphost(jh, &stream.host).await,
            None => dial_direct(&stream.host).await,
        }
    };
    let handle = timeout(connect_timeout, dial)
        .await
        .map_err(|_| ClientError::connect("connect timed out", 0))??;

    let mut channel = handle.channel_open_session().await.map_err(|e| ClientError::connect(format!("open session failed: {e}"), 0))?;
    channel.request_shell(true).await.map_err(|e| ClientError::connect(format!("request shell failed: {e}"), 0))?;

    let (input_tx, mut input_rx) = mpsc::channel::<String>(LINE_CHANNEL_CAPACITY);
    let (stdout_tx, stdout_rx) = mpsc::channel::<String>(LINE_CHANNEL_CAPACITY);
    let (stderr_tx, stderr_rx) = mpsc::channel::<String>(LINE_CHANNEL_CAPACITY);

    let pump = tokio::spawn(async move {
        let _handle = handle;
        let mut out_scanner = LineScanner::new();
        let mut err_scanner = LineScanner::new();
        loop {
            tokio::select! {
                maybe_fragment = input_rx.recv() => {
                    match maybe_fragment {
                        Some(fragment) => {
                            if channel.data(fragment.as_bytes()).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                msg = channel.wait() => {
                    match msg {
                        Some(ChannelMsg::Data { data }) => {
                            for line in out_scanner.feed(&data) {
                                if stdout_tx.send(line).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                            for line in err_scanner.feed(&data) {
                                if stderr_tx.send(line).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Some(ChannelMsg::ExtendedData { .. }) => {}
                        Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) => break,
                        Some(_) => {}
                        None => break,
                    }
                }
            }
        }
        for line in out_scanner.finish() {
            let _ = stdout_tx.send(line).await;
        }
        for line in err_scanner.finish() {
            let _ = stderr_tx.send(line).await;
        }
    });

    Ok(Connection { input: input_tx, stdout: stdout_rx, stderr: stderr_rx, pump })
}

#[cfg(test)]
impl Connection {
    /// Build a `Connection` around bare channels, bypassing SSH entirely.
    /// Returns the connection plus the test's end of each channel: a sender
    /// to inject stdout/stderr lines, and a receiver to observe writes made
    /// via [`Connection::send`].
    pub(crate) fn test_harness() -> (Connection, mpsc::Sender<String>, mpsc::Sender<String>, mpsc::Receiver<String>) {
        let (input_tx, mut input_rx) = mpsc::channel::<String>(LINE_CHANNEL_CAPACITY);
        let (stdout_tx, stdout_rx) = mpsc::channel::<String>(LINE_CHANNEL_CAPACITY);
        let (stderr_tx, stderr_rx) = mpsc::channel::<String>(LINE_CHANNEL_CAPACITY);
        let (captured_tx, captured_rx) = mpsc::channel::<String>(LINE_CHANNEL_CAPACITY);
        let pump = tokio::spawn(async move {
            while let Some(fragment) = input_rx.recv().await {
                if captured_tx.send(fragment).await.is_err() {
                    break;
                }
            }
        });
        let conn = Connection { input: input_tx, stdout: stdout_rx, stderr: stderr_rx, pump };
        (conn, stdout_tx, stderr_tx, captured_rx)
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
