// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client State Machine: the single-threaded event loop that owns one
//! connection, drives connect → bootstrap → (idle ↔ busy) → disconnect →
//! reconnect, and publishes [`ClientUpdate`]s.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono_tz::Tz;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::command::{Command, CommandContext, CommandOutcome, CommandReply, CommandSub, Enqueued};
use crate::connection::{self, Connection};
use crate::encoder;
use crate::error::ClientError;
use crate::events::{ClientState, ClientUpdate};
use crate::logstream::LogStream;
use crate::parser::{self, Stream};
use crate::timefmt::{self, TimeFormatDescr};

const AGENT_SCRIPT: &str = include_str!("../assets/nerdlog_agent.sh");

const ENQUEUE_CHANNEL_CAPACITY: usize = 32;
const DISCONNECT_CHANNEL_CAPACITY: usize = 1;
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Tunables for a running client. Constructed by the (out-of-scope) caller
/// alongside the [`LogStream`] it dials.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Identifier embedded in encoded commands, distinguishing this client's
    /// in-flight requests from any other client talking to the same agent.
    pub client_id: String,
    /// Per-dial-attempt timeout, covering both the outer and (if present)
    /// jump-host dial.
    pub connect_timeout: Duration,
    /// Delay before a fresh dial attempt after a failed one.
    pub reconnect_delay: Duration,
    /// How long a connection may sit idle before a keepalive ping is sent.
    pub idle_ping_after: Duration,
    /// Whether query responses should be requested gzip-compressed over the
    /// wire.
    pub use_gzip: bool,
}

impl ClientConfig {
    /// Sane defaults for every tunable but `client_id`.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            connect_timeout: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(2),
            idle_ping_after: Duration::from_secs(40),
            use_gzip: false,
        }
    }
}

/// Requests a client may receive on its (capacity-1) disconnect channel.
#[derive(Debug, Clone)]
enum DisconnectRequest {
    Close(Option<String>),
    Reconnect,
}

/// Dials a [`Connection`] for a stream. The production implementation goes
/// over SSH; tests substitute an in-memory fake.
pub trait Dialer: Send + Sync {
    fn dial(&self, stream: LogStream, connect_timeout: Duration) -> Pin<Box<dyn Future<Output = Result<Connection, ClientError>> + Send>>;
}

struct SshDialer;

impl Dialer for SshDialer {
    fn dial(&self, stream: LogStream, connect_timeout: Duration) -> Pin<Box<dyn Future<Output = Result<Connection, ClientError>> + Send>> {
        Box::pin(async move { connection::connect(&stream, connect_timeout).await })
    }
}

/// A handle to a running client's event loop.
pub struct ClientHandle {
    enqueue_tx: mpsc::Sender<Enqueued>,
    disconnect_tx: mpsc::Sender<DisconnectRequest>,
    shutdown: CancellationToken,
    join: tokio::task::JoinHandle<()>,
}

impl ClientHandle {
    /// Spawn a client for `stream`, publishing updates on `updates`.
    pub fn spawn(stream: LogStream, config: ClientConfig, updates: mpsc::Sender<ClientUpdate>) -> Self {
        Self::spawn_with_dialer(stream, config, updates, Arc::new(SshDialer))
    }

    pub(crate) fn spawn_with_dialer(stream: LogStream, config: ClientConfig, updates: mpsc::Sender<ClientUpdate>, dialer: Arc<dyn Dialer>) -> Self {
        let (enqueue_tx, enqueue_rx) = mpsc::channel(ENQUEUE_CHANNEL_CAPACITY);
        let (disconnect_tx, disconnect_rx) = mpsc::channel(DISCONNECT_CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();
        let client = Client::new(stream, config, updates, enqueue_rx, disconnect_rx, shutdown.clone(), dialer);
        let join = tokio::spawn(client.run());
        Self { enqueue_tx, disconnect_tx, shutdown, join }
    }

    /// Submit a command. If the send itself fails (the client has already
    /// torn down), returns [`ClientError::NotConnected`] directly rather
    /// than waiting on a reply that will never come.
    pub async fn enqueue(&self, command: Command) -> CommandReply {
        let (reply_tx, reply_rx) = oneshot::channel();
        let enqueued = Enqueued::new(command, Some(reply_tx));
        if self.enqueue_tx.send(enqueued).await.is_err() {
            return Err(ClientError::NotConnected);
        }
        reply_rx.await.unwrap_or(Err(ClientError::NotConnected))
    }

    /// Initiate teardown. `new_name` is published with the final `TornDown`
    /// update in place of the stream's configured name, when given.
    pub fn close(&self, new_name: Option<String>) {
        let _ = self.disconnect_tx.try_send(DisconnectRequest::Close(new_name));
    }

    /// Force a drop-and-reconnect without tearing the client down.
    pub fn reconnect(&self) {
        let _ = self.disconnect_tx.try_send(DisconnectRequest::Reconnect);
    }

    /// Wait for the event loop to exit.
    pub async fn join(self) {
        let _ = self.join.await;
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct Client {
    stream: LogStream,
    config: ClientConfig,
    updates: mpsc::Sender<ClientUpdate>,
    enqueue_rx: mpsc::Receiver<Enqueued>,
    disconnect_rx: mpsc::Receiver<DisconnectRequest>,
    shutdown: CancellationToken,
    dialer: Arc<dyn Dialer>,

    state: ClientState,
    connection: Option<Connection>,
    connect_rx: Option<oneshot::Receiver<Result<Connection, ClientError>>>,
    attempt: u32,
    tearing_down: bool,
    new_name_on_teardown: Option<String>,
    deferred_reconnect_at: Option<Instant>,

    queue: VecDeque<Enqueued>,
    command: Option<CommandContext>,
    active_reply: Option<oneshot::Sender<CommandReply>>,
    idx_counter: u64,
    last_activity: Instant,

    descr: Option<TimeFormatDescr>,
    tz: Tz,
}

impl Client {
    fn new(
        stream: LogStream,
        config: ClientConfig,
        updates: mpsc::Sender<ClientUpdate>,
        enqueue_rx: mpsc::Receiver<Enqueued>,
        disconnect_rx: mpsc::Receiver<DisconnectRequest>,
        shutdown: CancellationToken,
        dialer: Arc<dyn Dialer>,
    ) -> Self {
        Self {
            stream,
            config,
            updates,
            enqueue_rx,
            disconnect_rx,
            shutdown,
            dialer,
            state: ClientState::Disconnected,
            connection: None,
            connect_rx: None,
            attempt: 0,
            tearing_down: false,
            new_name_on_teardown: None,
            deferred_reconnect_at: None,
            queue: VecDeque::new(),
            command: None,
            active_reply: None,
            idx_counter: 0,
            last_activity: Instant::now(),
            descr: None,
            tz: chrono_tz::UTC,
        }
    }

    async fn run(mut self) {
        self.begin_connect().await;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                Some(result) = recv_connect_result(&mut self.connect_rx) => {
                    self.connect_rx = None;
                    self.on_connect_result(result).await;
                    if self.terminal() { break; }
                }

                Some(enqueued) = self.enqueue_rx.recv() => {
                    self.on_enqueue(enqueued).await;
                }

                Some(req) = self.disconnect_rx.recv() => {
                    self.on_disconnect_request(req).await;
                    if self.terminal() { break; }
                }

                Some(event) = recv_either_stream(&mut self.connection) => {
                    match event {
                        StreamEvent::Line(which, line) => self.on_line(which, line).await,
                        StreamEvent::Closed => self.on_disconnected().await,
                    }
                    if self.terminal() { break; }
                }

                _ = tokio::time::sleep(TICK_INTERVAL) => {
                    self.on_tick().await;
                    if self.terminal() { break; }
                }
            }
        }

        let name = self.new_name_on_teardown.take().unwrap_or_else(|| self.stream.name.clone());
        let _ = self.updates.send(ClientUpdate::TornDown { name }).await;
    }

    fn terminal(&self) -> bool {
        self.tearing_down && self.state == ClientState::Disconnected
    }

    /// Arm the deferred reconnect unless we're on our way out. Called after
    /// every path that lands in `Disconnected` involuntarily: a failed dial,
    /// a failed bootstrap, or the connection closing out from under us.
    fn arm_reconnect(&mut self) {
        if !self.tearing_down {
            self.deferred_reconnect_at = Some(Instant::now() + self.config.reconnect_delay);
        }
    }

    async fn set_state(&mut self, new: ClientState) {
        if self.state == new {
            return;
        }
        self.state = new;
        let _ = self.updates.send(ClientUpdate::State { name: self.stream.name.clone(), state: new }).await;
    }

    async fn begin_connect(&mut self) {
        self.set_state(ClientState::Connecting).await;
        let stream = self.stream.clone();
        let dial = self.dialer.dial(stream, self.config.connect_timeout);
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let result = dial.await;
            let _ = tx.send(result);
        });
        self.connect_rx = Some(rx);
    }

    async fn on_connect_result(&mut self, result: Result<Connection, ClientError>) {
        match result {
            Ok(conn) => {
                self.connection = Some(conn);
                self.attempt = 0;
                self.last_activity = Instant::now();
                self.set_state(ClientState::ConnectedIdle).await;
                self.queue.push_back(Enqueued::new(Command::Bootstrap, None));
                self.start_next_command().await;
            }
            Err(err) => {
                self.attempt += 1;
                let _ = self
                    .updates
                    .send(ClientUpdate::ConnDetails { name: self.stream.name.clone(), err: err.to_string(), attempt: self.attempt })
                    .await;
                self.arm_reconnect();
                self.set_state(ClientState::Disconnected).await;
            }
        }
    }

    async fn on_enqueue(&mut self, mut enqueued: Enqueued) {
        if !self.state.is_connected() {
            if let Some(reply) = enqueued.reply.take() {
                let _ = reply.send(Err(ClientError::NotConnected));
            }
            return;
        }
        let was_idle = self.state == ClientState::ConnectedIdle;
        self.queue.push_back(enqueued);
        if was_idle {
            self.start_next_command().await;
        }
    }

    async fn on_disconnect_request(&mut self, req: DisconnectRequest) {
        match req {
            DisconnectRequest::Close(new_name) => {
                self.tearing_down = true;
                self.new_name_on_teardown = new_name;
                self.teardown_connection().await;
            }
            DisconnectRequest::Reconnect => {
                self.teardown_connection().await;
                if !self.tearing_down {
                    self.begin_connect().await;
                }
            }
        }
    }

    async fn teardown_connection(&mut self) {
        if self.state == ClientState::Connecting {
            self.connect_rx = None;
            self.set_state(ClientState::Disconnected).await;
            return;
        }
        if !self.state.is_connected() {
            return;
        }
        self.set_state(ClientState::Disconnecting).await;
        self.connection = None;
        self.queue.clear();
        self.command = None;
        self.active_reply = None;
        self.descr = None;
        self.set_state(ClientState::Disconnected).await;
    }

    /// Both stream receivers closed while still connected: the remote end
    /// (or the SSH session underneath it) went away without us asking. Tear
    /// down and, unless we're on our way out, queue a reconnect the same way
    /// a failed dial does.
    async fn on_disconnected(&mut self) {
        self.teardown_connection().await;
        self.arm_reconnect();
    }

    async fn on_tick(&mut self) {
        if self.state == ClientState::Disconnected && !self.tearing_down {
            if let Some(at) = self.deferred_reconnect_at {
                if Instant::now() >= at {
                    self.deferred_reconnect_at = None;
                    self.begin_connect().await;
                }
            }
        }
        if self.state == ClientState::ConnectedIdle && self.last_activity.elapsed() >= self.config.idle_ping_after {
            self.queue.push_back(Enqueued::new(Command::Ping, None));
            self.start_next_command().await;
        }
    }

    async fn start_next_command(&mut self) {
        let Some(enqueued) = self.queue.pop_front() else {
            return;
        };
        let idx = self.idx_counter;
        self.idx_counter += 1;
        let ctx = CommandContext::new(idx, &enqueued.command);
        let fragment = match &enqueued.command {
            Command::Bootstrap => encoder::encode_bootstrap(&self.config.client_id, &self.stream, idx, AGENT_SCRIPT),
            Command::Ping => encoder::encode_ping(idx),
            Command::QueryLogs(args) => {
                let Some(descr) = self.descr.clone() else {
                    unreachable!("QueryLogs dispatched before bootstrap completed")
                };
                encoder::encode_query_logs(&self.config.client_id, &self.stream, idx, args, &descr, self.tz, self.config.use_gzip)
            }
        };

        self.active_reply = enqueued.reply;
        self.command = Some(ctx);
        self.last_activity = Instant::now();
        self.set_state(ClientState::ConnectedBusy).await;

        if let Some(conn) = &self.connection {
            if let Err(e) = conn.send(&fragment).await {
                tracing::debug!(error = %e, "failed to write command to input sink");
            }
        }
    }

    async fn on_line(&mut self, which: Stream, line: String) {
        self.last_activity = Instant::now();
        let Some(ctx) = self.command.as_mut() else {
            tracing::debug!(%line, "line received with no in-flight command");
            return;
        };
        let lstream_name = self.stream.name.clone();
        let tz = self.tz;
        let descr = self.descr.clone();
        let stage = parser::process_line(ctx, which, &line, &lstream_name, descr.as_ref(), tz);
        if let Some(stage) = stage {
            let _ = self.updates.send(ClientUpdate::Busy { name: self.stream.name.clone(), stage }).await;
        }
        if self.command.as_ref().is_some_and(CommandContext::both_done) {
            self.finish_command().await;
        }
    }

    async fn finish_command(&mut self) {
        let Some(ctx) = self.command.take() else {
            return;
        };
        match &ctx.sub {
            CommandSub::Bootstrap(_) => self.finish_bootstrap(ctx).await,
            CommandSub::Ping => self.finish_ping(ctx).await,
            CommandSub::QueryLogs(_) => self.finish_query_logs(ctx).await,
        }
    }

    async fn finish_bootstrap(&mut self, ctx: CommandContext) {
        let summary = parser::summary_error(&ctx, &[]);
        let CommandContext { sub, unhandled_stdout, unhandled_stderr, .. } = ctx;
        let CommandSub::Bootstrap(b) = sub else {
            unreachable!("finish_bootstrap called with non-bootstrap sub-context")
        };

        if b.received_success && summary.is_none() {
            match timefmt::detect(&b.example_log_lines) {
                Some(descr) => {
                    let tz_name = b.timezone.as_deref().unwrap_or("UTC");
                    self.tz = timefmt::resolve_timezone(tz_name);
                    self.descr = Some(descr);
                    self.set_state(ClientState::ConnectedIdle).await;
                    self.start_next_command().await;
                }
                None => {
                    let err = "could not detect a timestamp layout from the bootstrap example log lines".to_string();
                    let _ = self.updates.send(ClientUpdate::BootstrapDetails { name: self.stream.name.clone(), err }).await;
                    self.teardown_connection().await;
                    self.arm_reconnect();
                }
            }
            return;
        }

        let err = summary.unwrap_or_else(|| {
            if !unhandled_stdout.is_empty() || !unhandled_stderr.is_empty() {
                format!("bootstrap did not report success; stdout: {} | stderr: {}", unhandled_stdout.join(" | "), unhandled_stderr.join(" | "))
            } else {
                "bootstrap failed".to_string()
            }
        });
        let _ = self.updates.send(ClientUpdate::BootstrapDetails { name: self.stream.name.clone(), err }).await;
        self.teardown_connection().await;
        self.arm_reconnect();
    }

    async fn finish_ping(&mut self, _ctx: CommandContext) {
        if let Some(reply) = self.active_reply.take() {
            let _ = reply.send(Ok(CommandOutcome::Ping));
        }
        self.set_state(ClientState::ConnectedIdle).await;
        self.start_next_command().await;
    }

    async fn finish_query_logs(&mut self, ctx: CommandContext) {
        let CommandSub::QueryLogs(ref q) = ctx.sub else {
            unreachable!("finish_query_logs called with non-query sub-context")
        };
        let summary = parser::summary_error(&ctx, &q.response.protocol_errors);
        let CommandContext { sub, .. } = ctx;
        let CommandSub::QueryLogs(q) = sub else {
            unreachable!("finish_query_logs called with non-query sub-context")
        };
        let mut response = q.response;
        response.error = summary;
        if let Some(reply) = self.active_reply.take() {
            let _ = reply.send(Ok(CommandOutcome::QueryLogs(response)));
        }
        self.set_state(ClientState::ConnectedIdle).await;
        self.start_next_command().await;
    }
}

async fn recv_connect_result(rx: &mut Option<oneshot::Receiver<Result<Connection, ClientError>>>) -> Option<Result<Connection, ClientError>> {
    match rx {
        Some(r) => Some(r.await.unwrap_or_else(|_| Err(ClientError::connect("connect task ended unexpectedly", 0)))),
        None => std::future::pending().await,
    }
}

/// Outcome of polling a connection's two output streams.
enum StreamEvent {
    Line(Stream, String),
    /// Both `stdout` and `stderr` closed: the pump task ended, meaning the
    /// remote session is gone. Distinct from `conn` being `None`, which just
    /// means there's currently nothing to poll.
    Closed,
}

async fn recv_either_stream(conn: &mut Option<Connection>) -> Option<StreamEvent> {
    match conn {
        Some(c) => {
            tokio::select! {
                Some(line) = c.stdout.recv() => Some(StreamEvent::Line(Stream::Stdout, line)),
                Some(line) = c.stderr.recv() => Some(StreamEvent::Line(Stream::Stderr, line)),
                else => Some(StreamEvent::Closed),
            }
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
