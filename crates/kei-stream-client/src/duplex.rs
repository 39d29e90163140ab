//! Duplex stream client — the hardest part of the protocol core.
//!
//! All mutable client state (connection, per-stream sequencing, credit,
//! listeners, the replay ring) is owned by a single [`DuplexActor`] task,
//! reached exclusively through an unbounded command channel. Public methods
//! on [`DuplexClient`] are thin `async fn`s that send a command and await a
//! reply — there is no shared-memory concurrency anywhere in this module,
//! matching the cooperative, single-event-loop model the protocol assumes.

use crate::config::ClientConfig;
use crate::listener::{dispatch_to, ListenerEntry, ListenerFn, ListenerHandle};
use crate::state::{ClientEvent, ConnectionState, StreamState};
use crate::transport::{Connector, Incoming, Transport};
use kei_stream_core::error::{Error, Result};
use kei_stream_core::token_bucket::TokenBucketConfig;
use kei_stream_core::trace::{self, TraceContext};
use kei_stream_core::{compression, AckInfo, Frame, FrameKind};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

#[derive(Debug, Clone, Default)]
pub struct ClientStats {
    pub total_sent: u64,
    pub total_received: u64,
    pub reconnect_attempts: u32,
    pub state: ConnectionState,
}

enum Command {
    Connect(oneshot::Sender<Result<()>>),
    Disconnect,
    Send {
        stream_id: String,
        kind: FrameKind,
        payload: Option<Value>,
        reply: oneshot::Sender<Result<()>>,
    },
    RegisterListener {
        stream_id: Option<String>,
        func: Arc<ListenerFn>,
        reply: oneshot::Sender<u64>,
    },
    RemoveListener {
        stream_id: Option<String>,
        id: u64,
    },
    Replay {
        stream_id: String,
        since_seq: u64,
        reply: oneshot::Sender<Vec<Frame>>,
    },
    Stats(oneshot::Sender<ClientStats>),
}

/// Handle to a running duplex client. Cloning is intentionally not
/// supported (`Arc` it if you need fan-out); instead clone the receiver
/// side of events via [`broadcast::Receiver::resubscribe`].
pub struct DuplexClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl DuplexClient {
    /// Spawns the owning actor task and returns a handle plus an event
    /// subscription. The client starts in `Disconnected`; call
    /// [`DuplexClient::connect`] to begin the state machine.
    pub fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
    ) -> (Self, broadcast::Receiver<ClientEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = broadcast::channel(256);
        let actor = DuplexActor::new(config, connector, cmd_rx, event_tx);
        tokio::spawn(actor.run());
        (Self { cmd_tx }, event_rx)
    }

    pub async fn connect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send_command(Command::Connect(reply))?;
        rx.await.map_err(|_| Error::Transport("actor dropped reply".into()))?
    }

    /// Terminal for this session: stops reconnection and closes the
    /// transport with code 1000.
    pub fn disconnect(&self) {
        let _ = self.cmd_tx.send(Command::Disconnect);
    }

    pub async fn send(
        &self,
        stream_id: impl Into<String>,
        kind: FrameKind,
        payload: Option<Value>,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send_command(Command::Send {
            stream_id: stream_id.into(),
            kind,
            payload,
            reply,
        })?;
        rx.await.map_err(|_| Error::Transport("actor dropped reply".into()))?
    }

    /// Registers a listener (global if `stream_id` is `None`, otherwise
    /// scoped). Dropping the returned handle removes it.
    pub async fn register_listener(
        &self,
        stream_id: Option<String>,
        func: impl Fn(&Frame) + Send + Sync + 'static,
    ) -> ListenerHandle {
        let (reply, rx) = oneshot::channel();
        let func: Arc<ListenerFn> = Arc::new(func);
        let _ = self.cmd_tx.send(Command::RegisterListener {
            stream_id: stream_id.clone(),
            func,
            reply,
        });
        let id = rx.await.unwrap_or(0);
        let cmd_tx = self.cmd_tx.clone();
        ListenerHandle::new(id, move |id| {
            let _ = cmd_tx.send(Command::RemoveListener { stream_id, id });
        })
    }

    pub async fn replay(&self, stream_id: impl Into<String>, since_seq: u64) -> Vec<Frame> {
        let (reply, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::Replay {
            stream_id: stream_id.into(),
            since_seq,
            reply,
        });
        rx.await.unwrap_or_default()
    }

    pub async fn stats(&self) -> ClientStats {
        let (reply, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::Stats(reply));
        rx.await.unwrap_or_default()
    }

    fn send_command(&self, cmd: Command) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| Error::Transport("client actor is gone".into()))
    }
}

fn default_bucket_config() -> TokenBucketConfig {
    TokenBucketConfig::default()
}

struct DuplexActor {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: broadcast::Sender<ClientEvent>,
    state: ConnectionState,
    transport: Option<Box<dyn Transport>>,
    streams: BTreeMap<String, StreamState>,
    global_listeners: Vec<ListenerEntry>,
    per_stream_listeners: BTreeMap<String, Vec<ListenerEntry>>,
    total_sent: u64,
    total_received: u64,
    reconnect_attempts: u32,
    should_stop: bool,
}

async fn recv_or_pending(transport: &mut Option<Box<dyn Transport>>) -> Incoming {
    match transport {
        Some(t) => t.recv().await,
        None => std::future::pending().await,
    }
}

impl DuplexActor {
    fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        cmd_rx: mpsc::UnboundedReceiver<Command>,
        event_tx: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            config,
            connector,
            cmd_rx,
            event_tx,
            state: ConnectionState::Disconnected,
            transport: None,
            streams: BTreeMap::new(),
            global_listeners: Vec::new(),
            per_stream_listeners: BTreeMap::new(),
            total_sent: 0,
            total_received: 0,
            reconnect_attempts: 0,
            should_stop: false,
        }
    }

    async fn run(mut self) {
        let mut drain_tick = tokio::time::interval(Duration::from_millis(self.config.drain_interval_ms));
        drain_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            if self.should_stop && self.transport.is_none() {
                break;
            }
            tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => break,
                    }
                }
                incoming = recv_or_pending(&mut self.transport) => {
                    self.handle_inbound(incoming).await;
                }
                _ = drain_tick.tick() => {
                    self.drain_all().await;
                }
            }
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect(reply) => {
                let result = self.do_connect().await;
                let _ = reply.send(result);
            }
            Command::Disconnect => {
                self.should_stop = true;
                if let Some(t) = self.transport.as_mut() {
                    t.close(1000).await;
                }
                self.transport = None;
                self.state = ConnectionState::Disconnected;
                let _ = self.event_tx.send(ClientEvent::Disconnected);
            }
            Command::Send {
                stream_id,
                kind,
                payload,
                reply,
            } => {
                let result = self.handle_send(stream_id, kind, payload).await;
                let _ = reply.send(result);
            }
            Command::RegisterListener {
                stream_id,
                func,
                reply,
            } => {
                let entry = ListenerEntry::new(func);
                let id = entry.id;
                match stream_id {
                    Some(sid) => self.per_stream_listeners.entry(sid).or_default().push(entry),
                    None => self.global_listeners.push(entry),
                }
                let _ = reply.send(id);
            }
            Command::RemoveListener { stream_id, id } => match stream_id {
                Some(sid) => {
                    if let Some(list) = self.per_stream_listeners.get_mut(&sid) {
                        list.retain(|e| e.id != id);
                        if list.is_empty() {
                            self.per_stream_listeners.remove(&sid);
                        }
                    }
                }
                None => self.global_listeners.retain(|e| e.id != id),
            },
            Command::Replay {
                stream_id,
                since_seq,
                reply,
            } => {
                let frames = self
                    .streams
                    .get(&stream_id)
                    .map(|s| s.replay_since(since_seq))
                    .unwrap_or_default();
                let _ = reply.send(frames);
            }
            Command::Stats(reply) => {
                let _ = reply.send(ClientStats {
                    total_sent: self.total_sent,
                    total_received: self.total_received,
                    reconnect_attempts: self.reconnect_attempts,
                    state: self.state,
                });
            }
        }
    }

    async fn handle_send(
        &mut self,
        stream_id: String,
        kind: FrameKind,
        payload: Option<Value>,
    ) -> Result<()> {
        let mut frame = Frame::new(kind, stream_id.clone()).with_ts_now();
        if let Some(p) = payload {
            frame = frame.with_payload(p);
        }
        let ctx = TraceContext::generate();
        trace::instrument_frame(&mut frame, &ctx);
        let frame = match compression::compress(&frame, &self.config.compression) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, "compression failed, sending raw payload");
                frame
            }
        };
        frame.validate()?;

        let state = self
            .streams
            .entry(stream_id.clone())
            .or_insert_with(|| StreamState::new(default_bucket_config(), 0));
        state.pending.push_back(frame);
        self.drain_stream(&stream_id).await;
        Ok(())
    }

    async fn drain_all(&mut self) {
        let stream_ids: Vec<String> = self
            .streams
            .iter()
            .filter(|(_, s)| !s.pending.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        for stream_id in stream_ids {
            self.drain_stream(&stream_id).await;
        }
    }

    /// Drains `pending[stream_id]` while credit and tokens allow, assigning
    /// seq numbers and decrementing credit optimistically before the
    /// transport write is confirmed. Intentional: avoids double-counting
    /// under burst.
    async fn drain_stream(&mut self, stream_id: &str) {
        if self.transport.is_none() {
            // No drain runs while disconnected; frames stay queued until a
            // connection (and any Resume handshake) is re-established.
            return;
        }
        loop {
            let Some(state) = self.streams.get_mut(stream_id) else {
                return;
            };
            if state.pending.is_empty() || state.credit == 0 {
                return;
            }
            if !state.bucket.try_consume(None) {
                return;
            }
            let mut frame = state.pending.pop_front().expect("checked non-empty above");
            state.last_seq_out += 1;
            frame.seq = Some(state.last_seq_out);
            state.credit -= 1;

            let wire = match frame.to_wire() {
                Ok(w) => w,
                Err(e) => {
                    tracing::warn!(error = %e, stream_id, "failed to serialize frame");
                    continue;
                }
            };
            let transport = self
                .transport
                .as_mut()
                .expect("checked Some at function entry; single-owner task");
            match transport.send_text(wire).await {
                Ok(()) => self.total_sent += 1,
                Err(e) => tracing::warn!(error = %e, stream_id, "transport write failed, frame lost"),
            }
        }
    }

    async fn handle_inbound(&mut self, incoming: Incoming) {
        let text = match incoming {
            Incoming::Text(t) => t,
            Incoming::Closed(code) => {
                self.on_transport_closed(code).await;
                return;
            }
        };
        self.total_received += 1;
        let frame = match Frame::from_wire(&text) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, "discarding invalid inbound frame");
                return;
            }
        };
        let frame = match compression::decompress(&frame) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, "decompression failed, using raw frame");
                frame
            }
        };

        let stream_id = frame.stream_id.clone();
        {
            let state = self
                .streams
                .entry(stream_id.clone())
                .or_insert_with(|| StreamState::new(default_bucket_config(), 0));
            state.record(frame.clone());
            if let Some(seq) = frame.seq {
                state.last_seq_in = seq;
            }
        }

        match frame.kind {
            FrameKind::Ack => {
                if let Some(credit) = frame.ack.as_ref().and_then(|a| a.credit)
                    && let Some(state) = self.streams.get_mut(&stream_id)
                {
                    state.credit = credit;
                }
                self.drain_stream(&stream_id).await;
            }
            FrameKind::Resume => {
                let credit = frame
                    .ack
                    .as_ref()
                    .and_then(|a| a.credit)
                    .unwrap_or(self.config.ack_credit_target);
                if let Some(state) = self.streams.get_mut(&stream_id) {
                    state.credit = credit;
                }
                self.drain_stream(&stream_id).await;
            }
            FrameKind::Heartbeat => {
                let reply = Frame::new(FrameKind::Heartbeat, stream_id.clone());
                if let Some(t) = self.transport.as_mut()
                    && let Ok(wire) = reply.to_wire()
                {
                    let _ = t.send_text(wire).await;
                }
            }
            FrameKind::Error => {
                let message = frame.error.as_ref().map(|e| e.message.clone()).unwrap_or_default();
                let _ = self.event_tx.send(ClientEvent::Error {
                    kind: "remote".into(),
                    message,
                });
                self.dispatch(&stream_id, &frame);
            }
            _ => {
                self.dispatch(&stream_id, &frame);
                self.run_ack_policy(&stream_id).await;
            }
        }
        let _ = self.event_tx.send(ClientEvent::Frame(frame));
    }

    fn dispatch(&self, stream_id: &str, frame: &Frame) {
        if let Some(list) = self.per_stream_listeners.get(stream_id) {
            dispatch_to(list, frame);
        }
        dispatch_to(&self.global_listeners, frame);
    }

    /// Flow-control acknowledgement cadence.
    async fn run_ack_policy(&mut self, stream_id: &str) {
        let ack_every = self.config.ack_every;
        let ack_credit_target = self.config.ack_credit_target;
        let ack_seq = {
            let Some(state) = self.streams.get_mut(stream_id) else {
                return;
            };
            state.inflight_since_ack += 1;
            if state.inflight_since_ack < ack_every {
                return;
            }
            state.inflight_since_ack = 0;
            state.last_seq_in
        };
        let mut ack_frame = Frame::new(FrameKind::Ack, stream_id.to_string());
        ack_frame.ack = Some(AckInfo {
            ack_seq: Some(ack_seq),
            credit: Some(ack_credit_target),
            reason: None,
        });
        if let Some(t) = self.transport.as_mut()
            && let Ok(wire) = ack_frame.to_wire()
        {
            let _ = t.send_text(wire).await;
        }
    }

    async fn on_transport_closed(&mut self, code: u16) {
        self.transport = None;
        if self.should_stop || code == 1000 {
            self.state = ConnectionState::Disconnected;
            let _ = self.event_tx.send(ClientEvent::Disconnected);
            return;
        }
        self.begin_reconnect().await;
    }

    /// Exponential backoff `min(reconnect_max_ms, reconnect_initial_ms *
    /// 2^attempt)`, capped at `max_reconnect_attempts` before entering
    /// `Error`.
    async fn begin_reconnect(&mut self) {
        self.state = ConnectionState::Reconnecting;
        loop {
            if self.should_stop {
                self.state = ConnectionState::Disconnected;
                return;
            }
            if self.reconnect_attempts >= self.config.max_reconnect_attempts {
                self.state = ConnectionState::Error;
                let _ = self.event_tx.send(ClientEvent::Error {
                    kind: "max_reconnects".into(),
                    message: "maximum reconnect attempts exceeded".into(),
                });
                return;
            }
            let _ = self.event_tx.send(ClientEvent::Reconnecting {
                attempt: self.reconnect_attempts + 1,
            });
            let delay_ms = self
                .config
                .reconnect_initial_ms
                .saturating_mul(2u64.saturating_pow(self.reconnect_attempts))
                .min(self.config.reconnect_max_ms);
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            self.reconnect_attempts += 1;
            match self.do_connect().await {
                Ok(()) => return,
                Err(e) => {
                    tracing::warn!(error = %e, attempt = self.reconnect_attempts, "reconnect attempt failed");
                }
            }
        }
    }

    async fn do_connect(&mut self) -> Result<()> {
        self.state = ConnectionState::Connecting;
        let url = self.config.connect_url();
        let fut = self.connector.connect(&url);
        let transport = tokio::time::timeout(Duration::from_millis(self.config.connect_timeout_ms), fut)
            .await
            .map_err(|_| Error::Timeout("connect".into()))??;
        self.transport = Some(transport);
        self.state = ConnectionState::Connected;
        self.reconnect_attempts = 0;
        let _ = self.event_tx.send(ClientEvent::Connected);
        self.send_resume_frames().await;
        Ok(())
    }

    /// Resume precedence: sent strictly before any other queued frame for a
    /// stream after reconnection.
    async fn send_resume_frames(&mut self) {
        let stream_ids: Vec<String> = self
            .streams
            .iter()
            .filter(|(_, s)| s.last_seq_in > 0)
            .map(|(id, _)| id.clone())
            .collect();
        for stream_id in stream_ids {
            let last_seq = self.streams.get(&stream_id).map(|s| s.last_seq_in).unwrap_or(0);
            let mut frame = Frame::new(FrameKind::Resume, stream_id.clone()).with_payload(serde_json::json!({
                "stream_id": stream_id,
                "last_seq": last_seq,
                "session_id": self.config.session_id,
            }));
            let ctx = TraceContext::generate();
            trace::instrument_frame(&mut frame, &ctx);
            if let Some(t) = self.transport.as_mut()
                && let Ok(wire) = frame.to_wire()
            {
                let _ = t.send_text(wire).await;
            }
        }
    }
}
