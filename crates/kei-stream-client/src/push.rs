//! Push-only stream client: one-way SSE receive with no outbound sending,
//! credit, or token-bucket pacing. Reconnection is independent from
//! any [`crate::duplex::DuplexClient`] running alongside it — its own
//! backoff counter, its own terminal `Error` state.

use crate::config::PushConfig;
use crate::listener::{dispatch_to, ListenerEntry, ListenerFn, ListenerHandle};
use crate::state::{ClientEvent, ConnectionState};
use crate::transport::PushConnector;
use crate::transport::PushTransport;
use kei_stream_core::compression;
use kei_stream_core::error::{Error, Result};
use kei_stream_core::{Frame, FrameKind};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

#[derive(Debug, Clone, Default)]
pub struct PushStats {
    pub total_received: u64,
    pub last_frame_ts: Option<String>,
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
}

enum Command {
    Connect(oneshot::Sender<Result<()>>),
    Disconnect,
    RegisterListener {
        kind: Option<FrameKind>,
        func: Arc<ListenerFn>,
        reply: oneshot::Sender<u64>,
    },
    RemoveListener {
        kind: Option<FrameKind>,
        id: u64,
    },
    Stats(oneshot::Sender<PushStats>),
}

pub struct PushClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl PushClient {
    pub fn new(
        config: PushConfig,
        connector: Arc<dyn PushConnector>,
    ) -> (Self, broadcast::Receiver<ClientEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = broadcast::channel(256);
        let actor = PushActor::new(config, connector, cmd_rx, event_tx);
        tokio::spawn(actor.run());
        (Self { cmd_tx }, event_rx)
    }

    pub async fn connect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Connect(reply))
            .map_err(|_| Error::Transport("actor gone".into()))?;
        rx.await.map_err(|_| Error::Transport("actor dropped reply".into()))?
    }

    pub fn disconnect(&self) {
        let _ = self.cmd_tx.send(Command::Disconnect);
    }

    /// Registers a listener. `kind: None` dispatches for every frame;
    /// `Some(kind)` scopes dispatch to that `FrameKind` only.
    pub async fn register_listener(
        &self,
        kind: Option<FrameKind>,
        func: impl Fn(&Frame) + Send + Sync + 'static,
    ) -> ListenerHandle {
        let (reply, rx) = oneshot::channel();
        let func: Arc<ListenerFn> = Arc::new(func);
        let _ = self.cmd_tx.send(Command::RegisterListener { kind, func, reply });
        let id = rx.await.unwrap_or(0);
        let cmd_tx = self.cmd_tx.clone();
        ListenerHandle::new(id, move |id| {
            let _ = cmd_tx.send(Command::RemoveListener { kind, id });
        })
    }

    pub async fn stats(&self) -> PushStats {
        let (reply, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::Stats(reply));
        rx.await.unwrap_or_default()
    }
}

struct PushActor {
    config: PushConfig,
    connector: Arc<dyn PushConnector>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: broadcast::Sender<ClientEvent>,
    state: ConnectionState,
    transport: Option<Box<dyn PushTransport>>,
    global_listeners: Vec<ListenerEntry>,
    per_kind_listeners: HashMap<FrameKind, Vec<ListenerEntry>>,
    total_received: u64,
    last_frame_ts: Option<String>,
    reconnect_attempts: u32,
    should_stop: bool,
}

async fn recv_or_pending(transport: &mut Option<Box<dyn PushTransport>>) -> Option<String> {
    match transport {
        Some(t) => t.recv_text().await,
        None => std::future::pending().await,
    }
}

impl PushActor {
    fn new(
        config: PushConfig,
        connector: Arc<dyn PushConnector>,
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
            global_listeners: Vec::new(),
            per_kind_listeners: HashMap::new(),
            total_received: 0,
            last_frame_ts: None,
            reconnect_attempts: 0,
            should_stop: false,
        }
    }

    async fn run(mut self) {
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
                text = recv_or_pending(&mut self.transport) => {
                    self.handle_inbound(text).await;
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
                self.transport = None;
                self.state = ConnectionState::Disconnected;
                let _ = self.event_tx.send(ClientEvent::Disconnected);
            }
            Command::RegisterListener { kind, func, reply } => {
                let entry = ListenerEntry::new(func);
                let id = entry.id;
                match kind {
                    Some(k) => self.per_kind_listeners.entry(k).or_default().push(entry),
                    None => self.global_listeners.push(entry),
                }
                let _ = reply.send(id);
            }
            Command::RemoveListener { kind, id } => match kind {
                Some(k) => {
                    if let Some(list) = self.per_kind_listeners.get_mut(&k) {
                        list.retain(|e| e.id != id);
                        if list.is_empty() {
                            self.per_kind_listeners.remove(&k);
                        }
                    }
                }
                None => self.global_listeners.retain(|e| e.id != id),
            },
            Command::Stats(reply) => {
                let _ = reply.send(PushStats {
                    total_received: self.total_received,
                    last_frame_ts: self.last_frame_ts.clone(),
                    state: self.state,
                    reconnect_attempts: self.reconnect_attempts,
                });
            }
        }
    }

    async fn handle_inbound(&mut self, text: Option<String>) {
        let Some(text) = text else {
            self.on_transport_closed().await;
            return;
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
        self.last_frame_ts = frame.ts.clone();

        if let Some(list) = self.per_kind_listeners.get(&frame.kind) {
            dispatch_to(list, &frame);
        }
        dispatch_to(&self.global_listeners, &frame);
        let _ = self.event_tx.send(ClientEvent::Frame(frame));
    }

    async fn on_transport_closed(&mut self) {
        self.transport = None;
        if self.should_stop {
            self.state = ConnectionState::Disconnected;
            let _ = self.event_tx.send(ClientEvent::Disconnected);
            return;
        }
        self.begin_reconnect().await;
    }

    /// Same backoff shape as the duplex client, but this counter is scoped
    /// to this client only — a duplex client on the same session reconnects
    /// independently.
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
        let url = self.config.url();
        let transport = self.connector.connect(&url).await?;
        self.transport = Some(transport);
        self.state = ConnectionState::Connected;
        self.reconnect_attempts = 0;
        let _ = self.event_tx.send(ClientEvent::Connected);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{channel_push_transport_pair, ScriptedPushConnector};
    use kei_stream_core::FrameKind;

    fn config() -> PushConfig {
        PushConfig::new("https://push.test", "sess-1", "stream-a")
    }

    struct RecordingConnector {
        urls: std::sync::Mutex<Vec<String>>,
        transports: std::sync::Mutex<std::collections::VecDeque<crate::transport::ChannelPushTransport>>,
    }

    #[async_trait::async_trait]
    impl PushConnector for RecordingConnector {
        async fn connect(&self, url: &str) -> Result<Box<dyn PushTransport>> {
            self.urls.lock().unwrap().push(url.to_string());
            let t = self.transports.lock().unwrap().pop_front().expect("scripted transport");
            Ok(Box::new(t))
        }
    }

    #[tokio::test]
    async fn connect_builds_url_from_base_session_and_stream() {
        let (transport, _handle) = channel_push_transport_pair();
        let connector = Arc::new(RecordingConnector {
            urls: std::sync::Mutex::new(Vec::new()),
            transports: std::sync::Mutex::new(std::collections::VecDeque::from([transport])),
        });
        let (client, _events) = PushClient::new(config(), connector.clone());
        client.connect().await.unwrap();

        let urls = connector.urls.lock().unwrap();
        assert_eq!(urls.as_slice(), ["https://push.test/sess-1/stream-a"]);
    }

    #[tokio::test]
    async fn dispatches_per_kind_and_global_listeners() {
        let (transport, handle) = channel_push_transport_pair();
        let connector = Arc::new(ScriptedPushConnector::new(vec![transport]));
        let (client, _events) = PushClient::new(config(), connector);
        client.connect().await.unwrap();

        let typed_hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let typed_hits2 = typed_hits.clone();
        let _h1 = client
            .register_listener(Some(FrameKind::Status), move |_f| {
                typed_hits2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            })
            .await;

        let global_hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let global_hits2 = global_hits.clone();
        let _h2 = client.register_listener(None, move |_f| {
            global_hits2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }).await;

        handle
            .inbound_tx
            .send(Frame::new(FrameKind::Status, "stream-a").to_wire().unwrap())
            .unwrap();
        handle
            .inbound_tx
            .send(Frame::new(FrameKind::Partial, "stream-a").to_wire().unwrap())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(typed_hits.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(global_hits.load(std::sync::atomic::Ordering::SeqCst), 2);

        let stats = client.stats().await;
        assert_eq!(stats.total_received, 2);
    }

    #[tokio::test]
    async fn reconnects_independently_on_disconnect() {
        let (t1, h1) = channel_push_transport_pair();
        let (t2, _h2) = channel_push_transport_pair();
        let connector = Arc::new(ScriptedPushConnector::new(vec![t1, t2]));
        let mut cfg = config();
        cfg.reconnect_initial_ms = 5;
        cfg.reconnect_max_ms = 20;
        let (client, mut events) = PushClient::new(cfg, connector);
        client.connect().await.unwrap();

        h1.closed_tx.send(()).unwrap();

        let mut saw_reconnecting = false;
        let mut saw_connected_twice = 0;
        for _ in 0..10 {
            match tokio::time::timeout(Duration::from_millis(200), events.recv()).await {
                Ok(Ok(ClientEvent::Reconnecting { .. })) => saw_reconnecting = true,
                Ok(Ok(ClientEvent::Connected)) => saw_connected_twice += 1,
                _ => break,
            }
        }
        assert!(saw_reconnecting);
        assert!(saw_connected_twice >= 1);

        let stats = client.stats().await;
        assert_eq!(stats.state, ConnectionState::Connected);
    }
}
