//! Transport abstraction plus real WebSocket/SSE implementations and an
//! in-memory pair used by tests and the `kei-stream-integration-tests`
//! crate.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use kei_stream_core::error::{Error, Result};
use tokio::sync::mpsc;

/// Outcome of waiting for the next transport event.
pub enum Incoming {
    Text(String),
    /// The peer closed the connection with this code. `1000` is a graceful
    /// close; anything else (including the `1006` used for an abnormal
    /// drop with no code at all) must trigger reconnection.
    Closed(u16),
}

/// Duplex message transport used by the stream client. Implemented by
/// [`WsTransport`] in production and [`ChannelTransport`] in tests.
#[async_trait]
pub trait Transport: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;
    async fn recv(&mut self) -> Incoming;
    async fn close(&mut self, code: u16);
}

/// Establishes a fresh [`Transport`] connection against the given URL.
/// Abstracted so tests can hand out a scripted sequence of transports; the
/// URL is supplied per call since it is rebuilt from [`crate::config::ClientConfig`]
/// (query params, tenant) on every connect and reconnect attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>>;
}

/// One-way transport used by the push-only client.
#[async_trait]
pub trait PushTransport: Send {
    async fn recv_text(&mut self) -> Option<String>;
}

#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn PushTransport>>;
}

/// Production duplex transport over `tokio-tungstenite`.
pub struct WsTransport {
    socket: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
}

impl WsTransport {
    pub async fn connect(url: &str) -> Result<Self> {
        let (socket, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(Self { socket })
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.socket
            .send(tokio_tungstenite::tungstenite::Message::Text(text.into()))
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Incoming {
        loop {
            match self.socket.next().await {
                Some(Ok(tokio_tungstenite::tungstenite::Message::Text(t))) => {
                    return Incoming::Text(t.to_string());
                }
                Some(Ok(tokio_tungstenite::tungstenite::Message::Close(frame))) => {
                    let code = frame.map(|f| u16::from(f.code)).unwrap_or(1005);
                    return Incoming::Closed(code);
                }
                None => return Incoming::Closed(1006),
                Some(Ok(_)) => continue,
                Some(Err(_)) => return Incoming::Closed(1006),
            }
        }
    }

    async fn close(&mut self, code: u16) {
        let frame = tokio_tungstenite::tungstenite::protocol::CloseFrame {
            code: code.into(),
            reason: std::borrow::Cow::Borrowed(""),
        };
        let _ = self.socket.close(Some(frame)).await;
    }
}

pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        let transport = WsTransport::connect(url).await?;
        Ok(Box::new(transport))
    }
}

/// Production push transport over Server-Sent Events.
pub struct SseTransport {
    stream: std::pin::Pin<
        Box<
            dyn futures::Stream<
                    Item = std::result::Result<
                        eventsource_stream::Event,
                        eventsource_stream::EventStreamError<reqwest::Error>,
                    >,
                > + Send,
        >,
    >,
}

impl SseTransport {
    pub async fn connect(url: &str) -> Result<Self> {
        let response = reqwest::Client::new()
            .get(url)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        let stream = futures::StreamExt::boxed(eventsource_stream::Eventsource::eventsource(
            response.bytes_stream(),
        ));
        Ok(Self { stream })
    }
}

#[async_trait]
impl PushTransport for SseTransport {
    async fn recv_text(&mut self) -> Option<String> {
        loop {
            match self.stream.next().await {
                Some(Ok(event)) => return Some(event.data),
                Some(Err(_)) => return None,
                None => return None,
            }
        }
    }
}

pub struct SseConnector;

#[async_trait]
impl PushConnector for SseConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn PushTransport>> {
        let transport = SseTransport::connect(url).await?;
        Ok(Box::new(transport))
    }
}

/// In-memory duplex transport pair, used by unit and integration tests to
/// drive the client's state machine without a real socket.
pub struct ChannelTransport {
    outbound_tx: mpsc::UnboundedSender<String>,
    inbound_rx: mpsc::UnboundedReceiver<String>,
    closed_rx: mpsc::UnboundedReceiver<u16>,
}

/// The test-side handle for a [`ChannelTransport`]: observe what the client
/// sent, and inject server-originated frames.
pub struct ChannelTransportHandle {
    pub outbound_rx: mpsc::UnboundedReceiver<String>,
    pub inbound_tx: mpsc::UnboundedSender<String>,
    pub closed_tx: mpsc::UnboundedSender<u16>,
}

pub fn channel_transport_pair() -> (ChannelTransport, ChannelTransportHandle) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (closed_tx, closed_rx) = mpsc::unbounded_channel();
    (
        ChannelTransport {
            outbound_tx,
            inbound_rx,
            closed_rx,
        },
        ChannelTransportHandle {
            outbound_rx,
            inbound_tx,
            closed_tx,
        },
    )
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.outbound_tx
            .send(text)
            .map_err(|_| Error::Transport("peer dropped".into()))
    }

    async fn recv(&mut self) -> Incoming {
        tokio::select! {
            biased;
            code = self.closed_rx.recv() => Incoming::Closed(code.unwrap_or(1006)),
            msg = self.inbound_rx.recv() => match msg {
                Some(text) => Incoming::Text(text),
                None => Incoming::Closed(1006),
            },
        }
    }

    async fn close(&mut self, _code: u16) {
        self.inbound_rx.close();
    }
}

/// A [`Connector`] that hands out a pre-scripted sequence of
/// [`ChannelTransport`]s, one per connect attempt — used to simulate
/// reconnection in tests.
pub struct ScriptedConnector {
    transports: std::sync::Mutex<std::collections::VecDeque<Box<dyn Transport>>>,
}

impl ScriptedConnector {
    pub fn new(transports: Vec<ChannelTransport>) -> Self {
        Self {
            transports: std::sync::Mutex::new(
                transports
                    .into_iter()
                    .map(|t| Box::new(t) as Box<dyn Transport>)
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>> {
        self.transports
            .lock()
            .expect("mutex not poisoned")
            .pop_front()
            .ok_or_else(|| Error::Transport("no more scripted transports".into()))
    }
}

/// In-memory one-way transport, the [`PushTransport`] analogue of
/// [`ChannelTransport`].
pub struct ChannelPushTransport {
    inbound_rx: mpsc::UnboundedReceiver<String>,
    closed_rx: mpsc::UnboundedReceiver<()>,
}

pub struct ChannelPushTransportHandle {
    pub inbound_tx: mpsc::UnboundedSender<String>,
    pub closed_tx: mpsc::UnboundedSender<()>,
}

pub fn channel_push_transport_pair() -> (ChannelPushTransport, ChannelPushTransportHandle) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (closed_tx, closed_rx) = mpsc::unbounded_channel();
    (
        ChannelPushTransport { inbound_rx, closed_rx },
        ChannelPushTransportHandle { inbound_tx, closed_tx },
    )
}

#[async_trait]
impl PushTransport for ChannelPushTransport {
    async fn recv_text(&mut self) -> Option<String> {
        tokio::select! {
            biased;
            _ = self.closed_rx.recv() => None,
            msg = self.inbound_rx.recv() => msg,
        }
    }
}

/// Scripted sequence of [`ChannelPushTransport`]s for reconnection tests.
pub struct ScriptedPushConnector {
    transports: std::sync::Mutex<std::collections::VecDeque<Box<dyn PushTransport>>>,
}

impl ScriptedPushConnector {
    pub fn new(transports: Vec<ChannelPushTransport>) -> Self {
        Self {
            transports: std::sync::Mutex::new(
                transports
                    .into_iter()
                    .map(|t| Box::new(t) as Box<dyn PushTransport>)
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl PushConnector for ScriptedPushConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn PushTransport>> {
        self.transports
            .lock()
            .expect("mutex not poisoned")
            .pop_front()
            .ok_or_else(|| Error::Transport("no more scripted transports".into()))
    }
}
