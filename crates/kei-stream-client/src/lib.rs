//! Duplex and push-only stream clients for the KEI-Stream protocol.
//!
//! - [`duplex`]: the full-duplex client — flow control, credit,
//!   sequencing, reconnection with resume, and listener dispatch.
//! - [`push`]: the push-only client — one-way receive with independent
//!   reconnection and per-`FrameKind` dispatch.
//! - [`transport`]: the `Transport`/`Connector` abstractions plus
//!   WebSocket, SSE, and in-memory test implementations.
//! - [`config`]: configuration surfaces for both clients.
//! - [`listener`]: panic-isolated listener dispatch shared by both clients.
//! - [`state`]: connection state, client events, and per-stream state.

pub mod config;
pub mod duplex;
pub mod listener;
pub mod push;
pub mod state;
pub mod transport;

pub use duplex::{ClientStats, DuplexClient};
pub use kei_stream_core::{Error, Frame, FrameKind, Result};
pub use listener::ListenerHandle;
pub use push::{PushClient, PushStats};
pub use state::{ClientEvent, ConnectionState};
