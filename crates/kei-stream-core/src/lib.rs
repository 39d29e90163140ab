//! KEI-Stream protocol core
//!
//! This crate provides the protocol-level primitives shared by the duplex
//! and push-only stream clients in `kei-stream-client`:
//!
//! - [`frame`]: the tagged-union `Frame` type and its wire (de)serialization.
//! - [`token_bucket`]: per-stream pacing, its adaptive variant, and a
//!   per-stream bucket manager.
//! - [`compression`]: threshold-based payload compression and per-tenant
//!   profile resolution.
//! - [`trace`]: W3C trace-context propagation and span wrapping.
//! - [`error`]: the shared error taxonomy.

pub mod compression;
pub mod error;
pub mod frame;
pub mod token_bucket;
pub mod trace;

pub use error::{Error, Result};
pub use frame::{AckInfo, ChunkInfo, Frame, FrameError, FrameKind};
