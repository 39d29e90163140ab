//! Connection and per-stream state.

use kei_stream_core::token_bucket::{TokenBucket, TokenBucketConfig};
use kei_stream_core::Frame;
use std::collections::VecDeque;

/// Bound on the per-stream replay ring.
pub const RECORDER_CAPACITY: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

/// Events surfaced to callers outside the `send`/`register_listener` return
/// values. Every user-visible failure is accompanied by an `Error` event.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Connected,
    Disconnected,
    Reconnecting { attempt: u32 },
    Error { kind: String, message: String },
    Frame(Frame),
}

/// Per-`stream_id` state, created lazily on first send or first receive.
pub(crate) struct StreamState {
    pub last_seq_out: u64,
    pub last_seq_in: u64,
    pub credit: u32,
    pub pending: VecDeque<Frame>,
    pub recorder: VecDeque<Frame>,
    pub inflight_since_ack: u32,
    pub bucket: TokenBucket,
}

impl StreamState {
    pub fn new(bucket_config: TokenBucketConfig, initial_credit: u32) -> Self {
        Self {
            last_seq_out: 0,
            last_seq_in: 0,
            credit: initial_credit,
            pending: VecDeque::new(),
            recorder: VecDeque::new(),
            inflight_since_ack: 0,
            bucket: TokenBucket::new(bucket_config),
        }
    }

    pub fn record(&mut self, frame: Frame) {
        if self.recorder.len() >= RECORDER_CAPACITY {
            self.recorder.pop_front();
        }
        self.recorder.push_back(frame);
    }

    /// Frames with `seq > since_seq`, in receive order.
    pub fn replay_since(&self, since_seq: u64) -> Vec<Frame> {
        self.recorder
            .iter()
            .filter(|f| f.seq.map(|s| s > since_seq).unwrap_or(false))
            .cloned()
            .collect()
    }
}
