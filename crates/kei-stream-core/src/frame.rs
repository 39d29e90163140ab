//! Frame model.
//!
//! `Frame` is a tagged union over the KEI-Stream control and data frame
//! types. Serialization is JSON text with snake_case field names; unknown
//! fields are preserved on forward (round-tripped via `extra`) and
//! tolerated on receive.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Discriminant for `Frame::kind`. Values serialize as lowercase snake_case
/// on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    Partial,
    Final,
    ToolCall,
    ToolResult,
    Status,
    Error,
    Heartbeat,
    Ack,
    Nack,
    Resume,
    ChunkStart,
    ChunkContinue,
    ChunkEnd,
}

impl FrameKind {
    /// Control frames that never carry `seq` on egress when absent, and
    /// that the ack-cadence counter in the duplex client does not count
    /// towards `ack_every`.
    pub fn is_control(self) -> bool {
        matches!(
            self,
            FrameKind::Heartbeat | FrameKind::Ack | FrameKind::Nack | FrameKind::Resume
        )
    }

    /// True for frame kinds that are legal without a `seq` assigned.
    pub fn seq_optional(self) -> bool {
        matches!(self, FrameKind::Heartbeat | FrameKind::Ack | FrameKind::Resume)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AckInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack_seq: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The unit of protocol exchange.
///
/// `payload` and `binary_ref` are mutually exclusive; see [`Frame::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub stream_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corr_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk: Option<ChunkInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FrameError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack: Option<AckInfo>,
    /// Fields not recognized by this version of the client, preserved
    /// byte-for-byte across receive and re-transmit.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Frame {
    pub fn new(kind: FrameKind, stream_id: impl Into<String>) -> Self {
        Self {
            kind,
            id: None,
            stream_id: stream_id.into(),
            seq: None,
            ts: None,
            corr_id: None,
            headers: None,
            payload: None,
            binary_ref: None,
            chunk: None,
            error: None,
            ack: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_ts_now(mut self) -> Self {
        self.ts = Some(chrono::Utc::now().to_rfc3339());
        self
    }

    /// Insert a header, lowercasing the key — senders always emit
    /// lowercase.
    pub fn set_header(&mut self, key: &str, value: impl Into<String>) {
        self.headers
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_ascii_lowercase(), value.into());
    }

    /// Case-insensitive header lookup; receivers must tolerate either case.
    pub fn header(&self, key: &str) -> Option<&str> {
        let headers = self.headers.as_ref()?;
        let key = key.to_ascii_lowercase();
        headers
            .iter()
            .find(|(k, _)| k.to_ascii_lowercase() == key)
            .map(|(_, v)| v.as_str())
    }

    /// Enforces the payload/binary_ref exclusivity and ack/nack shape
    /// invariants.
    pub fn validate(&self) -> Result<()> {
        if self.stream_id.is_empty() {
            return Err(Error::SchemaMismatch("stream_id must be non-empty".into()));
        }
        if self.payload.is_some() && self.binary_ref.is_some() {
            return Err(Error::SchemaMismatch(
                "payload and binary_ref are mutually exclusive".into(),
            ));
        }
        if matches!(self.kind, FrameKind::Ack | FrameKind::Nack) && self.payload.is_some() {
            return Err(Error::SchemaMismatch(
                "ack/nack frames must not carry a payload".into(),
            ));
        }
        if matches!(self.kind, FrameKind::Error) && self.error.is_none() {
            return Err(Error::SchemaMismatch(
                "error frames require an `error` field".into(),
            ));
        }
        if self.seq.is_none() && !self.kind.seq_optional() {
            // Sender assigns seq on egress; absence here is only invalid
            // for frames already placed on the wire by a peer.
        }
        Ok(())
    }

    /// Parse an inbound wire message. Malformed JSON surfaces as
    /// `Error::InvalidFrame` for the caller to log and discard.
    pub fn from_wire(bytes: &str) -> Result<Self> {
        serde_json::from_str(bytes).map_err(|e| Error::InvalidFrame(e.to_string()))
    }

    /// Serialize for the wire. Outbound parse failures are fatal to the
    /// caller, unlike inbound ones.
    pub fn to_wire(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Error::Serialization)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let mut f = Frame::new(FrameKind::Partial, "s1").with_payload(serde_json::json!({"a": 1}));
        f.seq = Some(3);
        f.set_header("X-Custom", "v");

        let wire = f.to_wire().unwrap();
        let back = Frame::from_wire(&wire).unwrap();
        assert_eq!(back.stream_id, "s1");
        assert_eq!(back.seq, Some(3));
        assert_eq!(back.header("x-custom"), Some("v"));
    }

    #[test]
    fn rejects_empty_stream_id() {
        let f = Frame::new(FrameKind::Heartbeat, "");
        assert!(f.validate().is_err());
    }

    #[test]
    fn rejects_payload_and_binary_ref_together() {
        let mut f = Frame::new(FrameKind::Partial, "s1").with_payload(serde_json::json!(1));
        f.binary_ref = Some("abc".into());
        assert!(f.validate().is_err());
    }

    #[test]
    fn rejects_ack_with_payload() {
        let f = Frame::new(FrameKind::Ack, "s1").with_payload(serde_json::json!(1));
        assert!(f.validate().is_err());
    }

    #[test]
    fn preserves_unknown_fields_round_trip() {
        let wire = r#"{"type":"status","stream_id":"s1","future_field":"x"}"#;
        let f = Frame::from_wire(wire).unwrap();
        assert_eq!(f.extra.get("future_field").unwrap(), "x");
        let back = f.to_wire().unwrap();
        assert!(back.contains("future_field"));
    }

    #[test]
    fn kind_serializes_snake_case() {
        let f = Frame::new(FrameKind::ToolCall, "s1");
        let wire = f.to_wire().unwrap();
        assert!(wire.contains("\"type\":\"tool_call\""));
    }
}
