//! W3C trace context propagation and span wrapping for stream operations.

use crate::frame::Frame;
use rand::RngCore;
use std::collections::BTreeMap;
use std::future::Future;
use tracing::Instrument;

/// A W3C trace context: `00-<trace_id>-<span_id>-<flags>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
    pub flags: u8,
    pub trace_state: Option<String>,
}

impl TraceContext {
    /// Generate a fresh root context (32 hex trace id, 16 hex span id).
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let mut trace_id_bytes = [0u8; 16];
        rng.fill_bytes(&mut trace_id_bytes);
        let mut span_id_bytes = [0u8; 8];
        rng.fill_bytes(&mut span_id_bytes);
        Self {
            trace_id: hex::encode(trace_id_bytes),
            span_id: hex::encode(span_id_bytes),
            flags: 1,
            trace_state: None,
        }
    }

    pub fn to_traceparent(&self) -> String {
        format!("00-{}-{}-{:02x}", self.trace_id, self.span_id, self.flags)
    }

    pub fn from_traceparent(header: &str) -> Option<Self> {
        let parts: Vec<&str> = header.split('-').collect();
        if parts.len() != 4 || parts[0] != "00" || parts[1].len() != 32 || parts[2].len() != 16 {
            return None;
        }
        let flags = u8::from_str_radix(parts[3], 16).ok()?;
        Some(Self {
            trace_id: parts[1].to_string(),
            span_id: parts[2].to_string(),
            flags,
            trace_state: None,
        })
    }
}

/// Minimal hex encoding so this module needs no extra dependency beyond
/// `rand`, already used here for id generation.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// Case-insensitive header lookup; inbound headers must be read
/// case-insensitively.
fn header_ci<'a>(headers: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

/// Inject `traceparent`/`tracestate` into `headers`, never overwriting an
/// existing key.
pub fn inject(headers: &mut BTreeMap<String, String>, ctx: &TraceContext) {
    if header_ci(headers, "traceparent").is_none() {
        headers.insert("traceparent".to_string(), ctx.to_traceparent());
    }
    if let Some(state) = &ctx.trace_state
        && !state.is_empty()
        && header_ci(headers, "tracestate").is_none()
    {
        headers.insert("tracestate".to_string(), state.clone());
    }
}

/// Extract a parent [`TraceContext`] from inbound headers.
pub fn extract(headers: &BTreeMap<String, String>) -> Option<TraceContext> {
    let traceparent = header_ci(headers, "traceparent")?;
    let mut ctx = TraceContext::from_traceparent(traceparent)?;
    ctx.trace_state = header_ci(headers, "tracestate").map(|s| s.to_string());
    Some(ctx)
}

/// Inject trace headers into a frame and stamp `x-span-id` with the active
/// span's id.
pub fn instrument_frame(frame: &mut Frame, ctx: &TraceContext) {
    let headers = frame.headers.get_or_insert_with(BTreeMap::new);
    inject(headers, ctx);
    if header_ci(headers, "x-span-id").is_none() {
        headers.insert("x-span-id".to_string(), ctx.span_id.clone());
    }
}

/// Wrap a stream operation in a span carrying `stream.id`,
/// `stream.operation` and `component` attributes; records success/failure
/// and re-raises the error.
pub async fn trace_stream_op<F, T, E>(
    name: &str,
    stream_id: &str,
    component: &str,
    op: F,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let span = tracing::info_span!(
        "stream_op",
        stream.operation = %name,
        stream.id = %stream_id,
        component = %component,
    );
    async move {
        match op.await {
            Ok(v) => {
                tracing::trace!("stream operation succeeded");
                Ok(v)
            }
            Err(e) => {
                tracing::error!(error = %e, "stream operation failed");
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, FrameKind};

    #[test]
    fn traceparent_round_trips() {
        let ctx = TraceContext::generate();
        let header = ctx.to_traceparent();
        let parsed = TraceContext::from_traceparent(&header).unwrap();
        assert_eq!(parsed.trace_id, ctx.trace_id);
        assert_eq!(parsed.span_id, ctx.span_id);
    }

    #[test]
    fn inject_never_overwrites_existing_key() {
        let mut headers = BTreeMap::new();
        headers.insert("traceparent".to_string(), "existing".to_string());
        inject(&mut headers, &TraceContext::generate());
        assert_eq!(headers.get("traceparent").unwrap(), "existing");
    }

    #[test]
    fn extract_is_case_insensitive() {
        let mut headers = BTreeMap::new();
        let ctx = TraceContext::generate();
        headers.insert("TraceParent".to_string(), ctx.to_traceparent());
        let extracted = extract(&headers).unwrap();
        assert_eq!(extracted.trace_id, ctx.trace_id);
    }

    #[test]
    fn instrument_frame_sets_span_id_header() {
        let mut frame = Frame::new(FrameKind::Partial, "s1");
        let ctx = TraceContext::generate();
        instrument_frame(&mut frame, &ctx);
        assert_eq!(frame.header("x-span-id"), Some(ctx.span_id.as_str()));
    }

    #[tokio::test]
    async fn trace_stream_op_propagates_error() {
        let result: Result<(), &str> =
            trace_stream_op("send", "s1", "duplex", async { Err("boom") }).await;
        assert_eq!(result, Err("boom"));
    }

    #[tokio::test]
    async fn trace_stream_op_propagates_success() {
        let result: Result<u32, &str> =
            trace_stream_op("send", "s1", "duplex", async { Ok(42) }).await;
        assert_eq!(result, Ok(42));
    }
}
