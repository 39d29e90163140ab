//! Configuration surface recognised by both stream clients.

use kei_stream_core::compression::CompressionProfile;
use serde::{Deserialize, Serialize};

fn default_ack_credit_target() -> u32 {
    16
}
fn default_ack_every() -> u32 {
    5
}
fn default_reconnect_initial_ms() -> u64 {
    1_000
}
fn default_reconnect_max_ms() -> u64 {
    10_000
}
fn default_max_reconnect_attempts() -> u32 {
    10
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_drain_interval_ms() -> u64 {
    50
}

/// Configuration for [`crate::duplex::DuplexClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub url: String,
    pub session_id: String,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,

    #[serde(default = "default_ack_credit_target")]
    pub ack_credit_target: u32,
    #[serde(default = "default_ack_every")]
    pub ack_every: u32,

    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,

    #[serde(default)]
    pub enable_otel: bool,

    #[serde(default)]
    pub compression: CompressionProfile,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            session_id: session_id.into(),
            api_token: None,
            tenant_id: None,
            scopes: Vec::new(),
            ack_credit_target: default_ack_credit_target(),
            ack_every: default_ack_every(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            connect_timeout_ms: default_connect_timeout_ms(),
            drain_interval_ms: default_drain_interval_ms(),
            enable_otel: false,
            compression: CompressionProfile::default(),
        }
    }

    /// Builds the connect URL augmented with `access_token`, `scopes` and
    /// `tenant_id` query parameters.
    pub fn connect_url(&self) -> String {
        let mut url = url::Url::parse(&self.url).unwrap_or_else(|_| {
            url::Url::parse("ws://invalid.invalid/").expect("static fallback parses")
        });
        {
            let mut qs = url.query_pairs_mut();
            if let Some(token) = &self.api_token {
                qs.append_pair("access_token", token);
            }
            if !self.scopes.is_empty() {
                qs.append_pair("scopes", &self.scopes.join(" "));
            }
            if let Some(tenant) = &self.tenant_id {
                qs.append_pair("tenant_id", tenant);
            }
        }
        url.to_string()
    }
}

/// Configuration for [`crate::push::PushClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    pub base_url: String,
    pub session_id: String,
    pub stream_id: String,
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

impl PushConfig {
    pub fn new(
        base_url: impl Into<String>,
        session_id: impl Into<String>,
        stream_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            session_id: session_id.into(),
            stream_id: stream_id.into(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }

    /// URL path `<base>/<session_id>/<stream_id>`.
    pub fn url(&self) -> String {
        format!("{}/{}/{}", self.base_url.trim_end_matches('/'), self.session_id, self.stream_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_url_includes_query_params() {
        let mut cfg = ClientConfig::new("wss://example.test/stream/sess-1", "sess-1");
        cfg.api_token = Some("tok".into());
        cfg.tenant_id = Some("tenant-a".into());
        cfg.scopes = vec!["read".into(), "write".into()];

        let url = cfg.connect_url();
        assert!(url.contains("access_token=tok"));
        assert!(url.contains("tenant_id=tenant-a"));
        assert!(url.contains("scopes=read+write") || url.contains("scopes=read%20write"));
    }

    #[test]
    fn push_url_joins_base_session_and_stream() {
        let cfg = PushConfig::new("https://example.test/sse", "sess-1", "stream-a");
        assert_eq!(cfg.url(), "https://example.test/sse/sess-1/stream-a");
    }
}
