//! End-to-end scenario tests for the KEI-Stream client and edge scheduler.
//!
//! These drive the public API of `kei-stream-client`, `kei-edge-scheduler`,
//! and `kei-edge-voice` together the way an application would, rather than
//! exercising a single crate's internals.

/// Installs a test-scoped `tracing` subscriber so failures print span and
/// event output. Safe to call from multiple tests; only the first call
/// wins. Not `cfg(test)`-gated so the `tests/` directory's separate
/// integration test binaries can call it too.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("kei_stream=debug,kei_edge=debug")
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod smoke {
    use kei_stream_client::config::ClientConfig;
    use kei_stream_client::duplex::DuplexClient;
    use kei_stream_client::transport::{channel_transport_pair, ScriptedConnector};
    use std::sync::Arc;

    #[tokio::test]
    async fn client_reaches_connected_state_against_a_scripted_transport() {
        crate::init_tracing();
        let (transport, _handle) = channel_transport_pair();
        let connector = Arc::new(ScriptedConnector::new(vec![transport]));
        let mut cfg = ClientConfig::new("ws://test.invalid/stream/sess-1", "sess-1");
        cfg.drain_interval_ms = 5;
        let (client, _events) = DuplexClient::new(cfg, connector);

        client.connect().await.unwrap();
        let stats = client.stats().await;
        assert_eq!(stats.state, kei_stream_client::ConnectionState::Connected);
    }
}
