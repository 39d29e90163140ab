//! Resume after an unclean drop, across two independent streams.
//!
//! With a stream `"a"` at `last_seq_in = 7` and a stream `"b"` at
//! `last_seq_in = 3`, an unclean close (code 1006) must produce exactly two
//! `Resume` frames on reconnect — one per stream — each sent before any
//! other queued frame.

use kei_stream_client::config::ClientConfig;
use kei_stream_client::duplex::DuplexClient;
use kei_stream_client::transport::{channel_transport_pair, ScriptedConnector};
use kei_stream_core::{Frame, FrameKind};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn resume_is_sent_for_every_stream_with_prior_seq() {
    kei_stream_integration_tests::init_tracing();
    let (t1, h1) = channel_transport_pair();
    let (t2, mut h2) = channel_transport_pair();
    let connector = Arc::new(ScriptedConnector::new(vec![t1, t2]));

    let mut cfg = ClientConfig::new("ws://test.invalid/stream/sess-1", "sess-1");
    cfg.drain_interval_ms = 5;
    cfg.reconnect_initial_ms = 5;
    cfg.reconnect_max_ms = 20;
    let (client, _events) = DuplexClient::new(cfg, connector);
    client.connect().await.unwrap();

    let mut fa = Frame::new(FrameKind::Status, "a");
    fa.seq = Some(7);
    h1.inbound_tx.send(fa.to_wire().unwrap()).unwrap();

    let mut fb = Frame::new(FrameKind::Status, "b");
    fb.seq = Some(3);
    h1.inbound_tx.send(fb.to_wire().unwrap()).unwrap();

    tokio::time::sleep(Duration::from_millis(30)).await;

    h1.closed_tx.send(1006).unwrap();

    let mut resumes = Vec::new();
    for _ in 0..2 {
        let wire = tokio::time::timeout(Duration::from_millis(300), h2.outbound_rx.recv())
            .await
            .expect("resume arrives before timeout")
            .unwrap();
        resumes.push(Frame::from_wire(&wire).unwrap());
    }

    assert!(resumes.iter().all(|f| f.kind == FrameKind::Resume));
    let stream_ids: std::collections::HashSet<_> = resumes.iter().map(|f| f.stream_id.clone()).collect();
    assert_eq!(stream_ids, ["a".to_string(), "b".to_string()].into_iter().collect());

    for resume in &resumes {
        let expected_last_seq = if resume.stream_id == "a" { 7 } else { 3 };
        assert_eq!(
            resume.payload.as_ref().unwrap().get("last_seq").unwrap(),
            &serde_json::json!(expected_last_seq)
        );
    }
}
