//! Compression round trip through the duplex client's send and receive
//! paths, not just the bare `compress`/`decompress` functions.

use kei_stream_client::config::ClientConfig;
use kei_stream_client::duplex::DuplexClient;
use kei_stream_client::state::ClientEvent;
use kei_stream_client::transport::{channel_transport_pair, ScriptedConnector};
use kei_stream_core::{Frame, FrameKind};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn outbound_payload_above_threshold_is_compressed_on_the_wire() {
    kei_stream_integration_tests::init_tracing();
    let (transport, mut handle) = channel_transport_pair();
    let connector = Arc::new(ScriptedConnector::new(vec![transport]));
    let mut cfg = ClientConfig::new("ws://test.invalid/stream/sess-1", "sess-1");
    cfg.drain_interval_ms = 5;
    cfg.ack_credit_target = 100;
    cfg.compression.threshold_bytes = 512;
    let (client, _events) = DuplexClient::new(cfg, connector);
    client.connect().await.unwrap();

    // Give the stream initial credit via an Ack so the drain loop sends.
    let mut ack = Frame::new(FrameKind::Ack, "a");
    ack.ack = Some(kei_stream_core::AckInfo {
        ack_seq: None,
        credit: Some(5),
        reason: None,
    });
    handle.inbound_tx.send(ack.to_wire().unwrap()).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let payload = serde_json::json!({ "text": "x".repeat(2048) });
    let expected_original_size = serde_json::to_vec(&payload).unwrap().len();
    client.send("a", FrameKind::Partial, Some(payload)).await.unwrap();

    let wire = tokio::time::timeout(Duration::from_millis(200), handle.outbound_rx.recv())
        .await
        .unwrap()
        .unwrap();
    let on_wire = Frame::from_wire(&wire).unwrap();
    assert!(on_wire.payload.is_none());
    assert!(on_wire.binary_ref.is_some());
    assert_eq!(on_wire.header("x-compression"), Some("gzip"));
    assert_eq!(on_wire.header("x-original-size"), Some(expected_original_size.to_string().as_str()));
}

#[tokio::test]
async fn inbound_compressed_frame_is_decompressed_before_listener_dispatch() {
    let mut cfg = ClientConfig::new("ws://test.invalid/stream/sess-1", "sess-1");
    cfg.drain_interval_ms = 5;
    cfg.compression.threshold_bytes = 16;

    // Compress a frame the way a server peer would before it ever reaches
    // the client's transport.
    let original_payload = serde_json::json!({ "msg": "hello-compressed-world".repeat(4) });
    let raw_frame = Frame::new(FrameKind::Status, "a").with_payload(original_payload.clone());
    let compressed = kei_stream_core::compression::compress(&raw_frame, &cfg.compression).unwrap();
    assert!(compressed.binary_ref.is_some());

    let (transport, handle) = channel_transport_pair();
    let connector = Arc::new(ScriptedConnector::new(vec![transport]));
    let (client, mut events) = DuplexClient::new(cfg, connector);
    client.connect().await.unwrap();
    handle.inbound_tx.send(compressed.to_wire().unwrap()).unwrap();

    let frame_event = loop {
        match tokio::time::timeout(Duration::from_millis(200), events.recv()).await {
            Ok(Ok(ClientEvent::Frame(f))) => break f,
            Ok(Ok(_)) => continue,
            _ => panic!("expected a Frame event"),
        }
    };
    assert_eq!(frame_event.payload, Some(original_payload));
    assert!(frame_event.binary_ref.is_none());
    assert!(frame_event.header("x-compression").is_none());
}
