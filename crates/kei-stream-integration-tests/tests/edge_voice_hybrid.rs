//! Cross-crate scenario: the voice facade submitting audio chunks through a
//! hybrid-mode edge scheduler, verifying the partition + merge contract end
//! to end via the facade's public API rather than the scheduler's internals
//! directly.

use async_trait::async_trait;
use kei_edge_core::{Node, TaskResult};
use kei_edge_scheduler::{EdgeScheduler, Mode, SchedulerConfig, SelectionStrategy, TaskExecutor};
use kei_edge_voice::{VoiceCaches, VoiceFacade, VoiceFacadeConfig};
use std::sync::Arc;

struct EchoExecutor;

#[async_trait]
impl TaskExecutor for EchoExecutor {
    async fn execute(
        &self,
        _node_id: Option<&str>,
        input: &[u8],
        _params: &serde_json::Value,
    ) -> kei_edge_core::Result<TaskResult> {
        Ok(TaskResult::ok("t", input.to_vec(), 1))
    }
}

#[tokio::test]
async fn hybrid_mode_facade_merges_equal_length_partitions() {
    kei_stream_integration_tests::init_tracing();
    let mut scheduler_config = SchedulerConfig::default();
    scheduler_config.mode = Mode::Hybrid;
    scheduler_config.drain_interval_ms = 5;

    let (scheduler, _events) = EdgeScheduler::new(
        scheduler_config,
        Arc::new(EchoExecutor),
        SelectionStrategy::RoundRobin,
    );
    scheduler.add_node(Node::new("edge-1", "http://edge-1.invalid"));

    let mut facade_config = VoiceFacadeConfig::default();
    facade_config.op = "analysis".to_string();
    facade_config.partitionable = true;
    facade_config.cache_results = false;
    let facade = VoiceFacade::new(scheduler, VoiceCaches::default(), facade_config);

    let chunk: Vec<u8> = (0..4096u32).map(|n| (n % 251) as u8).collect();
    let out = facade.process_chunk(chunk.clone()).await.unwrap();

    assert_eq!(out.len(), chunk.len());
    assert_eq!(out, chunk);
}
