//! Binds audio capture to the edge scheduler and caches. Not protocol
//! critical on its own, but the entry point audio chunks take into the
//! scheduler.
//!
//! Audio I/O is injected rather than performed here: the facade never
//! touches a microphone, a codec, or a WASM module directly. The source and
//! sink traits are the dependency-injection seam that stands in for the
//! browser's JS "WASM fallback" functions.

use crate::cache::VoiceCaches;
use crate::error::{Error, Result};
use async_trait::async_trait;
use kei_edge_core::{Task, TaskKind};
use kei_edge_scheduler::EdgeScheduler;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::Duration;

/// Supplies raw audio chunks to be processed. Returns `None` when capture
/// has ended (e.g. the microphone stream closed).
#[async_trait]
pub trait AudioSource: Send {
    async fn next_chunk(&mut self) -> Option<Vec<u8>>;
}

/// Receives processed audio chunks. A `Sink` error aborts the current
/// `run` loop iteration but not the facade itself.
#[async_trait]
pub trait AudioSink: Send {
    async fn emit(&mut self, chunk: Vec<u8>) -> std::result::Result<(), String>;
}

#[derive(Debug, Clone)]
pub struct VoiceFacadeConfig {
    /// Routing operation name forwarded to the scheduler's routing table
    /// (e.g. `"vad"`, `"noise-reduction"`, `"analysis"`).
    pub op: String,
    pub partitionable: bool,
    pub priority: u32,
    pub task_timeout: Duration,
    /// Whether identical `(op, chunk)` pairs are served from the results
    /// cache instead of resubmitted to the scheduler.
    pub cache_results: bool,
}

impl Default for VoiceFacadeConfig {
    fn default() -> Self {
        Self {
            op: "default".to_string(),
            partitionable: false,
            priority: 0,
            task_timeout: Duration::from_secs(10),
            cache_results: true,
        }
    }
}

fn cache_key(op: &str, chunk: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    op.hash(&mut hasher);
    chunk.hash(&mut hasher);
    format!("{op}:{:x}", hasher.finish())
}

/// The edge entry point for audio processing: wires an injected capture
/// source through the scheduler (partitioning, routing, node selection)
/// and an injected sink, with a results cache in front.
pub struct VoiceFacade {
    scheduler: EdgeScheduler,
    caches: Mutex<VoiceCaches>,
    config: VoiceFacadeConfig,
}

impl VoiceFacade {
    pub fn new(scheduler: EdgeScheduler, caches: VoiceCaches, config: VoiceFacadeConfig) -> Self {
        Self {
            scheduler,
            caches: Mutex::new(caches),
            config,
        }
    }

    /// Submits one chunk through the scheduler and waits for its result,
    /// serving from the results cache first when enabled.
    pub async fn process_chunk(&self, chunk: Vec<u8>) -> Result<Vec<u8>> {
        let key = cache_key(&self.config.op, &chunk);
        if self.config.cache_results
            && let Some(cached) = self.caches.lock().unwrap().results.get(&key)
        {
            return Ok(cached);
        }

        let task_id = uuid::Uuid::new_v4().to_string();
        let mut task = Task::new(task_id.clone(), TaskKind::AudioProcessing, chunk)
            .with_priority(self.config.priority)
            .partitionable(self.config.partitionable)
            .with_deadline(std::time::Instant::now() + self.config.task_timeout);
        task.params = serde_json::json!({ "op": self.config.op });

        self.scheduler.submit(task);
        let result = self.scheduler.wait_for_result(&task_id, self.config.task_timeout).await?;
        if !result.success {
            return Err(Error::Scheduler(kei_edge_core::Error::Task {
                task_id,
                message: result.error.unwrap_or_default(),
            }));
        }

        if self.config.cache_results {
            let size = result.output.len();
            self.caches.lock().unwrap().results.set(
                key,
                result.output.clone(),
                size,
                Default::default(),
            );
        }
        Ok(result.output)
    }

    /// Drives `source` to completion, pushing every processed chunk to
    /// `sink`. A processing failure is logged and the loop continues with
    /// the next chunk; a sink failure aborts the loop, since a sink that
    /// rejects one chunk will reject the rest.
    pub async fn run(&self, mut source: impl AudioSource, mut sink: impl AudioSink) -> Result<()> {
        loop {
            let Some(chunk) = source.next_chunk().await else {
                return Ok(());
            };
            match self.process_chunk(chunk).await {
                Ok(output) => {
                    if let Err(e) = sink.emit(output).await {
                        return Err(Error::Sink(e));
                    }
                }
                Err(e) => tracing::warn!(error = %e, "audio chunk processing failed"),
            }
        }
    }
}
