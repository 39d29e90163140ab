//! Edge scheduler actor — ties the task queue, partitioner, routing table,
//! and node manager together behind a single owning task, matching the
//! command-channel shape used by the stream clients.

use crate::config::{Mode, SchedulerConfig};
use crate::health::{HealthProber, HttpHealthProber};
use crate::nodes::{NodeManager, SelectionStrategy};
use crate::partition::{merge_results, partition_task};
use crate::queue::TaskQueue;
use crate::routing::{route, RoutingContext, RoutingDecision};
use async_trait::async_trait;
use kei_edge_core::{Error, Node, Result, Task, TaskResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Performs the actual work of a task, dispatched to a specific node (`Some`)
/// or run locally (`None`). The scheduler itself never touches audio I/O or
/// models directly; this trait is the injection seam external executors
/// implement, the same role `kei-edge-voice`'s audio traits play one layer
/// up.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(
        &self,
        node_id: Option<&str>,
        input: &[u8],
        params: &serde_json::Value,
    ) -> Result<TaskResult>;
}

#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    TaskCompleted(TaskResult),
    TaskFailed { task_id: String, message: String },
    PartitionFailed { task_id: String, message: String },
    FellBackToLocal { task_id: String },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
}

enum Command {
    Submit(Task),
    AddNode(Node),
    GetResult {
        task_id: String,
        reply: oneshot::Sender<Option<TaskResult>>,
    },
    Stats(oneshot::Sender<SchedulerStats>),
    Shutdown,
}

/// Handle to a running scheduler. See [`DuplexClient`](kei_stream_client) for
/// the actor pattern this mirrors.
pub struct EdgeScheduler {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl EdgeScheduler {
    pub fn new(
        config: SchedulerConfig,
        executor: Arc<dyn TaskExecutor>,
        strategy: SelectionStrategy,
    ) -> (Self, broadcast::Receiver<SchedulerEvent>) {
        Self::with_health_prober(config, executor, strategy, Arc::new(HttpHealthProber::new()))
    }

    /// Same as [`EdgeScheduler::new`], but with the node health prober
    /// supplied explicitly — the seam tests use to script health-check
    /// outcomes without a real HTTP endpoint.
    pub fn with_health_prober(
        config: SchedulerConfig,
        executor: Arc<dyn TaskExecutor>,
        strategy: SelectionStrategy,
        prober: Arc<dyn HealthProber>,
    ) -> (Self, broadcast::Receiver<SchedulerEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = broadcast::channel(256);
        let actor = SchedulerActor::new(config, executor, strategy, prober, cmd_rx, event_tx);
        tokio::spawn(actor.run());
        (Self { cmd_tx }, event_rx)
    }

    pub fn submit(&self, task: Task) {
        let _ = self.cmd_tx.send(Command::Submit(task));
    }

    pub fn add_node(&self, node: Node) {
        let _ = self.cmd_tx.send(Command::AddNode(node));
    }

    pub async fn result(&self, task_id: impl Into<String>) -> Option<TaskResult> {
        let (reply, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::GetResult {
            task_id: task_id.into(),
            reply,
        });
        rx.await.unwrap_or(None)
    }

    /// Polls for a task's result until it appears or `timeout` elapses.
    pub async fn wait_for_result(&self, task_id: impl Into<String>, timeout: Duration) -> Result<TaskResult> {
        let task_id = task_id.into();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(result) = self.result(&task_id).await {
                return Ok(result);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Timeout(task_id));
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    pub async fn stats(&self) -> SchedulerStats {
        let (reply, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::Stats(reply));
        rx.await.unwrap_or_default()
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
    }
}

struct SchedulerActor {
    config: SchedulerConfig,
    executor: Arc<dyn TaskExecutor>,
    health_prober: Arc<dyn HealthProber>,
    nodes: NodeManager,
    queue: TaskQueue,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: broadcast::Sender<SchedulerEvent>,
    local_capacity: f64,
    should_stop: bool,
}

impl SchedulerActor {
    fn new(
        config: SchedulerConfig,
        executor: Arc<dyn TaskExecutor>,
        strategy: SelectionStrategy,
        health_prober: Arc<dyn HealthProber>,
        cmd_rx: mpsc::UnboundedReceiver<Command>,
        event_tx: broadcast::Sender<SchedulerEvent>,
    ) -> Self {
        let queue = TaskQueue::new(config.max_concurrent);
        Self {
            config,
            executor,
            health_prober,
            nodes: NodeManager::new(strategy),
            queue,
            cmd_rx,
            event_tx,
            local_capacity: 0.0,
            should_stop: false,
        }
    }

    async fn run(mut self) {
        let mut drain_tick = tokio::time::interval(Duration::from_millis(self.config.drain_interval_ms));
        drain_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut health_tick = tokio::time::interval(Duration::from_millis(self.config.health_check_interval_ms));
        health_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            if self.should_stop {
                break;
            }
            tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => break,
                    }
                }
                _ = drain_tick.tick() => {
                    self.drain().await;
                }
                _ = health_tick.tick() => {
                    self.run_health_checks().await;
                }
            }
        }
    }

    /// Probes every registered node's `/health` endpoint and feeds the
    /// pass/fail results into the node manager's consecutive-failure
    /// counters.
    async fn run_health_checks(&mut self) {
        let endpoints = self.nodes.node_endpoints();
        if endpoints.is_empty() {
            return;
        }
        let mut results = Vec::with_capacity(endpoints.len());
        for (node_id, endpoint) in endpoints {
            let healthy = self.health_prober.probe(&endpoint).await;
            results.push((node_id, healthy));
        }
        self.nodes.run_health_probes(results);
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Submit(task) => {
                self.queue.submit(task);
                self.drain().await;
            }
            Command::AddNode(node) => self.nodes.add_node(node),
            Command::GetResult { task_id, reply } => {
                let _ = reply.send(self.queue.result(&task_id).cloned());
            }
            Command::Stats(reply) => {
                let _ = reply.send(SchedulerStats {
                    pending: self.queue.pending_len(),
                    running: self.queue.running_len(),
                    completed: self.queue.completed_len(),
                });
            }
            Command::Shutdown => self.should_stop = true,
        }
    }

    async fn drain(&mut self) {
        while let Some(task) = self.queue.next() {
            self.run_task(task).await;
        }
    }

    fn routing_context(&self) -> RoutingContext {
        RoutingContext {
            force_local: matches!(self.config.mode, Mode::Local | Mode::CloudOnly),
            node_count: self.nodes.healthy_count(),
            local_capacity: self.local_capacity,
        }
    }

    /// Runs one task to completion (including hybrid fan-out), falling back
    /// to local execution on any partition/routing failure. The scheduler
    /// degrades to local and surfaces the failure via events rather than
    /// failing the task outright when the fallback succeeds.
    async fn run_task(&mut self, task: Task) {
        let op = task_op_name(&task);
        let ctx = self.routing_context();
        let decision = if matches!(self.config.mode, Mode::Hybrid) {
            RoutingDecision::Hybrid
        } else if matches!(self.config.mode, Mode::EdgeNode) {
            RoutingDecision::Edge
        } else {
            route(&op, task.input.len(), &ctx)
        };

        let outcome = match decision {
            RoutingDecision::Local => self.execute_local(&task).await,
            RoutingDecision::Edge => self.execute_edge(&task).await,
            RoutingDecision::Hybrid => self.execute_hybrid(&task).await,
        };

        match outcome {
            Ok(result) => self.finish_task(&task.task_id, result),
            Err(e) => {
                let _ = self.event_tx.send(SchedulerEvent::PartitionFailed {
                    task_id: task.task_id.clone(),
                    message: e.to_string(),
                });
                match self.execute_local(&task).await {
                    Ok(result) => {
                        let _ = self.event_tx.send(SchedulerEvent::FellBackToLocal {
                            task_id: task.task_id.clone(),
                        });
                        self.finish_task(&task.task_id, result);
                    }
                    Err(e) => {
                        self.queue.fail(&task.task_id, e.to_string());
                        let _ = self.event_tx.send(SchedulerEvent::TaskFailed {
                            task_id: task.task_id.clone(),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }
    }

    fn finish_task(&mut self, task_id: &str, result: TaskResult) {
        let failed = !result.success;
        self.queue.complete(task_id, result.clone());
        if failed {
            let _ = self.event_tx.send(SchedulerEvent::TaskFailed {
                task_id: task_id.to_string(),
                message: result.error.clone().unwrap_or_default(),
            });
        }
        let _ = self.event_tx.send(SchedulerEvent::TaskCompleted(result));
    }

    async fn execute_local(&self, task: &Task) -> Result<TaskResult> {
        self.executor.execute(None, &task.input, &task.params).await
    }

    async fn execute_edge(&mut self, task: &Task) -> Result<TaskResult> {
        let mut rng = rand::rng();
        let node_id = self
            .nodes
            .select(&mut rng)
            .ok_or_else(|| Error::Routing { task_id: task.task_id.clone() })?;
        self.executor
            .execute(Some(&node_id), &task.input, &task.params)
            .await
    }

    /// Exactly two partitions: index 0 always runs locally, index 1 runs on
    /// a selected edge node. Not a generic N-way split across however many
    /// nodes happen to be healthy.
    async fn execute_hybrid(&mut self, task: &Task) -> Result<TaskResult> {
        let parts = partition_task(task, 2);
        if parts.len() < 2 {
            return self.execute_local(task).await;
        }

        let mut rng = rand::rng();
        let node_id = self
            .nodes
            .select(&mut rng)
            .ok_or_else(|| Error::Routing { task_id: task.task_id.clone() })?;

        let mut results = Vec::with_capacity(2);
        for part in &parts {
            let target = if part.index == 0 { None } else { Some(node_id.as_str()) };
            let result = self.executor.execute(target, &part.input, &task.params).await?;
            results.push((part.index, result));
        }
        Ok(merge_results(&task.task_id, results))
    }
}

fn task_op_name(task: &Task) -> String {
    task.params
        .get("op")
        .and_then(|v| v.as_str())
        .unwrap_or("default")
        .to_string()
}
