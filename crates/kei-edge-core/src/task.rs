//! Task and result types shared by the scheduler and its executors.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    AudioProcessing,
    AiInference,
    DataTransformation,
}

/// Average resource footprint of processing a task, used when merging
/// partition results via a component-wise mean.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceUsage {
    pub cpu_ms: f64,
    pub mem_bytes: f64,
    pub bw_bytes: f64,
}

impl ResourceUsage {
    pub fn mean(values: &[ResourceUsage]) -> ResourceUsage {
        if values.is_empty() {
            return ResourceUsage::default();
        }
        let n = values.len() as f64;
        ResourceUsage {
            cpu_ms: values.iter().map(|v| v.cpu_ms).sum::<f64>() / n,
            mem_bytes: values.iter().map(|v| v.mem_bytes).sum::<f64>() / n,
            bw_bytes: values.iter().map(|v| v.bw_bytes).sum::<f64>() / n,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub task_id: String,
    pub kind: TaskKind,
    pub input: Vec<u8>,
    pub params: serde_json::Value,
    pub deps: Vec<String>,
    /// Higher sorts first in the ready queue.
    pub priority: u32,
    pub deadline: Instant,
    pub partitionable: bool,
}

impl Task {
    pub fn new(task_id: impl Into<String>, kind: TaskKind, input: Vec<u8>) -> Self {
        Self {
            task_id: task_id.into(),
            kind,
            input,
            params: serde_json::Value::Null,
            deps: Vec::new(),
            priority: 0,
            deadline: Instant::now() + Duration::from_secs(30),
            partitionable: false,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_deps(mut self, deps: Vec<String>) -> Self {
        self.deps = deps;
        self
    }

    pub fn partitionable(mut self, yes: bool) -> Self {
        self.partitionable = yes;
        self
    }

    pub fn is_past_deadline(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task_id: String,
    pub output: Vec<u8>,
    pub success: bool,
    pub error: Option<String>,
    pub processing_time_ms: u64,
    pub resource_usage: ResourceUsage,
}

impl TaskResult {
    pub fn ok(task_id: impl Into<String>, output: Vec<u8>, processing_time_ms: u64) -> Self {
        Self {
            task_id: task_id.into(),
            output,
            success: true,
            error: None,
            processing_time_ms,
            resource_usage: ResourceUsage::default(),
        }
    }

    pub fn err(task_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            output: Vec::new(),
            success: false,
            error: Some(message.into()),
            processing_time_ms: 0,
            resource_usage: ResourceUsage::default(),
        }
    }
}
