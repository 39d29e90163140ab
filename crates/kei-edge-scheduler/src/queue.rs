//! Priority + deadline + dependency task queue.

use kei_edge_core::{Task, TaskResult};
use std::collections::{HashMap, HashSet};

pub struct TaskQueue {
    pending: Vec<Task>,
    running: HashSet<String>,
    completed: HashMap<String, TaskResult>,
    max_concurrent: usize,
}

impl TaskQueue {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            pending: Vec::new(),
            running: HashSet::new(),
            completed: HashMap::new(),
            max_concurrent,
        }
    }

    /// Inserts into the ready queue, sorted by `(-priority, deadline)`.
    pub fn submit(&mut self, task: Task) {
        let key = (std::cmp::Reverse(task.priority), task.deadline);
        let pos = self
            .pending
            .partition_point(|t| (std::cmp::Reverse(t.priority), t.deadline) <= key);
        self.pending.insert(pos, task);
    }

    /// Scans the ready queue in order for the first task whose deps are all
    /// completed, moving it pending → running. Returns `None` once
    /// `max_concurrent` tasks are already running.
    pub fn next(&mut self) -> Option<Task> {
        if self.running.len() >= self.max_concurrent {
            return None;
        }
        let pos = self
            .pending
            .iter()
            .position(|t| t.deps.iter().all(|d| self.completed.contains_key(d)))?;
        let task = self.pending.remove(pos);
        self.running.insert(task.task_id.clone());
        Some(task)
    }

    pub fn complete(&mut self, task_id: &str, result: TaskResult) {
        self.running.remove(task_id);
        self.completed.insert(task_id.to_string(), result);
    }

    pub fn fail(&mut self, task_id: &str, err: impl Into<String>) {
        self.running.remove(task_id);
        self.completed
            .insert(task_id.to_string(), TaskResult::err(task_id, err.into()));
    }

    pub fn result(&self, task_id: &str) -> Option<&TaskResult> {
        self.completed.get(task_id)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn running_len(&self) -> usize {
        self.running.len()
    }

    pub fn completed_len(&self) -> usize {
        self.completed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kei_edge_core::TaskKind;

    fn task(id: &str, priority: u32) -> Task {
        Task::new(id, TaskKind::AudioProcessing, vec![]).with_priority(priority)
    }

    #[test]
    fn next_respects_priority_order() {
        let mut q = TaskQueue::new(10);
        q.submit(task("low", 1));
        q.submit(task("high", 5));
        q.submit(task("mid", 3));

        assert_eq!(q.next().unwrap().task_id, "high");
        assert_eq!(q.next().unwrap().task_id, "mid");
        assert_eq!(q.next().unwrap().task_id, "low");
    }

    #[test]
    fn next_skips_tasks_with_unmet_deps() {
        let mut q = TaskQueue::new(10);
        q.submit(task("a", 1));
        q.submit(task("b", 5).with_deps(vec!["a".to_string()]));

        // "b" outranks "a" but depends on it, so "a" runs first.
        assert_eq!(q.next().unwrap().task_id, "a");
    }

    #[test]
    fn next_returns_none_once_dep_unmet_and_no_other_ready() {
        let mut q = TaskQueue::new(10);
        q.submit(task("b", 5).with_deps(vec!["a".to_string()]));
        assert!(q.next().is_none());
    }

    #[test]
    fn max_concurrent_caps_running_tasks() {
        let mut q = TaskQueue::new(1);
        q.submit(task("a", 1));
        q.submit(task("b", 1));

        assert!(q.next().is_some());
        assert!(q.next().is_none());
    }

    #[test]
    fn complete_unblocks_dependents() {
        let mut q = TaskQueue::new(10);
        q.submit(task("a", 1));
        q.submit(task("b", 5).with_deps(vec!["a".to_string()]));

        let a = q.next().unwrap();
        assert!(q.next().is_none());
        q.complete(&a.task_id, kei_edge_core::TaskResult::ok(&a.task_id, vec![], 1));

        let b = q.next().unwrap();
        assert_eq!(b.task_id, "b");
    }
}
