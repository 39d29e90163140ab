//! Byte-range task partitioner and result merge.

use kei_edge_core::{ResourceUsage, Task, TaskResult};

#[derive(Debug, Clone)]
pub struct Partition {
    pub index: usize,
    pub input: Vec<u8>,
}

/// Splits `task.input` into up to `available_nodes` contiguous byte ranges.
/// Falls back to a single partition when the task opted out of
/// partitioning or fewer than two workers are available.
pub fn partition_task(task: &Task, available_nodes: usize) -> Vec<Partition> {
    if !task.partitionable || available_nodes < 2 || task.input.is_empty() {
        return vec![Partition {
            index: 0,
            input: task.input.clone(),
        }];
    }

    let chunk_len = task.input.len().div_ceil(available_nodes);
    task.input
        .chunks(chunk_len.max(1))
        .enumerate()
        .map(|(index, input)| Partition {
            index,
            input: input.to_vec(),
        })
        .collect()
}

/// Merges per-partition results back into a single [`TaskResult`]: bytes
/// concatenate in partition order, processing time is the max across
/// partitions, resource usage is the component-wise mean, and success
/// requires every partition to have succeeded.
pub fn merge_results(task_id: &str, mut results: Vec<(usize, TaskResult)>) -> TaskResult {
    results.sort_by_key(|(index, _)| *index);

    let mut output = Vec::new();
    let mut processing_time_ms = 0u64;
    let mut usages = Vec::with_capacity(results.len());
    let mut first_error = None;
    let mut success = true;

    for (_, result) in &results {
        output.extend_from_slice(&result.output);
        processing_time_ms = processing_time_ms.max(result.processing_time_ms);
        usages.push(result.resource_usage);
        if !result.success {
            success = false;
            if first_error.is_none() {
                first_error = result.error.clone();
            }
        }
    }

    TaskResult {
        task_id: task_id.to_string(),
        output,
        success,
        error: first_error,
        processing_time_ms,
        resource_usage: ResourceUsage::mean(&usages),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kei_edge_core::TaskKind;

    fn task(input: Vec<u8>, partitionable: bool) -> Task {
        Task::new("t1", TaskKind::AudioProcessing, input).partitionable(partitionable)
    }

    #[test]
    fn non_partitionable_task_yields_single_partition() {
        let t = task(vec![1, 2, 3, 4], false);
        let parts = partition_task(&t, 4);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].input, vec![1, 2, 3, 4]);
    }

    #[test]
    fn single_available_node_yields_single_partition() {
        let t = task(vec![1, 2, 3, 4], true);
        let parts = partition_task(&t, 1);
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn splits_into_byte_ranges_for_two_nodes() {
        let t = task(vec![1, 2, 3, 4, 5], true);
        let parts = partition_task(&t, 2);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].index, 0);
        assert_eq!(parts[1].index, 1);
        assert_eq!(parts[0].input, vec![1, 2, 3]);
        assert_eq!(parts[1].input, vec![4, 5]);
    }

    #[test]
    fn merge_concatenates_in_order_and_takes_max_processing_time() {
        let a = TaskResult::ok("t1", vec![1, 2], 10);
        let b = TaskResult::ok("t1", vec![3, 4], 25);
        let merged = merge_results("t1", vec![(1, b), (0, a)]);
        assert_eq!(merged.output, vec![1, 2, 3, 4]);
        assert_eq!(merged.processing_time_ms, 25);
        assert!(merged.success);
    }

    #[test]
    fn merge_surfaces_first_error_and_fails_overall() {
        let a = TaskResult::ok("t1", vec![1], 5);
        let b = TaskResult::err("t1", "boom");
        let merged = merge_results("t1", vec![(0, a), (1, b)]);
        assert!(!merged.success);
        assert_eq!(merged.error.as_deref(), Some("boom"));
    }
}
