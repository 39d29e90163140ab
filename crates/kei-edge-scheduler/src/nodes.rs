//! Node pool, health tracking, and selection strategies.

use kei_edge_core::Node;
use std::time::Duration;

/// Weights for the composite score used by [`SelectionStrategy::LatencyBased`]
/// when folded into `Adaptive`, and by `Adaptive` directly.
#[derive(Debug, Clone, Copy)]
pub struct ScoreWeights {
    pub w_lat: f64,
    pub w_cap: f64,
    pub w_rel: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            w_lat: 0.4,
            w_cap: 0.4,
            w_rel: 0.2,
        }
    }
}

impl ScoreWeights {
    fn l1_normalize(&mut self) {
        let sum = self.w_lat + self.w_cap + self.w_rel;
        if sum > 0.0 {
            self.w_lat /= sum;
            self.w_cap /= sum;
            self.w_rel /= sum;
        }
    }
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Composite fitness score in `[0, 1]`: lower latency, higher spare
/// capacity, and fewer recent failures all push the score up.
pub fn score(node: &Node, weights: &ScoreWeights) -> f64 {
    let lat_term = clamp01(1.0 - node.latency_ms / 1000.0);
    let cap_term = clamp01(node.available_capacity);
    let rel_term = clamp01(1.0 - node.consecutive_failures as f64 / 10.0);
    clamp01(weights.w_lat * lat_term + weights.w_cap * cap_term + weights.w_rel * rel_term)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    RoundRobin,
    LeastConnections,
    LatencyBased,
    CapacityBased,
    Adaptive,
}

/// Fraction of `Adaptive` selections that pick a uniformly random candidate
/// rather than the top scorer, to keep exploring the pool.
const EXPLORATION_RATE: f64 = 0.1;
const LEARNING_RATE: f64 = 0.1;

pub struct NodeManager {
    nodes: Vec<Node>,
    strategy: SelectionStrategy,
    weights: ScoreWeights,
    round_robin_cursor: usize,
}

impl NodeManager {
    pub fn new(strategy: SelectionStrategy) -> Self {
        Self {
            nodes: Vec::new(),
            strategy,
            weights: ScoreWeights::default(),
            round_robin_cursor: 0,
        }
    }

    pub fn add_node(&mut self, node: Node) {
        self.nodes.push(node);
    }

    pub fn node_mut(&mut self, node_id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.node_id == node_id)
    }

    pub fn healthy_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_candidate()).count()
    }

    /// `(node_id, endpoint)` for every registered node, used to drive the
    /// periodic health probe.
    pub fn node_endpoints(&self) -> Vec<(String, String)> {
        self.nodes
            .iter()
            .map(|n| (n.node_id.clone(), n.endpoint.clone()))
            .collect()
    }

    /// Picks a candidate node per the configured strategy. Candidate
    /// indices are collected up front so no borrow of `self.nodes` is held
    /// while `round_robin_cursor` is mutated.
    pub fn select(&mut self, rng: &mut impl rand::RngCore) -> Option<String> {
        let candidates: Vec<usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_candidate())
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let chosen = match self.strategy {
            SelectionStrategy::RoundRobin => {
                let pick = candidates[self.round_robin_cursor % candidates.len()];
                self.round_robin_cursor = self.round_robin_cursor.wrapping_add(1);
                pick
            }
            SelectionStrategy::LeastConnections => *candidates
                .iter()
                .min_by(|&&a, &&b| self.nodes[a].cpu.total_cmp(&self.nodes[b].cpu))
                .unwrap(),
            SelectionStrategy::LatencyBased => *candidates
                .iter()
                .min_by(|&&a, &&b| self.nodes[a].latency_ms.total_cmp(&self.nodes[b].latency_ms))
                .unwrap(),
            SelectionStrategy::CapacityBased => *candidates
                .iter()
                .max_by(|&&a, &&b| {
                    self.nodes[a]
                        .available_capacity
                        .total_cmp(&self.nodes[b].available_capacity)
                })
                .unwrap(),
            SelectionStrategy::Adaptive => {
                if (rng.next_u32() as f64 / u32::MAX as f64) < EXPLORATION_RATE {
                    candidates[rng.next_u32() as usize % candidates.len()]
                } else {
                    let weights = self.weights;
                    *candidates
                        .iter()
                        .max_by(|&&a, &&b| {
                            score(&self.nodes[a], &weights).total_cmp(&score(&self.nodes[b], &weights))
                        })
                        .unwrap()
                }
            }
        };

        Some(self.nodes[chosen].node_id.clone())
    }

    /// Nudges the adaptive score weights based on an observed response,
    /// then renormalizes so the three weights keep summing to 1.
    pub fn record_response(&mut self, latency: Duration, success: bool) {
        if latency < Duration::from_millis(50) {
            self.weights.w_lat += LEARNING_RATE;
        }
        if !success || latency > Duration::from_millis(200) {
            self.weights.w_rel += LEARNING_RATE;
        }
        self.weights.l1_normalize();
    }

    pub fn run_health_probes(&mut self, results: impl IntoIterator<Item = (String, bool)>) {
        for (node_id, success) in results {
            if let Some(node) = self.node_mut(&node_id) {
                node.record_health_result(success);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn node(id: &str, latency_ms: f64, capacity: f64) -> Node {
        let mut n = Node::new(id, format!("http://{id}"));
        n.latency_ms = latency_ms;
        n.available_capacity = capacity;
        n
    }

    #[test]
    fn round_robin_cycles_candidates() {
        let mut mgr = NodeManager::new(SelectionStrategy::RoundRobin);
        mgr.add_node(node("a", 10.0, 1.0));
        mgr.add_node(node("b", 10.0, 1.0));
        let mut rng = StdRng::seed_from_u64(1);

        let first = mgr.select(&mut rng).unwrap();
        let second = mgr.select(&mut rng).unwrap();
        assert_ne!(first, second);
        let third = mgr.select(&mut rng).unwrap();
        assert_eq!(first, third);
    }

    #[test]
    fn latency_based_picks_lowest_latency() {
        let mut mgr = NodeManager::new(SelectionStrategy::LatencyBased);
        mgr.add_node(node("slow", 500.0, 1.0));
        mgr.add_node(node("fast", 5.0, 1.0));
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(mgr.select(&mut rng).unwrap(), "fast");
    }

    #[test]
    fn capacity_based_picks_most_spare_capacity() {
        let mut mgr = NodeManager::new(SelectionStrategy::CapacityBased);
        mgr.add_node(node("full", 10.0, 0.2));
        mgr.add_node(node("spare", 10.0, 0.9));
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(mgr.select(&mut rng).unwrap(), "spare");
    }

    #[test]
    fn unhealthy_nodes_are_not_candidates() {
        let mut mgr = NodeManager::new(SelectionStrategy::RoundRobin);
        let mut bad = node("bad", 10.0, 1.0);
        bad.record_health_result(false);
        bad.record_health_result(false);
        bad.record_health_result(false);
        mgr.add_node(bad);
        assert_eq!(mgr.healthy_count(), 0);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(mgr.select(&mut rng).is_none());
    }

    #[test]
    fn run_health_probes_applies_results_by_id() {
        let mut mgr = NodeManager::new(SelectionStrategy::RoundRobin);
        mgr.add_node(node("a", 10.0, 1.0));
        mgr.run_health_probes(vec![("a".to_string(), false)]);
        assert_eq!(mgr.node_mut("a").unwrap().consecutive_failures, 1);
    }
}
