//! Local/edge/hybrid routing decision table.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingDecision {
    Local,
    Edge,
    Hybrid,
}

/// Snapshot of scheduler state relevant to a single routing decision.
#[derive(Debug, Clone, Copy)]
pub struct RoutingContext {
    pub force_local: bool,
    pub node_count: usize,
    pub local_capacity: f64,
}

/// Ops cheap enough that edge dispatch overhead dominates; always routed to
/// an edge node rather than hybridized.
pub const LIGHTWEIGHT_OPS: &[&str] = &["vad", "noise-reduction"];

/// Ops expensive enough to benefit from splitting across local + edge.
pub const HEAVY_OPS: &[&str] = &["analysis"];

/// Large audio payload threshold above which hybrid partitioning pays off.
const HYBRID_SIZE_THRESHOLD: usize = 10 * 1024;

/// Below this payload size, routing overhead exceeds any benefit.
const LOCAL_SIZE_FLOOR: usize = 1024;

/// Decides where a task should execute.
pub fn route(op: &str, size_bytes: usize, ctx: &RoutingContext) -> RoutingDecision {
    if ctx.force_local || size_bytes < LOCAL_SIZE_FLOOR || ctx.node_count == 0 || ctx.local_capacity > 0.8 {
        return RoutingDecision::Local;
    }
    if LIGHTWEIGHT_OPS.contains(&op) {
        return RoutingDecision::Edge;
    }
    if size_bytes > HYBRID_SIZE_THRESHOLD || HEAVY_OPS.contains(&op) {
        return RoutingDecision::Hybrid;
    }
    RoutingDecision::Edge
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(node_count: usize, local_capacity: f64) -> RoutingContext {
        RoutingContext {
            force_local: false,
            node_count,
            local_capacity,
        }
    }

    #[test]
    fn forced_local_always_wins() {
        let mut c = ctx(4, 0.1);
        c.force_local = true;
        assert_eq!(route("analysis", 100_000, &c), RoutingDecision::Local);
    }

    #[test]
    fn tiny_payload_stays_local() {
        assert_eq!(route("analysis", 10, &ctx(4, 0.1)), RoutingDecision::Local);
    }

    #[test]
    fn no_nodes_forces_local() {
        assert_eq!(route("vad", 5_000, &ctx(0, 0.1)), RoutingDecision::Local);
    }

    #[test]
    fn saturated_local_capacity_stays_local() {
        assert_eq!(route("vad", 5_000, &ctx(4, 0.9)), RoutingDecision::Local);
    }

    #[test]
    fn lightweight_op_goes_to_edge() {
        assert_eq!(route("vad", 5_000, &ctx(4, 0.1)), RoutingDecision::Edge);
    }

    #[test]
    fn large_payload_goes_hybrid() {
        assert_eq!(route("transcode", 20_000, &ctx(4, 0.1)), RoutingDecision::Hybrid);
    }

    #[test]
    fn heavy_op_goes_hybrid_even_when_small() {
        assert_eq!(route("analysis", 2_000, &ctx(4, 0.1)), RoutingDecision::Hybrid);
    }

    #[test]
    fn default_mid_size_op_goes_to_edge() {
        assert_eq!(route("transcode", 2_000, &ctx(4, 0.1)), RoutingDecision::Edge);
    }
}
