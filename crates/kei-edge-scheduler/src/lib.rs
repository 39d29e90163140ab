//! Priority/deadline task queue, byte-range partitioner, and adaptive node
//! routing for the edge audio scheduler.
//!
//! - [`queue`]: the priority+deadline+dependency ready queue.
//! - [`partition`]: byte-range task splitting and result merge.
//! - [`routing`]: the local/edge/hybrid decision table.
//! - [`nodes`]: the node pool, health tracking, and selection strategies.
//! - [`health`]: the `HTTP GET /health` prober the scheduler ticks every
//!   `health_check_interval_ms`.
//! - [`scheduler`]: the owning actor wiring all of the above together.
//! - [`config`]: the scheduler's configuration surface.

pub mod config;
pub mod health;
pub mod nodes;
pub mod partition;
pub mod queue;
pub mod routing;
pub mod scheduler;

pub use config::{FallbackConfig, Mode, RetryConfig, SchedulerConfig};
pub use health::{HealthProber, HttpHealthProber};
pub use nodes::{NodeManager, ScoreWeights, SelectionStrategy};
pub use partition::{merge_results, partition_task, Partition};
pub use queue::TaskQueue;
pub use routing::{route, RoutingContext, RoutingDecision};
pub use scheduler::{EdgeScheduler, SchedulerEvent, SchedulerStats, TaskExecutor};
