//! Edge scheduler configuration surface.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    #[default]
    Local,
    EdgeNode,
    Hybrid,
    CloudOnly,
}

fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    200
}
fn default_true() -> bool {
    true
}
fn default_fallback_timeout_ms() -> u64 {
    5_000
}
fn default_fallback_order() -> Vec<Mode> {
    vec![Mode::EdgeNode, Mode::Local]
}
fn default_max_concurrent() -> usize {
    10
}
fn default_drain_interval_ms() -> u64 {
    100
}
fn default_health_check_interval_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_true")]
    pub exponential_backoff: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            exponential_backoff: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_fallback_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_fallback_order")]
    pub order: Vec<Mode>,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            timeout_ms: default_fallback_timeout_ms(),
            order: default_fallback_order(),
            retry: RetryConfig::default(),
        }
    }
}

/// Top-level configuration for [`crate::scheduler::EdgeScheduler`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default)]
    pub adaptive_routing: bool,
    #[serde(default = "default_true")]
    pub caching_enabled: bool,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            max_concurrent: default_max_concurrent(),
            adaptive_routing: false,
            caching_enabled: default_true(),
            fallback: FallbackConfig::default(),
            drain_interval_ms: default_drain_interval_ms(),
            health_check_interval_ms: default_health_check_interval_ms(),
        }
    }
}
