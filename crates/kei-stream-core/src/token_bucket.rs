//! Token bucket pacing primitive, including the adaptive variant and the
//! per-stream bucket manager.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Configuration for a [`TokenBucket`].
#[derive(Debug, Clone)]
pub struct TokenBucketConfig {
    pub capacity: f64,
    pub refill_rate: f64,
    pub frame_cost: f64,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self {
            capacity: 32.0,
            refill_rate: 16.0,
            frame_cost: 1.0,
        }
    }
}

/// Snapshot returned by [`TokenBucket::status`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketStatus {
    pub tokens: f64,
    pub capacity: f64,
    pub refill_rate: f64,
    pub utilisation_pct: f64,
    pub time_to_full_ms: u64,
}

/// Per-stream pacing primitive. `try_consume` is lazy: tokens are only
/// refilled when observed, never on a background timer.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
    frame_cost: f64,
}

impl TokenBucket {
    pub fn new(config: TokenBucketConfig) -> Self {
        Self {
            capacity: config.capacity,
            refill_rate: config.refill_rate,
            tokens: config.capacity,
            last_refill: Instant::now(),
            frame_cost: config.frame_cost,
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
            self.last_refill = now;
        }
    }

    /// Attempt to consume `n` tokens (defaults to `frame_cost`). Refills
    /// lazily before checking. No side effects on failure.
    pub fn try_consume(&mut self, n: Option<f64>) -> bool {
        self.refill();
        let n = n.unwrap_or(self.frame_cost);
        if self.tokens >= n {
            self.tokens -= n;
            true
        } else {
            false
        }
    }

    /// Waits until `n` tokens are available, then consumes them.
    /// Individual wait steps are bounded to `[10ms, 5s]`.
    pub async fn consume(&mut self, n: Option<f64>) {
        let want = n.unwrap_or(self.frame_cost);
        loop {
            if self.try_consume(Some(want)) {
                return;
            }
            let deficit = (want - self.tokens).max(0.0);
            let wait_ms = if self.refill_rate > 0.0 {
                (deficit / self.refill_rate * 1000.0) as u64
            } else {
                5_000
            };
            let wait_ms = wait_ms.clamp(10, 5_000);
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        }
    }

    pub fn status(&mut self) -> BucketStatus {
        self.refill();
        let utilisation_pct = if self.capacity > 0.0 {
            (1.0 - self.tokens / self.capacity) * 100.0
        } else {
            0.0
        };
        let deficit = (self.capacity - self.tokens).max(0.0);
        let time_to_full_ms = if self.refill_rate > 0.0 {
            (deficit / self.refill_rate * 1000.0) as u64
        } else {
            u64::MAX
        };
        BucketStatus {
            tokens: self.tokens,
            capacity: self.capacity,
            refill_rate: self.refill_rate,
            utilisation_pct,
            time_to_full_ms,
        }
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    pub fn set_refill_rate(&mut self, rate: f64) {
        self.refill_rate = rate;
    }

    /// Milliseconds since the bucket was last touched. Exposed as an
    /// accessor (rather than having callers poke at `last_refill`
    /// directly) for idle-bucket cleanup.
    pub fn idle_ms(&self) -> u64 {
        Instant::now().duration_since(self.last_refill).as_millis() as u64
    }

    pub fn is_full(&self) -> bool {
        self.tokens >= self.capacity
    }
}

/// Configuration for [`AdaptiveTokenBucket`].
#[derive(Debug, Clone)]
pub struct AdaptiveConfig {
    pub adaptation_interval: Duration,
    pub min_refill_rate: f64,
    pub max_refill_rate: f64,
    pub history_len: usize,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            adaptation_interval: Duration::from_secs(10),
            min_refill_rate: 1.0,
            max_refill_rate: 256.0,
            history_len: 100,
        }
    }
}

/// A [`TokenBucket`] whose refill rate adapts to recent success rate.
pub struct AdaptiveTokenBucket {
    bucket: TokenBucket,
    config: AdaptiveConfig,
    history: VecDeque<bool>,
    last_adaptation: Instant,
}

impl AdaptiveTokenBucket {
    pub fn new(bucket_config: TokenBucketConfig, adaptive_config: AdaptiveConfig) -> Self {
        Self {
            bucket: TokenBucket::new(bucket_config),
            config: adaptive_config,
            history: VecDeque::new(),
            last_adaptation: Instant::now(),
        }
    }

    pub fn bucket_mut(&mut self) -> &mut TokenBucket {
        &mut self.bucket
    }

    /// Record a send outcome; drives the adaptation window.
    pub fn record_outcome(&mut self, success: bool) {
        if self.history.len() >= self.config.history_len {
            self.history.pop_front();
        }
        self.history.push_back(success);
        self.maybe_adapt();
    }

    fn success_rate(&self) -> Option<f64> {
        if self.history.is_empty() {
            return None;
        }
        let successes = self.history.iter().filter(|s| **s).count();
        Some(successes as f64 / self.history.len() as f64)
    }

    fn maybe_adapt(&mut self) {
        if self.last_adaptation.elapsed() < self.config.adaptation_interval {
            return;
        }
        self.last_adaptation = Instant::now();
        let Some(rate) = self.success_rate() else {
            return;
        };
        let current = self.bucket.refill_rate();
        let new_rate = if rate < 0.7 && current < self.config.max_refill_rate {
            (current * 1.10).min(self.config.max_refill_rate)
        } else if rate > 0.95 && current > self.config.min_refill_rate {
            (current * 0.95).max(self.config.min_refill_rate)
        } else {
            current
        };
        self.bucket
            .set_refill_rate(new_rate.clamp(self.config.min_refill_rate, self.config.max_refill_rate));
    }
}

/// Owns one [`TokenBucket`] per stream, created lazily on first lookup.
pub struct PerStreamBucketManager {
    buckets: std::collections::HashMap<String, TokenBucket>,
    default_config: TokenBucketConfig,
    max_idle: Duration,
}

impl PerStreamBucketManager {
    pub fn new(default_config: TokenBucketConfig) -> Self {
        Self {
            buckets: std::collections::HashMap::new(),
            default_config,
            max_idle: Duration::from_secs(300),
        }
    }

    pub fn with_max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn get_or_create(&mut self, stream_id: &str) -> &mut TokenBucket {
        self.buckets
            .entry(stream_id.to_string())
            .or_insert_with(|| TokenBucket::new(self.default_config.clone()))
    }

    /// Removes buckets idle for longer than `max_idle` that are also full.
    /// Cleanup never discards a bucket mid-deficit.
    pub fn cleanup(&mut self) {
        let max_idle = self.max_idle;
        self.buckets
            .retain(|_, bucket| !(bucket.idle_ms() as u128 > max_idle.as_millis() && bucket.is_full()));
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_consume_respects_capacity() {
        let mut b = TokenBucket::new(TokenBucketConfig {
            capacity: 2.0,
            refill_rate: 1.0,
            frame_cost: 1.0,
        });
        assert!(b.try_consume(None));
        assert!(b.try_consume(None));
        assert!(!b.try_consume(None));
    }

    #[test]
    fn status_reports_bounded_tokens() {
        let mut b = TokenBucket::new(TokenBucketConfig {
            capacity: 5.0,
            refill_rate: 10.0,
            frame_cost: 1.0,
        });
        let s = b.status();
        assert!(s.tokens >= 0.0 && s.tokens <= s.capacity);
    }

    #[tokio::test]
    async fn consume_waits_then_succeeds() {
        let mut b = TokenBucket::new(TokenBucketConfig {
            capacity: 1.0,
            refill_rate: 100.0,
            frame_cost: 1.0,
        });
        assert!(b.try_consume(None));
        // Bucket is empty; consume() must wait for refill rather than fail.
        b.consume(None).await;
    }

    #[test]
    fn adaptive_increases_rate_on_low_success() {
        let mut adaptive = AdaptiveTokenBucket::new(
            TokenBucketConfig {
                capacity: 10.0,
                refill_rate: 10.0,
                frame_cost: 1.0,
            },
            AdaptiveConfig {
                adaptation_interval: Duration::from_millis(0),
                min_refill_rate: 1.0,
                max_refill_rate: 100.0,
                history_len: 10,
            },
        );
        for _ in 0..10 {
            adaptive.record_outcome(false);
        }
        assert!(adaptive.bucket_mut().refill_rate() > 10.0);
    }

    #[test]
    fn adaptive_decreases_rate_on_high_success() {
        let mut adaptive = AdaptiveTokenBucket::new(
            TokenBucketConfig {
                capacity: 10.0,
                refill_rate: 10.0,
                frame_cost: 1.0,
            },
            AdaptiveConfig {
                adaptation_interval: Duration::from_millis(0),
                min_refill_rate: 1.0,
                max_refill_rate: 100.0,
                history_len: 10,
            },
        );
        for _ in 0..10 {
            adaptive.record_outcome(true);
        }
        assert!(adaptive.bucket_mut().refill_rate() < 10.0);
    }

    #[test]
    fn manager_creates_lazily_and_cleans_idle() {
        let mut mgr = PerStreamBucketManager::new(TokenBucketConfig::default())
            .with_max_idle(Duration::from_millis(0));
        mgr.get_or_create("a");
        assert_eq!(mgr.len(), 1);
        mgr.cleanup();
        // Freshly-created bucket is full, and idle threshold of 0ms means
        // it is immediately eligible for cleanup.
        assert_eq!(mgr.len(), 0);
    }
}
