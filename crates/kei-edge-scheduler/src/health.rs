//! Node health probing: `HTTP GET /health` with a bounded timeout, the
//! dependency-injection seam `SchedulerActor`'s health ticker calls into,
//! mirroring the `TaskExecutor` injection seam used for task dispatch.

use async_trait::async_trait;
use std::time::Duration;

/// Bound on a single probe request, independent of the probe interval.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Performs a liveness check against one node endpoint. Implemented by
/// [`HttpHealthProber`] in production and by a recording stub in tests.
#[async_trait]
pub trait HealthProber: Send + Sync {
    async fn probe(&self, endpoint: &str) -> bool;
}

/// `GET {endpoint}/health`, timing out after 5s; any non-2xx response or
/// transport failure counts as a probe failure.
pub struct HttpHealthProber {
    client: reqwest::Client,
}

impl HttpHealthProber {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

impl Default for HttpHealthProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProber for HttpHealthProber {
    async fn probe(&self, endpoint: &str) -> bool {
        let url = format!("{}/health", endpoint.trim_end_matches('/'));
        match self.client.get(url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::warn!(endpoint, error = %e, "health probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ScriptedProber {
        results: Vec<bool>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HealthProber for ScriptedProber {
        async fn probe(&self, _endpoint: &str) -> bool {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            self.results.get(i).copied().unwrap_or(false)
        }
    }

    #[tokio::test]
    async fn scripted_prober_replays_results_in_order() {
        let prober = Arc::new(ScriptedProber {
            results: vec![true, false],
            calls: AtomicUsize::new(0),
        });
        assert!(prober.probe("http://n1").await);
        assert!(!prober.probe("http://n1").await);
    }
}
