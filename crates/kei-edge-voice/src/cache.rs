//! The three named caches (models, results, metadata) with separate
//! budgets that back the voice facade.

use kei_edge_core::cache::{CacheBudget, LruCache};
use serde_json::Value;

/// Per-cache budgets. Defaults favor a small result cache over a larger
/// model cache, since models are few and large while results churn.
#[derive(Debug, Clone, Copy)]
pub struct VoiceCacheBudgets {
    pub models: CacheBudget,
    pub results: CacheBudget,
    pub metadata: CacheBudget,
}

impl Default for VoiceCacheBudgets {
    fn default() -> Self {
        Self {
            models: CacheBudget {
                max_bytes: 256 * 1024 * 1024,
                max_entries: 16,
            },
            results: CacheBudget {
                max_bytes: 32 * 1024 * 1024,
                max_entries: 512,
            },
            metadata: CacheBudget {
                max_bytes: 4 * 1024 * 1024,
                max_entries: 1024,
            },
        }
    }
}

/// Bundles the three caches the edge voice facade reads from and writes to.
pub struct VoiceCaches {
    pub models: LruCache<Vec<u8>>,
    pub results: LruCache<Vec<u8>>,
    pub metadata: LruCache<Value>,
}

impl VoiceCaches {
    pub fn new(budgets: VoiceCacheBudgets) -> Self {
        Self {
            models: LruCache::new(budgets.models),
            results: LruCache::new(budgets.results),
            metadata: LruCache::new(budgets.metadata),
        }
    }
}

impl Default for VoiceCaches {
    fn default() -> Self {
        Self::new(VoiceCacheBudgets::default())
    }
}
