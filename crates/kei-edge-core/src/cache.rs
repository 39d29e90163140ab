//! Bounded LRU cache: size- and count-bounded, with TTL expiry.
//!
//! Bookkeeping uses small owned structs rather than reaching for an
//! external LRU crate, since a cache instance is always owned by a single
//! scheduler task (no `RwLock` needed here).

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct CacheEntryMeta {
    pub ttl: Option<Duration>,
    pub priority: i32,
    pub metadata: serde_json::Value,
}

impl Default for CacheEntryMeta {
    fn default() -> Self {
        Self {
            ttl: None,
            priority: 0,
            metadata: serde_json::Value::Null,
        }
    }
}

struct Entry<V> {
    value: V,
    size_bytes: usize,
    created_at: Instant,
    meta: CacheEntryMeta,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    total_retrieval_ms: u64,
    retrieval_count: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn avg_retrieval_ms(&self) -> f64 {
        if self.retrieval_count == 0 {
            0.0
        } else {
            self.total_retrieval_ms as f64 / self.retrieval_count as f64
        }
    }
}

/// Per-named-cache size/count budget, so models/results/metadata caches can
/// each be sized independently.
#[derive(Debug, Clone, Copy)]
pub struct CacheBudget {
    pub max_bytes: usize,
    pub max_entries: usize,
}

impl Default for CacheBudget {
    fn default() -> Self {
        Self {
            max_bytes: 64 * 1024 * 1024,
            max_entries: 1024,
        }
    }
}

/// A single size+count+TTL bounded LRU cache.
pub struct LruCache<V> {
    budget: CacheBudget,
    entries: HashMap<String, Entry<V>>,
    /// Front = least recently used, back = most recently used.
    recency: Vec<String>,
    current_bytes: usize,
    stats: CacheStats,
}

impl<V: Clone> LruCache<V> {
    pub fn new(budget: CacheBudget) -> Self {
        Self {
            budget,
            entries: HashMap::new(),
            recency: Vec::new(),
            current_bytes: 0,
            stats: CacheStats::default(),
        }
    }

    fn is_expired(entry: &Entry<V>) -> bool {
        match entry.meta.ttl {
            Some(ttl) => entry.created_at.elapsed() >= ttl,
            None => false,
        }
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            let k = self.recency.remove(pos);
            self.recency.push(k);
        }
    }

    /// Returns `None` if the key is missing or its TTL has elapsed; updates
    /// recency and stats on hit.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let start = Instant::now();
        if self.entries.get(key).map(Self::is_expired).unwrap_or(false) {
            self.remove(key);
        }
        let value = self.entries.get(key).map(|e| e.value.clone());
        if value.is_some() {
            self.stats.hits += 1;
            self.touch(key);
        } else {
            self.stats.misses += 1;
        }
        self.stats.total_retrieval_ms += start.elapsed().as_millis() as u64;
        self.stats.retrieval_count += 1;
        value
    }

    /// Inserts `value`, evicting expired entries first and then
    /// least-recently-used entries until both the byte and count budgets
    /// hold.
    pub fn set(&mut self, key: impl Into<String>, value: V, size_bytes: usize, meta: CacheEntryMeta) {
        let key = key.into();
        self.evict_expired();
        self.remove(&key);
        self.entries.insert(
            key.clone(),
            Entry {
                value,
                size_bytes,
                created_at: Instant::now(),
                meta,
            },
        );
        self.recency.push(key);
        self.current_bytes += size_bytes;
        self.evict_to_fit();
    }

    fn evict_expired(&mut self) {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| Self::is_expired(e))
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            self.remove(&key);
            self.stats.evictions += 1;
        }
    }

    fn evict_to_fit(&mut self) {
        while (self.current_bytes > self.budget.max_bytes || self.entries.len() > self.budget.max_entries)
            && !self.recency.is_empty()
        {
            let victim = self.recency[0].clone();
            self.remove(&victim);
            self.stats.evictions += 1;
        }
    }

    fn remove(&mut self, key: &str) {
        if let Some(entry) = self.entries.remove(key) {
            self.current_bytes -= entry.size_bytes;
        }
        self.recency.retain(|k| k != key);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
        self.current_bytes = 0;
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(max_bytes: usize, max_entries: usize) -> CacheBudget {
        CacheBudget { max_bytes, max_entries }
    }

    #[test]
    fn miss_then_hit_updates_stats() {
        let mut cache: LruCache<Vec<u8>> = LruCache::new(budget(1024, 10));
        assert!(cache.get("k").is_none());
        cache.set("k", vec![1, 2, 3], 3, CacheEntryMeta::default());
        assert_eq!(cache.get("k"), Some(vec![1, 2, 3]));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn evicts_least_recently_used_over_count_budget() {
        let mut cache: LruCache<u8> = LruCache::new(budget(1024, 2));
        cache.set("a", 1, 1, CacheEntryMeta::default());
        cache.set("b", 2, 1, CacheEntryMeta::default());
        cache.get("a"); // "a" becomes most recently used; "b" is now LRU.
        cache.set("c", 3, 1, CacheEntryMeta::default());

        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn evicts_over_byte_budget() {
        let mut cache: LruCache<Vec<u8>> = LruCache::new(budget(10, 100));
        cache.set("a", vec![0; 6], 6, CacheEntryMeta::default());
        cache.set("b", vec![0; 6], 6, CacheEntryMeta::default());
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let mut cache: LruCache<u8> = LruCache::new(budget(1024, 10));
        cache.set(
            "k",
            1,
            1,
            CacheEntryMeta {
                ttl: Some(Duration::from_millis(0)),
                ..Default::default()
            },
        );
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn clear_drops_all_entries() {
        let mut cache: LruCache<u8> = LruCache::new(budget(1024, 10));
        cache.set("a", 1, 1, CacheEntryMeta::default());
        cache.set("b", 2, 1, CacheEntryMeta::default());
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
