use crate::{approximate_size, Cache, CacheConfig, CacheEntry, CacheStats};
use assetlib_core::EvictionPolicy;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    total_size: usize,
    clock: u64,
    stats: CacheStats,
}

impl<V> CacheState<V> {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.total_size = self.total_size.saturating_sub(entry.size);
        Some(entry)
    }

    /// Remove the entry with the oldest access.
    fn evict_lru(&mut self) -> bool {
        let victim = self
            .entries
            .values()
            .min_by_key(|e| (e.accessed, e.access_seq))
            .map(|e| e.key.clone());

        match victim {
            Some(key) => {
                self.remove(&key);
                self.stats.evictions += 1;
                debug!(key = %key, "evicted least recently used cache entry");
                true
            }
            None => false,
        }
    }
}

/// Expiring key/value cache with LRU eviction.
///
/// Entries expire lazily when read. Inserting past `max_size` evicts the
/// least recently accessed entries until the new value fits; a value larger
/// than the whole budget is not cached.
pub struct ExpiringCache<V> {
    state: Mutex<CacheState<V>>,
    config: CacheConfig,
}

impl<V> ExpiringCache<V>
where
    V: Clone + Serialize,
{
    pub fn new(config: CacheConfig) -> Self {
        if config.policy != EvictionPolicy::Lru {
            warn!(
                policy = ?config.policy,
                "cache eviction policy has no eviction branch; the cache may grow past max_size"
            );
        }
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                total_size: 0,
                clock: 0,
                stats: CacheStats::default(),
            }),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn get_entry(&self, key: &str) -> Option<V> {
        let mut state = self.state.lock();

        match state.entries.get(key).map(|entry| entry.is_expired()) {
            None => {
                state.stats.misses += 1;
                return None;
            }
            Some(true) => {
                state.remove(key);
                state.stats.expirations += 1;
                state.stats.misses += 1;
                return None;
            }
            Some(false) => {}
        }

        let seq = state.tick();
        state.stats.hits += 1;
        let entry = state.entries.get_mut(key)?;
        entry.touch(seq);
        Some(entry.value.clone())
    }

    pub fn insert(&self, key: &str, value: V, ttl: Option<Duration>, tags: Vec<String>) -> bool {
        let size = approximate_size(&value);
        let mut state = self.state.lock();

        state.remove(key);

        if size > self.config.max_size {
            debug!(key, size, max = self.config.max_size, "value exceeds cache budget, not cached");
            return false;
        }

        while state.total_size + size > self.config.max_size {
            let evicted = match self.config.policy {
                EvictionPolicy::Lru => state.evict_lru(),
                EvictionPolicy::Lfu | EvictionPolicy::Fifo => false,
            };
            if !evicted {
                break;
            }
        }

        let seq = state.tick();
        state.total_size += size;
        state
            .entries
            .insert(key.to_string(), CacheEntry::new(key.to_string(), value, size, ttl, tags, seq));
        true
    }

    pub fn remove(&self, key: &str) -> bool {
        self.state.lock().remove(key).is_some()
    }

    /// True when `key` is present and unexpired. Does not count as an access.
    pub fn contains(&self, key: &str) -> bool {
        self.state
            .lock()
            .entries
            .get(key)
            .map(|e| !e.is_expired())
            .unwrap_or(false)
    }

    pub fn remove_tagged(&self, tag: &str) -> usize {
        let mut state = self.state.lock();
        let keys: Vec<String> = state
            .entries
            .values()
            .filter(|e| e.tags.iter().any(|t| t == tag))
            .map(|e| e.key.clone())
            .collect();
        for key in &keys {
            state.remove(key);
        }
        keys.len()
    }

    /// Drop every expired entry without waiting for a read.
    pub fn purge_expired(&self) -> usize {
        let now = SystemTime::now();
        let mut state = self.state.lock();
        let keys: Vec<String> = state
            .entries
            .values()
            .filter(|e| e.is_expired_at(now))
            .map(|e| e.key.clone())
            .collect();
        for key in &keys {
            state.remove(key);
        }
        state.stats.expirations += keys.len() as u64;
        keys.len()
    }

    pub fn clear_all(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.total_size = 0;
    }

    pub fn snapshot_stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.entries.len(),
            size: state.total_size,
            ..state.stats.clone()
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl<V> Cache<V> for ExpiringCache<V>
where
    V: Clone + Serialize + Send + Sync,
{
    async fn get(&self, key: &str) -> Option<V> {
        self.get_entry(key)
    }

    async fn set(&self, key: &str, value: V) -> bool {
        self.insert(key, value, self.config.default_ttl, Vec::new())
    }

    async fn set_with(
        &self,
        key: &str,
        value: V,
        ttl: Option<Duration>,
        tags: Vec<String>,
    ) -> bool {
        self.insert(key, value, ttl, tags)
    }

    async fn delete(&self, key: &str) -> bool {
        self.remove(key)
    }

    async fn invalidate_tag(&self, tag: &str) -> usize {
        self.remove_tagged(tag)
    }

    async fn clear(&self) {
        self.clear_all()
    }

    async fn stats(&self) -> CacheStats {
        self.snapshot_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with_budget(max_size: usize) -> ExpiringCache<String> {
        ExpiringCache::new(CacheConfig {
            max_size,
            default_ttl: None,
            policy: EvictionPolicy::Lru,
        })
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = cache_with_budget(1024);
        assert!(cache.set("a", "alpha".to_string()).await);
        assert_eq!(cache.get("a").await, Some("alpha".to_string()));

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.size, approximate_size(&"alpha"));
    }

    #[tokio::test]
    async fn test_zero_max_age_is_immediate_miss() {
        let cache = cache_with_budget(1024);
        cache
            .set_with("k", "v".to_string(), Some(Duration::ZERO), vec![])
            .await;
        assert_eq!(cache.get("k").await, None);

        let stats = cache.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.entries, 0);
    }

    #[tokio::test]
    async fn test_evicts_least_recently_accessed_first() {
        // Each value serializes to 6 bytes, so three fit.
        let cache = cache_with_budget(18);
        cache.set("a", "aaaa".to_string()).await;
        cache.set("b", "bbbb".to_string()).await;
        cache.set("c", "cccc".to_string()).await;

        assert!(cache.get("a").await.is_some());
        cache.set("d", "dddd".to_string()).await;

        assert!(!cache.contains("b"));
        assert!(cache.contains("a"));
        assert!(cache.contains("c"));
        assert!(cache.contains("d"));
        assert_eq!(cache.stats().await.evictions, 1);
    }

    #[tokio::test]
    async fn test_large_insert_evicts_until_it_fits() {
        let cache = cache_with_budget(18);
        cache.set("a", "aaaa".to_string()).await;
        cache.set("b", "bbbb".to_string()).await;
        cache.set("c", "cccc".to_string()).await;

        // 12 bytes: needs two slots.
        cache.set("big", "0123456789".to_string()).await;

        let stats = cache.stats().await;
        assert_eq!(stats.evictions, 2);
        assert!(stats.size <= 18);
        assert!(cache.contains("c"));
        assert!(cache.contains("big"));
    }

    #[tokio::test]
    async fn test_oversized_value_is_not_cached() {
        let cache = cache_with_budget(4);
        assert!(!cache.set("k", "too large".to_string()).await);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_size() {
        let cache = cache_with_budget(1024);
        cache.set("k", "a".to_string()).await;
        cache.set("k", "abc".to_string()).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().await.size, approximate_size(&"abc"));
    }

    #[tokio::test]
    async fn test_invalidate_tag() {
        let cache = cache_with_budget(1024);
        cache
            .set_with("q1", "x".to_string(), None, vec!["search".into()])
            .await;
        cache
            .set_with("q2", "y".to_string(), None, vec!["search".into(), "other".into()])
            .await;
        cache.set("asset:a", "z".to_string()).await;

        assert_eq!(cache.invalidate_tag("search").await, 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("asset:a"));
    }

    #[test]
    fn test_purge_expired() {
        let cache = cache_with_budget(1024);
        tokio_test::block_on(async {
            cache
                .set_with("gone", "x".to_string(), Some(Duration::ZERO), vec![])
                .await;
            cache.set("kept", "y".to_string()).await;
        });
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_non_lru_policy_never_evicts() {
        let cache: ExpiringCache<String> = ExpiringCache::new(CacheConfig {
            max_size: 6,
            default_ttl: None,
            policy: EvictionPolicy::Lfu,
        });
        cache.set("a", "aaaa".to_string()).await;
        cache.set("b", "bbbb".to_string()).await;
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().await.evictions, 0);
    }
}
