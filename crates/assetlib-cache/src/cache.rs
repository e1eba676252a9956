use assetlib_core::{CacheSettings, EvictionPolicy};
use async_trait::async_trait;
use serde::Serialize;
use std::time::{Duration, SystemTime};

/// Cache entry metadata
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    /// Approximate size: serialized length, not an exact byte count
    pub size: usize,
    pub hits: u64,
    pub created: SystemTime,
    pub accessed: SystemTime,
    pub expires: Option<SystemTime>,
    pub tags: Vec<String>,
    /// Logical access clock; breaks ties between equal `accessed` stamps
    pub(crate) access_seq: u64,
}

impl<V> CacheEntry<V> {
    pub fn new(
        key: String,
        value: V,
        size: usize,
        ttl: Option<Duration>,
        tags: Vec<String>,
        access_seq: u64,
    ) -> Self {
        let now = SystemTime::now();
        Self {
            key,
            value,
            size,
            hits: 0,
            created: now,
            accessed: now,
            expires: ttl.map(|ttl| now + ttl),
            tags,
            access_seq,
        }
    }

    /// An entry with a zero TTL is already expired.
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        match self.expires {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }

    pub fn touch(&mut self, access_seq: u64) {
        self.accessed = SystemTime::now();
        self.hits += 1;
        self.access_seq = access_seq;
    }
}

/// Serialized length of `value`. Values that fail to serialize count as zero.
pub fn approximate_size<V: Serialize>(value: &V) -> usize {
    serde_json::to_vec(value).map(|bytes| bytes.len()).unwrap_or(0)
}

/// Cache configuration options
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Budget for the sum of entry sizes
    pub max_size: usize,
    pub default_ttl: Option<Duration>,
    pub policy: EvictionPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig::from(&CacheSettings::default())
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            max_size: settings.max_size_bytes,
            default_ttl: Some(Duration::from_secs(settings.default_ttl_secs)),
            policy: settings.policy,
        }
    }
}

/// Cache performance statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub entries: usize,
    pub size: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }

    pub fn miss_rate(&self) -> f64 {
        1.0 - self.hit_rate()
    }
}

/// Key/value cache seam used by the manager. Implementations never fail:
/// anything that goes wrong degrades to a miss.
#[async_trait]
pub trait Cache<V>: Send + Sync
where
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &str) -> Option<V>;

    /// Insert with the default TTL and no tags. Returns whether the value
    /// was stored.
    async fn set(&self, key: &str, value: V) -> bool;

    async fn set_with(&self, key: &str, value: V, ttl: Option<Duration>, tags: Vec<String>)
        -> bool;

    async fn delete(&self, key: &str) -> bool;

    /// Drop every entry carrying `tag`; returns how many were removed.
    async fn invalidate_tag(&self, tag: &str) -> usize;

    async fn clear(&self);

    async fn stats(&self) -> CacheStats;
}
