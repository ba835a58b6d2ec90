//! Per-provider read-through cache.
//!
//! A [`TtlCache`] is a concurrent map with two independent eviction triggers
//! checked in order: entries past their TTL are dropped first, then the
//! least-recently-accessed entries go until the table fits `max_size`.
//! Reads never touch a backend and never hold a lock across a backend call;
//! a read racing an eviction may see either the old value or a miss.

use crate::models::QueryResult;
use dashmap::DashMap;
use serde_json::Value as JsonValue;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// What a provider caches: single records by id, and raw query results
/// keyed by their literal text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Record(String),
    /// Literal query text; equivalent queries spelled differently are distinct keys.
    Query(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Record(JsonValue),
    Query(Arc<QueryResult>),
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub total: usize,
    pub expired: usize,
    pub active: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// The cache seam a provider is built with; swap in any implementation.
pub trait CacheLayer: Send + Sync {
    /// Hit value or `None`. Never performs backend I/O.
    fn get(&self, key: &CacheKey) -> Option<CachedValue>;
    /// Insert or overwrite; the entry's TTL restarts.
    fn put(&self, key: CacheKey, value: CachedValue);
    fn invalidate(&self, key: &CacheKey);
    fn invalidate_all(&self);
    fn stats(&self) -> CacheStats;
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    expires_at: Instant,
    last_accessed: AtomicU64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// TTL + size-bounded concurrent cache.
pub struct TtlCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
    max_size: usize,
    // Logical access clock; strictly increasing so LRU order has no ties.
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_size: max_size.max(1),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.last_accessed.store(self.tick(), Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(key = ?key, "Cache hit");
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        // Shard guard is released before removal.
        if expired {
            self.entries.remove_if(key, |_, e| e.is_expired(Instant::now()));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        trace!(key = ?key, expired, "Cache miss");
        None
    }

    pub fn put(&self, key: K, value: V) {
        let now = Instant::now();
        let entry = CacheEntry {
            value,
            inserted_at: now,
            expires_at: now + self.ttl,
            last_accessed: AtomicU64::new(self.tick()),
        };
        self.entries.insert(key, entry);
        if self.entries.len() > self.max_size {
            self.evict(now);
        }
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Remove every entry matching the predicate.
    pub fn invalidate_where(&self, mut predicate: impl FnMut(&K) -> bool) {
        self.entries.retain(|k, _| !predicate(k));
    }

    pub fn invalidate_all(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Age of an entry, expired or not.
    pub fn age(&self, key: &K) -> Option<Duration> {
        self.entries.get(key).map(|e| e.inserted_at.elapsed())
    }

    fn evict(&self, now: Instant) {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        let mut evicted = before.saturating_sub(self.entries.len());

        let over = self.entries.len().saturating_sub(self.max_size);
        if over > 0 {
            let mut by_access: Vec<(K, u64)> = self
                .entries
                .iter()
                .map(|e| (e.key().clone(), e.last_accessed.load(Ordering::Relaxed)))
                .collect();
            by_access.sort_by_key(|(_, tick)| *tick);
            for (key, _) in by_access.into_iter().take(over) {
                if self.entries.remove(&key).is_some() {
                    evicted += 1;
                }
            }
        }

        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            debug!(evicted, remaining = self.entries.len(), "Cache eviction");
        }
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let total = self.entries.len();
        let expired = self
            .entries
            .iter()
            .filter(|e| e.value().is_expired(now))
            .count();
        CacheStats {
            total,
            expired,
            active: total.saturating_sub(expired),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl CacheLayer for TtlCache<CacheKey, CachedValue> {
    fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        TtlCache::get(self, key)
    }

    fn put(&self, key: CacheKey, value: CachedValue) {
        TtlCache::put(self, key, value)
    }

    fn invalidate(&self, key: &CacheKey) {
        TtlCache::invalidate(self, key)
    }

    fn invalidate_all(&self) {
        TtlCache::invalidate_all(self)
    }

    fn stats(&self) -> CacheStats {
        TtlCache::stats(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn cache(ttl_ms: u64, max: usize) -> TtlCache<String, i32> {
        TtlCache::new(Duration::from_millis(ttl_ms), max)
    }

    #[test]
    fn test_put_then_get() {
        let c = cache(60_000, 10);
        c.put("a".to_string(), 1);
        assert_eq!(c.get(&"a".to_string()), Some(1));
        let stats = c.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.active, 1);
    }

    #[test]
    fn test_put_overwrites() {
        let c = cache(60_000, 10);
        c.put("a".to_string(), 1);
        c.put("a".to_string(), 2);
        assert_eq!(c.get(&"a".to_string()), Some(2));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_invalidate_is_miss() {
        let c = cache(60_000, 10);
        c.put("a".to_string(), 1);
        c.invalidate(&"a".to_string());
        assert_eq!(c.get(&"a".to_string()), None);
        assert_eq!(c.stats().misses, 1);
    }

    #[test]
    fn test_invalidate_all() {
        let c = cache(60_000, 10);
        c.put("a".to_string(), 1);
        c.put("b".to_string(), 2);
        c.invalidate_all();
        assert!(c.is_empty());
    }

    #[test]
    fn test_ttl_expiry() {
        let c = cache(30, 10);
        c.put("a".to_string(), 1);
        thread::sleep(Duration::from_millis(60));
        assert_eq!(c.get(&"a".to_string()), None);
        assert!(c.is_empty());
    }

    #[test]
    fn test_put_resets_ttl() {
        let c = cache(200, 10);
        c.put("a".to_string(), 1);
        thread::sleep(Duration::from_millis(120));
        c.put("a".to_string(), 2);
        thread::sleep(Duration::from_millis(120));
        assert_eq!(c.get(&"a".to_string()), Some(2));
    }

    #[test]
    fn test_size_bound_evicts_least_recently_accessed() {
        let c = cache(60_000, 2);
        c.put("a".to_string(), 1);
        c.put("b".to_string(), 2);
        // Touch "a" so "b" becomes the oldest-accessed entry.
        assert_eq!(c.get(&"a".to_string()), Some(1));
        c.put("c".to_string(), 3);

        assert_eq!(c.len(), 2);
        assert_eq!(c.get(&"b".to_string()), None);
        assert_eq!(c.get(&"a".to_string()), Some(1));
        assert_eq!(c.get(&"c".to_string()), Some(3));
        assert_eq!(c.stats().evictions, 1);
    }

    #[test]
    fn test_expired_entries_evicted_before_lru() {
        let c: TtlCache<String, i32> = TtlCache::new(Duration::from_millis(40), 2);
        c.put("old".to_string(), 1);
        thread::sleep(Duration::from_millis(60));
        c.put("b".to_string(), 2);
        c.put("c".to_string(), 3);
        // "old" expired, so nothing live had to be dropped.
        assert_eq!(c.get(&"b".to_string()), Some(2));
        assert_eq!(c.get(&"c".to_string()), Some(3));
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn test_invalidate_where() {
        let c: TtlCache<CacheKey, i32> = TtlCache::new(Duration::from_secs(60), 10);
        c.put(CacheKey::Record("1".to_string()), 1);
        c.put(CacheKey::Query("SELECT 1".to_string()), 2);
        c.invalidate_where(|k| matches!(k, CacheKey::Query(_)));
        assert_eq!(c.len(), 1);
        assert!(c.get(&CacheKey::Record("1".to_string())).is_some());
    }

    #[test]
    fn test_stats_counts_expired() {
        let c = cache(30, 10);
        c.put("a".to_string(), 1);
        thread::sleep(Duration::from_millis(60));
        c.put("b".to_string(), 2);
        let stats = c.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.active, 1);
    }

    #[test]
    fn test_concurrent_access() {
        let c = Arc::new(cache(60_000, 64));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let c = Arc::clone(&c);
                thread::spawn(move || {
                    for i in 0..200 {
                        let key = format!("k{}", (t * 7 + i) % 100);
                        c.put(key.clone(), i);
                        let _ = c.get(&key);
                        if i % 10 == 0 {
                            c.invalidate(&key);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(c.len() <= 64 + 8);
    }

    #[test]
    fn test_trait_object_usage() {
        let layer: Arc<dyn CacheLayer> = Arc::new(TtlCache::new(Duration::from_secs(60), 4));
        let key = CacheKey::Query("SELECT COUNT(*) FROM t".to_string());
        layer.put(
            key.clone(),
            CachedValue::Query(Arc::new(QueryResult::empty(0))),
        );
        assert!(matches!(layer.get(&key), Some(CachedValue::Query(_))));
        layer.invalidate_all();
        assert!(layer.get(&key).is_none());
    }
}
