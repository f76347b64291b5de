//! Cache Store Module
//!
//! Cache coordinator combining byte storage with the LRU index and the
//! expiration heap. All three structures change together inside `&mut self`
//! methods; callers share the store behind a single lock.

use std::collections::HashMap;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheStats, ExpirationHeap, LruIndex};
use crate::config::CacheConfig;

// == Cache Store ==
/// Main cache storage with LRU eviction and TTL expiry.
#[derive(Debug)]
pub struct CacheStore {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// Recency order
    lru: LruIndex,
    /// Absolute expiry schedule
    expiry: ExpirationHeap,
    /// Performance statistics
    stats: CacheStats,
    /// Active bounds
    config: CacheConfig,
    /// Sum of all entry costs
    total_cost: u64,
}

impl CacheStore {
    // == Constructor ==
    /// Creates an empty store enforcing `config`.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruIndex::new(),
            expiry: ExpirationHeap::new(),
            stats: CacheStats::new(),
            config,
            total_cost: 0,
        }
    }

    // == Get ==
    /// Returns the value for `key` if it is present and younger than `max_age`.
    ///
    /// A stale entry is removed on the spot and the lookup counts as a miss.
    pub fn get(&mut self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        let max_age = self.config.max_age();

        let stale = match self.entries.get(key) {
            Some(entry) => entry.is_stale(max_age, now),
            None => {
                self.stats.record_miss();
                debug!(key, "Cache miss");
                return None;
            }
        };

        if stale {
            self.detach(key);
            self.stats.record_expiration();
            self.stats.record_miss();
            self.sync_occupancy();
            debug!(key, "Cache miss (stale entry removed)");
            return None;
        }

        self.lru.touch(key);
        self.stats.record_hit();
        debug!(key, "Cache hit");
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    // == Peek ==
    /// Returns a fresh value without touching recency or counters.
    pub fn peek(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_stale(self.config.max_age(), now))
            .map(|entry| entry.value.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.peek(key).is_some()
    }

    // == Put ==
    /// Stores `value` under `key`, evicting least recently used entries until
    /// both the entry-count and total-cost bounds leave room for it.
    ///
    /// A previous value for `key` is dropped first. Returns false when `cost`
    /// alone exceeds `max_total_cost`; such a value is not stored.
    pub fn put(&mut self, key: &str, value: Bytes, cost: u64) -> bool {
        self.detach(key);

        if cost > self.config.max_total_cost() {
            warn!(
                key,
                cost,
                max_total_cost = self.config.max_total_cost(),
                "Entry larger than the cache, not stored"
            );
            self.sync_occupancy();
            return false;
        }

        while self.entries.len() >= self.config.max_entry_count()
            || self.total_cost + cost > self.config.max_total_cost()
        {
            if !self.evict_lru() {
                break;
            }
        }

        let now = Instant::now();
        self.entries
            .insert(key.to_string(), CacheEntry::new(value, cost, now));
        self.lru.insert_front(key);
        self.expiry.push(key, now + self.config.max_age());
        self.total_cost += cost;
        self.sync_occupancy();
        true
    }

    // == Remove ==
    /// Removes an entry by key. Returns false if it was not cached.
    pub fn remove(&mut self, key: &str) -> bool {
        let removed = self.detach(key).is_some();
        if removed {
            self.expiry.compact_if_needed();
        }
        self.sync_occupancy();
        removed
    }

    // == Evict Expired ==
    /// Removes every entry whose scheduled expiry has passed.
    ///
    /// Returns the number of entries removed.
    pub fn evict_expired(&mut self) -> usize {
        let expired = self.expiry.pop_expired(Instant::now());
        let count = expired.len();

        for key in expired {
            if let Some(entry) = self.entries.remove(&key) {
                self.lru.remove(&key);
                self.total_cost -= entry.cost;
                self.stats.record_expiration();
            }
        }

        if count > 0 {
            debug!(count, "Evicted expired entries");
        }
        self.sync_occupancy();
        count
    }

    // == Reconfigure ==
    /// Switches to `config` and trims the cache to its bounds.
    ///
    /// Expired entries are dropped under the old schedule first. When the max
    /// age changes, every remaining entry is rescheduled at
    /// `inserted_at + max_age`, so the heap and [`get`](Self::get) agree on
    /// freshness. Returns the number of entries removed.
    pub fn reconfigure(&mut self, config: CacheConfig) -> usize {
        let mut removed = self.evict_expired();
        let ttl_changed = config.max_age() != self.config.max_age();
        self.config = config;

        if ttl_changed {
            self.expiry.clear();
            for (key, entry) in &self.entries {
                self.expiry.push(key, entry.inserted_at + config.max_age());
            }
            removed += self.evict_expired();
        }

        while self.entries.len() > config.max_entry_count()
            || self.total_cost > config.max_total_cost()
        {
            if !self.evict_lru() {
                break;
            }
            removed += 1;
        }

        self.sync_occupancy();
        info!(
            max_age_secs = config.max_age().as_secs_f64(),
            max_entry_count = config.max_entry_count(),
            max_total_cost = config.max_total_cost(),
            removed,
            "Cache reconfigured"
        );
        removed
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.clone()
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<String> {
        self.lru.keys()
    }

    pub fn total_cost(&self) -> u64 {
        self.total_cost
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // == Internal Helpers ==
    /// Drops `key` from storage and the LRU index and tombstones its expiry.
    fn detach(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(key);
        self.expiry.invalidate(key);
        self.total_cost -= entry.cost;
        Some(entry)
    }

    /// Evicts the least recently used entry. Returns false if the cache is empty.
    fn evict_lru(&mut self) -> bool {
        let Some(key) = self.lru.evict_tail() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&key) {
            self.expiry.invalidate(&key);
            self.total_cost -= entry.cost;
            self.stats.record_eviction();
            debug!(key = %key, "Evicted least recently used entry");
        }
        true
    }

    fn sync_occupancy(&mut self) {
        self.stats.set_occupancy(self.entries.len(), self.total_cost);
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(max_age_secs: u64, max_entries: usize, max_cost: u64) -> CacheConfig {
        CacheConfig::new(Duration::from_secs(max_age_secs), max_entries, max_cost).unwrap()
    }

    fn store(max_entries: usize) -> CacheStore {
        CacheStore::new(config(300, max_entries, 1_000_000))
    }

    fn put(store: &mut CacheStore, key: &str, value: &'static str) -> bool {
        store.put(key, Bytes::from_static(value.as_bytes()), value.len() as u64)
    }

    #[test]
    fn test_store_new() {
        let store = store(100);
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
        assert_eq!(store.total_cost(), 0);
    }

    #[test]
    fn test_store_put_and_get() {
        let mut store = store(100);

        assert!(put(&mut store, "key1", "value1"));
        assert_eq!(store.get("key1"), Some(Bytes::from_static(b"value1")));
        assert_eq!(store.len(), 1);
        assert_eq!(store.total_cost(), 6);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let mut store = store(100);
        assert_eq!(store.get("nonexistent"), None);
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn test_store_remove() {
        let mut store = store(100);

        put(&mut store, "key1", "value1");
        assert!(store.remove("key1"));

        assert!(store.is_empty());
        assert_eq!(store.total_cost(), 0);
        assert_eq!(store.get("key1"), None);
        assert!(!store.remove("key1"));
    }

    #[test]
    fn test_store_overwrite_replaces_cost() {
        let mut store = store(100);

        put(&mut store, "key1", "value1");
        put(&mut store, "key1", "v2");

        assert_eq!(store.get("key1"), Some(Bytes::from_static(b"v2")));
        assert_eq!(store.len(), 1);
        assert_eq!(store.total_cost(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_ttl_expiration() {
        let mut store = CacheStore::new(config(1, 100, 1000));

        put(&mut store, "k", "v");
        assert_eq!(store.get("k"), Some(Bytes::from_static(b"v")));

        tokio::time::advance(Duration::from_millis(1100)).await;

        assert_eq!(store.get("k"), None);
        assert!(store.is_empty());
        assert_eq!(store.stats().expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_evict_expired_removes_entries() {
        let mut store = CacheStore::new(config(1, 100, 1000));

        put(&mut store, "k", "v");
        put(&mut store, "other", "v");
        assert_eq!(store.evict_expired(), 0);

        tokio::time::advance(Duration::from_millis(1100)).await;

        assert_eq!(store.evict_expired(), 2);
        assert!(store.is_empty());
        assert_eq!(store.total_cost(), 0);
        assert!(store.keys().is_empty());
    }

    #[test]
    fn test_store_lru_eviction() {
        let mut store = store(3);

        put(&mut store, "key1", "value1");
        put(&mut store, "key2", "value2");
        put(&mut store, "key3", "value3");

        // Full; key4 evicts key1 (oldest)
        put(&mut store, "key4", "value4");

        assert_eq!(store.len(), 3);
        assert_eq!(store.get("key1"), None);
        assert!(store.get("key2").is_some());
        assert!(store.get("key3").is_some());
        assert!(store.get("key4").is_some());
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_store_lru_touch_on_get() {
        let mut store = store(2);

        put(&mut store, "a", "1");
        put(&mut store, "b", "2");
        store.get("a");
        put(&mut store, "c", "3");

        assert!(store.get("a").is_some());
        assert_eq!(store.get("b"), None);
        assert!(store.get("c").is_some());
    }

    #[test]
    fn test_store_cost_bound_evicts_until_fit() {
        let mut store = CacheStore::new(config(300, 100, 10));

        put(&mut store, "a", "aaaa");
        put(&mut store, "b", "bbbb");
        // 8 + 6 > 10: evict a, 4 + 6 fits
        put(&mut store, "c", "cccccc");

        assert_eq!(store.keys(), vec!["c", "b"]);
        assert_eq!(store.total_cost(), 10);
    }

    #[test]
    fn test_store_refuses_oversized_entry() {
        let mut store = CacheStore::new(config(300, 100, 4));

        put(&mut store, "small", "ab");
        assert!(!put(&mut store, "huge", "abcdefgh"));

        assert_eq!(store.keys(), vec!["small"]);
        assert_eq!(store.total_cost(), 2);
        assert_eq!(store.stats().evictions, 0);
    }

    #[test]
    fn test_store_oversized_overwrite_drops_previous_value() {
        let mut store = CacheStore::new(config(300, 100, 4));

        put(&mut store, "other", "ab");
        put(&mut store, "key", "cd");
        assert!(!put(&mut store, "key", "abcdefgh"));

        assert_eq!(store.get("key"), None);
        assert_eq!(store.keys(), vec!["other"]);
        assert_eq!(store.total_cost(), 2);
        assert_eq!(store.stats().entry_count, 1);
        assert_eq!(store.stats().evictions, 0);
        assert_eq!(store.expiry.len(), 1);
    }

    #[test]
    fn test_store_remove_compacts_expiry_heap() {
        let mut store = store(100);
        for i in 0..20 {
            store.put(&format!("k{}", i), Bytes::from_static(b"v"), 1);
        }

        // 2 tombstones out of 20 is exactly at the ratio threshold
        assert!(store.remove("k0"));
        assert!(store.remove("k1"));
        assert_eq!(store.expiry.invalid_count(), 2);

        assert!(store.remove("k2"));
        assert_eq!(store.expiry.invalid_count(), 0);
        assert_eq!(store.expiry.physical_len(), store.len());
        assert_eq!(store.len(), 17);
    }

    #[test]
    fn test_store_stats() {
        let mut store = store(100);

        put(&mut store, "key1", "value1");
        store.get("key1");
        store.get("nonexistent");

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.total_cost, 6);
    }

    #[test]
    fn test_peek_does_not_count_or_touch() {
        let mut store = store(2);

        put(&mut store, "a", "1");
        put(&mut store, "b", "2");
        assert!(store.peek("a").is_some());
        assert!(store.contains("a"));
        put(&mut store, "c", "3");

        // peek did not refresh "a"
        assert!(!store.contains("a"));
        assert_eq!(store.stats().hits, 0);
        assert_eq!(store.stats().misses, 0);
    }

    #[test]
    fn test_reconfigure_shrinks_to_most_recent() {
        let mut store = store(100);

        put(&mut store, "a", "1");
        put(&mut store, "b", "2");
        put(&mut store, "c", "3");
        store.get("a");

        let removed = store.reconfigure(config(300, 1, 1_000_000));

        assert_eq!(removed, 2);
        assert_eq!(store.keys(), vec!["a"]);
        assert_eq!(store.config().max_entry_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_shorter_ttl_reschedules() {
        let mut store = CacheStore::new(config(60, 100, 1000));

        put(&mut store, "old", "v");
        tokio::time::advance(Duration::from_secs(20)).await;
        put(&mut store, "new", "v");

        // old is 20s old, new is fresh: a 10s TTL expires only old
        let removed = store.reconfigure(config(10, 100, 1000));
        assert_eq!(removed, 1);
        assert_eq!(store.keys(), vec!["new"]);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.evict_expired(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_longer_ttl_keeps_entries() {
        let mut store = CacheStore::new(config(5, 100, 1000));

        put(&mut store, "k", "v");
        store.reconfigure(config(60, 100, 1000));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(store.evict_expired(), 0);
        assert!(store.get("k").is_some());
    }
}
