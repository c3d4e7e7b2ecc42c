//! # Least Recently Used (LRU) Simulated Cache
//!
//! Byte-capacity LRU used as the classic baseline policy.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────────┐
//!   │                     LruCache { queue: KeyedQueue }               │
//!   │                                                                  │
//!   │   FxHashMap<ObjKey, SlotId>          IntrusiveList<Entry>        │
//!   │   ┌─────────┬────────┐                                           │
//!   │   │ key_a   │ id_1 ──┼──► head ─► [id_1] ◄─► [id_2] ◄─► [id_3]   │
//!   │   │ key_b   │ id_2 ──┼──►          MRU                  LRU      │
//!   │   │ key_c   │ id_3 ──┼──►                               ▲        │
//!   │   └─────────┴────────┘                                  │        │
//!   │                                                     evict here   │
//!   │   occupied: sum of charged sizes                                 │
//!   └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Operations
//!
//! | Method           | Complexity | Description                               |
//! |------------------|------------|-------------------------------------------|
//! | `find(req, upd)` | O(1)       | Lookup, move to MRU when `upd`            |
//! | `insert(req)`    | O(1)       | Push at MRU                               |
//! | `evict(req)`     | O(1)       | Pop LRU                                   |
//! | `remove(&key)`   | O(1)       | Unlink by key                             |
//! | `recency_rank`   | O(n)       | Position in recency order (0 = MRU)       |
//!
//! With `use_ttl`, an object whose ttl has elapsed at lookup time is dropped
//! and the lookup reports a miss.
//!
//! ## Example Usage
//!
//! ```
//! use cachesim::policy::lru::LruCache;
//! use cachesim::request::Request;
//! use cachesim::traits::{CacheSim, CommonCacheParams, Lookup};
//!
//! let mut cache = LruCache::try_new(CommonCacheParams::new(100)).unwrap();
//! assert_eq!(cache.get(&Request::new(1u64, 60, 0)), Lookup::Miss);
//! assert_eq!(cache.get(&Request::new(1u64, 60, 1)), Lookup::Hit);
//! // 60 + 60 > 100: key 1 is evicted to make room
//! assert_eq!(cache.get(&Request::new(2u64, 60, 2)), Lookup::Miss);
//! assert!(!cache.contains(&1u64.into()));
//! ```

use crate::error::ConfigError;
use crate::metrics::CacheMetricsSnapshot;
use crate::policy::keyed_queue::KeyedQueue;
use crate::request::{ObjKey, Request};
use crate::traits::{CacheSim, CommonCacheParams};

#[derive(Debug, Clone)]
pub struct LruCache {
    params: CommonCacheParams,
    queue: KeyedQueue,
    metrics: CacheMetricsSnapshot,
}

impl LruCache {
    pub fn try_new(params: CommonCacheParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self {
            queue: KeyedQueue::new(&params),
            metrics: CacheMetricsSnapshot::default(),
            params,
        })
    }

    pub fn params(&self) -> &CommonCacheParams {
        &self.params
    }

    /// Key of the next victim.
    pub fn peek_lru(&self) -> Option<&ObjKey> {
        self.queue.back_key()
    }

    /// Position in recency order, 0 being most recently used.
    pub fn recency_rank(&self, key: &ObjKey) -> Option<usize> {
        self.queue.position(key)
    }
}

impl CacheSim for LruCache {
    fn find(&mut self, req: &Request, update: bool) -> bool {
        if !self.queue.contains(&req.key) {
            return false;
        }
        if self.params.use_ttl && self.queue.remove_expired(&req.key, req.timestamp) {
            self.metrics.expired += 1;
            return false;
        }
        if update {
            self.queue.promote(&req.key);
        }
        true
    }

    fn insert(&mut self, req: &Request) -> bool {
        self.queue.admit(req, &self.params);
        true
    }

    fn evict(&mut self, _req: &Request) -> u64 {
        match self.queue.pop_back() {
            Some(charged) => {
                self.metrics.record_eviction(charged);
                charged
            },
            None => 0,
        }
    }

    fn remove(&mut self, key: &ObjKey) -> bool {
        if self.queue.remove(key).is_none() {
            return false;
        }
        self.metrics.removals += 1;
        true
    }

    fn contains(&self, key: &ObjKey) -> bool {
        self.queue.contains(key)
    }

    fn len(&self) -> usize {
        self.queue.len()
    }

    fn capacity(&self) -> u64 {
        self.params.cache_size
    }

    fn occupied_bytes(&self) -> u64 {
        self.queue.occupied()
    }

    fn charged_size(&self, req: &Request) -> u64 {
        self.params.charged_size(req.size)
    }

    fn metrics(&self) -> CacheMetricsSnapshot {
        self.metrics
    }

    fn metrics_mut(&mut self) -> &mut CacheMetricsSnapshot {
        &mut self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Lookup;

    fn unit(key: u64, ts: u64) -> Request {
        Request::new(key, 1, ts)
    }

    fn lru(size: u64) -> LruCache {
        LruCache::try_new(CommonCacheParams::new(size)).unwrap()
    }

    #[test]
    fn hit_right_after_insert() {
        let mut cache = lru(10);
        assert_eq!(cache.get(&unit(7, 0)), Lookup::Miss);
        assert_eq!(cache.get(&unit(7, 1)), Lookup::Hit);
        assert_eq!(cache.metrics().hits, 1);
        assert_eq!(cache.metrics().misses, 1);
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = lru(3);
        for key in 1..=3 {
            cache.get(&unit(key, key));
        }
        // touch 1 so 2 becomes the LRU
        assert!(cache.get(&unit(1, 4)).is_hit());
        cache.get(&unit(4, 5));

        assert!(cache.contains(&1u64.into()));
        assert!(!cache.contains(&2u64.into()));
        assert_eq!(cache.peek_lru(), Some(&ObjKey::Num(3)));
        assert_eq!(cache.recency_rank(&4u64.into()), Some(0));
        assert_eq!(cache.metrics().evicted_objects, 1);
        assert!(cache.queue.is_consistent());
    }

    #[test]
    fn key_misses_after_capacity_distinct_insertions() {
        let mut cache = lru(16);
        cache.get(&unit(0, 0));
        for key in 1..=16 {
            cache.get(&unit(key, key));
        }
        assert_eq!(cache.get(&unit(0, 100)), Lookup::Miss);
    }

    #[test]
    fn oversized_object_is_forced_miss() {
        let mut cache = lru(100);
        let big = Request::new("big", 101, 0);
        assert_eq!(cache.get(&big), Lookup::Miss);
        assert_eq!(cache.get(&big), Lookup::Miss);
        assert_eq!(cache.metrics().forced_misses, 2);
        assert!(cache.is_empty());
        assert_eq!(cache.occupied_bytes(), 0);
    }

    #[test]
    fn occupancy_never_exceeds_capacity_with_variable_sizes() {
        let mut cache = lru(1_000);
        for i in 0..500u64 {
            let size = 1 + (i * 37) % 300;
            cache.get(&Request::new(i % 50, size, i));
            assert!(cache.occupied_bytes() <= cache.capacity());
        }
    }

    #[test]
    fn metadata_overhead_counts_toward_capacity() {
        let mut params = CommonCacheParams::new(200);
        params.consider_obj_metadata = true;
        let mut cache = LruCache::try_new(params).unwrap();
        cache.get(&Request::new(1u64, 100, 0));
        assert_eq!(cache.occupied_bytes(), 100 + crate::traits::OBJ_METADATA_SIZE);
        cache.get(&Request::new(2u64, 100, 1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn ttl_expiry_turns_hit_into_miss() {
        let mut params = CommonCacheParams::new(100);
        params.use_ttl = true;
        let mut cache = LruCache::try_new(params).unwrap();

        cache.get(&Request::new(1u64, 10, 0).with_ttl(5));
        assert!(cache.get(&Request::new(1u64, 10, 4)).is_hit());
        assert_eq!(cache.get(&Request::new(1u64, 10, 5)), Lookup::Miss);
        assert_eq!(cache.metrics().expired, 1);
        // re-admitted without ttl on the second request
        assert!(cache.get(&Request::new(1u64, 10, 1_000)).is_hit());
    }

    #[test]
    fn remove_unlinks_object() {
        let mut cache = lru(10);
        cache.get(&unit(1, 0));
        assert!(cache.remove(&1u64.into()));
        assert!(!cache.remove(&1u64.into()));
        assert_eq!(cache.occupied_bytes(), 0);
        assert_eq!(cache.metrics().removals, 1);
    }
}
