//! First-in, first-out simulated cache.
//!
//! Same layout as [`LruCache`](crate::policy::lru::LruCache) but hits leave
//! the queue untouched, so victims leave in admission order.

use crate::error::ConfigError;
use crate::metrics::CacheMetricsSnapshot;
use crate::policy::keyed_queue::KeyedQueue;
use crate::request::{ObjKey, Request};
use crate::traits::{CacheSim, CommonCacheParams};

#[derive(Debug, Clone)]
pub struct FifoCache {
    params: CommonCacheParams,
    queue: KeyedQueue,
    metrics: CacheMetricsSnapshot,
}

impl FifoCache {
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

    /// Key of the oldest resident object.
    pub fn peek_oldest(&self) -> Option<&ObjKey> {
        self.queue.back_key()
    }
}

impl CacheSim for FifoCache {
    fn find(&mut self, req: &Request, _update: bool) -> bool {
        if !self.queue.contains(&req.key) {
            return false;
        }
        if self.params.use_ttl && self.queue.remove_expired(&req.key, req.timestamp) {
            self.metrics.expired += 1;
            return false;
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

    #[test]
    fn hits_do_not_protect_from_eviction() {
        let mut cache = FifoCache::try_new(CommonCacheParams::new(2)).unwrap();
        cache.get(&Request::new(1u64, 1, 0));
        cache.get(&Request::new(2u64, 1, 1));
        assert!(cache.get(&Request::new(1u64, 1, 2)).is_hit());
        cache.get(&Request::new(3u64, 1, 3));

        assert!(!cache.contains(&1u64.into()));
        assert!(cache.contains(&2u64.into()));
        assert_eq!(cache.peek_oldest(), Some(&ObjKey::Num(2)));
        assert!(cache.queue.is_consistent());
    }

    #[test]
    fn expired_object_leaves_the_queue() {
        let mut params = CommonCacheParams::new(100);
        params.use_ttl = true;
        let mut cache = FifoCache::try_new(params).unwrap();
        cache.get(&Request::new(1u64, 10, 0).with_ttl(5));
        cache.get(&Request::new(2u64, 10, 1));

        assert!(!cache.get(&Request::new(1u64, 10, 6)).is_hit());
        assert_eq!(cache.metrics().expired, 1);
        // re-admitted behind key 2
        assert_eq!(cache.peek_oldest(), Some(&ObjKey::Num(2)));
        assert_eq!(cache.occupied_bytes(), 20);
        assert!(cache.queue.is_consistent());
    }

    #[test]
    fn evict_on_empty_frees_nothing() {
        let mut cache = FifoCache::try_new(CommonCacheParams::new(2)).unwrap();
        assert_eq!(cache.evict(&Request::new(1u64, 1, 0)), 0);
    }
}
