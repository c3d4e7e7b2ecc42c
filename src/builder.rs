//! Unified cache builder for all simulated eviction policies.
//!
//! [`CacheBuilder`] validates parameters once and yields a [`Cache`], a closed
//! tagged set over the policy implementations. The profiler clones a template
//! `Cache` per size bin with [`Cache::spawn_with_size`].
//!
//! ## Example
//!
//! ```rust
//! use cachesim::builder::{CacheBuilder, CachePolicy};
//! use cachesim::request::Request;
//! use cachesim::traits::{CacheSim, Lookup};
//!
//! let mut cache = CacheBuilder::new(100).build(CachePolicy::Lru).unwrap();
//! assert_eq!(cache.get(&Request::new(1u64, 10, 0)), Lookup::Miss);
//! assert_eq!(cache.get(&Request::new(1u64, 10, 1)), Lookup::Hit);
//! assert_eq!(cache.policy_name(), "lru");
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::metrics::CacheMetricsSnapshot;
use crate::policy::fifo::FifoCache;
use crate::policy::l2cache::{L2Cache, L2CacheParams, ModelBackend};
use crate::policy::lru::LruCache;
use crate::request::{ObjKey, Request};
use crate::traits::{CacheSim, CommonCacheParams};

/// Available eviction policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CachePolicy {
    /// First In, First Out eviction.
    Fifo,
    /// Least Recently Used eviction.
    Lru,
    /// Segmented learned eviction.
    L2Cache(L2CacheParams),
}

/// Simulated cache of any supported policy.
#[derive(Debug)]
pub struct Cache {
    inner: CacheInner,
}

#[derive(Debug)]
enum CacheInner {
    Fifo(FifoCache),
    Lru(LruCache),
    L2Cache(Box<L2Cache>),
}

macro_rules! dispatch {
    ($self:expr, $cache:ident => $body:expr) => {
        match $self {
            CacheInner::Fifo($cache) => $body,
            CacheInner::Lru($cache) => $body,
            CacheInner::L2Cache($cache) => $body,
        }
    };
}

impl Cache {
    /// Fresh, empty cache of the same policy and parameters at `cache_size`.
    pub fn spawn_with_size(&self, cache_size: u64) -> Result<Cache, ConfigError> {
        let inner = match &self.inner {
            CacheInner::Fifo(fifo) => {
                CacheInner::Fifo(FifoCache::try_new(fifo.params().with_size(cache_size))?)
            },
            CacheInner::Lru(lru) => {
                CacheInner::Lru(LruCache::try_new(lru.params().with_size(cache_size))?)
            },
            CacheInner::L2Cache(l2) => CacheInner::L2Cache(Box::new(l2.spawn_with_size(cache_size)?)),
        };
        Ok(Cache { inner })
    }

    pub fn policy_name(&self) -> &'static str {
        match &self.inner {
            CacheInner::Fifo(_) => "fifo",
            CacheInner::Lru(_) => "lru",
            CacheInner::L2Cache(_) => "l2cache",
        }
    }

    /// The segmented cache, when this is one.
    pub fn as_l2cache(&self) -> Option<&L2Cache> {
        match &self.inner {
            CacheInner::L2Cache(l2) => Some(l2),
            _ => None,
        }
    }
}

impl CacheSim for Cache {
    fn find(&mut self, req: &Request, update: bool) -> bool {
        dispatch!(&mut self.inner, c => c.find(req, update))
    }

    fn insert(&mut self, req: &Request) -> bool {
        dispatch!(&mut self.inner, c => c.insert(req))
    }

    fn evict(&mut self, req: &Request) -> u64 {
        dispatch!(&mut self.inner, c => c.evict(req))
    }

    fn remove(&mut self, key: &ObjKey) -> bool {
        dispatch!(&mut self.inner, c => c.remove(key))
    }

    fn contains(&self, key: &ObjKey) -> bool {
        dispatch!(&self.inner, c => c.contains(key))
    }

    fn len(&self) -> usize {
        dispatch!(&self.inner, c => c.len())
    }

    fn capacity(&self) -> u64 {
        dispatch!(&self.inner, c => c.capacity())
    }

    fn occupied_bytes(&self) -> u64 {
        dispatch!(&self.inner, c => c.occupied_bytes())
    }

    fn charged_size(&self, req: &Request) -> u64 {
        dispatch!(&self.inner, c => c.charged_size(req))
    }

    fn metrics(&self) -> CacheMetricsSnapshot {
        dispatch!(&self.inner, c => c.metrics())
    }

    fn metrics_mut(&mut self) -> &mut CacheMetricsSnapshot {
        dispatch!(&mut self.inner, c => c.metrics_mut())
    }
}

/// Builder for creating cache instances.
#[derive(Clone)]
pub struct CacheBuilder {
    common: CommonCacheParams,
    backend: Option<Arc<dyn ModelBackend>>,
}

impl CacheBuilder {
    /// Builder for a cache of `cache_size` bytes with default common params.
    pub fn new(cache_size: u64) -> Self {
        Self::with_params(CommonCacheParams::new(cache_size))
    }

    pub fn with_params(common: CommonCacheParams) -> Self {
        Self {
            common,
            backend: None,
        }
    }

    pub fn consider_obj_metadata(mut self, enabled: bool) -> Self {
        self.common.consider_obj_metadata = enabled;
        self
    }

    pub fn use_ttl(mut self, enabled: bool) -> Self {
        self.common.use_ttl = enabled;
        self
    }

    pub fn hashpower(mut self, hashpower: u8) -> Self {
        self.common.hashpower = hashpower;
        self
    }

    /// Model backend for [`ScoringPolicy::Learned`](crate::policy::l2cache::ScoringPolicy::Learned).
    pub fn model_backend(mut self, backend: Arc<dyn ModelBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Build a cache with the specified policy.
    ///
    /// ```rust
    /// use cachesim::builder::{CacheBuilder, CachePolicy};
    /// use cachesim::policy::l2cache::L2CacheParams;
    ///
    /// let lru = CacheBuilder::new(1 << 20).build(CachePolicy::Lru);
    /// assert!(lru.is_ok());
    ///
    /// // ttl is not supported by the segmented cache
    /// let l2 = CacheBuilder::new(1 << 20)
    ///     .use_ttl(true)
    ///     .build(CachePolicy::L2Cache(L2CacheParams::default()));
    /// assert!(l2.is_err());
    /// ```
    pub fn build(self, policy: CachePolicy) -> Result<Cache, ConfigError> {
        let inner = match policy {
            CachePolicy::Fifo => CacheInner::Fifo(FifoCache::try_new(self.common)?),
            CachePolicy::Lru => CacheInner::Lru(LruCache::try_new(self.common)?),
            CachePolicy::L2Cache(params) => {
                CacheInner::L2Cache(Box::new(L2Cache::try_new(self.common, params, self.backend)?))
            },
        };
        Ok(Cache { inner })
    }
}
