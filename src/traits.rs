//! # Cache Simulation Trait
//!
//! Every simulated eviction policy implements [`CacheSim`]. The trait splits a
//! request into the policy-specific primitives (`find`, `insert`, `evict`,
//! `remove`) and provides the shared request path in [`CacheSim::get`].
//!
//! ## Request Path
//!
//! ```text
//!   get(req)
//!     │
//!     ├─ find(req, update = true) ── hit ──► update recency / features ──► Hit
//!     │
//!     └─ miss
//!          ├─ charged size > capacity ──► forced miss (counted) ──► Miss
//!          └─ insert(req)
//!               └─ while occupied > capacity: evict(req)
//!                                                 └──► Miss
//! ```
//!
//! ## Variants
//!
//! | Policy    | Module                 | Unit of eviction        | ttl |
//! |-----------|------------------------|-------------------------|-----|
//! | LRU       | `policy::lru`          | least recently used obj | yes |
//! | FIFO      | `policy::fifo`         | oldest inserted obj     | yes |
//! | L2Cache   | `policy::l2cache`      | ranked segment(s)       | no  |
//!
//! ## Thread Safety
//!
//! Implementations are **not** internally synchronized. A cache instance must
//! be driven by exactly one thread at a time; instances are `Send` so a
//! profiler worker can own one, but sharing one instance between threads is
//! the caller's responsibility to prevent.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::metrics::CacheMetricsSnapshot;
use crate::request::{ObjKey, Request};

/// Bytes charged per object when `consider_obj_metadata` is set.
pub const OBJ_METADATA_SIZE: u64 = 48;

/// Largest accepted `hashpower`.
pub const MAX_HASHPOWER: u8 = 40;

// Index preallocation never goes beyond 2^20 entries regardless of the hint.
const MAX_PREALLOC_HASHPOWER: u8 = 20;

/// Outcome of a single [`CacheSim::get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Hit,
    Miss,
}

impl Lookup {
    pub fn is_hit(self) -> bool {
        self == Lookup::Hit
    }
}

/// Construction parameters shared by all policies.
///
/// | Field                   | Default | Description                               |
/// |-------------------------|---------|-------------------------------------------|
/// | `cache_size`            | -       | Capacity in bytes                         |
/// | `hashpower`             | 16      | log2 of the expected object count         |
/// | `consider_obj_metadata` | false   | Charge `OBJ_METADATA_SIZE` per object     |
/// | `use_ttl`               | false   | Expire objects whose ttl has elapsed      |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonCacheParams {
    pub cache_size: u64,
    pub hashpower: u8,
    pub consider_obj_metadata: bool,
    pub use_ttl: bool,
}

impl CommonCacheParams {
    pub fn new(cache_size: u64) -> Self {
        Self {
            cache_size,
            hashpower: 16,
            consider_obj_metadata: false,
            use_ttl: false,
        }
    }

    /// Same parameters at another capacity.
    pub fn with_size(&self, cache_size: u64) -> Self {
        Self {
            cache_size,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hashpower > MAX_HASHPOWER {
            return Err(ConfigError::new(format!(
                "hashpower must be <= {MAX_HASHPOWER}, got {}",
                self.hashpower
            )));
        }
        Ok(())
    }

    /// Bytes an object of `size` occupies in the simulated cache.
    #[inline]
    pub fn charged_size(&self, size: u64) -> u64 {
        if self.consider_obj_metadata {
            size + OBJ_METADATA_SIZE
        } else {
            size
        }
    }

    pub(crate) fn index_capacity(&self) -> usize {
        1usize << self.hashpower.min(MAX_PREALLOC_HASHPOWER)
    }
}

/// Core operations every simulated policy supports.
pub trait CacheSim {
    /// Looks `req.key` up. With `update` set, a hit refreshes the policy's
    /// recency or feature state. Returns `true` on hit.
    fn find(&mut self, req: &Request, update: bool) -> bool;

    /// Admits the object described by `req` without evicting anything.
    /// Returns `false` when the object cannot be admitted.
    fn insert(&mut self, req: &Request) -> bool;

    /// Evicts the policy's next victim(s). Returns the bytes freed; `0` means
    /// nothing was evictable.
    fn evict(&mut self, req: &Request) -> u64;

    /// Removes `key` if resident.
    fn remove(&mut self, key: &ObjKey) -> bool;

    fn contains(&self, key: &ObjKey) -> bool;

    /// Number of resident objects.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity in bytes.
    fn capacity(&self) -> u64;

    /// Bytes currently charged to resident objects.
    fn occupied_bytes(&self) -> u64;

    /// Bytes the object in `req` would occupy.
    fn charged_size(&self, req: &Request) -> u64;

    fn metrics(&self) -> CacheMetricsSnapshot;

    fn metrics_mut(&mut self) -> &mut CacheMetricsSnapshot;

    /// Serves one request: lookup, then insert and evict-to-fit on a miss.
    fn get(&mut self, req: &Request) -> Lookup {
        self.metrics_mut().record_request(req.size);

        if self.find(req, true) {
            self.metrics_mut().record_hit();
            return Lookup::Hit;
        }
        self.metrics_mut().record_miss(req.size);

        if self.charged_size(req) > self.capacity() {
            self.metrics_mut().forced_misses += 1;
            return Lookup::Miss;
        }

        if self.insert(req) {
            self.metrics_mut().inserts += 1;
        }
        while self.occupied_bytes() > self.capacity() {
            if self.evict(req) == 0 {
                break;
            }
        }
        Lookup::Miss
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charged_size_adds_metadata_when_enabled() {
        let mut params = CommonCacheParams::new(1024);
        assert_eq!(params.charged_size(100), 100);
        params.consider_obj_metadata = true;
        assert_eq!(params.charged_size(100), 100 + OBJ_METADATA_SIZE);
    }

    #[test]
    fn hashpower_is_validated_and_prealloc_capped() {
        let mut params = CommonCacheParams::new(1024);
        assert!(params.validate().is_ok());
        params.hashpower = 41;
        assert!(params.validate().is_err());
        params.hashpower = 32;
        assert!(params.validate().is_ok());
        assert_eq!(params.index_capacity(), 1 << 20);
    }

    #[test]
    fn with_size_keeps_other_fields() {
        let mut params = CommonCacheParams::new(1024);
        params.use_ttl = true;
        let resized = params.with_size(4096);
        assert_eq!(resized.cache_size, 4096);
        assert!(resized.use_ttl);
    }
}
