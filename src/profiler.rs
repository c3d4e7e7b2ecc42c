//! # Miss Ratio Curve Profiler
//!
//! Replays one request stream against a sweep of cache sizes in parallel.
//!
//! ```text
//!   template (capacity C) ──spawn_with_size──► bin 1 .. bin n   (n = C / bin_size)
//!
//!   worker 0: replay cursor ──► bins 1, 1+W, 1+2W, ...
//!   worker 1: replay cursor ──► bins 2, 2+W, ...
//!     ...                        (each request fed to every cache it owns)
//!
//!   scope join ──► results[bin] aligned by bin index; results[0] = baseline
//! ```
//!
//! Workers share nothing but the (read-only) source storage; each owns its
//! replay cursor and its caches, so no locking happens during replay.
//!
//! ## Example Usage
//!
//! ```
//! use cachesim::builder::{CacheBuilder, CachePolicy};
//! use cachesim::profiler::{get_miss_ratio_curve, ProfilerParams};
//! use cachesim::request::TraceBuffer;
//!
//! let trace = TraceBuffer::from_keys([1u64, 2, 1, 3, 1, 2, 4, 1]);
//! let template = CacheBuilder::new(4).build(CachePolicy::Lru).unwrap();
//! let params = ProfilerParams { n_workers: 2, bin_size: 1, max_requests: None };
//!
//! let curve = get_miss_ratio_curve(&trace, &template, &params).unwrap();
//! assert_eq!(curve.len(), 5);
//! assert_eq!(curve[0].req_cnt, 0);
//! assert_eq!(curve[4].miss_cnt, 4); // only cold misses
//! ```

use std::thread;

use serde::{Deserialize, Serialize};

use crate::builder::Cache;
use crate::error::{ConfigError, ProfilerError};
use crate::metrics::ratio;
use crate::request::RequestSource;
use crate::traits::CacheSim;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilerParams {
    pub n_workers: usize,
    /// Capacity step between consecutive bins, in bytes.
    pub bin_size: u64,
    /// Stop each replay after this many requests.
    pub max_requests: Option<u64>,
}

impl ProfilerParams {
    /// One worker per available core.
    pub fn new(bin_size: u64) -> Self {
        Self {
            n_workers: thread::available_parallelism().map_or(1, |n| n.get()),
            bin_size,
            max_requests: None,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.n_workers == 0 {
            return Err(ConfigError::new("n_workers must be > 0"));
        }
        if self.bin_size == 0 {
            return Err(ConfigError::new("bin_size must be > 0"));
        }
        Ok(())
    }
}

/// Counters of one simulated cache size.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilerResult {
    pub req_cnt: u64,
    pub req_byte: u64,
    pub miss_cnt: u64,
    pub miss_byte: u64,
    pub cache_size: u64,
}

impl ProfilerResult {
    pub fn obj_miss_ratio(&self) -> f64 {
        ratio(self.miss_cnt, self.req_cnt)
    }

    pub fn byte_miss_ratio(&self) -> f64 {
        ratio(self.miss_byte, self.req_byte)
    }

    fn from_cache(cache: &Cache) -> Self {
        let m = cache.metrics();
        Self {
            req_cnt: m.requests,
            req_byte: m.request_bytes,
            miss_cnt: m.misses,
            miss_byte: m.miss_bytes,
            cache_size: cache.capacity(),
        }
    }
}

/// Simulates every capacity `0, bin_size, 2 * bin_size, ...` up to the
/// template's capacity and returns one result per bin.
///
/// # Errors
///
/// - [`ProfilerError::Config`] for zero workers, zero `bin_size`, or a
///   template that cannot be rebuilt at some bin size.
/// - [`ProfilerError::UnsupportedSource`] when `source` cannot replay.
pub fn get_miss_ratio_curve(
    source: &dyn RequestSource,
    template: &Cache,
    params: &ProfilerParams,
) -> Result<Vec<ProfilerResult>, ProfilerError> {
    params.validate()?;

    let n_bins = usize::try_from(template.capacity() / params.bin_size)
        .map_err(|_| ConfigError::new("too many bins for this platform"))?;
    let n_workers = params.n_workers.min(n_bins).max(1);

    let mut assignments: Vec<Vec<(usize, Cache)>> = (0..n_workers).map(|_| Vec::new()).collect();
    for bin in 1..=n_bins {
        let cache = template.spawn_with_size(bin as u64 * params.bin_size)?;
        assignments[(bin - 1) % n_workers].push((bin, cache));
    }

    let mut cursors = Vec::with_capacity(n_workers);
    for _ in 0..n_workers {
        let cursor = source.replay().ok_or_else(|| {
            ProfilerError::UnsupportedSource("source does not support replay".to_string())
        })?;
        cursors.push(cursor);
    }

    tracing::info!(
        bins = n_bins,
        workers = n_workers,
        bin_size = params.bin_size,
        policy = template.policy_name(),
        "miss ratio curve started"
    );

    let mut results = vec![ProfilerResult::default(); n_bins + 1];
    let max_requests = params.max_requests;
    let finished: Vec<Vec<(usize, ProfilerResult)>> = thread::scope(|scope| {
        let handles: Vec<_> = assignments
            .into_iter()
            .zip(cursors)
            .enumerate()
            .map(|(worker, (caches, cursor))| {
                scope.spawn(move || run_worker(worker, caches, cursor, max_requests))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(rows) => rows,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });

    for (bin, result) in finished.into_iter().flatten() {
        results[bin] = result;
    }
    Ok(results)
}

fn run_worker(
    worker: usize,
    mut caches: Vec<(usize, Cache)>,
    mut cursor: Box<dyn RequestSource + Send>,
    max_requests: Option<u64>,
) -> Vec<(usize, ProfilerResult)> {
    if caches.is_empty() {
        return Vec::new();
    }
    tracing::info!(worker, bins = caches.len(), "profiler worker started");
    let limit = max_requests.unwrap_or(u64::MAX);
    let mut processed = 0u64;
    while processed < limit {
        let Some(req) = cursor.next_request() else {
            break;
        };
        for (_, cache) in &mut caches {
            cache.get(&req);
        }
        processed += 1;
    }
    tracing::info!(worker, requests = processed, "profiler worker finished");

    caches
        .iter()
        .map(|(bin, cache)| (*bin, ProfilerResult::from_cache(cache)))
        .collect()
}
