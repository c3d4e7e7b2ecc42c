//! Per-instance request counters.
//!
//! Every cache variant owns one [`CacheMetricsSnapshot`] and updates it from
//! [`CacheSim::get`](crate::traits::CacheSim::get). The profiler reads it back
//! after replay to build a [`ProfilerResult`](crate::profiler::ProfilerResult).

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetricsSnapshot {
    pub requests: u64,
    pub request_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub miss_bytes: u64,

    /// Misses for objects whose charged size exceeds the whole capacity.
    pub forced_misses: u64,
    /// Hits on objects whose ttl had elapsed; reported as misses.
    pub expired: u64,

    pub inserts: u64,
    pub evicted_objects: u64,
    pub evicted_bytes: u64,
    pub removals: u64,
}

impl CacheMetricsSnapshot {
    pub fn hit_ratio(&self) -> f64 {
        ratio(self.hits, self.requests)
    }

    pub fn miss_ratio(&self) -> f64 {
        ratio(self.misses, self.requests)
    }

    pub fn byte_miss_ratio(&self) -> f64 {
        ratio(self.miss_bytes, self.request_bytes)
    }

    pub(crate) fn record_request(&mut self, size: u64) {
        self.requests += 1;
        self.request_bytes += size;
    }

    pub(crate) fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub(crate) fn record_miss(&mut self, size: u64) {
        self.misses += 1;
        self.miss_bytes += size;
    }

    pub(crate) fn record_eviction(&mut self, bytes: u64) {
        self.evicted_objects += 1;
        self.evicted_bytes += bytes;
    }
}

pub(crate) fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratios_handle_empty_counters() {
        let m = CacheMetricsSnapshot::default();
        assert_eq!(m.hit_ratio(), 0.0);
        assert_eq!(m.miss_ratio(), 0.0);
        assert_eq!(m.byte_miss_ratio(), 0.0);
    }

    #[test]
    fn ratios_follow_counters() {
        let mut m = CacheMetricsSnapshot::default();
        for size in [10, 30] {
            m.record_request(size);
        }
        m.record_hit();
        m.record_miss(30);
        assert_eq!(m.hit_ratio(), 0.5);
        assert_eq!(m.miss_ratio(), 0.5);
        assert_eq!(m.byte_miss_ratio(), 0.75);
    }
}
