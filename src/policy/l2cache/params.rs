//! Construction parameters for [`L2Cache`](super::L2Cache).
//!
//! Retention limits: `retain_per_seg` must stay below `segment_size`, and
//! `retain_per_seg * merge_factor` must fit in one segment, because the
//! survivors of all victims share a single merged segment. An eviction
//! therefore always keeps `min(retain_per_seg, active objects)` of each
//! victim and never a whole full segment.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::traits::CommonCacheParams;

/// Hard ceiling on the number of eviction buckets.
pub const MAX_N_BUCKET: usize = 120;

/// How the victim segment is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoringPolicy {
    /// Sweep buckets and segments in order.
    RoundRobin,
    /// Rank segments by the summed score of their active objects.
    Heuristic,
    /// Rank segments by a trained model's predicted utility; heuristic
    /// until the first successful fit.
    Learned,
}

/// Per-object score used for retention and heuristic segment utility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjScoreType {
    Freq,
    FreqByte,
    FreqAge,
    HitDensity,
}

/// How admitted objects are partitioned into buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BucketType {
    NoBucket,
    /// log2 size classes relative to `size_bucket_base`.
    Size,
    /// log2 ttl classes; objects without ttl land in bucket 0.
    Ttl,
}

impl BucketType {
    /// Bucket index for an object of `size` bytes and optional `ttl`.
    ///
    /// ```
    /// use cachesim::policy::l2cache::BucketType;
    ///
    /// assert_eq!(BucketType::Size.bucket_index(100, None, 100, 120), 0);
    /// assert_eq!(BucketType::Size.bucket_index(101, None, 100, 120), 1);
    /// assert_eq!(BucketType::Size.bucket_index(300, None, 100, 120), 2);
    /// assert_eq!(BucketType::Size.bucket_index(401, None, 100, 120), 3);
    /// assert_eq!(BucketType::Ttl.bucket_index(1, Some(3600), 1, 120), 12);
    /// ```
    pub fn bucket_index(self, size: u64, ttl: Option<u32>, size_base: u64, max_buckets: usize) -> usize {
        let max_idx = max_buckets.saturating_sub(1);
        let idx = match self {
            BucketType::NoBucket => 0,
            BucketType::Size => {
                let base = size_base.max(1);
                if size <= base {
                    0
                } else {
                    let classes = size.div_ceil(base) - 1;
                    classes.ilog2() as usize + 1
                }
            },
            BucketType::Ttl => match ttl {
                Some(ttl) if ttl > 0 => ttl.ilog2() as usize + 1,
                _ => 0,
            },
        };
        idx.min(max_idx)
    }
}

/// Where training rows for the learned scorer come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainingSource {
    /// Divert every `sample_every_n_seg`-th evicted segment to the training
    /// bucket once `start_after_evicted_bytes` bytes were evicted since the
    /// last fit. Fits when the training buffer is full.
    Eviction {
        sample_every_n_seg: u32,
        start_after_evicted_bytes: u64,
    },
    /// Snapshot resident closed segments every `snapshot_interval` seconds.
    /// Fits every `retrain_interval` seconds.
    Cache {
        snapshot_interval: u64,
        retrain_interval: u64,
    },
}

/// L2Cache tuning knobs.
///
/// | Field               | Default      | Description                                  |
/// |---------------------|--------------|----------------------------------------------|
/// | `segment_size`      | 100          | Objects per segment                          |
/// | `merge_factor`      | 2            | Segments consumed per eviction               |
/// | `retain_per_seg`    | 10           | Objects kept from each victim segment        |
/// | `rank_interval`     | 20           | Evictions between re-rankings                |
/// | `hit_prob_interval` | 10_000       | Requests between hit-density recomputation   |
/// | `bucket_type`       | `NoBucket`   | Object partitioning                          |
/// | `size_bucket_base`  | 1            | Base of the size classes                     |
/// | `max_buckets`       | 120          | Bucket count, capped at [`MAX_N_BUCKET`]     |
/// | `obj_score`         | `FreqByte`   | Per-object score                             |
/// | `scoring`           | `Heuristic`  | Segment selection                            |
/// | `training`          | `Eviction`   | Training row source                          |
/// | `train_buffer_rows` | 2048         | Training rows collected before a fit         |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct L2CacheParams {
    pub segment_size: usize,
    pub merge_factor: usize,
    /// Survivors per victim segment. Must be `< segment_size` and
    /// `retain_per_seg * merge_factor <= segment_size`.
    pub retain_per_seg: usize,
    pub rank_interval: u64,
    pub hit_prob_interval: u64,
    pub bucket_type: BucketType,
    pub size_bucket_base: u64,
    pub max_buckets: usize,
    pub obj_score: ObjScoreType,
    pub scoring: ScoringPolicy,
    pub training: TrainingSource,
    pub train_buffer_rows: usize,
}

impl Default for L2CacheParams {
    fn default() -> Self {
        Self {
            segment_size: 100,
            merge_factor: 2,
            retain_per_seg: 10,
            rank_interval: 20,
            hit_prob_interval: 10_000,
            bucket_type: BucketType::NoBucket,
            size_bucket_base: 1,
            max_buckets: MAX_N_BUCKET,
            obj_score: ObjScoreType::FreqByte,
            scoring: ScoringPolicy::Heuristic,
            training: TrainingSource::Eviction {
                sample_every_n_seg: 5,
                start_after_evicted_bytes: 0,
            },
            train_buffer_rows: 2048,
        }
    }
}

impl L2CacheParams {
    /// Buckets an instance allocates: one without bucketing, `max_buckets`
    /// otherwise.
    pub fn n_buckets(&self) -> usize {
        match self.bucket_type {
            BucketType::NoBucket => 1,
            BucketType::Size | BucketType::Ttl => self.max_buckets,
        }
    }

    pub fn validate(&self, common: &CommonCacheParams) -> Result<(), ConfigError> {
        common.validate()?;
        if common.use_ttl {
            return Err(ConfigError::new("L2Cache does not support use_ttl"));
        }
        if self.segment_size == 0 {
            return Err(ConfigError::new("segment_size must be > 0"));
        }
        if self.merge_factor == 0 {
            return Err(ConfigError::new("merge_factor must be > 0"));
        }
        if self.retain_per_seg >= self.segment_size {
            return Err(ConfigError::new(format!(
                "retain_per_seg ({}) must be < segment_size ({})",
                self.retain_per_seg, self.segment_size
            )));
        }
        if self.retain_per_seg.saturating_mul(self.merge_factor) > self.segment_size {
            return Err(ConfigError::new(format!(
                "retain_per_seg * merge_factor ({} * {}) must be <= segment_size ({})",
                self.retain_per_seg, self.merge_factor, self.segment_size
            )));
        }
        if self.rank_interval == 0 {
            return Err(ConfigError::new("rank_interval must be > 0"));
        }
        if self.hit_prob_interval == 0 {
            return Err(ConfigError::new("hit_prob_interval must be > 0"));
        }
        if self.max_buckets == 0 || self.max_buckets > MAX_N_BUCKET {
            return Err(ConfigError::new(format!(
                "max_buckets must be in 1..={MAX_N_BUCKET}, got {}",
                self.max_buckets
            )));
        }
        if self.bucket_type == BucketType::Size && self.size_bucket_base == 0 {
            return Err(ConfigError::new("size_bucket_base must be > 0"));
        }
        if self.train_buffer_rows == 0 {
            return Err(ConfigError::new("train_buffer_rows must be > 0"));
        }
        match self.training {
            TrainingSource::Eviction {
                sample_every_n_seg, ..
            } if sample_every_n_seg == 0 => {
                Err(ConfigError::new("sample_every_n_seg must be > 0"))
            },
            TrainingSource::Cache {
                snapshot_interval,
                retrain_interval,
            } if snapshot_interval == 0 || retrain_interval == 0 => Err(ConfigError::new(
                "snapshot_interval and retrain_interval must be > 0",
            )),
            _ => Ok(()),
        }
    }
}
