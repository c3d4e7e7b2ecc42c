//! # L2Cache: Segmented, Learned Eviction
//!
//! Objects are appended to fixed-size segments; eviction works on whole
//! segments. A selector picks the least useful segment (round-robin,
//! heuristic utility, or a trained model's prediction), merges it with up to
//! `merge_factor - 1` closed siblings, keeps the best `retain_per_seg`
//! objects of each victim in one new segment, and frees the rest.
//!
//! ## Architecture
//!
//! ```text
//!   ┌───────────────────────────────────────────────────────────────────────┐
//!   │                               L2Cache                                 │
//!   │                                                                       │
//!   │  index: FxHashMap<ObjKey, ObjId> ──► objects: SlotArena<CachedObject> │
//!   │                                            │ seg, slot                │
//!   │                                            ▼                          │
//!   │  buckets[0..n_buckets]              segments: SlotArena<Segment>      │
//!   │  ┌──────────┐                                                         │
//!   │  │ bucket 0 │ head ─► [closed] ◄─► [closed] ◄─► [open] ◄─ tail        │
//!   │  │ bucket 1 │ head ─► [closed] ◄─► [open]                             │
//!   │  │   ...    │                                                         │
//!   │  └──────────┘                                                         │
//!   │  training_bucket: evicted segments still collecting labels            │
//!   │  ghosts: FxHashMap<ObjKey, SegId>  (keys of training segments)        │
//!   │                                                                       │
//!   │  selector: ranked Vec<SegId> │ round-robin cursor                     │
//!   │  learner:  row buffers, ModelBackend, Box<dyn ScoringModel>           │
//!   └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Eviction
//!
//! ```text
//!   victims = [s, s.next, ...]  (≤ merge_factor, closed, same bucket)
//!
//!   s:      [a b c d e]        top retain_per_seg by ObjScoreType
//!   s.next: [f g h i j]   ──►  merged: [b e g] (n_merge = max + 1)
//!                               linked where s was; the rest is freed
//! ```
//!
//! Construction requires `retain_per_seg < segment_size` and
//! `retain_per_seg * merge_factor <= segment_size`, so a full victim always
//! keeps exactly `retain_per_seg` objects and the merged segment fits.
//!
//! Without bucketing the cache holds a single bucket; otherwise it holds
//! `max_buckets`. Hit-probability tables exist only for the `HitDensity`
//! object score and are built when a bucket first records into one.
//!
//! Hits never move objects. They update object frequency, segment hit
//! counters and windows, the bucket hit-probability table, and the training
//! label of the segment if it is being tracked.
//!
//! ## Example Usage
//!
//! ```
//! use cachesim::policy::l2cache::{L2Cache, L2CacheParams, ScoringPolicy};
//! use cachesim::request::Request;
//! use cachesim::traits::{CacheSim, CommonCacheParams};
//!
//! let params = L2CacheParams {
//!     segment_size: 10,
//!     merge_factor: 2,
//!     retain_per_seg: 2,
//!     scoring: ScoringPolicy::Heuristic,
//!     ..L2CacheParams::default()
//! };
//! let mut cache = L2Cache::try_new(CommonCacheParams::new(100), params, None).unwrap();
//! for i in 0..1_000u64 {
//!     cache.get(&Request::new(i % 150, 1, i / 10));
//! }
//! assert!(cache.occupied_bytes() <= 100);
//! cache.check_invariants().unwrap();
//! ```
//!
//! ## Thread Safety
//!
//! Not synchronized. The model backend is shared (`Arc`) between caches
//! spawned from one template; the trained model is owned per cache.

mod bucket;
pub mod feature;
pub mod hit_prob;
mod learner;
pub mod model;
pub mod params;
mod segment;
mod select;

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::ds::SlotArena;
use crate::error::{ConfigError, InvariantError};
use crate::metrics::CacheMetricsSnapshot;
use crate::request::{ObjKey, Request};
use crate::traits::{CacheSim, CommonCacheParams};

use bucket::Bucket;
use feature::{push_segment_features, CacheState};
use learner::Learner;
use segment::{CachedObject, ObjId, SegId, Segment};
use select::Selector;

pub use feature::{N_FEATURES, N_FEATURE_TIME_WINDOW};
pub use hit_prob::{HitProbTable, HIT_PROB_MAX_AGE, HIT_PROB_RESCALE_THRESHOLD};
pub use learner::LearnerStats;
pub use model::{FeatureMatrix, ModelBackend, RidgeRegression, ScoringModel, TrainingSet};
pub use params::{BucketType, L2CacheParams, ObjScoreType, ScoringPolicy, TrainingSource, MAX_N_BUCKET};

#[derive(Debug, Clone, Copy, Default)]
struct Clock {
    rtime: u64,
    vtime: u64,
    started: bool,
}

/// Segmented cache with merge-and-retain eviction and optional learned
/// segment ranking. Build with [`L2Cache::try_new`] or through
/// [`CacheBuilder`](crate::builder::CacheBuilder).
pub struct L2Cache {
    common: CommonCacheParams,
    params: L2CacheParams,
    backend: Option<Arc<dyn ModelBackend>>,

    objects: SlotArena<CachedObject>,
    index: FxHashMap<ObjKey, ObjId>,
    segments: SlotArena<Segment>,
    buckets: Vec<Bucket>,
    training_bucket: Bucket,
    ghosts: FxHashMap<ObjKey, SegId>,

    selector: Selector,
    learner: Option<Learner>,
    state: CacheState,
    clock: Clock,
    last_hit_prob_vtime: u64,

    occupied: u64,
    n_evictions: u64,
    metrics: CacheMetricsSnapshot,
}

impl fmt::Debug for L2Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("L2Cache")
            .field("common", &self.common)
            .field("params", &self.params)
            .field("objects", &self.index.len())
            .field("segments", &self.segments.len())
            .field("occupied", &self.occupied)
            .field("learner", &self.learner)
            .finish_non_exhaustive()
    }
}

impl L2Cache {
    /// Builds an empty cache. `backend` is only used by
    /// [`ScoringPolicy::Learned`]; without one that policy scores with the
    /// heuristic.
    pub fn try_new(
        common: CommonCacheParams,
        params: L2CacheParams,
        backend: Option<Arc<dyn ModelBackend>>,
    ) -> Result<Self, ConfigError> {
        params.validate(&common)?;

        let learner = match (params.scoring, &backend) {
            (ScoringPolicy::Learned, Some(backend)) => Some(Learner::new(
                params.training,
                Arc::clone(backend),
                params.train_buffer_rows,
            )),
            (ScoringPolicy::Learned, None) => {
                tracing::debug!("learned scoring without a model backend, using heuristic");
                None
            },
            _ => None,
        };

        let track_cold_misses = learner.is_some();
        let capacity = common.index_capacity();
        Ok(Self {
            objects: SlotArena::with_capacity(capacity),
            index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            segments: SlotArena::new(),
            buckets: (0..params.n_buckets()).map(|_| Bucket::new()).collect(),
            training_bucket: Bucket::new(),
            ghosts: FxHashMap::default(),
            selector: Selector::default(),
            learner,
            // cold-miss tracking only feeds the learner's features
            state: CacheState::new(track_cold_misses),
            clock: Clock::default(),
            last_hit_prob_vtime: 0,
            occupied: 0,
            n_evictions: 0,
            metrics: CacheMetricsSnapshot::default(),
            common,
            params,
            backend,
        })
    }

    /// Fresh, empty cache with the same parameters at another capacity.
    pub fn spawn_with_size(&self, cache_size: u64) -> Result<Self, ConfigError> {
        Self::try_new(
            self.common.with_size(cache_size),
            self.params.clone(),
            self.backend.clone(),
        )
    }

    /// Segment and scoring parameters this cache was built with.
    pub fn params(&self) -> &L2CacheParams {
        &self.params
    }

    /// Capacity and object-accounting parameters.
    pub fn common_params(&self) -> &CommonCacheParams {
        &self.common
    }

    /// Segments in eviction buckets (open ones included).
    pub fn n_segments(&self) -> usize {
        self.buckets.iter().map(|b| b.n_segs).sum()
    }

    /// Evicted segments held back as training data.
    pub fn n_training_segments(&self) -> usize {
        self.training_bucket.n_segs
    }

    /// Keys of diverted training segments still collecting labels.
    pub fn n_ghosts(&self) -> usize {
        self.ghosts.len()
    }

    /// Victim selections so far, each of which may consume several segments.
    pub fn n_evictions(&self) -> u64 {
        self.n_evictions
    }

    /// Active object count of every segment, per bucket in chain order.
    pub fn segment_occupancy(&self) -> Vec<(usize, u32)> {
        self.buckets
            .iter()
            .enumerate()
            .flat_map(|(b, bucket)| bucket.iter(&self.segments).map(move |(_, seg)| (b, seg.n_active)))
            .collect()
    }

    /// `None` unless the cache scores with [`ScoringPolicy::Learned`] and has
    /// a backend.
    pub fn learner_stats(&self) -> Option<LearnerStats> {
        self.learner.as_ref().map(Learner::stats)
    }

    /// Whether the last fit produced a model that currently ranks segments.
    pub fn has_model(&self) -> bool {
        self.learner.as_ref().is_some_and(|l| l.model().is_some())
    }

    /// Hit-probability table of a bucket. Tables are only kept for
    /// [`ObjScoreType::HitDensity`] and appear once the bucket records a hit
    /// or an eviction.
    pub fn hit_prob(&self, bucket_idx: usize) -> Option<&HitProbTable> {
        self.buckets.get(bucket_idx)?.hit_prob.as_ref()
    }

    fn tracks_hit_prob(&self) -> bool {
        self.params.obj_score == ObjScoreType::HitDensity
    }

    fn tick(&mut self, req: &Request) {
        if !self.clock.started {
            self.clock.started = true;
            self.clock.rtime = req.timestamp;
            self.state.reset_clock(req.timestamp, 0);
            if let Some(learner) = self.learner.as_mut() {
                learner.start(req.timestamp);
            }
        }
        self.clock.vtime += 1;
        self.clock.rtime = self.clock.rtime.max(req.timestamp);
        let Clock { rtime, vtime, .. } = self.clock;

        self.state.on_request(rtime, vtime);
        if vtime - self.last_hit_prob_vtime >= self.params.hit_prob_interval {
            for table in self.buckets.iter_mut().filter_map(|b| b.hit_prob.as_mut()) {
                table.refresh();
            }
            self.last_hit_prob_vtime = vtime;
        }

        self.collect_training(req);
    }

    fn collect_training(&mut self, req: &Request) {
        let Some(learner) = self.learner.as_mut() else {
            return;
        };
        let rtime = self.clock.rtime;

        if let Some(&seg_id) = self.ghosts.get(&req.key) {
            if let Some(handle) = self.segments.get(seg_id).and_then(|s| s.training_row) {
                learner.record_hit(handle);
            }
        }

        if learner.snapshot_due(rtime) {
            let mut tracked = Vec::new();
            'buckets: for bucket in &self.buckets {
                for (id, seg) in bucket.iter(&self.segments) {
                    let live = seg.training_row.is_some_and(|h| learner.is_live(h));
                    if !seg.is_evictable() || seg.active_bytes == 0 || live {
                        continue;
                    }
                    match learner.add_row(seg.active_bytes, |out| push_segment_features(seg, rtime, out)) {
                        Some(handle) => tracked.push((id, handle)),
                        None => break 'buckets,
                    }
                }
            }
            for (id, handle) in tracked {
                if let Some(seg) = self.segments.get_mut(id) {
                    seg.training_row = Some(handle);
                }
            }
        }

        if learner.fit_due(rtime) {
            learner.fit(rtime);
            self.reset_training_bucket();
        }
    }

    fn reset_training_bucket(&mut self) {
        let mut cursor = self.training_bucket.head;
        while let Some(id) = cursor {
            cursor = self.segments.get(id).and_then(|s| s.next);
            self.training_bucket.unlink(&mut self.segments, id);
            self.segments.remove(id);
        }
        tracing::debug!(ghosts = self.ghosts.len(), "training bucket reset");
        self.ghosts.clear();
    }

    fn obj_score(&self, id: ObjId) -> Option<f64> {
        let obj = self.objects.get(id)?;
        let vtime = self.clock.vtime;
        let size = obj.size.max(1) as f64;
        let freq = f64::from(obj.freq);
        Some(match self.params.obj_score {
            ObjScoreType::Freq => freq,
            ObjScoreType::FreqByte => freq / size,
            ObjScoreType::FreqAge => freq / vtime.saturating_sub(obj.create_vtime).max(1) as f64,
            ObjScoreType::HitDensity => {
                let bucket = self.segments.get(obj.seg).map(|s| s.bucket_idx)?;
                let table = self.buckets.get(bucket)?.hit_prob.as_ref();
                table.map_or(0.0, |t| t.hit_density(obj.age(vtime))) / size
            },
        })
    }

    // Unlinks an object from its segment and the index.
    fn detach_object(&mut self, id: ObjId) -> Option<CachedObject> {
        let obj = self.objects.remove(id)?;
        if let Some(seg) = self.segments.get_mut(obj.seg) {
            seg.take(obj.slot, obj.size);
        }
        if self.index.get(&obj.key) == Some(&id) {
            self.index.remove(&obj.key);
        }
        self.occupied -= obj.size;
        Some(obj)
    }

    /// Verifies every structural invariant of the segment layout.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        let segment_size = self.params.segment_size;
        let mut active_bytes = 0u64;
        let mut active_objs = 0usize;

        for (b, bucket) in self.buckets.iter().enumerate() {
            let mut count = 0;
            let mut prev = None;
            for (id, seg) in bucket.iter(&self.segments) {
                count += 1;
                if seg.prev != prev {
                    return Err(InvariantError::new(format!("bucket {b}: broken prev link at {id:?}")));
                }
                if seg.bucket_idx != b || seg.is_training {
                    return Err(InvariantError::new(format!(
                        "bucket {b}: segment {id:?} belongs to bucket {} (training: {})",
                        seg.bucket_idx, seg.is_training
                    )));
                }
                if seg.objs.len() > segment_size {
                    return Err(InvariantError::new(format!(
                        "segment {id:?} holds {} objects, segment_size is {segment_size}",
                        seg.objs.len()
                    )));
                }
                if !seg.closed && Some(id) != bucket.tail {
                    return Err(InvariantError::new(format!("bucket {b}: open segment {id:?} is not the tail")));
                }
                let mut n_active = 0;
                let mut bytes = 0;
                for (slot, obj_id) in seg.objs.iter().enumerate() {
                    let Some(obj_id) = obj_id else { continue };
                    let obj = self
                        .objects
                        .get(*obj_id)
                        .ok_or_else(|| InvariantError::new(format!("segment {id:?}: stale object handle")))?;
                    if obj.seg != id || obj.slot != slot {
                        return Err(InvariantError::new(format!(
                            "object {} points to {:?}/{} but sits in {id:?}/{slot}",
                            obj.key, obj.seg, obj.slot
                        )));
                    }
                    if self.index.get(&obj.key) != Some(obj_id) {
                        return Err(InvariantError::new(format!("object {} missing from index", obj.key)));
                    }
                    n_active += 1;
                    bytes += obj.size;
                }
                if n_active != seg.n_active || bytes != seg.active_bytes {
                    return Err(InvariantError::new(format!(
                        "segment {id:?}: counted {n_active} objects / {bytes} bytes, recorded {} / {}",
                        seg.n_active, seg.active_bytes
                    )));
                }
                active_objs += n_active as usize;
                active_bytes += bytes;
                prev = Some(id);
            }
            if count != bucket.n_segs || prev != bucket.tail {
                return Err(InvariantError::new(format!(
                    "bucket {b}: walked {count} segments, n_segs = {}",
                    bucket.n_segs
                )));
            }
        }

        let mut training = 0;
        for (id, seg) in self.training_bucket.iter(&self.segments) {
            training += 1;
            if !seg.is_training || seg.n_active != 0 {
                return Err(InvariantError::new(format!(
                    "training segment {id:?} is not a drained training segment"
                )));
            }
        }
        if training != self.training_bucket.n_segs {
            return Err(InvariantError::new("training bucket length mismatch"));
        }

        if self.n_segments() + training != self.segments.len() {
            return Err(InvariantError::new(format!(
                "bucket segment counts sum to {}, arena holds {}",
                self.n_segments() + training,
                self.segments.len()
            )));
        }
        if active_objs != self.objects.len() || self.index.len() != self.objects.len() {
            return Err(InvariantError::new(format!(
                "{} objects in segments, {} in arena, {} indexed",
                active_objs,
                self.objects.len(),
                self.index.len()
            )));
        }
        if active_bytes != self.occupied {
            return Err(InvariantError::new(format!(
                "segments hold {active_bytes} bytes, occupied = {}",
                self.occupied
            )));
        }
        Ok(())
    }
}

impl CacheSim for L2Cache {
    fn find(&mut self, req: &Request, update: bool) -> bool {
        if update {
            self.tick(req);
        }
        let Some(&obj_id) = self.index.get(&req.key) else {
            return false;
        };
        if !update {
            return true;
        }

        let Clock { rtime, vtime, .. } = self.clock;
        let track_hit_prob = self.tracks_hit_prob();
        let Some(obj) = self.objects.get_mut(obj_id) else {
            return false;
        };
        let age = obj.age(vtime);
        obj.freq = obj.freq.saturating_add(1);
        obj.last_access_vtime = vtime;

        if let Some(seg) = self.segments.get_mut(obj.seg) {
            seg.n_total_hit = seg.n_total_hit.saturating_add(1);
            seg.windows.record_hit(rtime);
            if let Some(bucket) = self.buckets.get_mut(seg.bucket_idx).filter(|_| track_hit_prob) {
                bucket.hit_prob_mut().record_hit(age);
            }
            if let (Some(handle), Some(learner)) = (seg.training_row, self.learner.as_mut()) {
                learner.record_hit(handle);
            }
        }
        true
    }

    fn insert(&mut self, req: &Request) -> bool {
        if let Some(&old) = self.index.get(&req.key) {
            self.detach_object(old);
        }

        let segment_size = self.params.segment_size;
        let Clock { rtime, vtime, .. } = self.clock;
        let bucket_idx = self.params.bucket_type.bucket_index(
            req.size,
            req.ttl,
            self.params.size_bucket_base,
            self.buckets.len(),
        );
        let Some(bucket) = self.buckets.get_mut(bucket_idx) else {
            return false;
        };
        let seg_id = match bucket.open_segment(&self.segments, segment_size) {
            Some(id) => id,
            None => {
                let id = self
                    .segments
                    .insert(Segment::open(bucket_idx, rtime, vtime, segment_size));
                bucket.push_back(&mut self.segments, id);
                id
            },
        };

        let charged = self.common.charged_size(req.size);
        let obj_id = self.objects.insert(CachedObject {
            key: req.key.clone(),
            size: charged,
            seg: seg_id,
            slot: 0,
            freq: 0,
            create_vtime: vtime,
            last_access_vtime: vtime,
        });
        let Some(seg) = self.segments.get_mut(seg_id) else {
            self.objects.remove(obj_id);
            return false;
        };
        let slot = seg.push(obj_id, charged);
        if seg.objs.len() >= segment_size {
            seg.close(rtime, vtime, self.state.snapshot());
        }
        if let Some(obj) = self.objects.get_mut(obj_id) {
            obj.slot = slot;
        }

        self.index.insert(req.key.clone(), obj_id);
        self.occupied += charged;
        self.state.on_write(&req.key);
        true
    }

    fn evict(&mut self, _req: &Request) -> u64 {
        let mut freed = 0;
        // empty victims free nothing; keep going until bytes move or nothing is left
        while freed == 0 {
            let Some(victims) = self.select_victims() else {
                break;
            };
            freed += self.evict_segments(&victims);
        }
        freed
    }

    fn remove(&mut self, key: &ObjKey) -> bool {
        let Some(&id) = self.index.get(key) else {
            return false;
        };
        if self.detach_object(id).is_none() {
            return false;
        }
        self.metrics.removals += 1;
        true
    }

    fn contains(&self, key: &ObjKey) -> bool {
        self.index.contains_key(key)
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn capacity(&self) -> u64 {
        self.common.cache_size
    }

    fn occupied_bytes(&self) -> u64 {
        self.occupied
    }

    fn charged_size(&self, req: &Request) -> u64 {
        self.common.charged_size(req.size)
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

    fn params(segment_size: usize, merge_factor: usize, retain: usize) -> L2CacheParams {
        L2CacheParams {
            segment_size,
            merge_factor,
            retain_per_seg: retain,
            scoring: ScoringPolicy::RoundRobin,
            ..L2CacheParams::default()
        }
    }

    fn cache(size: u64, params: L2CacheParams) -> L2Cache {
        L2Cache::try_new(CommonCacheParams::new(size), params, None).unwrap()
    }

    fn unit(key: u64, ts: u64) -> Request {
        Request::new(key, 1, ts)
    }

    #[test]
    fn segments_close_when_full() {
        let mut cache = cache(100, params(4, 1, 0));
        for key in 0..10 {
            cache.get(&unit(key, 0));
        }
        assert_eq!(cache.segment_occupancy(), vec![(0, 4), (0, 4), (0, 2)]);
        let closed: Vec<bool> = cache
            .buckets[0]
            .iter(&cache.segments)
            .map(|(_, s)| s.closed)
            .collect();
        assert_eq!(closed, vec![true, true, false]);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn hits_do_not_move_objects() {
        let mut cache = cache(100, params(4, 1, 0));
        for key in 0..6 {
            cache.get(&unit(key, 0));
        }
        let before = cache.segment_occupancy();
        assert_eq!(cache.get(&unit(1, 1)), Lookup::Hit);
        assert_eq!(cache.segment_occupancy(), before);

        let id = cache.index[&ObjKey::Num(1)];
        let obj = cache.objects.get(id).unwrap();
        assert_eq!(obj.freq, 1);
        let seg = cache.segments.get(obj.seg).unwrap();
        assert_eq!(seg.n_total_hit, 1);
    }

    #[test]
    fn round_robin_evicts_oldest_segment_without_retention() {
        let mut cache = cache(8, params(4, 1, 0));
        for key in 0..8 {
            cache.get(&unit(key, 0));
        }
        cache.get(&unit(8, 1));
        for key in 0..4u64 {
            assert!(!cache.contains(&key.into()));
        }
        assert_eq!(cache.len(), 5);
        assert_eq!(cache.metrics().evicted_objects, 4);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn fullest_open_segment_is_evicted_when_nothing_is_closed() {
        let mut cache = cache(5, params(10, 1, 0));
        for key in 0..6 {
            cache.get(&unit(key, 0));
        }
        // the only segment was open; it was closed and evicted whole
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.occupied_bytes(), 0);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn size_buckets_separate_objects() {
        let p = L2CacheParams {
            bucket_type: BucketType::Size,
            size_bucket_base: 10,
            ..params(4, 1, 0)
        };
        let mut cache = cache(10_000, p);
        cache.get(&Request::new(1u64, 5, 0));
        cache.get(&Request::new(2u64, 50, 0));
        cache.get(&Request::new(3u64, 500, 0));
        let buckets: Vec<usize> = cache.segment_occupancy().iter().map(|&(b, _)| b).collect();
        assert_eq!(buckets, vec![0, 3, 6]);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn remove_leaves_tombstone() {
        let mut cache = cache(100, params(4, 1, 0));
        for key in 0..4 {
            cache.get(&unit(key, 0));
        }
        assert!(cache.remove(&2u64.into()));
        assert!(!cache.remove(&2u64.into()));
        assert_eq!(cache.segment_occupancy(), vec![(0, 3)]);
        assert_eq!(cache.occupied_bytes(), 3);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn spawn_with_size_keeps_params_and_starts_empty() {
        let mut cache = cache(100, params(4, 2, 1));
        cache.get(&unit(1, 0));
        let spawned = cache.spawn_with_size(500).unwrap();
        assert_eq!(spawned.capacity(), 500);
        assert_eq!(spawned.params(), cache.params());
        assert!(spawned.is_empty());
    }

    #[test]
    fn unbucketed_cache_allocates_one_bucket_without_tables() {
        let mut cache = cache(8, params(4, 1, 0));
        assert_eq!(cache.buckets.len(), 1);
        for key in 0..20u64 {
            cache.get(&unit(key % 6, key));
        }
        assert!(cache.metrics().hits > 0);
        assert!(cache.hit_prob(0).is_none());
        assert!(cache.hit_prob(1).is_none());
    }

    #[test]
    fn hit_density_builds_tables_on_demand() {
        let p = L2CacheParams {
            obj_score: ObjScoreType::HitDensity,
            bucket_type: BucketType::Size,
            size_bucket_base: 10,
            max_buckets: 8,
            ..params(4, 1, 0)
        };
        let mut cache = cache(10_000, p);
        assert_eq!(cache.buckets.len(), 8);
        cache.get(&Request::new(1u64, 5, 0));
        cache.get(&Request::new(1u64, 5, 1));
        assert!(cache.hit_prob(0).is_some());
        assert!((1..8).all(|b| cache.hit_prob(b).is_none()));
        cache.check_invariants().unwrap();
    }

    #[test]
    fn debug_output_is_summarized() {
        let cache = cache(100, params(4, 1, 0));
        let text = format!("{cache:?}");
        assert!(text.starts_with("L2Cache"));
    }
}
