// ==============================================
// L2CACHE INTEGRATION TESTS
// ==============================================
//
// Segment layout, retention, and both training pipelines driven through the
// public API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cachesim::error::ModelError;
use cachesim::policy::l2cache::{
    FeatureMatrix, L2Cache, L2CacheParams, ModelBackend, ObjScoreType, RidgeRegression,
    ScoringModel, ScoringPolicy, TrainingSet, TrainingSource,
};
use cachesim::request::{Request, RequestSource};
use cachesim::traits::{CacheSim, CommonCacheParams};
use cachesim::workload::{SizeModel, Workload, WorkloadSpec};
use proptest::prelude::*;

fn l2(size: u64, params: L2CacheParams, backend: Option<Arc<dyn ModelBackend>>) -> L2Cache {
    L2Cache::try_new(CommonCacheParams::new(size), params, backend).unwrap()
}

fn drive(cache: &mut L2Cache, spec: WorkloadSpec) {
    let mut source = spec.source();
    while let Some(req) = source.next_request() {
        cache.get(&req);
    }
}

fn zipf(n_requests: u64, sizes: SizeModel) -> WorkloadSpec {
    WorkloadSpec {
        universe: 5_000,
        workload: Workload::Zipfian { theta: 0.9 },
        sizes,
        seed: 42,
        n_requests,
        requests_per_sec: 100,
    }
}

// ==============================================
// Retention
// ==============================================

#[test]
fn retention_keeps_exactly_k_of_a_full_victim() {
    for k in 0..=5usize {
        let params = L2CacheParams {
            segment_size: 10,
            merge_factor: 1,
            retain_per_seg: k,
            scoring: ScoringPolicy::RoundRobin,
            obj_score: ObjScoreType::FreqByte,
            ..L2CacheParams::default()
        };
        let mut cache = l2(20, params, None);
        for key in 0..20u64 {
            cache.get(&Request::new(key, 1, 0));
        }
        cache.get(&Request::new(1_000u64, 1, 1));

        let survivors = (0..10u64).filter(|&key| cache.contains(&key.into())).count();
        assert_eq!(survivors, k.min(10), "retain_per_seg = {k}");
        assert!((10..20u64).all(|key| cache.contains(&key.into())));
        cache.check_invariants().unwrap();
    }
}

#[test]
fn retention_that_frees_nothing_evicts_everything() {
    let params = L2CacheParams {
        segment_size: 10,
        merge_factor: 1,
        retain_per_seg: 5,
        scoring: ScoringPolicy::RoundRobin,
        ..L2CacheParams::default()
    };
    let mut cache = l2(12, params, None);
    for key in 0..10u64 {
        cache.get(&Request::new(key, 1, 0));
    }
    // three survivors left in the head segment, fewer than retain_per_seg
    for key in 0..7u64 {
        assert!(cache.remove(&key.into()));
    }
    for key in 10..13u64 {
        cache.get(&Request::new(key, 1, 1));
    }
    for key in 13..20u64 {
        cache.get(&Request::new(key, 1, 1));
    }
    assert!((7..10u64).all(|key| !cache.contains(&key.into())));
    assert!(cache.occupied_bytes() <= 12);
    cache.check_invariants().unwrap();
}

// ==============================================
// Segment Invariants Under Load
// ==============================================

#[test]
fn segment_invariants_hold_on_variable_size_workload() {
    for scoring in [ScoringPolicy::RoundRobin, ScoringPolicy::Heuristic] {
        for obj_score in [
            ObjScoreType::Freq,
            ObjScoreType::FreqByte,
            ObjScoreType::FreqAge,
            ObjScoreType::HitDensity,
        ] {
            let params = L2CacheParams {
                segment_size: 32,
                merge_factor: 3,
                retain_per_seg: 8,
                hit_prob_interval: 500,
                scoring,
                obj_score,
                bucket_type: cachesim::policy::l2cache::BucketType::Size,
                size_bucket_base: 64,
                max_buckets: 16,
                ..L2CacheParams::default()
            };
            let mut cache = l2(200_000, params, None);
            let mut source = zipf(20_000, SizeModel::LogUniform { min: 16, max: 8_192 }).source();
            let mut n = 0;
            while let Some(req) = source.next_request() {
                cache.get(&req);
                n += 1;
                if n % 1_000 == 0 {
                    cache.check_invariants().unwrap();
                }
                assert!(cache.occupied_bytes() <= cache.capacity());
            }
            assert!(cache.metrics().evicted_objects > 0);
            assert!(cache.segment_occupancy().iter().all(|&(_, n)| n <= 32));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn random_params_keep_segments_consistent(
        segment_size in 2usize..24,
        merge_factor in 1usize..4,
        retain_frac in 0.0f64..1.0,
        capacity in 8u64..400,
        reqs in prop::collection::vec((0u64..300, 1u64..6), 50..600),
    ) {
        let max_retain = (segment_size / merge_factor).min(segment_size - 1);
        let retain_per_seg = (retain_frac * (max_retain + 1) as f64) as usize;
        let params = L2CacheParams {
            segment_size,
            merge_factor,
            retain_per_seg: retain_per_seg.min(max_retain),
            rank_interval: 3,
            scoring: ScoringPolicy::Heuristic,
            ..L2CacheParams::default()
        };
        let mut cache = l2(capacity, params, None);
        for (i, &(key, size)) in reqs.iter().enumerate() {
            cache.get(&Request::new(key, size, i as u64 / 10));
            prop_assert!(cache.occupied_bytes() <= capacity);
        }
        prop_assert!(cache.check_invariants().is_ok());
        for (_, n_active) in cache.segment_occupancy() {
            prop_assert!(n_active as usize <= segment_size);
        }
    }
}

// ==============================================
// Training: Eviction Source
// ==============================================

struct FailingBackend {
    calls: AtomicU64,
}

impl ModelBackend for FailingBackend {
    fn fit(&self, _data: &TrainingSet) -> Result<Box<dyn ScoringModel>, ModelError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(ModelError::new("backend unavailable"))
    }
}

fn eviction_trained(train_buffer_rows: usize) -> L2CacheParams {
    L2CacheParams {
        segment_size: 20,
        merge_factor: 2,
        retain_per_seg: 4,
        scoring: ScoringPolicy::Learned,
        training: TrainingSource::Eviction {
            sample_every_n_seg: 2,
            start_after_evicted_bytes: 100,
        },
        train_buffer_rows,
        ..L2CacheParams::default()
    }
}

#[test]
fn failing_fit_falls_back_to_heuristic() {
    let backend = Arc::new(FailingBackend {
        calls: AtomicU64::new(0),
    });
    let mut cache = l2(500, eviction_trained(8), Some(backend.clone()));
    drive(&mut cache, zipf(30_000, SizeModel::Fixed(1)));

    let stats = cache.learner_stats().unwrap();
    assert!(stats.fit_failures > 0);
    assert_eq!(stats.fits, 0);
    assert_eq!(stats.inferences, 0);
    assert_eq!(backend.calls.load(Ordering::Relaxed), stats.fit_failures);
    assert!(!cache.has_model());
    assert_eq!(cache.metrics().requests, 30_000);
    cache.check_invariants().unwrap();
}

#[test]
fn sampled_victims_become_training_segments_with_ghosts() {
    let backend: Arc<dyn ModelBackend> = Arc::new(RidgeRegression::default());
    // buffer never fills, so no fit resets the training bucket
    let mut cache = l2(500, eviction_trained(100_000), Some(backend));
    drive(&mut cache, zipf(10_000, SizeModel::Fixed(1)));

    let stats = cache.learner_stats().unwrap();
    assert!(stats.rows_collected > 0);
    assert_eq!(
        stats.training_rows + stats.validation_rows,
        stats.rows_collected as usize
    );
    assert!(stats.validation_rows > 0);
    assert!(cache.n_training_segments() > 0);
    assert!(cache.n_ghosts() > 0);
    assert_eq!(stats.fits, 0);
    cache.check_invariants().unwrap();
}

struct FitsOnce {
    calls: AtomicU64,
}

impl ModelBackend for FitsOnce {
    fn fit(&self, data: &TrainingSet) -> Result<Box<dyn ScoringModel>, ModelError> {
        match self.calls.fetch_add(1, Ordering::Relaxed) {
            0 => RidgeRegression::default().fit(data),
            _ => Err(ModelError::new("backend unavailable")),
        }
    }
}

#[test]
fn failed_refit_returns_to_heuristic_ranking() {
    let backend = Arc::new(FitsOnce {
        calls: AtomicU64::new(0),
    });
    let mut cache = l2(500, eviction_trained(64), Some(backend));
    let mut source = zipf(30_000, SizeModel::Fixed(1)).source();

    let mut at_failure = None;
    while let Some(req) = source.next_request() {
        cache.get(&req);
        let stats = cache.learner_stats().unwrap();
        match at_failure {
            None if stats.fit_failures > 0 => at_failure = Some(stats),
            Some(first) => assert_eq!(stats.inferences, first.inferences),
            None => {},
        }
    }

    let first = at_failure.expect("backend never failed");
    assert_eq!(first.fits, 1);
    assert!(first.inferences > 0);
    assert!(!cache.has_model());
    let stats = cache.learner_stats().unwrap();
    assert_eq!(stats.fits, 1);
    assert!(stats.fit_failures > 1);
    cache.check_invariants().unwrap();
}

// ==============================================
// Training: Cache Source
// ==============================================

#[test]
fn cache_snapshots_train_ridge_model() {
    let params = L2CacheParams {
        segment_size: 20,
        merge_factor: 2,
        retain_per_seg: 5,
        rank_interval: 5,
        scoring: ScoringPolicy::Learned,
        training: TrainingSource::Cache {
            snapshot_interval: 10,
            retrain_interval: 50,
        },
        train_buffer_rows: 1_024,
        ..L2CacheParams::default()
    };
    let backend: Arc<dyn ModelBackend> = Arc::new(RidgeRegression::new(1.0));
    let mut cache = l2(500, params, Some(backend));
    drive(&mut cache, zipf(30_000, SizeModel::Fixed(1)));

    let stats = cache.learner_stats().unwrap();
    assert!(stats.rows_collected > 0);
    assert!(stats.fits >= 2, "fits = {}", stats.fits);
    assert_eq!(stats.fit_failures, 0);
    assert!(stats.inferences > 0);
    assert_eq!(stats.inference_failures, 0);
    assert!(cache.has_model());
    assert_eq!(cache.n_training_segments(), 0);
    cache.check_invariants().unwrap();
}

// ==============================================
// Training: Failing Inference
// ==============================================

struct BrokenModel;

impl ScoringModel for BrokenModel {
    fn predict(&self, _features: &FeatureMatrix) -> Result<Vec<f32>, ModelError> {
        Err(ModelError::new("corrupt model"))
    }
}

struct BrokenModelBackend;

impl ModelBackend for BrokenModelBackend {
    fn fit(&self, _data: &TrainingSet) -> Result<Box<dyn ScoringModel>, ModelError> {
        Ok(Box::new(BrokenModel))
    }
}

#[test]
fn failing_inference_is_counted_and_simulation_continues() {
    let mut cache = l2(500, eviction_trained(4), Some(Arc::new(BrokenModelBackend)));
    drive(&mut cache, zipf(20_000, SizeModel::Fixed(1)));

    let stats = cache.learner_stats().unwrap();
    assert!(stats.fits > 0);
    assert!(stats.inference_failures > 0);
    assert_eq!(stats.inferences, stats.inference_failures);
    assert!(cache.occupied_bytes() <= 500);
    cache.check_invariants().unwrap();
}

#[test]
fn learned_without_backend_scores_heuristically() {
    let mut cache = l2(500, eviction_trained(8), None);
    drive(&mut cache, zipf(5_000, SizeModel::Fixed(1)));
    assert!(cache.learner_stats().is_none());
    assert!(cache.metrics().evicted_objects > 0);
}
