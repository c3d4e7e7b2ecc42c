//! Miss ratio curve profiling at different worker counts.
//!
//! Run with: `cargo bench --bench profiler`

use std::hint::black_box;

use cachesim::builder::{CacheBuilder, CachePolicy};
use cachesim::policy::l2cache::{L2CacheParams, ScoringPolicy};
use cachesim::profiler::{get_miss_ratio_curve, ProfilerParams};
use cachesim::workload::{SizeModel, Workload, WorkloadSpec};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const REQUESTS: u64 = 100_000;
const BIN_SIZE: u64 = 1_000;
const N_BINS: u64 = 16;

fn bench_mrc(c: &mut Criterion) {
    let source = WorkloadSpec {
        universe: 50_000,
        workload: Workload::Zipfian { theta: 0.99 },
        sizes: SizeModel::Fixed(1),
        seed: 42,
        n_requests: REQUESTS,
        requests_per_sec: 1_000,
    }
    .source();

    let templates = [
        ("lru", CachePolicy::Lru),
        (
            "l2_heuristic",
            CachePolicy::L2Cache(L2CacheParams {
                scoring: ScoringPolicy::Heuristic,
                ..L2CacheParams::default()
            }),
        ),
    ];

    let mut group = c.benchmark_group("miss_ratio_curve");
    group.throughput(Throughput::Elements(REQUESTS * N_BINS));
    group.sample_size(10);

    for (name, policy) in templates {
        let template = CacheBuilder::new(BIN_SIZE * N_BINS).build(policy).unwrap();
        for n_workers in [1usize, 2, 4, 8] {
            let params = ProfilerParams {
                n_workers,
                bin_size: BIN_SIZE,
                max_requests: None,
            };
            group.bench_with_input(BenchmarkId::new(name, n_workers), &params, |b, params| {
                b.iter(|| black_box(get_miss_ratio_curve(&source, &template, params).unwrap()))
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_mrc);
criterion_main!(benches);
