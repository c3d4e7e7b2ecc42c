// ==============================================
// LRU TRACE REGRESSION (integration, ignored by default)
// ==============================================
//
// Replays a plaintext trace (one key per line, unit sizes) through the
// profiler with an LRU template and compares per-bin miss counts against
// known values.
//
//   CACHESIM_TRACE=/path/to/trace.txt \
//   CACHESIM_TRACE_BIN_SIZE=500 \
//   cargo test --test lru_trace_regression -- --ignored

use std::env;
use std::fs;

use cachesim::builder::{CacheBuilder, CachePolicy};
use cachesim::profiler::{get_miss_ratio_curve, ProfilerParams};
use cachesim::request::TraceBuffer;

const EXPECTED_MISS_CNT: [u64; 9] = [0, 99411, 96397, 95652, 95370, 95182, 94997, 94891, 94816];
const EXPECTED_REQ_CNT: u64 = 113872;
const DEFAULT_BIN_SIZE: u64 = 500;

fn load_trace(path: &str) -> TraceBuffer {
    let text = fs::read_to_string(path).unwrap_or_else(|e| panic!("reading {path}: {e}"));
    TraceBuffer::from_keys(
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| match line.parse::<u64>() {
                Ok(n) => n.into(),
                Err(_) => cachesim::request::ObjKey::from(line),
            }),
    )
}

#[test]
#[ignore = "needs CACHESIM_TRACE pointing at the reference trace"]
fn lru_miss_ratio_curve_matches_reference() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let Ok(path) = env::var("CACHESIM_TRACE") else {
        eprintln!("CACHESIM_TRACE not set, skipping");
        return;
    };
    let bin_size = env::var("CACHESIM_TRACE_BIN_SIZE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_BIN_SIZE);

    let trace = load_trace(&path);
    let n_bins = (EXPECTED_MISS_CNT.len() - 1) as u64;
    let template = CacheBuilder::new(bin_size * n_bins)
        .build(CachePolicy::Lru)
        .unwrap();
    let params = ProfilerParams {
        n_workers: 4,
        bin_size,
        max_requests: None,
    };
    let curve = get_miss_ratio_curve(&trace, &template, &params).unwrap();

    assert_eq!(curve.len(), EXPECTED_MISS_CNT.len());
    for (bin, (result, &expected)) in curve.iter().zip(EXPECTED_MISS_CNT.iter()).enumerate() {
        assert_eq!(result.miss_cnt, expected, "bin {bin}");
        if bin > 0 {
            assert_eq!(result.req_cnt, EXPECTED_REQ_CNT, "bin {bin}");
        }
    }
}
