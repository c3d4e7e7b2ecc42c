//! Synthetic request streams.
//!
//! Deterministic, seeded generators for tests, benches, and quick
//! experiments when no recorded trace is at hand. A [`SyntheticSource`]
//! replays by rebuilding its generator from the same [`WorkloadSpec`], so every
//! profiler worker sees the identical stream.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::request::{Request, RequestSource};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Workload {
    /// Uniform random keys in `[0, universe)`.
    Uniform,
    /// Hot/cold split with a configurable hot fraction and hot access probability.
    Hotset { hot_fraction: f64, hot_prob: f64 },
    /// Sequential scan in `[0, universe)`.
    Scan,
    /// Zipfian distribution; `theta` 0.0 = uniform, 0.99 = highly skewed.
    Zipfian { theta: f64 },
}

/// How object sizes are derived from keys. Sizes are a pure function of the
/// key so a re-requested object keeps its size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeModel {
    Fixed(u64),
    /// Log-uniform in `[min, max]`, hashed from the key.
    LogUniform { min: u64, max: u64 },
}

impl SizeModel {
    pub fn size_of(self, key: u64) -> u64 {
        match self {
            SizeModel::Fixed(size) => size.max(1),
            SizeModel::LogUniform { min, max } => {
                let min = min.max(1);
                let max = max.max(min);
                let lo = (min as f64).ln();
                let hi = (max as f64).ln();
                let unit = (mix64(key) >> 11) as f64 / (1u64 << 53) as f64;
                ((lo + unit * (hi - lo)).exp().round() as u64).clamp(min, max)
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub universe: u64,
    pub workload: Workload,
    pub sizes: SizeModel,
    pub seed: u64,
    pub n_requests: u64,
    /// Requests issued per simulated second; drives `Request::timestamp`.
    pub requests_per_sec: u64,
}

impl WorkloadSpec {
    pub fn generator(self) -> WorkloadGenerator {
        WorkloadGenerator::new(self.universe, self.workload, self.seed)
    }

    pub fn source(self) -> SyntheticSource {
        SyntheticSource::new(self)
    }
}

#[derive(Debug, Clone)]
pub struct WorkloadGenerator {
    universe: u64,
    workload: Workload,
    rng: SmallRng,
    scan_pos: u64,
    zipfian: Option<ZipfianState>,
}

impl WorkloadGenerator {
    pub fn new(universe: u64, workload: Workload, seed: u64) -> Self {
        let universe = universe.max(1);
        let zipfian = match workload {
            Workload::Zipfian { theta } => Some(ZipfianState::new(universe, theta)),
            _ => None,
        };
        Self {
            universe,
            workload,
            rng: SmallRng::seed_from_u64(seed),
            scan_pos: 0,
            zipfian,
        }
    }

    pub fn next_key(&mut self) -> u64 {
        match self.workload {
            Workload::Uniform => self.rng.gen_range(0..self.universe),
            Workload::Hotset {
                hot_fraction,
                hot_prob,
            } => {
                let hot_fraction = hot_fraction.clamp(0.0, 1.0);
                let hot_prob = hot_prob.clamp(0.0, 1.0);
                let hot_size = ((self.universe as f64) * hot_fraction).round() as u64;
                let hot_size = hot_size.clamp(1, self.universe);
                if self.rng.gen_bool(hot_prob) {
                    self.rng.gen_range(0..hot_size)
                } else if hot_size == self.universe {
                    self.rng.gen_range(0..self.universe)
                } else {
                    self.rng.gen_range(hot_size..self.universe)
                }
            },
            Workload::Scan => {
                let key = self.scan_pos;
                self.scan_pos = (self.scan_pos + 1) % self.universe;
                key
            },
            Workload::Zipfian { .. } => {
                let u: f64 = self.rng.gen();
                match &self.zipfian {
                    Some(zipf) => zipf.sample(u),
                    None => 0,
                }
            },
        }
    }
}

/// Replayable request source backed by a [`WorkloadGenerator`].
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    spec: WorkloadSpec,
    generator: WorkloadGenerator,
    issued: u64,
}

impl SyntheticSource {
    pub fn new(spec: WorkloadSpec) -> Self {
        Self {
            spec,
            generator: spec.generator(),
            issued: 0,
        }
    }
}

impl RequestSource for SyntheticSource {
    fn next_request(&mut self) -> Option<Request> {
        if self.issued >= self.spec.n_requests {
            return None;
        }
        let key = self.generator.next_key();
        let timestamp = self.issued / self.spec.requests_per_sec.max(1);
        self.issued += 1;
        Some(Request::new(key, self.spec.sizes.size_of(key), timestamp))
    }

    fn replay(&self) -> Option<Box<dyn RequestSource + Send>> {
        Some(Box::new(SyntheticSource::new(self.spec)))
    }

    fn len_hint(&self) -> Option<u64> {
        Some(self.spec.n_requests)
    }
}

/// Zipfian distribution state for inverse CDF sampling (YCSB algorithm).
#[derive(Debug, Clone)]
struct ZipfianState {
    n: u64,
    theta: f64,
    zeta_n: f64,
    alpha: f64,
    eta: f64,
}

impl ZipfianState {
    fn new(n: u64, theta: f64) -> Self {
        let theta = theta.clamp(0.0, 0.9999);
        let zeta_2 = Self::zeta(2, theta);
        let zeta_n = Self::zeta(n, theta);
        let alpha = 1.0 / (1.0 - theta);
        let eta = (1.0 - (2.0 / n as f64).powf(1.0 - theta)) / (1.0 - zeta_2 / zeta_n);

        Self {
            n,
            theta,
            zeta_n,
            alpha,
            eta,
        }
    }

    fn zeta(n: u64, theta: f64) -> f64 {
        (1..=n).map(|i| 1.0 / (i as f64).powf(theta)).sum()
    }

    fn sample(&self, u: f64) -> u64 {
        let uz = u * self.zeta_n;
        if uz < 1.0 {
            return 0;
        }
        if uz < 1.0 + 0.5_f64.powf(self.theta) {
            return 1;
        }
        let spread = (self.n as f64) * (self.eta * u - self.eta + 1.0).powf(self.alpha);
        (spread as u64).min(self.n - 1)
    }
}

// splitmix64 finalizer
fn mix64(mut x: u64) -> u64 {
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}
