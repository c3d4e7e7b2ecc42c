//! Per-bucket hit probability by object age.
//!
//! Each bucket counts, per coarsened age, how many objects were hit and how
//! many were evicted at that age. `hit_density(age) = hits / (hits + evicts)`
//! feeds the `HitDensity` object score.
//!
//! ```text
//!   age (virtual time since last access) >> age_shift
//!        │
//!        ▼
//!   ┌──────┬──────┬──────┬─────┬─────────────┐
//!   │  0   │  1   │  2   │ ... │ MAX_AGE - 1 │   n_hit[] / n_evict[]
//!   └──────┴──────┴──────┴─────┴─────────────┘
//!
//!   age >= MAX_AGE  ──► age_shift += 1, counters (2i, 2i+1) merged into i
//!   counter about to pass HIT_PROB_RESCALE_THRESHOLD ──► all counters halved
//! ```

/// Number of tracked age classes.
pub const HIT_PROB_MAX_AGE: usize = 4096;

/// No hit/evict counter is allowed to grow past this value.
pub const HIT_PROB_RESCALE_THRESHOLD: u32 = 1 << 30;

#[derive(Debug, Clone)]
pub struct HitProbTable {
    n_hit: Vec<u32>,
    n_evict: Vec<u32>,
    hit_density: Vec<f64>,
    age_shift: u32,
    n_rescale: u64,
}

impl HitProbTable {
    pub fn new() -> Self {
        Self {
            n_hit: vec![0; HIT_PROB_MAX_AGE],
            n_evict: vec![0; HIT_PROB_MAX_AGE],
            hit_density: vec![0.0; HIT_PROB_MAX_AGE],
            age_shift: 0,
            n_rescale: 0,
        }
    }

    pub fn record_hit(&mut self, age: u64) {
        let idx = self.age_index(age);
        if self.n_hit[idx] >= HIT_PROB_RESCALE_THRESHOLD - 1 {
            self.rescale();
        }
        self.n_hit[idx] += 1;
    }

    pub fn record_evict(&mut self, age: u64) {
        let idx = self.age_index(age);
        if self.n_evict[idx] >= HIT_PROB_RESCALE_THRESHOLD - 1 {
            self.rescale();
        }
        self.n_evict[idx] += 1;
    }

    /// Recomputes densities from the current counters.
    pub fn refresh(&mut self) {
        for ((density, &hits), &evicts) in self
            .hit_density
            .iter_mut()
            .zip(&self.n_hit)
            .zip(&self.n_evict)
        {
            let total = u64::from(hits) + u64::from(evicts);
            *density = if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            };
        }
    }

    /// Density as of the last [`refresh`](Self::refresh).
    pub fn hit_density(&self, age: u64) -> f64 {
        let idx = usize::try_from(age >> self.age_shift)
            .unwrap_or(usize::MAX)
            .min(HIT_PROB_MAX_AGE - 1);
        self.hit_density[idx]
    }

    pub fn age_shift(&self) -> u32 {
        self.age_shift
    }

    /// Number of overflow-driven halvings so far.
    pub fn n_rescale(&self) -> u64 {
        self.n_rescale
    }

    pub fn counters(&self) -> (&[u32], &[u32]) {
        (&self.n_hit, &self.n_evict)
    }

    // A too-old age coarsens the table once and lands in the last class.
    fn age_index(&mut self, age: u64) -> usize {
        let mut idx = age >> self.age_shift;
        if idx >= HIT_PROB_MAX_AGE as u64 && self.age_shift < u64::BITS - 1 {
            self.shift_ages();
            idx = age >> self.age_shift;
        }
        usize::try_from(idx)
            .unwrap_or(usize::MAX)
            .min(HIT_PROB_MAX_AGE - 1)
    }

    fn shift_ages(&mut self) {
        self.age_shift += 1;
        for counters in [&mut self.n_hit, &mut self.n_evict] {
            for i in 0..HIT_PROB_MAX_AGE / 2 {
                counters[i] = merge_pair(counters[2 * i], counters[2 * i + 1]);
            }
            counters[HIT_PROB_MAX_AGE / 2..].fill(0);
        }
        tracing::debug!(age_shift = self.age_shift, "hit probability ages coarsened");
    }

    fn rescale(&mut self) {
        for counter in self.n_hit.iter_mut().chain(self.n_evict.iter_mut()) {
            *counter /= 2;
        }
        self.n_rescale += 1;
    }
}

impl Default for HitProbTable {
    fn default() -> Self {
        Self::new()
    }
}

// Merged pairs stay below the rescale threshold.
fn merge_pair(a: u32, b: u32) -> u32 {
    let sum = u64::from(a) + u64::from(b);
    if sum >= u64::from(HIT_PROB_RESCALE_THRESHOLD) {
        (sum / 2) as u32
    } else {
        sum as u32
    }
}
