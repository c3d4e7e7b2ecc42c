//! Training-row collection and fit scheduling for the learned scorer.
//!
//! Rows are segment feature vectors. Each row accumulates the requests its
//! segment's objects receive after collection; at fit time the label is
//! `hits * 1e6 / bytes`. Every fifth row goes to the validation buffer.
//!
//! A [`RowHandle`] carries the learner cycle it was issued in. After a fit
//! both buffers are cleared and the cycle advances, so handles still held by
//! segments silently stop accumulating.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::feature::N_FEATURES;
use super::model::{FeatureMatrix, ModelBackend, ScoringModel, TrainingSet};
use super::params::TrainingSource;

const VALIDATION_EVERY: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowHandle {
    cycle: u32,
    validation: bool,
    index: u32,
}

/// Counters exposed through [`L2Cache::learner_stats`](super::L2Cache::learner_stats).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnerStats {
    pub fits: u64,
    pub fit_failures: u64,
    pub inferences: u64,
    pub inference_failures: u64,
    pub rows_collected: u64,
    pub training_rows: usize,
    pub validation_rows: usize,
}

#[derive(Debug, Clone)]
struct RowBuffer {
    features: FeatureMatrix,
    hits: Vec<u32>,
    bytes: Vec<u64>,
}

impl RowBuffer {
    fn new(rows: usize) -> Self {
        Self {
            features: FeatureMatrix::with_capacity(N_FEATURES, rows),
            hits: Vec::with_capacity(rows),
            bytes: Vec::with_capacity(rows),
        }
    }

    fn len(&self) -> usize {
        self.hits.len()
    }

    fn labels(&self) -> Vec<f32> {
        self.hits
            .iter()
            .zip(&self.bytes)
            .map(|(&hits, &bytes)| (f64::from(hits) * 1e6 / bytes.max(1) as f64) as f32)
            .collect()
    }

    fn clear(&mut self) {
        self.features.clear();
        self.hits.clear();
        self.bytes.clear();
    }
}

pub struct Learner {
    source: TrainingSource,
    backend: Arc<dyn ModelBackend>,
    model: Option<Box<dyn ScoringModel>>,
    train: RowBuffer,
    valid: RowBuffer,
    capacity: usize,
    cycle: u32,
    n_rows: u64,

    last_fit_rtime: u64,
    last_snapshot_rtime: u64,
    evicted_bytes: u64,
    evicted_segs: u64,

    stats: LearnerStats,
}

impl std::fmt::Debug for Learner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Learner")
            .field("source", &self.source)
            .field("has_model", &self.model.is_some())
            .field("cycle", &self.cycle)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Learner {
    pub fn new(source: TrainingSource, backend: Arc<dyn ModelBackend>, capacity: usize) -> Self {
        let valid_capacity = capacity.div_ceil(VALIDATION_EVERY as usize - 1);
        Self {
            source,
            backend,
            model: None,
            train: RowBuffer::new(capacity),
            valid: RowBuffer::new(valid_capacity),
            capacity,
            cycle: 0,
            n_rows: 0,
            last_fit_rtime: 0,
            last_snapshot_rtime: 0,
            evicted_bytes: 0,
            evicted_segs: 0,
            stats: LearnerStats::default(),
        }
    }

    pub fn start(&mut self, rtime: u64) {
        self.last_fit_rtime = rtime;
        self.last_snapshot_rtime = rtime;
    }

    pub fn model(&self) -> Option<&dyn ScoringModel> {
        self.model.as_deref()
    }

    pub fn stats(&self) -> LearnerStats {
        LearnerStats {
            training_rows: self.train.len(),
            validation_rows: self.valid.len(),
            ..self.stats
        }
    }

    pub fn record_inference(&mut self, ok: bool) {
        self.stats.inferences += 1;
        if !ok {
            self.stats.inference_failures += 1;
        }
    }

    pub fn is_full(&self) -> bool {
        self.train.len() >= self.capacity
    }

    pub fn is_live(&self, handle: RowHandle) -> bool {
        handle.cycle == self.cycle
    }

    /// Adds a row whose features were already appended by `write`.
    pub fn add_row(&mut self, bytes: u64, write: impl FnOnce(&mut Vec<f32>)) -> Option<RowHandle> {
        if self.is_full() {
            return None;
        }
        let to_valid = self.n_rows % VALIDATION_EVERY == VALIDATION_EVERY - 1;
        self.n_rows += 1;
        self.stats.rows_collected += 1;

        let buffer = if to_valid { &mut self.valid } else { &mut self.train };
        let index = buffer.len() as u32;
        write(buffer.features.data_mut());
        buffer.hits.push(0);
        buffer.bytes.push(bytes);
        Some(RowHandle {
            cycle: self.cycle,
            validation: to_valid,
            index,
        })
    }

    pub fn record_hit(&mut self, handle: RowHandle) {
        if !self.is_live(handle) {
            return;
        }
        let buffer = if handle.validation {
            &mut self.valid
        } else {
            &mut self.train
        };
        if let Some(hits) = buffer.hits.get_mut(handle.index as usize) {
            *hits = hits.saturating_add(1);
        }
    }

    /// Accounts an evicted segment. Returns `true` when it should be
    /// diverted into the training bucket.
    pub fn sample_evicted(&mut self, bytes: u64) -> bool {
        let TrainingSource::Eviction {
            sample_every_n_seg,
            start_after_evicted_bytes,
        } = self.source
        else {
            return false;
        };
        self.evicted_bytes += bytes;
        if self.evicted_bytes < start_after_evicted_bytes || self.is_full() {
            return false;
        }
        self.evicted_segs += 1;
        self.evicted_segs % u64::from(sample_every_n_seg) == 0
    }

    /// Whether resident segments should be snapshotted at `rtime`.
    pub fn snapshot_due(&mut self, rtime: u64) -> bool {
        let TrainingSource::Cache {
            snapshot_interval, ..
        } = self.source
        else {
            return false;
        };
        if rtime.saturating_sub(self.last_snapshot_rtime) < snapshot_interval {
            return false;
        }
        self.last_snapshot_rtime = rtime;
        true
    }

    pub fn fit_due(&self, rtime: u64) -> bool {
        match self.source {
            TrainingSource::Eviction { .. } => self.is_full(),
            TrainingSource::Cache {
                retrain_interval, ..
            } => self.train.len() > 0 && rtime.saturating_sub(self.last_fit_rtime) >= retrain_interval,
        }
    }

    /// Fits a new model from the collected rows and resets the buffers.
    pub fn fit(&mut self, rtime: u64) {
        let set = TrainingSet {
            train_x: self.train.features.clone(),
            train_y: self.train.labels(),
            valid_x: self.valid.features.clone(),
            valid_y: self.valid.labels(),
        };
        match self.backend.fit(&set) {
            Ok(model) => {
                self.model = Some(model);
                self.stats.fits += 1;
                tracing::debug!(
                    rows = set.train_y.len(),
                    valid_rows = set.valid_y.len(),
                    fits = self.stats.fits,
                    "scoring model refit"
                );
            },
            Err(err) => {
                self.model = None;
                self.stats.fit_failures += 1;
                tracing::warn!(error = %err, "model fit failed, ranking with heuristic");
            },
        }

        self.train.clear();
        self.valid.clear();
        self.n_rows = 0;
        self.cycle = self.cycle.wrapping_add(1);
        self.last_fit_rtime = rtime;
        self.evicted_bytes = 0;
        self.evicted_segs = 0;
    }
}
