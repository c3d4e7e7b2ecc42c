//! Pluggable scoring models for the learned eviction policy.
//!
//! The cache only sees two traits:
//!
//! - [`ModelBackend::fit`] turns a [`TrainingSet`] into a trained model.
//! - [`ScoringModel::predict`] maps segment feature rows to a predicted
//!   utility (future hits per million bytes). Lower utility is evicted first.
//!
//! [`RidgeRegression`] is a small built-in backend; any other library can be
//! wired in by implementing [`ModelBackend`].
//!
//! ## Example Usage
//!
//! ```
//! use cachesim::policy::l2cache::{FeatureMatrix, ModelBackend, RidgeRegression, TrainingSet};
//!
//! let mut x = FeatureMatrix::new(1);
//! let mut y = Vec::new();
//! for i in 0..20 {
//!     x.push_row(&[i as f32]);
//!     y.push(2.0 * i as f32 + 1.0);
//! }
//! let set = TrainingSet { train_x: x, train_y: y, valid_x: FeatureMatrix::new(1), valid_y: vec![] };
//! let model = RidgeRegression::new(1e-6).fit(&set).unwrap();
//!
//! let mut query = FeatureMatrix::new(1);
//! query.push_row(&[30.0]);
//! let pred = model.predict(&query).unwrap();
//! assert!((pred[0] - 61.0).abs() < 0.1);
//! ```

use crate::error::ModelError;

/// Row-major `f32` matrix with a fixed column count.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    n_features: usize,
    data: Vec<f32>,
}

impl FeatureMatrix {
    pub fn new(n_features: usize) -> Self {
        Self {
            n_features,
            data: Vec::new(),
        }
    }

    pub fn with_capacity(n_features: usize, rows: usize) -> Self {
        Self {
            n_features,
            data: Vec::with_capacity(n_features * rows),
        }
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_rows(&self) -> usize {
        if self.n_features == 0 {
            0
        } else {
            self.data.len() / self.n_features
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Appends a row. Panics if `row.len() != n_features`.
    pub fn push_row(&mut self, row: &[f32]) {
        assert_eq!(row.len(), self.n_features, "feature row length mismatch");
        self.data.extend_from_slice(row);
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.n_features..(i + 1) * self.n_features]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.n_features.max(1))
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub(crate) fn data_mut(&mut self) -> &mut Vec<f32> {
        &mut self.data
    }
}

/// Labelled rows handed to [`ModelBackend::fit`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    pub train_x: FeatureMatrix,
    pub train_y: Vec<f32>,
    pub valid_x: FeatureMatrix,
    pub valid_y: Vec<f32>,
}

/// Fits scoring models. Shared by every cache built from the same template.
pub trait ModelBackend: Send + Sync {
    fn fit(&self, data: &TrainingSet) -> Result<Box<dyn ScoringModel>, ModelError>;
}

/// A trained model owned by one cache instance.
pub trait ScoringModel: Send {
    /// One prediction per row of `features`.
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f32>, ModelError>;
}

/// Closed-form ridge regression on standardized features.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RidgeRegression {
    lambda: f64,
}

impl RidgeRegression {
    pub fn new(lambda: f64) -> Self {
        Self {
            lambda: lambda.max(0.0),
        }
    }
}

impl Default for RidgeRegression {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[derive(Debug, Clone)]
struct RidgeModel {
    means: Vec<f64>,
    scales: Vec<f64>,
    weights: Vec<f64>,
    intercept: f64,
}

impl ModelBackend for RidgeRegression {
    fn fit(&self, data: &TrainingSet) -> Result<Box<dyn ScoringModel>, ModelError> {
        let x = &data.train_x;
        let n = x.n_rows();
        let d = x.n_features();
        if n == 0 || d == 0 {
            return Err(ModelError::new("empty training set"));
        }
        if data.train_y.len() != n {
            return Err(ModelError::new(format!(
                "{} labels for {} training rows",
                data.train_y.len(),
                n
            )));
        }

        let mut means = vec![0.0; d];
        for row in x.rows() {
            for (m, &v) in means.iter_mut().zip(row) {
                *m += f64::from(v);
            }
        }
        means.iter_mut().for_each(|m| *m /= n as f64);

        let mut scales = vec![0.0; d];
        for row in x.rows() {
            for ((s, &v), m) in scales.iter_mut().zip(row).zip(&means) {
                *s += (f64::from(v) - m).powi(2);
            }
        }
        for s in &mut scales {
            *s = (*s / n as f64).sqrt();
            if *s < 1e-12 {
                *s = 1.0;
            }
        }

        let y_mean = data.train_y.iter().map(|&y| f64::from(y)).sum::<f64>() / n as f64;

        // normal equations: (ZᵀZ + λI) w = Zᵀ(y - ȳ)
        let mut a = vec![vec![0.0; d + 1]; d];
        let mut z = vec![0.0; d];
        for (row, &y) in x.rows().zip(&data.train_y) {
            for (zj, ((&v, m), s)) in z.iter_mut().zip(row.iter().zip(&means).zip(&scales)) {
                *zj = (f64::from(v) - m) / s;
            }
            let target = f64::from(y) - y_mean;
            for i in 0..d {
                for j in 0..d {
                    a[i][j] += z[i] * z[j];
                }
                a[i][d] += z[i] * target;
            }
        }
        for (i, row) in a.iter_mut().enumerate() {
            row[i] += self.lambda;
        }

        let weights = solve(a)?;
        let model = RidgeModel {
            means,
            scales,
            weights,
            intercept: y_mean,
        };

        if !data.valid_x.is_empty() {
            let pred = model.predict(&data.valid_x)?;
            let mse = pred
                .iter()
                .zip(&data.valid_y)
                .map(|(&p, &y)| f64::from(p - y).powi(2))
                .sum::<f64>()
                / pred.len().max(1) as f64;
            tracing::debug!(rows = n, valid_rows = pred.len(), mse, "ridge model fitted");
        }
        Ok(Box::new(model))
    }
}

impl ScoringModel for RidgeModel {
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f32>, ModelError> {
        if features.n_features() != self.weights.len() {
            return Err(ModelError::new(format!(
                "model expects {} features, got {}",
                self.weights.len(),
                features.n_features()
            )));
        }
        Ok(features
            .rows()
            .map(|row| {
                let dot: f64 = row
                    .iter()
                    .zip(&self.means)
                    .zip(&self.scales)
                    .zip(&self.weights)
                    .map(|(((&v, m), s), w)| (f64::from(v) - m) / s * w)
                    .sum();
                (self.intercept + dot) as f32
            })
            .collect())
    }
}

// Gaussian elimination with partial pivoting on an augmented d x (d+1) matrix.
fn solve(mut a: Vec<Vec<f64>>) -> Result<Vec<f64>, ModelError> {
    let d = a.len();
    for col in 0..d {
        let pivot = (col..d)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-12 {
            return Err(ModelError::new("singular normal equations"));
        }
        a.swap(col, pivot);
        for row in col + 1..d {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..=d {
                a[row][k] -= factor * a[col][k];
            }
        }
    }

    let mut w = vec![0.0; d];
    for i in (0..d).rev() {
        let tail: f64 = (i + 1..d).map(|j| a[i][j] * w[j]).sum();
        w[i] = (a[i][d] - tail) / a[i][i];
    }
    Ok(w)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(rows: &[[f32; 2]], y: &[f32]) -> TrainingSet {
        let mut x = FeatureMatrix::new(2);
        for row in rows {
            x.push_row(row);
        }
        TrainingSet {
            train_x: x,
            train_y: y.to_vec(),
            valid_x: FeatureMatrix::new(2),
            valid_y: Vec::new(),
        }
    }

    #[test]
    fn matrix_rows_are_row_major() {
        let mut m = FeatureMatrix::with_capacity(3, 2);
        m.push_row(&[1.0, 2.0, 3.0]);
        m.push_row(&[4.0, 5.0, 6.0]);
        assert_eq!(m.n_rows(), 2);
        assert_eq!(m.row(1), &[4.0, 5.0, 6.0]);
        assert_eq!(m.rows().count(), 2);
        m.clear();
        assert!(m.is_empty());
    }

    #[test]
    fn ridge_recovers_linear_relation() {
        let rows: Vec<[f32; 2]> = (0..50).map(|i| [i as f32, (i % 7) as f32]).collect();
        let y: Vec<f32> = rows.iter().map(|r| 3.0 * r[0] - 2.0 * r[1] + 5.0).collect();
        let model = RidgeRegression::new(1e-6).fit(&set(&rows, &y)).unwrap();

        let mut query = FeatureMatrix::new(2);
        query.push_row(&[10.0, 3.0]);
        let pred = model.predict(&query).unwrap();
        assert!((pred[0] - 29.0).abs() < 0.05, "pred = {}", pred[0]);
    }

    #[test]
    fn constant_columns_do_not_make_the_system_singular() {
        let rows = [[1.0, 7.0], [2.0, 7.0], [3.0, 7.0]];
        let model = RidgeRegression::default().fit(&set(&rows, &[1.0, 2.0, 3.0]));
        assert!(model.is_ok());
    }

    #[test]
    fn fit_rejects_empty_and_mismatched_sets() {
        assert!(RidgeRegression::default().fit(&set(&[], &[])).is_err());
        assert!(RidgeRegression::default()
            .fit(&set(&[[1.0, 2.0]], &[1.0, 2.0]))
            .is_err());
    }

    #[test]
    fn predict_rejects_wrong_width() {
        let model = RidgeRegression::default()
            .fit(&set(&[[1.0, 2.0], [2.0, 1.0]], &[1.0, 2.0]))
            .unwrap();
        let query = FeatureMatrix::new(3);
        assert!(model.predict(&query).is_err());
    }
}
