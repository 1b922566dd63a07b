//! k-Nearest Neighbours (brute force)

use crate::common::{check_fit_input, thread_pool};
use crate::ClassifierError;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Neighbour vote weighting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NeighborWeights {
    #[default]
    Uniform,
    /// Inverse distance; exact matches take the whole vote
    Distance,
}

/// KNN hyperparameters (scikit-learn names)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KnnParams {
    pub n_neighbors: usize,
    pub weights: NeighborWeights,
    /// Minkowski power
    pub p: f64,
    pub n_jobs: i32,
}

impl Default for KnnParams {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            weights: NeighborWeights::Uniform,
            p: 2.0,
            n_jobs: 1,
        }
    }
}

/// Fitted KNN: the training set itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnModel {
    x: Array2<f64>,
    y: Vec<usize>,
    n_classes: usize,
    n_neighbors: usize,
    weights: NeighborWeights,
    p: f64,
    n_jobs: i32,
}

impl KnnParams {
    pub fn fit(
        &self,
        x: ArrayView2<'_, f64>,
        y: &[usize],
        n_classes: usize,
    ) -> Result<KnnModel, ClassifierError> {
        check_fit_input(&x, y, n_classes)?;
        if self.n_neighbors == 0 {
            return Err(ClassifierError::invalid("n_neighbors", "must be at least 1"));
        }
        if !(self.p >= 1.0) {
            return Err(ClassifierError::invalid("p", "must be at least 1"));
        }
        if self.n_neighbors > y.len() {
            debug!(
                "n_neighbors={} exceeds {} training rows; using all rows",
                self.n_neighbors,
                y.len()
            );
        }
        Ok(KnnModel {
            x: x.to_owned(),
            y: y.to_vec(),
            n_classes,
            n_neighbors: self.n_neighbors.min(y.len()),
            weights: self.weights,
            p: self.p,
            n_jobs: self.n_jobs,
        })
    }
}

impl KnnModel {
    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn distance(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        let p = self.p;
        if p == 2.0 {
            return a
                .iter()
                .zip(b.iter())
                .map(|(u, v)| (u - v) * (u - v))
                .sum::<f64>()
                .sqrt();
        }
        if p == 1.0 {
            return a.iter().zip(b.iter()).map(|(u, v)| (u - v).abs()).sum();
        }
        a.iter()
            .zip(b.iter())
            .map(|(u, v)| (u - v).abs().powf(p))
            .sum::<f64>()
            .powf(1.0 / p)
    }

    fn vote(&self, query: ArrayView1<'_, f64>) -> Vec<f64> {
        let mut neighbors: Vec<(f64, usize)> = self
            .x
            .axis_iter(Axis(0))
            .enumerate()
            .map(|(i, row)| (self.distance(query, row), i))
            .collect();
        // Stable on index so equidistant rows resolve the same way every time
        neighbors.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        neighbors.truncate(self.n_neighbors);

        let mut votes = vec![0.0; self.n_classes];
        match self.weights {
            NeighborWeights::Uniform => {
                for &(_, i) in &neighbors {
                    votes[self.y[i]] += 1.0;
                }
            }
            NeighborWeights::Distance => {
                let exact: Vec<usize> = neighbors
                    .iter()
                    .filter(|(d, _)| *d == 0.0)
                    .map(|&(_, i)| i)
                    .collect();
                if exact.is_empty() {
                    for &(d, i) in &neighbors {
                        votes[self.y[i]] += 1.0 / d;
                    }
                } else {
                    for i in exact {
                        votes[self.y[i]] += 1.0;
                    }
                }
            }
        }
        let total: f64 = votes.iter().sum();
        votes.iter_mut().for_each(|v| *v /= total);
        votes
    }

    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let rows: Vec<ArrayView1<'_, f64>> = x.axis_iter(Axis(0)).collect();
        let votes: Vec<Vec<f64>> = if self.n_jobs == 1 {
            rows.iter().map(|row| self.vote(*row)).collect()
        } else {
            match thread_pool(self.n_jobs) {
                Ok(pool) => pool.install(|| rows.par_iter().map(|row| self.vote(*row)).collect()),
                Err(e) => {
                    warn!("KNN falling back to a single thread: {}", e);
                    rows.iter().map(|row| self.vote(*row)).collect()
                }
            }
        };

        let mut out = Array2::<f64>::zeros((x.nrows(), self.n_classes));
        for (i, row) in votes.into_iter().enumerate() {
            for (k, p) in row.into_iter().enumerate() {
                out[[i, k]] = p;
            }
        }
        out
    }
}
