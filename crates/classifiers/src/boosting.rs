//! Gradient Boosting
//!
//! Multinomial deviance: each stage fits one regression tree per class to
//! the negative gradient, then replaces leaf means with a single Newton step.

use crate::common::{check_fit_input, rng_from, softmax_rows, MaxFeatures};
use crate::tree::{GrowthLimits, RegressionTree};
use crate::ClassifierError;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Gradient boosting hyperparameters (scikit-learn names)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GradientBoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Fraction of rows drawn (without replacement) for each stage
    pub subsample: f64,
    pub max_features: Option<MaxFeatures>,
    pub random_state: Option<u64>,
}

impl Default for GradientBoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: Some(3),
            min_samples_split: 2,
            min_samples_leaf: 1,
            subsample: 1.0,
            max_features: None,
            random_state: None,
        }
    }
}

/// Fitted boosted ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingModel {
    /// Log prior per class
    init: Vec<f64>,
    /// `stages[m][k]` is the tree for class `k` at stage `m`
    stages: Vec<Vec<RegressionTree>>,
    learning_rate: f64,
    n_features: usize,
}

impl GradientBoostingParams {
    fn limits(&self) -> GrowthLimits {
        GrowthLimits {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features,
        }
    }

    fn validate(&self) -> Result<(), ClassifierError> {
        if self.n_estimators == 0 {
            return Err(ClassifierError::invalid("n_estimators", "must be at least 1"));
        }
        if self.learning_rate <= 0.0 {
            return Err(ClassifierError::invalid("learning_rate", "must be positive"));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(ClassifierError::invalid("subsample", "must be in (0, 1]"));
        }
        self.limits().validate()
    }

    pub fn fit(
        &self,
        x: ArrayView2<'_, f64>,
        y: &[usize],
        n_classes: usize,
    ) -> Result<GradientBoostingModel, ClassifierError> {
        check_fit_input(&x, y, n_classes)?;
        self.validate()?;

        let n = y.len();
        let mut rng = rng_from(self.random_state);
        let limits = self.limits();

        let mut counts = vec![0.0; n_classes];
        for &label in y {
            counts[label] += 1.0;
        }
        let init: Vec<f64> = counts
            .iter()
            .map(|c| (c / n as f64).max(f64::EPSILON).ln())
            .collect();

        let mut raw = Array2::<f64>::zeros((n, n_classes));
        for mut row in raw.axis_iter_mut(Axis(0)) {
            row.assign(&Array1::from(init.clone()));
        }

        let k_factor = (n_classes as f64 - 1.0) / n_classes as f64;
        let n_sub = ((self.subsample * n as f64) as usize).clamp(1, n);
        let mut stages = Vec::with_capacity(self.n_estimators);

        for stage in 0..self.n_estimators {
            let proba = softmax_rows(raw.clone());
            let samples: Vec<usize> = if n_sub < n {
                let mut drawn = rand::seq::index::sample(&mut rng, n, n_sub).into_vec();
                drawn.sort_unstable();
                drawn
            } else {
                (0..n).collect()
            };

            let mut trees = Vec::with_capacity(n_classes);
            for class in 0..n_classes {
                let residuals: Vec<f64> = (0..n)
                    .map(|i| f64::from(u8::from(y[i] == class)) - proba[[i, class]])
                    .collect();
                let newton_step = |idx: &[usize]| {
                    let numerator: f64 = idx.iter().map(|&i| residuals[i]).sum();
                    let denominator: f64 = idx
                        .iter()
                        .map(|&i| {
                            let r = residuals[i].abs();
                            r * (1.0 - r)
                        })
                        .sum();
                    if denominator.abs() < 1e-150 {
                        0.0
                    } else {
                        k_factor * numerator / denominator
                    }
                };
                let tree =
                    RegressionTree::fit(x, &residuals, samples.clone(), limits, newton_step, &mut rng);
                for (i, row) in x.axis_iter(Axis(0)).enumerate() {
                    raw[[i, class]] += self.learning_rate * tree.predict_row(row);
                }
                trees.push(tree);
            }
            stages.push(trees);

            if (stage + 1) % 25 == 0 {
                debug!("Gradient boosting: {} / {} stages", stage + 1, self.n_estimators);
            }
        }

        Ok(GradientBoostingModel {
            init,
            stages,
            learning_rate: self.learning_rate,
            n_features: x.ncols(),
        })
    }
}

impl GradientBoostingModel {
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.init.len()
    }

    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut raw = Array2::<f64>::zeros((x.nrows(), self.init.len()));
        for (i, row) in x.axis_iter(Axis(0)).enumerate() {
            for (k, prior) in self.init.iter().enumerate() {
                raw[[i, k]] = *prior
                    + self.learning_rate
                        * self
                            .stages
                            .iter()
                            .map(|trees| trees[k].predict_row(row))
                            .sum::<f64>();
            }
        }
        softmax_rows(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_three_class_fit() {
        let x = array![[0.0], [0.5], [1.0], [5.0], [5.5], [6.0], [10.0], [10.5], [11.0]];
        let y = [0, 0, 0, 1, 1, 1, 2, 2, 2];
        let params = GradientBoostingParams {
            n_estimators: 30,
            random_state: Some(0),
            ..Default::default()
        };
        let model = params.fit(x.view(), &y, 3).unwrap();
        assert_eq!(model.n_stages(), 30);

        let proba = model.predict_proba(x.view());
        for (row, &label) in proba.rows().into_iter().zip(&y) {
            assert!((row.sum() - 1.0).abs() < 1e-9);
            assert!(row[label] > 0.6, "row {:?} label {}", row, label);
        }
    }

    #[test]
    fn test_subsample_is_seeded() {
        let x = array![[0.0, 1.0], [1.0, 0.0], [2.0, 1.0], [3.0, 0.0], [4.0, 1.0], [5.0, 0.0]];
        let y = [0, 0, 0, 1, 1, 1];
        let params = GradientBoostingParams {
            n_estimators: 5,
            subsample: 0.5,
            random_state: Some(11),
            ..Default::default()
        };
        let a = params.fit(x.view(), &y, 2).unwrap();
        let b = params.fit(x.view(), &y, 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_subsample() {
        let params = GradientBoostingParams {
            subsample: 0.0,
            ..Default::default()
        };
        let x = array![[0.0], [1.0]];
        assert!(params.fit(x.view(), &[0, 1], 2).is_err());
    }
}
