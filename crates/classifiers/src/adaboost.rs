//! AdaBoost (SAMME)

use crate::common::{argmax, check_fit_input, rng_from, softmax_rows, Criterion};
use crate::tree::{DecisionTreeModel, DecisionTreeParams};
use crate::ClassifierError;
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// AdaBoost hyperparameters; `max_depth` configures the weak learner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdaBoostParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub random_state: Option<u64>,
}

impl Default for AdaBoostParams {
    fn default() -> Self {
        Self {
            n_estimators: 50,
            learning_rate: 1.0,
            max_depth: 1,
            random_state: None,
        }
    }
}

/// Fitted SAMME ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaBoostModel {
    estimators: Vec<(DecisionTreeModel, f64)>,
    n_features: usize,
    n_classes: usize,
}

impl AdaBoostParams {
    pub fn fit(
        &self,
        x: ArrayView2<'_, f64>,
        y: &[usize],
        n_classes: usize,
    ) -> Result<AdaBoostModel, ClassifierError> {
        check_fit_input(&x, y, n_classes)?;
        if self.n_estimators == 0 {
            return Err(ClassifierError::invalid("n_estimators", "must be at least 1"));
        }
        if self.learning_rate <= 0.0 {
            return Err(ClassifierError::invalid("learning_rate", "must be positive"));
        }
        if self.max_depth == 0 {
            return Err(ClassifierError::invalid("max_depth", "must be at least 1"));
        }

        let n = y.len();
        let k = n_classes as f64;
        let stump = DecisionTreeParams {
            criterion: Criterion::Gini,
            max_depth: Some(self.max_depth),
            ..Default::default()
        };
        let mut rng = rng_from(self.random_state);
        let mut weights = vec![1.0 / n as f64; n];
        let mut estimators = Vec::with_capacity(self.n_estimators);

        for round in 0..self.n_estimators {
            let tree = stump.fit_weighted(x, y, &weights, n_classes, &mut rng)?;
            let incorrect: Vec<bool> = x
                .axis_iter(Axis(0))
                .zip(y)
                .map(|(row, &label)| {
                    let dist = tree.leaf_distribution(row);
                    argmax(ndarray::ArrayView1::from(dist)) != label
                })
                .collect();

            let total: f64 = weights.iter().sum();
            let error: f64 = weights
                .iter()
                .zip(&incorrect)
                .filter(|(_, wrong)| **wrong)
                .map(|(w, _)| w)
                .sum::<f64>()
                / total;

            if error <= 0.0 {
                estimators.push((tree, 1.0));
                debug!("AdaBoost: perfect fit at round {}", round);
                break;
            }
            if error >= 1.0 - 1.0 / k {
                if estimators.is_empty() {
                    return Err(ClassifierError::WeakLearner(format!(
                        "first estimator error {:.4} is no better than chance",
                        error
                    )));
                }
                warn!("AdaBoost stopped at round {}: weak learner error {:.4}", round, error);
                break;
            }

            let alpha = self.learning_rate * (((1.0 - error) / error).ln() + (k - 1.0).ln());
            estimators.push((tree, alpha));

            if round + 1 == self.n_estimators {
                break;
            }
            for (w, &wrong) in weights.iter_mut().zip(&incorrect) {
                if wrong && *w > 0.0 {
                    *w *= alpha.exp();
                }
            }
            let total: f64 = weights.iter().sum();
            if !total.is_finite() || total <= 0.0 {
                warn!("AdaBoost stopped at round {}: sample weights degenerated", round);
                break;
            }
            weights.iter_mut().for_each(|w| *w /= total);
        }

        debug!("AdaBoost fitted {} weak learners", estimators.len());
        Ok(AdaBoostModel {
            estimators,
            n_features: x.ncols(),
            n_classes,
        })
    }
}

impl AdaBoostModel {
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_estimators(&self) -> usize {
        self.estimators.len()
    }

    /// Weighted SAMME vote, normalised by the total estimator weight
    pub fn decision_function(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let k = self.n_classes;
        let miss = -1.0 / (k as f64 - 1.0);
        let total: f64 = self.estimators.iter().map(|(_, a)| a).sum();
        let mut out = Array2::<f64>::zeros((x.nrows(), k));
        for (i, row) in x.axis_iter(Axis(0)).enumerate() {
            for (tree, alpha) in &self.estimators {
                let vote = argmax(ndarray::ArrayView1::from(tree.leaf_distribution(row)));
                for class in 0..k {
                    out[[i, class]] += alpha * if class == vote { 1.0 } else { miss };
                }
            }
        }
        if total > 0.0 {
            out /= total;
        }
        out
    }

    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let scale = (self.n_classes as f64 - 1.0).max(1.0);
        softmax_rows(self.decision_function(x) / scale)
    }
}
