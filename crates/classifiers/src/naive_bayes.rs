//! Gaussian Naive Bayes

use crate::common::{check_fit_input, class_weights, softmax_in_place};
use crate::ClassifierError;
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

/// Gaussian NB hyperparameters (scikit-learn names)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GaussianNbParams {
    /// Portion of the largest feature variance added to every variance
    pub var_smoothing: f64,
    /// Class priors; estimated from label frequencies when absent
    pub priors: Option<Vec<f64>>,
}

impl Default for GaussianNbParams {
    fn default() -> Self {
        Self {
            var_smoothing: 1e-9,
            priors: None,
        }
    }
}

/// Fitted per-class Gaussians
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianNbModel {
    /// Shape (n_classes, n_features)
    means: Array2<f64>,
    variances: Array2<f64>,
    log_priors: Vec<f64>,
    /// Classes with no training rows never win
    present: Vec<bool>,
}

impl GaussianNbParams {
    pub fn fit(
        &self,
        x: ArrayView2<'_, f64>,
        y: &[usize],
        n_classes: usize,
    ) -> Result<GaussianNbModel, ClassifierError> {
        check_fit_input(&x, y, n_classes)?;
        if self.var_smoothing < 0.0 {
            return Err(ClassifierError::invalid("var_smoothing", "must be non-negative"));
        }

        let n = y.len();
        let d = x.ncols();
        let counts = class_weights(y, &vec![1.0; n], n_classes);

        let priors = match &self.priors {
            Some(priors) => {
                if priors.len() != n_classes {
                    return Err(ClassifierError::invalid(
                        "priors",
                        &format!("expected {} values, got {}", n_classes, priors.len()),
                    ));
                }
                if priors.iter().any(|p| *p < 0.0) || (priors.iter().sum::<f64>() - 1.0).abs() > 1e-6
                {
                    return Err(ClassifierError::invalid(
                        "priors",
                        "must be non-negative and sum to 1",
                    ));
                }
                priors.clone()
            }
            None => counts.iter().map(|c| c / n as f64).collect(),
        };

        let max_variance = x
            .var_axis(Axis(0), 0.0)
            .iter()
            .cloned()
            .fold(0.0f64, f64::max);
        let mut epsilon = self.var_smoothing * max_variance;
        if epsilon <= 0.0 {
            epsilon = self.var_smoothing.max(f64::MIN_POSITIVE);
        }

        let mut means = Array2::<f64>::zeros((n_classes, d));
        let mut variances = Array2::<f64>::from_elem((n_classes, d), epsilon);
        for (row, &label) in x.axis_iter(Axis(0)).zip(y) {
            let mut mean = means.row_mut(label);
            mean += &row;
        }
        for class in 0..n_classes {
            if counts[class] > 0.0 {
                let mut mean = means.row_mut(class);
                mean /= counts[class];
            }
        }
        for (row, &label) in x.axis_iter(Axis(0)).zip(y) {
            for j in 0..d {
                let diff = row[j] - means[[label, j]];
                variances[[label, j]] += diff * diff / counts[label];
            }
        }

        debug!(
            "Gaussian NB fitted: {} classes, {} features, epsilon {:e}",
            n_classes, d, epsilon
        );
        Ok(GaussianNbModel {
            means,
            variances,
            log_priors: priors.iter().map(|p| p.ln()).collect(),
            present: counts.iter().map(|c| *c > 0.0).collect(),
        })
    }
}

impl GaussianNbModel {
    pub fn n_features(&self) -> usize {
        self.means.ncols()
    }

    pub fn n_classes(&self) -> usize {
        self.means.nrows()
    }

    /// Joint log-likelihood per class
    pub fn joint_log_likelihood(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let k = self.n_classes();
        let mut out = Array2::<f64>::zeros((x.nrows(), k));
        for (i, row) in x.axis_iter(Axis(0)).enumerate() {
            for class in 0..k {
                if !self.present[class] {
                    out[[i, class]] = f64::NEG_INFINITY;
                    continue;
                }
                let mut ll = self.log_priors[class];
                for (j, &v) in row.iter().enumerate() {
                    let var = self.variances[[class, j]];
                    let diff = v - self.means[[class, j]];
                    ll -= 0.5 * (2.0 * PI * var).ln() + 0.5 * diff * diff / var;
                }
                out[[i, class]] = ll;
            }
        }
        out
    }

    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut jll = self.joint_log_likelihood(x);
        for mut row in jll.axis_iter_mut(Axis(0)) {
            let mut scores = row.to_vec();
            softmax_in_place(&mut scores);
            row.iter_mut().zip(scores).for_each(|(dst, p)| *dst = p);
        }
        jll
    }
}
