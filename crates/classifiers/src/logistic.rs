//! Multinomial Logistic Regression

use crate::common::{check_fit_input, softmax_rows};
use crate::ClassifierError;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Hyperparameters (scikit-learn names)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogisticRegressionParams {
    /// Inverse L2 regularization strength
    #[serde(rename = "C", alias = "c")]
    pub c: f64,
    pub max_iter: usize,
    /// Stop when the largest gradient component falls below this
    pub tol: f64,
    /// Step size as a multiple of the inverse Lipschitz bound of the loss
    pub learning_rate: f64,
    pub fit_intercept: bool,
    /// Unused by the deterministic solver; accepted for config compatibility
    pub random_state: Option<u64>,
}

impl Default for LogisticRegressionParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 500,
            tol: 1e-4,
            learning_rate: 1.0,
            fit_intercept: true,
            random_state: None,
        }
    }
}

/// Fitted softmax model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegressionModel {
    /// Coefficients, shape (n_features, n_classes)
    weights: Array2<f64>,
    intercept: Array1<f64>,
}

impl LogisticRegressionParams {
    pub fn fit(
        &self,
        x: ArrayView2<'_, f64>,
        y: &[usize],
        n_classes: usize,
    ) -> Result<LogisticRegressionModel, ClassifierError> {
        check_fit_input(&x, y, n_classes)?;
        if self.c <= 0.0 {
            return Err(ClassifierError::invalid("C", "must be positive"));
        }
        if self.learning_rate <= 0.0 {
            return Err(ClassifierError::invalid("learning_rate", "must be positive"));
        }

        let (n, d) = x.dim();
        let mut targets = Array2::<f64>::zeros((n, n_classes));
        for (row, &label) in y.iter().enumerate() {
            targets[[row, label]] = 1.0;
        }

        let mut weights = Array2::<f64>::zeros((d, n_classes));
        let mut intercept = Array1::<f64>::zeros(n_classes);
        let scale = 1.0 / n as f64;
        let penalty = 1.0 / (self.c * n as f64);

        // Softmax cross-entropy Hessian is bounded by 0.5 * ||[X 1]||_F^2 / n
        let lipschitz = 0.5 * (x.iter().map(|v| v * v).sum::<f64>() * scale + 1.0) + penalty;
        let step = self.learning_rate / lipschitz;

        let mut iterations = 0;
        for _ in 0..self.max_iter {
            iterations += 1;
            let scores = x.dot(&weights) + &intercept;
            let residual = softmax_rows(scores) - &targets;

            let grad_w = x.t().dot(&residual) * scale + &weights * penalty;
            let grad_b = residual.sum_axis(Axis(0)) * scale;

            let grad_max = grad_w
                .iter()
                .chain(grad_b.iter())
                .fold(0.0f64, |acc, g| acc.max(g.abs()));

            weights.scaled_add(-step, &grad_w);
            if self.fit_intercept {
                intercept.scaled_add(-step, &grad_b);
            }

            if grad_max < self.tol {
                break;
            }
        }

        debug!(
            "Logistic regression converged after {} iterations ({} features, {} classes)",
            iterations, d, n_classes
        );
        Ok(LogisticRegressionModel { weights, intercept })
    }
}

impl LogisticRegressionModel {
    pub fn n_features(&self) -> usize {
        self.weights.nrows()
    }

    pub fn n_classes(&self) -> usize {
        self.weights.ncols()
    }

    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        softmax_rows(x.dot(&self.weights) + &self.intercept)
    }
}
