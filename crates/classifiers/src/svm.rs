//! Support Vector Classifier
//!
//! One binary machine per class (one-vs-rest), each trained with the SMO
//! dual solver using maximal-violating-pair working set selection. Class
//! probabilities are the softmax of the per-class decision values.

use crate::common::{check_fit_input, softmax_rows};
use crate::ClassifierError;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, warn};

/// Kernel function
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelKind {
    Linear,
    Poly,
    #[default]
    Rbf,
    Sigmoid,
}

/// Kernel coefficient for rbf, poly and sigmoid
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gamma {
    /// `1 / (n_features * X.var())`
    #[default]
    Scale,
    /// `1 / n_features`
    Auto,
    #[serde(untagged)]
    Value(f64),
}

/// SVC hyperparameters (scikit-learn names)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SvcParams {
    #[serde(rename = "C", alias = "c")]
    pub c: f64,
    pub kernel: KernelKind,
    pub gamma: Gamma,
    pub degree: u32,
    pub coef0: f64,
    /// Stopping tolerance on the KKT violation
    pub tol: f64,
    /// Solver iteration cap per machine; `-1` means no explicit cap
    pub max_iter: i64,
    /// Accepted for config compatibility; probabilities are always produced
    pub probability: bool,
    pub random_state: Option<u64>,
}

impl Default for SvcParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            kernel: KernelKind::Rbf,
            gamma: Gamma::Scale,
            degree: 3,
            coef0: 0.0,
            tol: 1e-3,
            max_iter: -1,
            probability: true,
            random_state: None,
        }
    }
}

/// Resolved kernel with a concrete gamma
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Kernel {
    kind: KernelKind,
    gamma: f64,
    degree: u32,
    coef0: f64,
}

impl Kernel {
    fn eval(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        match self.kind {
            KernelKind::Linear => a.dot(&b),
            KernelKind::Poly => (self.gamma * a.dot(&b) + self.coef0).powi(self.degree as i32),
            KernelKind::Rbf => {
                let dist: f64 = a.iter().zip(b.iter()).map(|(u, v)| (u - v) * (u - v)).sum();
                (-self.gamma * dist).exp()
            }
            KernelKind::Sigmoid => (self.gamma * a.dot(&b) + self.coef0).tanh(),
        }
    }
}

/// Lazily computed kernel rows, dropped wholesale when the budget fills
struct KernelCache<'a> {
    x: ArrayView2<'a, f64>,
    kernel: Kernel,
    rows: HashMap<usize, Rc<Vec<f64>>>,
    capacity: usize,
}

/// Cache budget in kernel entries (8 bytes each)
const CACHE_ENTRIES: usize = 32 * 1024 * 1024;

impl<'a> KernelCache<'a> {
    fn new(x: ArrayView2<'a, f64>, kernel: Kernel) -> Self {
        let capacity = (CACHE_ENTRIES / x.nrows().max(1)).max(2);
        Self {
            x,
            kernel,
            rows: HashMap::new(),
            capacity,
        }
    }

    fn row(&mut self, i: usize) -> Rc<Vec<f64>> {
        if let Some(row) = self.rows.get(&i) {
            return Rc::clone(row);
        }
        if self.rows.len() >= self.capacity {
            self.rows.clear();
        }
        let xi = self.x.row(i);
        let row: Rc<Vec<f64>> = Rc::new(
            self.x
                .axis_iter(Axis(0))
                .map(|xt| self.kernel.eval(xi, xt))
                .collect(),
        );
        self.rows.insert(i, Rc::clone(&row));
        row
    }
}

/// One fitted binary machine; `None` support set means the class never
/// occurred in training and always scores `-inf`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BinaryMachine {
    support: Option<Array2<f64>>,
    /// `alpha_i * y_i` per support vector
    dual_coef: Vec<f64>,
    rho: f64,
}

impl BinaryMachine {
    fn decision(&self, kernel: &Kernel, row: ArrayView1<'_, f64>) -> f64 {
        match &self.support {
            None => f64::NEG_INFINITY,
            Some(support) => {
                support
                    .axis_iter(Axis(0))
                    .zip(&self.dual_coef)
                    .map(|(sv, coef)| coef * kernel.eval(sv, row))
                    .sum::<f64>()
                    - self.rho
            }
        }
    }
}

/// Fitted one-vs-rest SVC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvcModel {
    kernel: Kernel,
    machines: Vec<BinaryMachine>,
    n_features: usize,
}

const TAU: f64 = 1e-12;

/// SMO solution of the C-SVC dual for labels `y` in {-1, +1}
struct Smo<'a, 'b> {
    y: &'b [f64],
    c: f64,
    tol: f64,
    max_iter: usize,
    cache: KernelCache<'a>,
}

impl Smo<'_, '_> {
    fn solve(mut self) -> (Vec<f64>, f64, usize) {
        let n = self.y.len();
        let y = self.y;
        let c = self.c;
        let diag: Vec<f64> = (0..n)
            .map(|i| self.cache.kernel.eval(self.cache.x.row(i), self.cache.x.row(i)))
            .collect();

        let mut alpha = vec![0.0; n];
        let mut grad = vec![-1.0; n];
        let is_up = |a: f64, yt: f64| (yt > 0.0 && a < c) || (yt < 0.0 && a > 0.0);
        let is_low = |a: f64, yt: f64| (yt > 0.0 && a > 0.0) || (yt < 0.0 && a < c);

        let mut iterations = 0;
        while iterations < self.max_iter {
            // Maximal violating pair
            let mut g_max = f64::NEG_INFINITY;
            let mut g_max2 = f64::NEG_INFINITY;
            let mut i = usize::MAX;
            let mut j = usize::MAX;
            for t in 0..n {
                if is_up(alpha[t], y[t]) && -y[t] * grad[t] > g_max {
                    g_max = -y[t] * grad[t];
                    i = t;
                }
                if is_low(alpha[t], y[t]) && y[t] * grad[t] > g_max2 {
                    g_max2 = y[t] * grad[t];
                    j = t;
                }
            }
            if i == usize::MAX || j == usize::MAX || g_max + g_max2 < self.tol {
                break;
            }
            iterations += 1;

            let k_i = self.cache.row(i);
            let k_j = self.cache.row(j);
            let q_ij = y[i] * y[j] * k_i[j];
            let (old_i, old_j) = (alpha[i], alpha[j]);

            if y[i] != y[j] {
                let mut quad = diag[i] + diag[j] + 2.0 * q_ij;
                if quad <= 0.0 {
                    quad = TAU;
                }
                let delta = (-grad[i] - grad[j]) / quad;
                let diff = alpha[i] - alpha[j];
                alpha[i] += delta;
                alpha[j] += delta;
                if diff > 0.0 {
                    if alpha[j] < 0.0 {
                        alpha[j] = 0.0;
                        alpha[i] = diff;
                    }
                } else if alpha[i] < 0.0 {
                    alpha[i] = 0.0;
                    alpha[j] = -diff;
                }
                if diff > 0.0 {
                    if alpha[i] > c {
                        alpha[i] = c;
                        alpha[j] = c - diff;
                    }
                } else if alpha[j] > c {
                    alpha[j] = c;
                    alpha[i] = c + diff;
                }
            } else {
                let mut quad = diag[i] + diag[j] - 2.0 * q_ij;
                if quad <= 0.0 {
                    quad = TAU;
                }
                let delta = (grad[i] - grad[j]) / quad;
                let sum = alpha[i] + alpha[j];
                alpha[i] -= delta;
                alpha[j] += delta;
                if sum > c {
                    if alpha[i] > c {
                        alpha[i] = c;
                        alpha[j] = sum - c;
                    }
                } else if alpha[j] < 0.0 {
                    alpha[j] = 0.0;
                    alpha[i] = sum;
                }
                if sum > c {
                    if alpha[j] > c {
                        alpha[j] = c;
                        alpha[i] = sum - c;
                    }
                } else if alpha[i] < 0.0 {
                    alpha[i] = 0.0;
                    alpha[j] = sum;
                }
            }

            let d_i = alpha[i] - old_i;
            let d_j = alpha[j] - old_j;
            for t in 0..n {
                grad[t] += y[t] * (y[i] * k_i[t] * d_i + y[j] * k_j[t] * d_j);
            }
        }

        let rho = Self::rho(&alpha, &grad, y, c);
        (alpha, rho, iterations)
    }

    fn rho(alpha: &[f64], grad: &[f64], y: &[f64], c: f64) -> f64 {
        let mut upper = f64::INFINITY;
        let mut lower = f64::NEG_INFINITY;
        let mut free_sum = 0.0;
        let mut free = 0usize;
        for t in 0..alpha.len() {
            let yg = y[t] * grad[t];
            if alpha[t] >= c {
                if y[t] < 0.0 {
                    upper = upper.min(yg);
                } else {
                    lower = lower.max(yg);
                }
            } else if alpha[t] <= 0.0 {
                if y[t] > 0.0 {
                    upper = upper.min(yg);
                } else {
                    lower = lower.max(yg);
                }
            } else {
                free += 1;
                free_sum += yg;
            }
        }
        if free > 0 {
            free_sum / free as f64
        } else {
            match (upper.is_finite(), lower.is_finite()) {
                (true, true) => (upper + lower) / 2.0,
                (true, false) => upper,
                (false, true) => lower,
                (false, false) => 0.0,
            }
        }
    }
}

impl SvcParams {
    fn validate(&self) -> Result<(), ClassifierError> {
        if self.c <= 0.0 {
            return Err(ClassifierError::invalid("C", "must be positive"));
        }
        if self.tol <= 0.0 {
            return Err(ClassifierError::invalid("tol", "must be positive"));
        }
        if let Gamma::Value(g) = self.gamma {
            if g <= 0.0 {
                return Err(ClassifierError::invalid("gamma", "must be positive"));
            }
        }
        if self.max_iter == 0 || self.max_iter < -1 {
            return Err(ClassifierError::invalid("max_iter", "must be positive or -1"));
        }
        Ok(())
    }

    fn resolve_gamma(&self, x: &ArrayView2<'_, f64>) -> f64 {
        let d = x.ncols().max(1) as f64;
        match self.gamma {
            Gamma::Value(g) => g,
            Gamma::Auto => 1.0 / d,
            Gamma::Scale => {
                let variance = x.var(0.0);
                if variance > 0.0 {
                    1.0 / (d * variance)
                } else {
                    1.0
                }
            }
        }
    }

    pub fn fit(
        &self,
        x: ArrayView2<'_, f64>,
        y: &[usize],
        n_classes: usize,
    ) -> Result<SvcModel, ClassifierError> {
        check_fit_input(&x, y, n_classes)?;
        self.validate()?;

        let kernel = Kernel {
            kind: self.kernel,
            gamma: self.resolve_gamma(&x),
            degree: self.degree,
            coef0: self.coef0,
        };
        let n = y.len();
        let max_iter = if self.max_iter < 0 {
            10_000_000usize.max(100 * n)
        } else {
            self.max_iter as usize
        };

        let machines: Vec<BinaryMachine> = (0..n_classes)
            .into_par_iter()
            .map(|class| {
                if !y.contains(&class) {
                    return BinaryMachine {
                        support: None,
                        dual_coef: Vec::new(),
                        rho: 0.0,
                    };
                }
                let signs: Vec<f64> = y
                    .iter()
                    .map(|&label| if label == class { 1.0 } else { -1.0 })
                    .collect();
                let solver = Smo {
                    y: &signs,
                    c: self.c,
                    tol: self.tol,
                    max_iter,
                    cache: KernelCache::new(x, kernel),
                };
                let (alpha, rho, iterations) = solver.solve();
                if iterations >= max_iter {
                    warn!("SVC machine for class {} stopped at max_iter={}", class, max_iter);
                }

                let support_idx: Vec<usize> = (0..n).filter(|&t| alpha[t] > 0.0).collect();
                let support = x.select(Axis(0), &support_idx);
                let dual_coef = support_idx.iter().map(|&t| alpha[t] * signs[t]).collect();
                debug!(
                    "SVC machine {}: {} support vectors after {} iterations",
                    class,
                    support_idx.len(),
                    iterations
                );
                BinaryMachine {
                    support: Some(support),
                    dual_coef,
                    rho,
                }
            })
            .collect();

        Ok(SvcModel {
            kernel,
            machines,
            n_features: x.ncols(),
        })
    }
}

impl SvcModel {
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.machines.len()
    }

    /// Per-class one-vs-rest decision values
    pub fn decision_function(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut out = Array2::<f64>::zeros((x.nrows(), self.machines.len()));
        for (i, row) in x.axis_iter(Axis(0)).enumerate() {
            for (k, machine) in self.machines.iter().enumerate() {
                out[[i, k]] = machine.decision(&self.kernel, row);
            }
        }
        out
    }

    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        softmax_rows(self.decision_function(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_groups() -> (Array2<f64>, Vec<usize>) {
        let x = array![
            [-2.0, -1.0],
            [-1.5, -2.0],
            [-2.5, -1.5],
            [2.0, 1.0],
            [1.5, 2.0],
            [2.5, 1.5]
        ];
        (x, vec![0, 0, 0, 1, 1, 1])
    }

    #[test]
    fn test_linear_kernel_separates() {
        let (x, y) = two_groups();
        let params = SvcParams {
            kernel: KernelKind::Linear,
            ..Default::default()
        };
        let model = params.fit(x.view(), &y, 2).unwrap();
        let decision = model.decision_function(array![[-2.0, -2.0], [2.0, 2.0]].view());
        assert!(decision[[0, 0]] > 0.0 && decision[[0, 1]] < 0.0);
        assert!(decision[[1, 1]] > 0.0 && decision[[1, 0]] < 0.0);
    }

    #[test]
    fn test_rbf_probabilities() {
        let (x, y) = two_groups();
        let model = SvcParams::default().fit(x.view(), &y, 2).unwrap();
        let proba = model.predict_proba(x.view());
        for (row, &label) in proba.rows().into_iter().zip(&y) {
            assert!((row.sum() - 1.0).abs() < 1e-9);
            assert!(row[label] > 0.5);
        }
    }

    #[test]
    fn test_absent_class_gets_zero_probability() {
        let (x, y) = two_groups();
        let model = SvcParams::default().fit(x.view(), &y, 3).unwrap();
        let proba = model.predict_proba(x.view());
        assert!(proba.column(2).iter().all(|&p| p == 0.0));
    }

    #[test]
    fn test_gamma_parsing() {
        let scale: Gamma = serde_json::from_value(serde_json::json!("scale")).unwrap();
        let value: Gamma = serde_json::from_value(serde_json::json!(0.25)).unwrap();
        assert_eq!(scale, Gamma::Scale);
        assert_eq!(value, Gamma::Value(0.25));
    }

    #[test]
    fn test_rejects_bad_c() {
        let (x, y) = two_groups();
        let params = SvcParams {
            c: -1.0,
            ..Default::default()
        };
        assert!(params.fit(x.view(), &y, 2).is_err());
    }
}
