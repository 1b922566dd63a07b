//! Random Forest
//!
//! Bagged CART trees grown in parallel on a rayon pool. Bootstrap draws are
//! expressed as per-sample weights, so a row drawn twice counts twice.

use crate::common::{check_fit_input, rng_from, thread_pool, Criterion, MaxFeatures};
use crate::tree::{DecisionTreeModel, DecisionTreeParams};
use crate::ClassifierError;
use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Random forest hyperparameters (scikit-learn names)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RandomForestParams {
    pub n_estimators: usize,
    pub criterion: Criterion,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: Option<MaxFeatures>,
    pub bootstrap: bool,
    pub random_state: Option<u64>,
    /// Worker threads; `<= 0` uses every core
    pub n_jobs: i32,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            criterion: Criterion::Gini,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: Some(MaxFeatures::Sqrt),
            bootstrap: true,
            random_state: None,
            n_jobs: 1,
        }
    }
}

/// Fitted forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestModel {
    trees: Vec<DecisionTreeModel>,
    n_features: usize,
    n_classes: usize,
}

impl RandomForestParams {
    fn tree_params(&self, seed: u64) -> DecisionTreeParams {
        DecisionTreeParams {
            criterion: self.criterion,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features,
            random_state: Some(seed),
        }
    }

    pub fn fit(
        &self,
        x: ArrayView2<'_, f64>,
        y: &[usize],
        n_classes: usize,
    ) -> Result<RandomForestModel, ClassifierError> {
        check_fit_input(&x, y, n_classes)?;
        if self.n_estimators == 0 {
            return Err(ClassifierError::invalid("n_estimators", "must be at least 1"));
        }
        self.tree_params(0).limits().validate()?;

        let base_seed: u64 = rng_from(self.random_state).random();
        let n = y.len();
        let pool = thread_pool(self.n_jobs)?;

        let trees = pool.install(|| {
            (0..self.n_estimators)
                .into_par_iter()
                .map(|i| {
                    let seed = base_seed.wrapping_add(i as u64);
                    let mut rng = StdRng::seed_from_u64(seed);
                    let weights = if self.bootstrap {
                        let mut counts = vec![0.0; n];
                        for _ in 0..n {
                            counts[rng.random_range(0..n)] += 1.0;
                        }
                        counts
                    } else {
                        vec![1.0; n]
                    };
                    self.tree_params(seed)
                        .fit_weighted(x, y, &weights, n_classes, &mut rng)
                })
                .collect::<Result<Vec<_>, _>>()
        })?;

        debug!(
            "Fitted random forest with {} trees on {} threads",
            trees.len(),
            pool.current_num_threads()
        );
        Ok(RandomForestModel {
            trees,
            n_features: x.ncols(),
            n_classes,
        })
    }
}

impl RandomForestModel {
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut out = Array2::<f64>::zeros((x.nrows(), self.n_classes));
        for tree in &self.trees {
            out += &tree.predict_proba(x);
        }
        out / self.trees.len() as f64
    }
}
