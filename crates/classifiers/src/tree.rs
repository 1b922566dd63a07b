//! CART Decision Trees
//!
//! One split search serves both classification trees (weighted class
//! histograms) and the regression trees used by gradient boosting.

use crate::common::{check_fit_input, rng_from, Criterion, MaxFeatures};
use crate::ClassifierError;
use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Growth limits shared by every tree flavour
#[derive(Debug, Clone, Copy)]
pub(crate) struct GrowthLimits {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: Option<MaxFeatures>,
}

impl GrowthLimits {
    pub(crate) fn validate(&self) -> Result<(), ClassifierError> {
        if self.min_samples_split < 2 {
            return Err(ClassifierError::invalid("min_samples_split", "must be at least 2"));
        }
        if self.min_samples_leaf < 1 {
            return Err(ClassifierError::invalid("min_samples_leaf", "must be at least 1"));
        }
        if self.max_depth == Some(0) {
            return Err(ClassifierError::invalid("max_depth", "must be at least 1"));
        }
        match self.max_features {
            Some(MaxFeatures::Count(0)) => {
                Err(ClassifierError::invalid("max_features", "must be at least 1"))
            }
            Some(MaxFeatures::Fraction(f)) if !(f > 0.0 && f <= 1.0) => {
                Err(ClassifierError::invalid("max_features", "fraction must be in (0, 1]"))
            }
            _ => Ok(()),
        }
    }
}

/// Tree node stored in a flat arena
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum Node<L> {
    Leaf(L),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Walk from the root to the leaf reached by `row`
pub(crate) fn leaf_for<'a, L>(nodes: &'a [Node<L>], row: ArrayView1<'_, f64>) -> &'a L {
    let mut idx = 0;
    loop {
        match &nodes[idx] {
            Node::Leaf(value) => return value,
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                idx = if row[*feature] <= *threshold { *left } else { *right };
            }
        }
    }
}

/// Split statistics for one kind of target
pub(crate) trait SplitTarget {
    type Acc: Clone;
    type Leaf;

    fn empty(&self) -> Self::Acc;
    fn add(&self, acc: &mut Self::Acc, sample: usize);
    fn remove(&self, acc: &mut Self::Acc, sample: usize);
    /// Impurity scaled by node weight, so child costs add up
    fn cost(&self, acc: &Self::Acc) -> f64;
    fn is_pure(&self, acc: &Self::Acc) -> bool {
        self.cost(acc) <= PURITY_EPSILON
    }
    fn leaf(&self, samples: &[usize], acc: &Self::Acc) -> Self::Leaf;
}

/// Weighted class histogram target
pub(crate) struct ClassTarget<'a> {
    pub y: &'a [usize],
    pub weights: &'a [f64],
    pub n_classes: usize,
    pub criterion: Criterion,
}

impl SplitTarget for ClassTarget<'_> {
    type Acc = (Vec<f64>, f64);
    type Leaf = Vec<f64>;

    fn empty(&self) -> Self::Acc {
        (vec![0.0; self.n_classes], 0.0)
    }

    fn add(&self, acc: &mut Self::Acc, sample: usize) {
        let w = self.weights[sample];
        acc.0[self.y[sample]] += w;
        acc.1 += w;
    }

    fn remove(&self, acc: &mut Self::Acc, sample: usize) {
        let w = self.weights[sample];
        acc.0[self.y[sample]] -= w;
        acc.1 -= w;
    }

    fn cost(&self, acc: &Self::Acc) -> f64 {
        acc.1 * self.criterion.impurity(&acc.0, acc.1)
    }

    fn is_pure(&self, acc: &Self::Acc) -> bool {
        acc.0.iter().filter(|c| **c > 0.0).count() <= 1
    }

    fn leaf(&self, _samples: &[usize], acc: &Self::Acc) -> Vec<f64> {
        if acc.1 <= 0.0 {
            return vec![1.0 / self.n_classes as f64; self.n_classes];
        }
        acc.0.iter().map(|c| (c / acc.1).max(0.0)).collect()
    }
}

/// Squared-error target with a caller-supplied leaf value
pub(crate) struct RegressionTarget<'a, F> {
    pub residuals: &'a [f64],
    pub leaf_value: F,
}

impl<F> SplitTarget for RegressionTarget<'_, F>
where
    F: Fn(&[usize]) -> f64,
{
    /// (sum, sum of squares, count)
    type Acc = (f64, f64, usize);
    type Leaf = f64;

    fn empty(&self) -> Self::Acc {
        (0.0, 0.0, 0)
    }

    fn add(&self, acc: &mut Self::Acc, sample: usize) {
        let r = self.residuals[sample];
        acc.0 += r;
        acc.1 += r * r;
        acc.2 += 1;
    }

    fn remove(&self, acc: &mut Self::Acc, sample: usize) {
        let r = self.residuals[sample];
        acc.0 -= r;
        acc.1 -= r * r;
        acc.2 -= 1;
    }

    fn cost(&self, acc: &Self::Acc) -> f64 {
        if acc.2 == 0 {
            return 0.0;
        }
        (acc.1 - acc.0 * acc.0 / acc.2 as f64).max(0.0)
    }

    fn leaf(&self, samples: &[usize], _acc: &Self::Acc) -> f64 {
        (self.leaf_value)(samples)
    }
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    cost: f64,
}

/// Recursive CART grower over a sample subset
pub(crate) struct TreeGrower<'x, 't, T: SplitTarget> {
    x: ArrayView2<'x, f64>,
    target: &'t T,
    limits: GrowthLimits,
    nodes: Vec<Node<T::Leaf>>,
}

const PURITY_EPSILON: f64 = 1e-12;

impl<'x, 't, T: SplitTarget> TreeGrower<'x, 't, T> {
    pub(crate) fn new(x: ArrayView2<'x, f64>, target: &'t T, limits: GrowthLimits) -> Self {
        Self {
            x,
            target,
            limits,
            nodes: Vec::new(),
        }
    }

    pub(crate) fn grow(mut self, samples: Vec<usize>, rng: &mut StdRng) -> Vec<Node<T::Leaf>> {
        self.build(samples, 0, rng);
        self.nodes
    }

    fn build(&mut self, samples: Vec<usize>, depth: usize, rng: &mut StdRng) -> usize {
        let mut acc = self.target.empty();
        for &s in &samples {
            self.target.add(&mut acc, s);
        }

        let n = samples.len();
        let depth_reached = self.limits.max_depth.is_some_and(|max| depth >= max);
        let too_small =
            n < self.limits.min_samples_split || n < 2 * self.limits.min_samples_leaf;
        let pure = self.target.is_pure(&acc);

        let split = if depth_reached || too_small || pure {
            None
        } else {
            self.best_split(&samples, &acc, rng)
        };

        let Some(split) = split else {
            let idx = self.nodes.len();
            let leaf = self.target.leaf(&samples, &acc);
            self.nodes.push(Node::Leaf(leaf));
            return idx;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&s| self.x[[s, split.feature]] <= split.threshold);

        // Reserve the slot so the parent precedes its children
        let idx = self.nodes.len();
        self.nodes.push(Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: 0,
            right: 0,
        });

        let left_idx = self.build(left, depth + 1, rng);
        let right_idx = self.build(right, depth + 1, rng);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: left_idx,
            right: right_idx,
        };
        idx
    }

    fn best_split(&self, samples: &[usize], total: &T::Acc, rng: &mut StdRng) -> Option<BestSplit> {
        let n_features = self.x.ncols();
        let features: Vec<usize> = match self.limits.max_features {
            Some(max) if max.resolve(n_features) < n_features => {
                rand::seq::index::sample(rng, n_features, max.resolve(n_features)).into_vec()
            }
            _ => (0..n_features).collect(),
        };

        let min_leaf = self.limits.min_samples_leaf;
        let n = samples.len();
        let mut best: Option<BestSplit> = None;
        let mut order = samples.to_vec();

        for feature in features {
            order.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));

            let mut left = self.target.empty();
            let mut right = total.clone();
            for pos in 0..n - 1 {
                let sample = order[pos];
                self.target.add(&mut left, sample);
                self.target.remove(&mut right, sample);

                let here = self.x[[sample, feature]];
                let next = self.x[[order[pos + 1], feature]];
                if here == next {
                    continue;
                }
                let left_n = pos + 1;
                if left_n < min_leaf || n - left_n < min_leaf {
                    continue;
                }

                let cost = self.target.cost(&left) + self.target.cost(&right);
                if best.as_ref().map_or(true, |b| cost < b.cost) {
                    let mid = here + (next - here) / 2.0;
                    let threshold = if mid >= next { here } else { mid };
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        cost,
                    });
                }
            }
        }
        best
    }
}

/// Decision tree hyperparameters (scikit-learn names)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecisionTreeParams {
    pub criterion: Criterion,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: Option<MaxFeatures>,
    pub random_state: Option<u64>,
}

impl Default for DecisionTreeParams {
    fn default() -> Self {
        Self {
            criterion: Criterion::Gini,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            random_state: None,
        }
    }
}

/// Fitted classification tree; leaves hold class probabilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTreeModel {
    nodes: Vec<Node<Vec<f64>>>,
    n_features: usize,
    n_classes: usize,
}

impl DecisionTreeParams {
    pub(crate) fn limits(&self) -> GrowthLimits {
        GrowthLimits {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features,
        }
    }

    pub fn fit(
        &self,
        x: ArrayView2<'_, f64>,
        y: &[usize],
        n_classes: usize,
    ) -> Result<DecisionTreeModel, ClassifierError> {
        check_fit_input(&x, y, n_classes)?;
        let weights = vec![1.0; y.len()];
        let mut rng = rng_from(self.random_state);
        self.fit_weighted(x, y, &weights, n_classes, &mut rng)
    }

    /// Fit with per-sample weights; zero-weight samples are left out
    pub(crate) fn fit_weighted(
        &self,
        x: ArrayView2<'_, f64>,
        y: &[usize],
        weights: &[f64],
        n_classes: usize,
        rng: &mut StdRng,
    ) -> Result<DecisionTreeModel, ClassifierError> {
        let limits = self.limits();
        limits.validate()?;

        let samples: Vec<usize> = (0..y.len()).filter(|&i| weights[i] > 0.0).collect();
        if samples.is_empty() {
            return Err(ClassifierError::EmptyTrainingSet);
        }

        let target = ClassTarget {
            y,
            weights,
            n_classes,
            criterion: self.criterion,
        };
        let nodes = TreeGrower::new(x, &target, limits).grow(samples, rng);
        debug!("Grew decision tree with {} nodes", nodes.len());

        Ok(DecisionTreeModel {
            nodes,
            n_features: x.ncols(),
            n_classes,
        })
    }
}

impl DecisionTreeModel {
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Class distribution of the leaf reached by one row
    pub(crate) fn leaf_distribution(&self, row: ArrayView1<'_, f64>) -> &[f64] {
        leaf_for(&self.nodes, row).as_slice()
    }

    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut out = Array2::<f64>::zeros((x.nrows(), self.n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            for (k, p) in self.leaf_distribution(row).iter().enumerate() {
                out[[i, k]] = *p;
            }
        }
        out
    }
}

/// Fitted regression tree, used as a boosting stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct RegressionTree {
    nodes: Vec<Node<f64>>,
}

impl RegressionTree {
    pub(crate) fn fit<F>(
        x: ArrayView2<'_, f64>,
        residuals: &[f64],
        samples: Vec<usize>,
        limits: GrowthLimits,
        leaf_value: F,
        rng: &mut StdRng,
    ) -> Self
    where
        F: Fn(&[usize]) -> f64,
    {
        let target = RegressionTarget {
            residuals,
            leaf_value,
        };
        let nodes = TreeGrower::new(x, &target, limits).grow(samples, rng);
        Self { nodes }
    }

    pub(crate) fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        *leaf_for(&self.nodes, row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::rng_from;
    use ndarray::array;

    #[test]
    fn test_fits_threshold() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [12.0]];
        let y = [0, 0, 0, 1, 1, 1];
        let model = DecisionTreeParams::default().fit(x.view(), &y, 2).unwrap();
        assert_eq!(model.n_nodes(), 3);

        let proba = model.predict_proba(array![[2.5], [11.5]].view());
        assert_eq!(proba.row(0).to_vec(), vec![1.0, 0.0]);
        assert_eq!(proba.row(1).to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = [0, 1, 0, 1];
        let params = DecisionTreeParams {
            max_depth: Some(1),
            ..Default::default()
        };
        let model = params.fit(x.view(), &y, 2).unwrap();
        assert!(model.n_nodes() <= 3);
    }

    #[test]
    fn test_leaf_holds_mixed_distribution() {
        let x = array![[1.0], [1.0], [1.0]];
        let y = [0, 0, 1];
        let model = DecisionTreeParams::default().fit(x.view(), &y, 2).unwrap();
        let proba = model.predict_proba(array![[1.0]].view());
        assert!((proba[[0, 0]] - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_weight_samples_ignored() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = [0, 1, 1];
        let mut rng = rng_from(Some(0));
        let model = DecisionTreeParams::default()
            .fit_weighted(x.view(), &y, &[1.0, 0.0, 0.0], 2, &mut rng)
            .unwrap();
        assert_eq!(model.n_nodes(), 1);
        assert_eq!(model.predict_proba(x.view())[[2, 0]], 1.0);
    }

    #[test]
    fn test_regression_tree_leaf_means() {
        let x = array![[0.0], [1.0], [5.0], [6.0]];
        let residuals = [1.0, 1.0, -1.0, -1.0];
        let limits = GrowthLimits {
            max_depth: Some(2),
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        };
        let mut rng = rng_from(Some(1));
        let tree = RegressionTree::fit(
            x.view(),
            &residuals,
            vec![0, 1, 2, 3],
            limits,
            |idx| idx.iter().map(|&i| residuals[i]).sum::<f64>() / idx.len().max(1) as f64,
            &mut rng,
        );
        assert_eq!(tree.predict_row(array![0.5].view()), 1.0);
        assert_eq!(tree.predict_row(array![5.5].view()), -1.0);
    }

    /// Fit on a column window of a wider matrix, in a scope shorter than the data
    fn fit_first_column(data: &Array2<f64>, y: &[usize]) -> DecisionTreeModel {
        let window = data.slice(ndarray::s![.., 0..1]);
        DecisionTreeParams::default().fit(window, y, 2).unwrap()
    }

    #[test]
    fn test_fit_on_borrowed_window() {
        let data = array![[1.0, 9.0], [2.0, 8.0], [8.0, 2.0], [9.0, 1.0]];
        let y = [0, 0, 1, 1];
        let model = fit_first_column(&data, &y);
        assert_eq!(model.n_features(), 1);
        assert_eq!(model.leaf_distribution(array![1.5].view()), &[1.0, 0.0]);
        assert_eq!(model.leaf_distribution(array![8.5].view()), &[0.0, 1.0]);
    }

    #[test]
    fn test_regression_tree_borrows_caller_state() {
        let data = array![[0.0, 3.0], [1.0, 3.0], [5.0, 3.0], [6.0, 3.0]];
        let residuals = vec![2.0, 2.0, -2.0, -2.0];
        let limits = GrowthLimits {
            max_depth: Some(1),
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        };
        let scale = 0.5;
        let leaf_value = |idx: &[usize]| {
            scale * idx.iter().map(|&i| residuals[i]).sum::<f64>() / idx.len() as f64
        };
        let mut rng = rng_from(Some(3));
        let tree = RegressionTree::fit(
            data.view(),
            &residuals,
            (0..4).collect(),
            limits,
            leaf_value,
            &mut rng,
        );
        assert_eq!(tree.predict_row(data.row(0)), 1.0);
        assert_eq!(tree.predict_row(data.row(3)), -1.0);
    }

    #[test]
    fn test_invalid_limits() {
        let params = DecisionTreeParams {
            min_samples_split: 1,
            ..Default::default()
        };
        let x = array![[0.0], [1.0]];
        assert!(params.fit(x.view(), &[0, 1], 2).is_err());
    }
}
