//! Shared helpers for the classifier families

use crate::ClassifierError;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seeded generator, or entropy-seeded when no state is configured
pub(crate) fn rng_from(random_state: Option<u64>) -> StdRng {
    match random_state {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::seed_from_u64(rand::rng().random()),
    }
}

/// Check that inputs line up before fitting
pub(crate) fn check_fit_input(
    x: &ArrayView2<'_, f64>,
    y: &[usize],
    n_classes: usize,
) -> Result<(), ClassifierError> {
    if x.nrows() == 0 {
        return Err(ClassifierError::EmptyTrainingSet);
    }
    if x.nrows() != y.len() {
        return Err(ClassifierError::LabelCountMismatch {
            rows: x.nrows(),
            labels: y.len(),
        });
    }
    if n_classes < 2 {
        return Err(ClassifierError::InsufficientClasses(n_classes));
    }
    if let Some(&bad) = y.iter().find(|&&label| label >= n_classes) {
        return Err(ClassifierError::LabelOutOfRange {
            label: bad,
            n_classes,
        });
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(ClassifierError::NonFiniteInput);
    }
    Ok(())
}

/// Weighted class histogram
pub(crate) fn class_weights(y: &[usize], weights: &[f64], n_classes: usize) -> Vec<f64> {
    let mut counts = vec![0.0; n_classes];
    for (&label, &w) in y.iter().zip(weights) {
        counts[label] += w;
    }
    counts
}

/// Numerically stable softmax of one row of scores, in place.
/// `-inf` scores get probability zero.
pub(crate) fn softmax_in_place(scores: &mut [f64]) {
    let max = scores
        .iter()
        .cloned()
        .filter(|s| s.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        let uniform = 1.0 / scores.len() as f64;
        scores.iter_mut().for_each(|s| *s = uniform);
        return;
    }
    let mut total = 0.0;
    for s in scores.iter_mut() {
        *s = if s.is_finite() { (*s - max).exp() } else { 0.0 };
        total += *s;
    }
    for s in scores.iter_mut() {
        *s /= total;
    }
}

/// Row-wise softmax of a score matrix
pub(crate) fn softmax_rows(mut scores: Array2<f64>) -> Array2<f64> {
    for mut row in scores.axis_iter_mut(Axis(0)) {
        if let Some(slice) = row.as_slice_mut() {
            softmax_in_place(slice);
        } else {
            let mut owned = row.to_vec();
            softmax_in_place(&mut owned);
            row.iter_mut().zip(owned).for_each(|(dst, v)| *dst = v);
        }
    }
    scores
}

/// Index of the largest value; lowest index wins ties
pub(crate) fn argmax(values: ArrayView1<'_, f64>) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Number of candidate features examined per split
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxFeatures {
    /// Square root of the feature count
    Sqrt,
    /// Base-2 logarithm of the feature count
    Log2,
    /// Every feature
    All,
    /// Fixed number of features
    #[serde(untagged)]
    Count(usize),
    /// Fraction of the feature count
    #[serde(untagged)]
    Fraction(f64),
}

impl MaxFeatures {
    pub(crate) fn resolve(&self, n_features: usize) -> usize {
        let n = n_features as f64;
        let k = match self {
            MaxFeatures::Sqrt => n.sqrt() as usize,
            MaxFeatures::Log2 => n.log2() as usize,
            MaxFeatures::All => n_features,
            MaxFeatures::Count(k) => *k,
            MaxFeatures::Fraction(f) => (f * n) as usize,
        };
        k.clamp(1, n_features.max(1))
    }
}

/// Split quality criterion for classification trees
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    #[default]
    Gini,
    Entropy,
}

impl Criterion {
    /// Impurity of a weighted class histogram with total weight `total`
    pub(crate) fn impurity(&self, counts: &[f64], total: f64) -> f64 {
        if total <= 0.0 {
            return 0.0;
        }
        match self {
            Criterion::Gini => {
                1.0 - counts
                    .iter()
                    .map(|c| {
                        let p = c / total;
                        p * p
                    })
                    .sum::<f64>()
            }
            Criterion::Entropy => -counts
                .iter()
                .filter(|c| **c > 0.0)
                .map(|c| {
                    let p = c / total;
                    p * p.log2()
                })
                .sum::<f64>(),
        }
    }
}

/// Build a rayon pool honoring a scikit-style `n_jobs` (`<= 0` means all cores)
pub fn thread_pool(n_jobs: i32) -> Result<rayon::ThreadPool, ClassifierError> {
    let threads = if n_jobs <= 0 { 0 } else { n_jobs as usize };
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| ClassifierError::ThreadPool(e.to_string()))
}
