//! Classifier Families
//!
//! Eight probabilistic classifiers over dense `ndarray` matrices:
//! logistic regression, random forest, SVC, decision tree, gradient
//! boosting, AdaBoost, k-nearest neighbours and Gaussian naive Bayes.
//! Every family takes label codes in `[0, n_classes)` and returns one
//! probability column per class.

mod adaboost;
mod boosting;
mod common;
mod estimator;
mod family;
mod forest;
mod knn;
mod logistic;
mod naive_bayes;
mod svm;
mod tree;

pub use adaboost::{AdaBoostModel, AdaBoostParams};
pub use boosting::{GradientBoostingModel, GradientBoostingParams};
pub use common::{thread_pool, Criterion, MaxFeatures};
pub use estimator::{Estimator, FittedClassifier};
pub use family::ModelFamily;
pub use forest::{RandomForestModel, RandomForestParams};
pub use knn::{KnnModel, KnnParams, NeighborWeights};
pub use logistic::{LogisticRegressionModel, LogisticRegressionParams};
pub use naive_bayes::{GaussianNbModel, GaussianNbParams};
pub use svm::{Gamma, KernelKind, SvcModel, SvcParams};
pub use tree::{DecisionTreeModel, DecisionTreeParams};

use thiserror::Error;

/// Errors while configuring, fitting or applying a classifier
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClassifierError {
    #[error("Cannot fit on an empty training set")]
    EmptyTrainingSet,
    #[error("Label count mismatch: {rows} rows, {labels} labels")]
    LabelCountMismatch { rows: usize, labels: usize },
    #[error("At least 2 classes are required, got {0}")]
    InsufficientClasses(usize),
    #[error("Label {label} out of range for {n_classes} classes")]
    LabelOutOfRange { label: usize, n_classes: usize },
    #[error("Training data contains NaN or infinite values")]
    NonFiniteInput,
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("Invalid parameters for {family}: {reason}")]
    InvalidParams { family: String, reason: String },
    #[error("Unknown model family: {0}")]
    UnknownFamily(String),
    #[error("Feature count mismatch: expected {expected}, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },
    #[error("Weak learner failed: {0}")]
    WeakLearner(String),
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

impl ClassifierError {
    pub(crate) fn invalid(name: &'static str, reason: &str) -> Self {
        ClassifierError::InvalidParameter {
            name,
            reason: reason.to_string(),
        }
    }
}
