//! Model family names

use crate::ClassifierError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The eight supported classifier families, in training order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelFamily {
    LogisticRegression,
    RandomForest,
    #[serde(rename = "SVC")]
    Svc,
    DecisionTree,
    GradientBoosting,
    AdaBoost,
    #[serde(rename = "KNN")]
    Knn,
    #[serde(rename = "GaussianNB")]
    GaussianNb,
}

impl ModelFamily {
    /// Every family in the fixed candidate order
    pub const ALL: [ModelFamily; 8] = [
        ModelFamily::LogisticRegression,
        ModelFamily::RandomForest,
        ModelFamily::Svc,
        ModelFamily::DecisionTree,
        ModelFamily::GradientBoosting,
        ModelFamily::AdaBoost,
        ModelFamily::Knn,
        ModelFamily::GaussianNb,
    ];

    /// Configuration key and report name
    pub fn name(&self) -> &'static str {
        match self {
            ModelFamily::LogisticRegression => "LogisticRegression",
            ModelFamily::RandomForest => "RandomForest",
            ModelFamily::Svc => "SVC",
            ModelFamily::DecisionTree => "DecisionTree",
            ModelFamily::GradientBoosting => "GradientBoosting",
            ModelFamily::AdaBoost => "AdaBoost",
            ModelFamily::Knn => "KNN",
            ModelFamily::GaussianNb => "GaussianNB",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelFamily {
    type Err = ClassifierError;

    /// Case-insensitive lookup by configuration key
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelFamily::ALL
            .into_iter()
            .find(|family| family.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ClassifierError::UnknownFamily(s.to_string()))
    }
}
