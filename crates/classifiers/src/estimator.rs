//! Unfitted estimators and their fitted counterparts
//!
//! [`Estimator`] carries one family's hyperparameters and is built from
//! loosely typed configuration values. Fitting yields a [`FittedClassifier`],
//! which is what gets persisted inside a pipeline artifact.

use crate::adaboost::{AdaBoostModel, AdaBoostParams};
use crate::boosting::{GradientBoostingModel, GradientBoostingParams};
use crate::common::argmax;
use crate::family::ModelFamily;
use crate::forest::{RandomForestModel, RandomForestParams};
use crate::knn::{KnnModel, KnnParams};
use crate::logistic::{LogisticRegressionModel, LogisticRegressionParams};
use crate::naive_bayes::{GaussianNbModel, GaussianNbParams};
use crate::svm::{SvcModel, SvcParams};
use crate::tree::{DecisionTreeModel, DecisionTreeParams};
use crate::ClassifierError;
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Prefix used by pipeline-style parameter grids
const STEP_PREFIX: &str = "model__";

/// One family with its hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", content = "params")]
pub enum Estimator {
    LogisticRegression(LogisticRegressionParams),
    RandomForest(RandomForestParams),
    #[serde(rename = "SVC")]
    Svc(SvcParams),
    DecisionTree(DecisionTreeParams),
    GradientBoosting(GradientBoostingParams),
    AdaBoost(AdaBoostParams),
    #[serde(rename = "KNN")]
    Knn(KnnParams),
    #[serde(rename = "GaussianNB")]
    GaussianNb(GaussianNbParams),
}

impl Estimator {
    pub fn family(&self) -> ModelFamily {
        match self {
            Estimator::LogisticRegression(_) => ModelFamily::LogisticRegression,
            Estimator::RandomForest(_) => ModelFamily::RandomForest,
            Estimator::Svc(_) => ModelFamily::Svc,
            Estimator::DecisionTree(_) => ModelFamily::DecisionTree,
            Estimator::GradientBoosting(_) => ModelFamily::GradientBoosting,
            Estimator::AdaBoost(_) => ModelFamily::AdaBoost,
            Estimator::Knn(_) => ModelFamily::Knn,
            Estimator::GaussianNb(_) => ModelFamily::GaussianNb,
        }
    }

    /// Default hyperparameters of a family
    pub fn default_for(family: ModelFamily) -> Self {
        match family {
            ModelFamily::LogisticRegression => Estimator::LogisticRegression(Default::default()),
            ModelFamily::RandomForest => Estimator::RandomForest(Default::default()),
            ModelFamily::Svc => Estimator::Svc(Default::default()),
            ModelFamily::DecisionTree => Estimator::DecisionTree(Default::default()),
            ModelFamily::GradientBoosting => Estimator::GradientBoosting(Default::default()),
            ModelFamily::AdaBoost => Estimator::AdaBoost(Default::default()),
            ModelFamily::Knn => Estimator::Knn(Default::default()),
            ModelFamily::GaussianNb => Estimator::GaussianNb(Default::default()),
        }
    }

    /// Build from a parameter object; `null` means defaults
    pub fn from_value(family: ModelFamily, params: &Value) -> Result<Self, ClassifierError> {
        let params = match params {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };
        let invalid = |e: serde_json::Error| ClassifierError::InvalidParams {
            family: family.name().to_string(),
            reason: e.to_string(),
        };
        Ok(match family {
            ModelFamily::LogisticRegression => {
                Estimator::LogisticRegression(serde_json::from_value(params).map_err(invalid)?)
            }
            ModelFamily::RandomForest => {
                Estimator::RandomForest(serde_json::from_value(params).map_err(invalid)?)
            }
            ModelFamily::Svc => Estimator::Svc(serde_json::from_value(params).map_err(invalid)?),
            ModelFamily::DecisionTree => {
                Estimator::DecisionTree(serde_json::from_value(params).map_err(invalid)?)
            }
            ModelFamily::GradientBoosting => {
                Estimator::GradientBoosting(serde_json::from_value(params).map_err(invalid)?)
            }
            ModelFamily::AdaBoost => {
                Estimator::AdaBoost(serde_json::from_value(params).map_err(invalid)?)
            }
            ModelFamily::Knn => Estimator::Knn(serde_json::from_value(params).map_err(invalid)?),
            ModelFamily::GaussianNb => {
                Estimator::GaussianNb(serde_json::from_value(params).map_err(invalid)?)
            }
        })
    }

    /// Hyperparameters as a JSON object, using the configuration key names
    pub fn params_json(&self) -> Value {
        let result = match self {
            Estimator::LogisticRegression(p) => serde_json::to_value(p),
            Estimator::RandomForest(p) => serde_json::to_value(p),
            Estimator::Svc(p) => serde_json::to_value(p),
            Estimator::DecisionTree(p) => serde_json::to_value(p),
            Estimator::GradientBoosting(p) => serde_json::to_value(p),
            Estimator::AdaBoost(p) => serde_json::to_value(p),
            Estimator::Knn(p) => serde_json::to_value(p),
            Estimator::GaussianNb(p) => serde_json::to_value(p),
        };
        result.unwrap_or(Value::Null)
    }

    /// Replace individual hyperparameters.
    ///
    /// Keys may carry the `model__` prefix and are matched against existing
    /// names case-insensitively.
    pub fn with_overrides(&self, overrides: &BTreeMap<String, Value>) -> Result<Self, ClassifierError> {
        let mut params = match self.params_json() {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in overrides {
            let key = key.strip_prefix(STEP_PREFIX).unwrap_or(key);
            params.retain(|existing, _| !existing.eq_ignore_ascii_case(key));
            params.insert(key.to_string(), value.clone());
        }
        Self::from_value(self.family(), &Value::Object(params))
    }

    /// Set `random_state` for families that draw random numbers
    pub fn with_random_state(mut self, seed: u64) -> Self {
        match &mut self {
            Estimator::LogisticRegression(p) => p.random_state = Some(seed),
            Estimator::RandomForest(p) => p.random_state = Some(seed),
            Estimator::Svc(p) => p.random_state = Some(seed),
            Estimator::DecisionTree(p) => p.random_state = Some(seed),
            Estimator::GradientBoosting(p) => p.random_state = Some(seed),
            Estimator::AdaBoost(p) => p.random_state = Some(seed),
            Estimator::Knn(_) | Estimator::GaussianNb(_) => {}
        }
        self
    }

    /// Fit on encoded rows `x` with label codes `y` in `[0, n_classes)`
    pub fn fit(
        &self,
        x: ArrayView2<'_, f64>,
        y: &[usize],
        n_classes: usize,
    ) -> Result<FittedClassifier, ClassifierError> {
        debug!(
            "Fitting {} on {} rows x {} features",
            self.family(),
            x.nrows(),
            x.ncols()
        );
        Ok(match self {
            Estimator::LogisticRegression(p) => {
                FittedClassifier::LogisticRegression(p.fit(x, y, n_classes)?)
            }
            Estimator::RandomForest(p) => FittedClassifier::RandomForest(p.fit(x, y, n_classes)?),
            Estimator::Svc(p) => FittedClassifier::Svc(p.fit(x, y, n_classes)?),
            Estimator::DecisionTree(p) => FittedClassifier::DecisionTree(p.fit(x, y, n_classes)?),
            Estimator::GradientBoosting(p) => {
                FittedClassifier::GradientBoosting(p.fit(x, y, n_classes)?)
            }
            Estimator::AdaBoost(p) => FittedClassifier::AdaBoost(p.fit(x, y, n_classes)?),
            Estimator::Knn(p) => FittedClassifier::Knn(p.fit(x, y, n_classes)?),
            Estimator::GaussianNb(p) => FittedClassifier::GaussianNb(p.fit(x, y, n_classes)?),
        })
    }
}

/// A fitted model of any family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FittedClassifier {
    LogisticRegression(LogisticRegressionModel),
    RandomForest(RandomForestModel),
    Svc(SvcModel),
    DecisionTree(DecisionTreeModel),
    GradientBoosting(GradientBoostingModel),
    AdaBoost(AdaBoostModel),
    Knn(KnnModel),
    GaussianNb(GaussianNbModel),
}

impl FittedClassifier {
    pub fn family(&self) -> ModelFamily {
        match self {
            FittedClassifier::LogisticRegression(_) => ModelFamily::LogisticRegression,
            FittedClassifier::RandomForest(_) => ModelFamily::RandomForest,
            FittedClassifier::Svc(_) => ModelFamily::Svc,
            FittedClassifier::DecisionTree(_) => ModelFamily::DecisionTree,
            FittedClassifier::GradientBoosting(_) => ModelFamily::GradientBoosting,
            FittedClassifier::AdaBoost(_) => ModelFamily::AdaBoost,
            FittedClassifier::Knn(_) => ModelFamily::Knn,
            FittedClassifier::GaussianNb(_) => ModelFamily::GaussianNb,
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            FittedClassifier::LogisticRegression(m) => m.n_features(),
            FittedClassifier::RandomForest(m) => m.n_features(),
            FittedClassifier::Svc(m) => m.n_features(),
            FittedClassifier::DecisionTree(m) => m.n_features(),
            FittedClassifier::GradientBoosting(m) => m.n_features(),
            FittedClassifier::AdaBoost(m) => m.n_features(),
            FittedClassifier::Knn(m) => m.n_features(),
            FittedClassifier::GaussianNb(m) => m.n_features(),
        }
    }

    pub fn n_classes(&self) -> usize {
        match self {
            FittedClassifier::LogisticRegression(m) => m.n_classes(),
            FittedClassifier::RandomForest(m) => m.n_classes(),
            FittedClassifier::Svc(m) => m.n_classes(),
            FittedClassifier::DecisionTree(m) => m.n_classes(),
            FittedClassifier::GradientBoosting(m) => m.n_classes(),
            FittedClassifier::AdaBoost(m) => m.n_classes(),
            FittedClassifier::Knn(m) => m.n_classes(),
            FittedClassifier::GaussianNb(m) => m.n_classes(),
        }
    }

    /// Class probabilities, one row per input row
    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ClassifierError> {
        if x.ncols() != self.n_features() {
            return Err(ClassifierError::FeatureMismatch {
                expected: self.n_features(),
                actual: x.ncols(),
            });
        }
        Ok(match self {
            FittedClassifier::LogisticRegression(m) => m.predict_proba(x),
            FittedClassifier::RandomForest(m) => m.predict_proba(x),
            FittedClassifier::Svc(m) => m.predict_proba(x),
            FittedClassifier::DecisionTree(m) => m.predict_proba(x),
            FittedClassifier::GradientBoosting(m) => m.predict_proba(x),
            FittedClassifier::AdaBoost(m) => m.predict_proba(x),
            FittedClassifier::Knn(m) => m.predict_proba(x),
            FittedClassifier::GaussianNb(m) => m.predict_proba(x),
        })
    }

    /// Most probable class code per row, lowest code on ties
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<usize>, ClassifierError> {
        let proba = self.predict_proba(x)?;
        Ok(proba.axis_iter(Axis(0)).map(argmax).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::MaxFeatures;
    use ndarray::array;
    use serde_json::json;

    fn separable() -> (Array2<f64>, Vec<usize>) {
        let x = array![
            [-3.0, -2.5],
            [-2.5, -3.0],
            [-2.8, -2.2],
            [-3.2, -2.9],
            [3.0, 2.5],
            [2.5, 3.0],
            [2.8, 2.2],
            [3.2, 2.9]
        ];
        (x, vec![0, 0, 0, 0, 1, 1, 1, 1])
    }

    #[test]
    fn test_every_family_fits_separable_data() {
        let (x, y) = separable();
        for family in ModelFamily::ALL {
            let estimator = Estimator::default_for(family).with_random_state(0);
            let fitted = estimator.fit(x.view(), &y, 2).unwrap();
            assert_eq!(fitted.family(), family);
            assert_eq!(fitted.n_features(), 2);
            assert_eq!(fitted.n_classes(), 2);
            let predicted = fitted.predict(x.view()).unwrap();
            assert_eq!(predicted, y, "{} misclassified training data", family);
        }
    }

    #[test]
    fn test_feature_count_checked() {
        let (x, y) = separable();
        let fitted = Estimator::default_for(ModelFamily::GaussianNb)
            .fit(x.view(), &y, 2)
            .unwrap();
        let err = fitted.predict_proba(array![[1.0]].view()).unwrap_err();
        assert!(matches!(
            err,
            ClassifierError::FeatureMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_from_value_and_unknown_param() {
        let est = Estimator::from_value(ModelFamily::RandomForest, &json!({"n_estimators": 10})).unwrap();
        match est {
            Estimator::RandomForest(p) => assert_eq!(p.n_estimators, 10),
            other => panic!("unexpected {:?}", other),
        }
        assert!(Estimator::from_value(ModelFamily::Knn, &json!({"bogus": 1})).is_err());
        assert_eq!(
            Estimator::from_value(ModelFamily::Svc, &Value::Null).unwrap(),
            Estimator::default_for(ModelFamily::Svc)
        );
    }

    #[test]
    fn test_overrides_strip_prefix_and_ignore_case() {
        let base = Estimator::default_for(ModelFamily::LogisticRegression);
        let mut overrides = BTreeMap::new();
        overrides.insert("model__c".to_string(), json!(0.5));
        overrides.insert("max_iter".to_string(), json!(50));
        match base.with_overrides(&overrides).unwrap() {
            Estimator::LogisticRegression(p) => {
                assert_eq!(p.c, 0.5);
                assert_eq!(p.max_iter, 50);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_max_features_forms() {
        for (value, expected) in [
            (json!("sqrt"), MaxFeatures::Sqrt),
            (json!("log2"), MaxFeatures::Log2),
            (json!(3), MaxFeatures::Count(3)),
            (json!(0.5), MaxFeatures::Fraction(0.5)),
        ] {
            let est = Estimator::from_value(ModelFamily::DecisionTree, &json!({ "max_features": value }))
                .unwrap();
            match est {
                Estimator::DecisionTree(p) => assert_eq!(p.max_features, Some(expected)),
                other => panic!("unexpected {:?}", other),
            }
        }
    }
}
