//! Evaluation
//!
//! Accuracy, weighted precision/recall/F1 and a per-class classification
//! report. Undefined ratios (no predicted or no true rows) count as 0.

use crate::TrainingError;
use chrono::{DateTime, Utc};
use feature_engine::Frame;
use inference_engine::{LabelEncoder, ModelPipeline};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use tracing::info;

/// Precision, recall, F1 and support of one class or average
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassReport {
    pub precision: f64,
    pub recall: f64,
    #[serde(rename = "f1-score")]
    pub f1_score: f64,
    pub support: usize,
}

/// Per-class rows keyed by class name, then `accuracy`, `macro avg` and
/// `weighted avg`
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    pub classes: Vec<(String, ClassReport)>,
    pub accuracy: f64,
    pub macro_avg: ClassReport,
    pub weighted_avg: ClassReport,
}

impl Serialize for ClassificationReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.classes.len() + 3))?;
        for (name, row) in &self.classes {
            map.serialize_entry(name, row)?;
        }
        map.serialize_entry("accuracy", &self.accuracy)?;
        map.serialize_entry("macro avg", &self.macro_avg)?;
        map.serialize_entry("weighted avg", &self.weighted_avg)?;
        map.end()
    }
}

/// One candidate's validation metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsRecord {
    pub model_name: String,
    pub evaluated_at: DateTime<Utc>,
    pub accuracy: f64,
    pub f1_weighted: f64,
    pub precision_weighted: f64,
    pub recall_weighted: f64,
    pub classification_report: ClassificationReport,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// True positives, predicted count and support per class
struct Tally {
    hits: Vec<usize>,
    predicted: Vec<usize>,
    support: Vec<usize>,
}

impl Tally {
    fn count(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> Self {
        let mut tally = Tally {
            hits: vec![0; n_classes],
            predicted: vec![0; n_classes],
            support: vec![0; n_classes],
        };
        for (&t, &p) in y_true.iter().zip(y_pred) {
            if t < n_classes {
                tally.support[t] += 1;
            }
            if p < n_classes {
                tally.predicted[p] += 1;
            }
            if t == p && t < n_classes {
                tally.hits[t] += 1;
            }
        }
        tally
    }

    fn row(&self, k: usize) -> ClassReport {
        let precision = ratio(self.hits[k], self.predicted[k]);
        let recall = ratio(self.hits[k], self.support[k]);
        ClassReport {
            precision,
            recall,
            f1_score: f1(precision, recall),
            support: self.support[k],
        }
    }

    fn rows(&self) -> Vec<ClassReport> {
        (0..self.support.len()).map(|k| self.row(k)).collect()
    }

    /// Classes seen in truth or predictions
    fn present(&self) -> Vec<usize> {
        (0..self.support.len())
            .filter(|&k| self.support[k] > 0 || self.predicted[k] > 0)
            .collect()
    }

    fn total(&self) -> usize {
        self.support.iter().sum()
    }

    fn accuracy(&self) -> f64 {
        ratio(self.hits.iter().sum(), self.total())
    }

    fn macro_avg(&self) -> ClassReport {
        let rows = self.rows();
        let present = self.present();
        let mean = |f: fn(&ClassReport) -> f64| {
            if present.is_empty() {
                0.0
            } else {
                present.iter().map(|&k| f(&rows[k])).sum::<f64>() / present.len() as f64
            }
        };
        ClassReport {
            precision: mean(|r| r.precision),
            recall: mean(|r| r.recall),
            f1_score: mean(|r| r.f1_score),
            support: self.total(),
        }
    }

    fn weighted_avg(&self) -> ClassReport {
        let rows = self.rows();
        let total = self.total();
        let weighted = |f: fn(&ClassReport) -> f64| {
            if total == 0 {
                0.0
            } else {
                rows.iter().map(|r| f(r) * r.support as f64).sum::<f64>() / total as f64
            }
        };
        ClassReport {
            precision: weighted(|r| r.precision),
            recall: weighted(|r| r.recall),
            f1_score: weighted(|r| r.f1_score),
            support: total,
        }
    }
}

/// Report over every encoder class, in code order
pub fn classification_report(
    y_true: &[usize],
    y_pred: &[usize],
    class_names: &[String],
) -> ClassificationReport {
    let tally = Tally::count(y_true, y_pred, class_names.len());
    ClassificationReport {
        classes: class_names.iter().cloned().zip(tally.rows()).collect(),
        accuracy: tally.accuracy(),
        macro_avg: tally.macro_avg(),
        weighted_avg: tally.weighted_avg(),
    }
}

/// Score `pipeline` on `frame` against label codes `labels`
pub fn evaluate(
    pipeline: &ModelPipeline,
    frame: &Frame,
    labels: &[usize],
    encoder: &LabelEncoder,
    model_name: &str,
) -> Result<MetricsRecord, TrainingError> {
    let predicted = pipeline.predict(frame)?;
    let report = classification_report(labels, &predicted, encoder.classes());

    let record = MetricsRecord {
        model_name: model_name.to_string(),
        evaluated_at: Utc::now(),
        accuracy: report.accuracy,
        f1_weighted: report.weighted_avg.f1_score,
        precision_weighted: report.weighted_avg.precision,
        recall_weighted: report.weighted_avg.recall,
        classification_report: report,
    };
    info!(
        "{}: accuracy={:.4} f1_weighted={:.4} precision_weighted={:.4} recall_weighted={:.4}",
        model_name,
        record.accuracy,
        record.f1_weighted,
        record.precision_weighted,
        record.recall_weighted
    );
    Ok(record)
}

/// Cross-validation objective
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scoring {
    #[default]
    Accuracy,
    BalancedAccuracy,
    F1Weighted,
    PrecisionWeighted,
    RecallWeighted,
    F1Macro,
    PrecisionMacro,
    RecallMacro,
}

impl Scoring {
    /// Higher is better for every objective
    pub fn score(&self, y_true: &[usize], y_pred: &[usize], n_classes: usize) -> f64 {
        let tally = Tally::count(y_true, y_pred, n_classes);
        match self {
            Scoring::Accuracy => tally.accuracy(),
            Scoring::BalancedAccuracy => {
                let observed: Vec<usize> =
                    (0..n_classes).filter(|&k| tally.support[k] > 0).collect();
                if observed.is_empty() {
                    0.0
                } else {
                    observed.iter().map(|&k| tally.row(k).recall).sum::<f64>()
                        / observed.len() as f64
                }
            }
            Scoring::F1Weighted => tally.weighted_avg().f1_score,
            Scoring::PrecisionWeighted => tally.weighted_avg().precision,
            Scoring::RecallWeighted => tally.weighted_avg().recall,
            Scoring::F1Macro => tally.macro_avg().f1_score,
            Scoring::PrecisionMacro => tally.macro_avg().precision,
            Scoring::RecallMacro => tally.macro_avg().recall,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names() -> Vec<String> {
        vec!["Dropout".into(), "Enrolled".into(), "Graduate".into()]
    }

    #[test]
    fn test_report_values() {
        let y_true = [0, 0, 1, 1, 2, 2];
        let y_pred = [0, 1, 1, 1, 2, 0];
        let report = classification_report(&y_true, &y_pred, &names());

        assert!((report.accuracy - 4.0 / 6.0).abs() < 1e-12);
        let (name, dropout) = &report.classes[0];
        assert_eq!(name, "Dropout");
        assert!((dropout.precision - 0.5).abs() < 1e-12);
        assert!((dropout.recall - 0.5).abs() < 1e-12);
        assert_eq!(dropout.support, 2);

        let enrolled = report.classes[1].1;
        assert!((enrolled.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((enrolled.recall - 1.0).abs() < 1e-12);
        assert!((enrolled.f1_score - 0.8).abs() < 1e-12);
        assert_eq!(report.weighted_avg.support, 6);
    }

    #[test]
    fn test_zero_division_is_zero() {
        // class 2 never predicted, never observed
        let report = classification_report(&[0, 1], &[0, 0], &names());
        let enrolled = report.classes[1].1;
        assert_eq!(enrolled.precision, 0.0);
        assert_eq!(enrolled.f1_score, 0.0);
        let graduate = report.classes[2].1;
        assert_eq!(graduate, ClassReport { precision: 0.0, recall: 0.0, f1_score: 0.0, support: 0 });
        // macro averages only over classes that appear
        assert!((report.macro_avg.recall - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_report_json_shape() {
        let report = classification_report(&[0, 1, 2], &[0, 1, 2], &names());
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["accuracy"], json!(1.0));
        assert_eq!(value["Graduate"]["f1-score"], json!(1.0));
        assert_eq!(value["macro avg"]["support"], json!(3));
        assert!(value.get("weighted avg").is_some());

        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 6);
    }

    #[test]
    fn test_scoring_variants() {
        let y_true = [0, 0, 0, 0, 1];
        let y_pred = [0, 0, 0, 0, 0];
        assert!((Scoring::Accuracy.score(&y_true, &y_pred, 2) - 0.8).abs() < 1e-12);
        assert!((Scoring::BalancedAccuracy.score(&y_true, &y_pred, 2) - 0.5).abs() < 1e-12);
        assert!((Scoring::RecallWeighted.score(&y_true, &y_pred, 2) - 0.8).abs() < 1e-12);
        assert!(Scoring::F1Macro.score(&y_true, &y_pred, 2) < Scoring::F1Weighted.score(&y_true, &y_pred, 2));

        let parsed: Scoring = serde_json::from_value(json!("precision_macro")).unwrap();
        assert_eq!(parsed, Scoring::PrecisionMacro);
    }
}
