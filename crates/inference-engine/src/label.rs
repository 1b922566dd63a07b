//! Label Encoding

use crate::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Bijection between class names and codes `[0, n)`, codes in sorted name order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Learn the sorted set of distinct labels
    pub fn fit<S: AsRef<str>>(labels: &[S]) -> Self {
        let classes: BTreeSet<&str> = labels.iter().map(AsRef::as_ref).collect();
        Self {
            classes: classes.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn encode(&self, label: &str) -> Result<usize, PipelineError> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .map_err(|_| PipelineError::UnknownLabel(label.to_string()))
    }

    pub fn encode_all<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>, PipelineError> {
        labels.iter().map(|l| self.encode(l.as_ref())).collect()
    }

    pub fn decode(&self, code: usize) -> Result<&str, PipelineError> {
        self.classes
            .get(code)
            .map(String::as_str)
            .ok_or(PipelineError::UnknownClassCode(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_codes_follow_sorted_order() {
        let encoder = LabelEncoder::fit(&["Graduate", "Dropout", "Enrolled", "Dropout"]);
        assert_eq!(encoder.classes(), &["Dropout", "Enrolled", "Graduate"]);
        assert_eq!(encoder.encode("Enrolled").unwrap(), 1);
        assert_eq!(encoder.decode(2).unwrap(), "Graduate");
    }

    #[test]
    fn test_unknown_label_and_code() {
        let encoder = LabelEncoder::fit(&["a", "b"]);
        assert!(matches!(encoder.encode("c"), Err(PipelineError::UnknownLabel(_))));
        assert!(matches!(encoder.decode(2), Err(PipelineError::UnknownClassCode(2))));
    }

    proptest! {
        #[test]
        fn prop_round_trip(labels in prop::collection::vec("[A-Za-z]{1,8}", 1..20)) {
            let encoder = LabelEncoder::fit(&labels);
            for label in &labels {
                let code = encoder.encode(label).unwrap();
                prop_assert!(code < encoder.n_classes());
                prop_assert_eq!(encoder.decode(code).unwrap(), label.as_str());
            }
        }
    }
}
