//! Column Schema
//!
//! Declared column groups of the student records table. Names match the
//! CSV header spelling.

/// Label column in training data
pub const TARGET_COLUMN: &str = "Target";

/// Row identifier column, dropped before feature use
pub const ID_COLUMN: &str = "id";

/// Base numeric columns (imputed with median, standard-scaled)
pub const NUMERIC_FEATURES: [&str; 18] = [
    "Previous qualification (grade)",
    "Admission grade",
    "Age at enrollment",
    "Curricular units 1st sem (credited)",
    "Curricular units 1st sem (enrolled)",
    "Curricular units 1st sem (evaluations)",
    "Curricular units 1st sem (approved)",
    "Curricular units 1st sem (grade)",
    "Curricular units 1st sem (without evaluations)",
    "Curricular units 2nd sem (credited)",
    "Curricular units 2nd sem (enrolled)",
    "Curricular units 2nd sem (evaluations)",
    "Curricular units 2nd sem (approved)",
    "Curricular units 2nd sem (grade)",
    "Curricular units 2nd sem (without evaluations)",
    "Unemployment rate",
    "Inflation rate",
    "GDP",
];

/// Categorical columns (imputed with most frequent value, one-hot encoded)
pub const CATEGORICAL_FEATURES: [&str; 18] = [
    "Marital status",
    "Application mode",
    "Application order",
    "Course",
    "Daytime/evening attendance",
    "Previous qualification",
    "Nacionality",
    "Mother's qualification",
    "Father's qualification",
    "Mother's occupation",
    "Father's occupation",
    "Displaced",
    "Educational special needs",
    "Debtor",
    "Tuition fees up to date",
    "Gender",
    "Scholarship holder",
    "International",
];

/// Columns derived by the feature engineer, in append order
pub const ENGINEERED_FEATURES: [&str; 7] = [
    "total_approved",
    "total_enrolled",
    "total_evaluations",
    "total_credited",
    "average_grade",
    "grade_per_approved",
    "pass_rate",
];

pub(crate) const SEM1_APPROVED: &str = "Curricular units 1st sem (approved)";
pub(crate) const SEM2_APPROVED: &str = "Curricular units 2nd sem (approved)";
pub(crate) const SEM1_ENROLLED: &str = "Curricular units 1st sem (enrolled)";
pub(crate) const SEM2_ENROLLED: &str = "Curricular units 2nd sem (enrolled)";
pub(crate) const SEM1_EVALUATIONS: &str = "Curricular units 1st sem (evaluations)";
pub(crate) const SEM2_EVALUATIONS: &str = "Curricular units 2nd sem (evaluations)";
pub(crate) const SEM1_CREDITED: &str = "Curricular units 1st sem (credited)";
pub(crate) const SEM2_CREDITED: &str = "Curricular units 2nd sem (credited)";
pub(crate) const SEM1_GRADE: &str = "Curricular units 1st sem (grade)";
pub(crate) const SEM2_GRADE: &str = "Curricular units 2nd sem (grade)";

/// Full numeric group: base numeric columns followed by engineered columns
pub fn numeric_columns() -> Vec<String> {
    NUMERIC_FEATURES
        .iter()
        .chain(ENGINEERED_FEATURES.iter())
        .map(|c| c.to_string())
        .collect()
}

/// Categorical group in declared order
pub fn categorical_columns() -> Vec<String> {
    CATEGORICAL_FEATURES.iter().map(|c| c.to_string()).collect()
}

/// All raw input columns a record must carry
pub fn raw_columns() -> impl Iterator<Item = &'static str> {
    NUMERIC_FEATURES.iter().chain(CATEGORICAL_FEATURES.iter()).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_groups_are_disjoint() {
        let numeric: HashSet<_> = numeric_columns().into_iter().collect();
        let categorical: HashSet<_> = categorical_columns().into_iter().collect();
        assert_eq!(numeric.len(), 25);
        assert_eq!(categorical.len(), 18);
        assert!(numeric.is_disjoint(&categorical));
    }

    #[test]
    fn test_raw_columns_count() {
        assert_eq!(raw_columns().count(), 36);
    }
}
