//! Academic Feature Derivation

use crate::schema::*;
use crate::{FeatureError, Frame};
use ndarray::{Array1, Zip};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Number of columns appended by [`FeatureEngineer::transform`]
pub const ENGINEERED_DIMENSION: usize = ENGINEERED_FEATURES.len();

/// Derives aggregate academic-performance columns from per-semester columns.
///
/// Stateless: the same engineer serves training batches and single-row
/// inference. Missing inputs propagate as `NaN`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureEngineer;

impl FeatureEngineer {
    pub fn new() -> Self {
        Self
    }

    /// Return a copy of `frame` with the engineered columns set
    pub fn transform(&self, frame: &Frame) -> Result<Frame, FeatureError> {
        let total_approved = sum(frame, SEM1_APPROVED, SEM2_APPROVED)?;
        let total_enrolled = sum(frame, SEM1_ENROLLED, SEM2_ENROLLED)?;
        let total_evaluations = sum(frame, SEM1_EVALUATIONS, SEM2_EVALUATIONS)?;
        let total_credited = sum(frame, SEM1_CREDITED, SEM2_CREDITED)?;
        let average_grade = sum(frame, SEM1_GRADE, SEM2_GRADE)? / 2.0;

        // +1 smooths students with no approved/enrolled units
        let grade_per_approved = Zip::from(&average_grade)
            .and(&total_approved)
            .map_collect(|&grade, &approved| grade / (approved + 1.0));
        let pass_rate = Zip::from(&total_approved)
            .and(&total_enrolled)
            .map_collect(|&approved, &enrolled| approved / (enrolled + 1.0));

        let mut out = frame.clone();
        for (name, column) in ENGINEERED_FEATURES.iter().zip([
            total_approved,
            total_enrolled,
            total_evaluations,
            total_credited,
            average_grade,
            grade_per_approved,
            pass_rate,
        ]) {
            out.set_column(name, column)?;
        }

        debug!(
            "Engineered {} features over {} rows",
            ENGINEERED_DIMENSION,
            out.n_rows()
        );
        Ok(out)
    }
}

fn sum(frame: &Frame, first: &str, second: &str) -> Result<Array1<f64>, FeatureError> {
    Ok(&frame.column(first)? + &frame.column(second)?)
}
