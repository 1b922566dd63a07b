//! Request Validation and Normalization
//!
//! Typed student records, the alias map between header and underscore
//! spellings, and JSON validation for prediction requests.

mod error;
mod normalizer;
mod record;
mod validator;

pub use error::ValidationError;
pub use normalizer::canonical_name;
pub use record::{FieldKind, FieldSpec, StudentRecord, FIELDS};
pub use validator::validate;

#[cfg(test)]
mod tests {
    use super::*;
    use feature_engine::schema;

    #[test]
    fn test_fields_cover_raw_schema() {
        let mut declared: Vec<&str> = FIELDS.iter().map(|f| f.display).collect();
        let mut raw: Vec<&str> = schema::raw_columns().collect();
        declared.sort_unstable();
        raw.sort_unstable();
        assert_eq!(declared, raw);
    }
}
