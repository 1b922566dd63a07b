//! Validation Error Types

use thiserror::Error;

/// Errors while validating a prediction request
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    /// Request body is not a JSON object
    #[error("Request body must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Field present with a value of the wrong JSON type
    #[error("Field {field} must be {expected}, got {found}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
        found: String,
    },
}
