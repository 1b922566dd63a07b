//! Request Validation

use crate::error::ValidationError;
use crate::normalizer::resolve_fields;
use crate::record::{json_kind, StudentRecord};
use serde_json::Value;
use tracing::debug;

/// Validate a JSON request body into a typed record.
///
/// Every field is required; unknown keys are ignored.
pub fn validate(value: &Value) -> Result<StudentRecord, ValidationError> {
    let object = value
        .as_object()
        .ok_or_else(|| ValidationError::NotAnObject(json_kind(value)))?;

    let resolved = resolve_fields(object);
    if resolved.ignored > 0 {
        debug!("Ignoring {} unknown request keys", resolved.ignored);
    }

    StudentRecord::from_slots(resolved.slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FIELDS;
    use serde_json::{json, Map};

    fn display_request() -> Value {
        let mut map = Map::new();
        for (i, field) in FIELDS.iter().enumerate() {
            map.insert(field.display.to_string(), json!(i + 1));
        }
        Value::Object(map)
    }

    fn underscore_request() -> Value {
        let mut map = Map::new();
        for (i, field) in FIELDS.iter().enumerate() {
            map.insert(field.name.to_string(), json!(i + 1));
        }
        Value::Object(map)
    }

    #[test]
    fn test_both_spellings_give_same_record() {
        let a = validate(&display_request()).unwrap();
        let b = validate(&underscore_request()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.Mother_s_qualification, 9);
        assert_eq!(a.values().len(), FIELDS.len());
    }

    #[test]
    fn test_missing_field_is_named() {
        let mut request = display_request();
        request
            .as_object_mut()
            .unwrap()
            .remove("Mother's qualification");
        let err = validate(&request).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("Mother's qualification"));
        assert!(err.to_string().contains("Mother's qualification"));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let mut request = underscore_request();
        request["Course"] = json!("engineering");
        assert!(matches!(
            validate(&request),
            Err(ValidationError::WrongType { field: "Course", .. })
        ));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let mut request = display_request();
        request["favourite_colour"] = json!("green");
        assert!(validate(&request).is_ok());
    }

    #[test]
    fn test_header_spelling_wins_over_underscore() {
        let mut request = display_request();
        request["Mother_s_qualification"] = json!(99);
        assert_eq!(validate(&request).unwrap().Mother_s_qualification, 9);

        let mut request = underscore_request();
        request["Mother's qualification"] = json!(42);
        assert_eq!(validate(&request).unwrap().Mother_s_qualification, 42);
    }

    #[test]
    fn test_non_object_rejected() {
        assert_eq!(
            validate(&json!([1, 2])).unwrap_err(),
            ValidationError::NotAnObject("an array")
        );
    }
}
