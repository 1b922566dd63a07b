//! Student Record Schema
//!
//! `student_schema!` declares each request field once: its canonical
//! underscore name (the struct field), its type, and the CSV header
//! spelling. From that single list it generates the typed record, the field
//! table used for alias lookup, and the extraction code.

use crate::ValidationError;
use serde::Serialize;
use serde_json::Value;

/// JSON shape a field accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// JSON integer, or a float with zero fraction
    Integer,
    /// Any JSON number
    Float,
}

/// One declared field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Canonical underscore spelling
    pub name: &'static str,
    /// CSV header spelling, also the column name fed to the pipeline
    pub display: &'static str,
    pub kind: FieldKind,
}

/// Conversion between a JSON value and a typed field
pub(crate) trait FieldValue: Sized {
    const KIND: FieldKind;

    fn read(field: &'static str, value: &Value) -> Result<Self, ValidationError>;
    fn to_f64(&self) -> f64;
}

/// Short description of a JSON value's type for error messages
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(n) if n.is_f64() => "a fractional number",
        Value::Number(_) => "an integer",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl FieldValue for i64 {
    const KIND: FieldKind = FieldKind::Integer;

    fn read(field: &'static str, value: &Value) -> Result<Self, ValidationError> {
        if let Some(v) = value.as_i64() {
            return Ok(v);
        }
        match value.as_f64() {
            Some(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => Ok(v as i64),
            _ => Err(ValidationError::WrongType {
                field,
                expected: "an integer",
                found: json_kind(value).to_string(),
            }),
        }
    }

    fn to_f64(&self) -> f64 {
        *self as f64
    }
}

impl FieldValue for f64 {
    const KIND: FieldKind = FieldKind::Float;

    fn read(field: &'static str, value: &Value) -> Result<Self, ValidationError> {
        value.as_f64().ok_or_else(|| ValidationError::WrongType {
            field,
            expected: "a number",
            found: json_kind(value).to_string(),
        })
    }

    fn to_f64(&self) -> f64 {
        *self
    }
}

macro_rules! student_schema {
    ($( $field:ident : $ty:ty => $display:literal ),+ $(,)?) => {
        /// One validated prediction request
        #[derive(Debug, Clone, PartialEq, Serialize)]
        #[allow(non_snake_case)]
        pub struct StudentRecord {
            $(
                #[serde(rename = $display)]
                pub $field: $ty,
            )+
        }

        /// Every request field in declaration order
        pub const FIELDS: &[FieldSpec] = &[
            $(
                FieldSpec {
                    name: stringify!($field),
                    display: $display,
                    kind: <$ty as FieldValue>::KIND,
                },
            )+
        ];

        impl StudentRecord {
            /// Build from values slotted in [`FIELDS`] order
            pub(crate) fn from_slots(slots: Vec<Option<&Value>>) -> Result<Self, ValidationError> {
                let mut slots = slots.into_iter();
                Ok(Self {
                    $(
                        $field: <$ty as FieldValue>::read(
                            $display,
                            slots
                                .next()
                                .flatten()
                                .ok_or(ValidationError::MissingField($display))?,
                        )?,
                    )+
                })
            }

            /// Field values as `f64`, in [`FIELDS`] order
            pub fn values(&self) -> Vec<f64> {
                vec![$( FieldValue::to_f64(&self.$field) ),+]
            }
        }
    };
}

student_schema! {
    Marital_status: i64 => "Marital status",
    Application_mode: i64 => "Application mode",
    Application_order: i64 => "Application order",
    Course: i64 => "Course",
    Daytime_evening_attendance: i64 => "Daytime/evening attendance",
    Previous_qualification: i64 => "Previous qualification",
    Previous_qualification_grade: f64 => "Previous qualification (grade)",
    Nacionality: i64 => "Nacionality",
    Mother_s_qualification: i64 => "Mother's qualification",
    Father_s_qualification: i64 => "Father's qualification",
    Mother_s_occupation: i64 => "Mother's occupation",
    Father_s_occupation: i64 => "Father's occupation",
    Admission_grade: f64 => "Admission grade",
    Displaced: i64 => "Displaced",
    Educational_special_needs: i64 => "Educational special needs",
    Debtor: i64 => "Debtor",
    Tuition_fees_up_to_date: i64 => "Tuition fees up to date",
    Gender: i64 => "Gender",
    Scholarship_holder: i64 => "Scholarship holder",
    Age_at_enrollment: i64 => "Age at enrollment",
    International: i64 => "International",
    Curricular_units_1st_sem_credited: i64 => "Curricular units 1st sem (credited)",
    Curricular_units_1st_sem_enrolled: i64 => "Curricular units 1st sem (enrolled)",
    Curricular_units_1st_sem_evaluations: i64 => "Curricular units 1st sem (evaluations)",
    Curricular_units_1st_sem_approved: i64 => "Curricular units 1st sem (approved)",
    Curricular_units_1st_sem_grade: f64 => "Curricular units 1st sem (grade)",
    Curricular_units_1st_sem_without_evaluations: i64 => "Curricular units 1st sem (without evaluations)",
    Curricular_units_2nd_sem_credited: i64 => "Curricular units 2nd sem (credited)",
    Curricular_units_2nd_sem_enrolled: i64 => "Curricular units 2nd sem (enrolled)",
    Curricular_units_2nd_sem_evaluations: i64 => "Curricular units 2nd sem (evaluations)",
    Curricular_units_2nd_sem_approved: i64 => "Curricular units 2nd sem (approved)",
    Curricular_units_2nd_sem_grade: f64 => "Curricular units 2nd sem (grade)",
    Curricular_units_2nd_sem_without_evaluations: i64 => "Curricular units 2nd sem (without evaluations)",
    Unemployment_rate: f64 => "Unemployment rate",
    Inflation_rate: f64 => "Inflation rate",
    GDP: f64 => "GDP",
}

impl StudentRecord {
    /// Column names matching [`values`](Self::values)
    pub fn column_names() -> Vec<String> {
        FIELDS.iter().map(|f| f.display.to_string()).collect()
    }
}
