//! Field Name Normalization
//!
//! Requests may spell a field the way the CSV header does
//! (`"Mother's qualification"`) or with every run of punctuation and
//! whitespace collapsed to one underscore (`"Mother_s_qualification"`).

use crate::record::FIELDS;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Which spelling a key used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Spelling {
    Display,
    Underscore,
}

/// Both accepted spellings of every field, mapped to its index in [`FIELDS`]
fn alias_map() -> &'static HashMap<&'static str, (usize, Spelling)> {
    static MAP: OnceLock<HashMap<&'static str, (usize, Spelling)>> = OnceLock::new();
    MAP.get_or_init(|| {
        let mut map = HashMap::with_capacity(FIELDS.len() * 2);
        for (idx, field) in FIELDS.iter().enumerate() {
            map.insert(field.name, (idx, Spelling::Underscore));
            // identical spellings (e.g. GDP) resolve as the header form
            map.insert(field.display, (idx, Spelling::Display));
        }
        map
    })
}

/// Canonical (underscore) name for any accepted spelling
pub fn canonical_name(key: &str) -> Option<&'static str> {
    alias_map().get(key).map(|&(idx, _)| FIELDS[idx].name)
}

/// Request values slotted by field
pub(crate) struct ResolvedFields<'a> {
    /// One slot per entry of [`FIELDS`], in order
    pub slots: Vec<Option<&'a Value>>,
    /// Keys matching no field
    pub ignored: usize,
}

/// Slot every key of `object` into its field. The header spelling wins
/// when both spellings of one field are present.
pub(crate) fn resolve_fields(object: &Map<String, Value>) -> ResolvedFields<'_> {
    let mut slots: Vec<Option<(&Value, Spelling)>> = vec![None; FIELDS.len()];
    let mut ignored = 0;
    for (key, value) in object {
        let Some(&(idx, spelling)) = alias_map().get(key.as_str()) else {
            ignored += 1;
            continue;
        };
        match slots[idx] {
            Some((_, Spelling::Display)) if spelling == Spelling::Underscore => {}
            _ => slots[idx] = Some((value, spelling)),
        }
    }
    ResolvedFields {
        slots: slots.into_iter().map(|s| s.map(|(v, _)| v)).collect(),
        ignored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Collapse punctuation and whitespace runs to one underscore
    fn underscore_spelling(display: &str) -> String {
        let mut out = String::with_capacity(display.len());
        let mut pending_separator = false;
        for c in display.chars() {
            if c.is_ascii_alphanumeric() {
                if pending_separator && !out.is_empty() {
                    out.push('_');
                }
                pending_separator = false;
                out.push(c);
            } else {
                pending_separator = true;
            }
        }
        out
    }

    #[test]
    fn test_declared_names_follow_rule() {
        assert_eq!(
            underscore_spelling("Daytime/evening attendance"),
            "Daytime_evening_attendance"
        );
        for field in FIELDS.iter() {
            assert_eq!(underscore_spelling(field.display), field.name);
        }
    }

    #[test]
    fn test_canonical_name() {
        assert_eq!(
            canonical_name("Curricular units 1st sem (grade)"),
            Some("Curricular_units_1st_sem_grade")
        );
        assert_eq!(canonical_name("Debtor"), Some("Debtor"));
        assert_eq!(canonical_name("shoe size"), None);
    }

    #[test]
    fn test_resolve_prefers_header_spelling() {
        let idx = FIELDS
            .iter()
            .position(|f| f.name == "Mother_s_qualification")
            .unwrap();
        let request = json!({
            "Mother_s_qualification": 1,
            "Mother's qualification": 2,
            "shoe size": 44,
        });
        let resolved = resolve_fields(request.as_object().unwrap());
        assert_eq!(resolved.slots.len(), FIELDS.len());
        assert_eq!(resolved.slots[idx], Some(&json!(2)));
        assert_eq!(resolved.ignored, 1);
        assert_eq!(resolved.slots.iter().flatten().count(), 1);
    }
}
