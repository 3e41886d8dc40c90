//! Serde helpers for values written in YAML as bare scalars (`4`, `2.5`,
//! `true`) but held as text.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serializer};
use serde_yaml::Value;

pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(number_text(n)),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Integers as written; floats in the same form as a float cell's text, so
/// `1.0` reads as `1`.
fn number_text(n: &serde_yaml::Number) -> String {
    match (n.as_i64(), n.as_u64(), n.as_f64()) {
        (Some(i), _, _) => i.to_string(),
        (None, Some(u), _) => u.to_string(),
        (None, None, Some(f)) => f.to_string(),
        (None, None, None) => n.to_string(),
    }
}

pub fn serialize<S: Serializer>(value: &str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(value)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    scalar_text(&value).ok_or_else(|| D::Error::custom(format!("expected a scalar value, found {value:?}")))
}

pub fn deserialize_opt<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    scalar_text(&value)
        .map(Some)
        .ok_or_else(|| D::Error::custom(format!("expected a scalar value, found {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_read_as_canonical_text() {
        let text = |yaml: &str| scalar_text(&serde_yaml::from_str::<Value>(yaml).unwrap());
        assert_eq!(text("1.0").as_deref(), Some("1"));
        assert_eq!(text("2.5").as_deref(), Some("2.5"));
        assert_eq!(text("16").as_deref(), Some("16"));
        assert_eq!(text("'1.0'").as_deref(), Some("1.0"));
        assert_eq!(text("true").as_deref(), Some("true"));
        assert_eq!(text("[1]"), None);
    }
}
