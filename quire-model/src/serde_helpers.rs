//! Lenient decoding helpers for catalog-service fields whose JSON type is not
//! stable across versions (ids arrive as numbers, numeric strings or `null`).

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Interpret a JSON value as a positive catalog id.
///
/// Accepts integers, integral floats and numeric strings. `null`, empty
/// strings, the literal `"null"`, zero and negative values yield `None`.
pub fn value_as_id(value: &Value) -> Option<i64> {
    let id = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
                None
            } else {
                trimmed.parse::<i64>().ok()
            }
        }
        _ => None,
    }?;

    (id > 0).then_some(id)
}

/// `deserialize_with` adapter for optional ids decoded with [`value_as_id`].
pub fn lenient_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(value_as_id))
}

/// `deserialize_with` adapter for optional strings that tolerates numbers.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_forms_are_accepted() {
        assert_eq!(value_as_id(&json!(123)), Some(123));
        assert_eq!(value_as_id(&json!("123")), Some(123));
        assert_eq!(value_as_id(&json!(" 42 ")), Some(42));
        assert_eq!(value_as_id(&json!(7.0)), Some(7));
    }

    #[test]
    fn null_markers_are_rejected() {
        assert_eq!(value_as_id(&json!(null)), None);
        assert_eq!(value_as_id(&json!("")), None);
        assert_eq!(value_as_id(&json!("null")), None);
        assert_eq!(value_as_id(&json!("0")), None);
        assert_eq!(value_as_id(&json!(0)), None);
        assert_eq!(value_as_id(&json!("abc")), None);
        assert_eq!(value_as_id(&json!(7.5)), None);
    }
}
