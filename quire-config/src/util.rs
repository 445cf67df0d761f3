//! Serde adapters for human readable durations (`"30s"`, `"5m"`, `"1h"`).

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

pub fn serialize_duration<S>(
    value: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

/// Accepts humantime strings or a bare number of seconds.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => humantime::parse_duration(text.trim())
            .map_err(|err| D::Error::custom(format!("invalid duration `{text}`: {err}"))),
    }
}

/// Trim a configured endpoint and make sure it starts with a slash.
pub fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() || trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_gain_leading_slash() {
        assert_eq!(normalize_endpoint("book/lookup"), "/book/lookup");
        assert_eq!(normalize_endpoint(" /book "), "/book");
        assert_eq!(normalize_endpoint(""), "");
    }
}
