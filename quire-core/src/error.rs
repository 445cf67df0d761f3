use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Maximum number of characters of a response body echoed into errors/logs.
pub const MAX_ECHOED_BODY_CHARS: usize = 200;

const REDACTED: &str = "REDACTED";

static API_KEY_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(api_?key=)[^&\s#]*").expect("static regex compiles")
});

#[derive(Error, Debug, Clone)]
pub enum CatalogError {
    #[error("transport error calling {url}: {message}")]
    Transport {
        url: String,
        message: String,
        timed_out: bool,
    },

    #[error("catalog service returned HTTP {status} for {url}: {body}")]
    Status { status: u16, url: String, body: String },

    #[error("invalid response from {url} (HTTP {status}): {message}; body: {body}")]
    InvalidResponse {
        status: u16,
        url: String,
        message: String,
        body: String,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("already exists in the catalog: {0}")]
    Conflict(String),

    #[error("could not resolve {what}: {message}")]
    ReferenceResolution { what: &'static str, message: String },
}

impl CatalogError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } | Self::InvalidResponse { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Status { body, .. } | Self::InvalidResponse { body, .. } => {
                Some(body)
            }
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport { timed_out: true, .. })
    }

    /// Classification of this error for duplicate/conflict handling.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Conflict(_) => ErrorKind::Duplicate,
            Self::Status { status, body, .. }
            | Self::InvalidResponse { status, body, .. } => {
                classify_error(body, *status)
            }
            _ => ErrorKind::Other,
        }
    }
}

/// Coarse meaning of a failed catalog-service response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Duplicate,
    NotFound,
    Unauthorized,
    Other,
}

/// Decide what a failed response means.
///
/// The catalog service has no stable conflict code, so duplicates are
/// detected from the body text. Swap this out if the service ever grows a
/// structured error code.
pub fn classify_error(body: &str, status: u16) -> ErrorKind {
    const DUPLICATE_MARKERS: &[&str] = &[
        "duplicate key",
        "already exists",
        "unique index",
        "unique constraint",
        "already been added",
    ];

    let lowered = body.to_ascii_lowercase();
    if DUPLICATE_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return ErrorKind::Duplicate;
    }

    match status {
        401 | 403 => ErrorKind::Unauthorized,
        404 => ErrorKind::NotFound,
        _ => ErrorKind::Other,
    }
}

/// Cut a response body down to [`MAX_ECHOED_BODY_CHARS`] characters.
pub fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_ECHOED_BODY_CHARS {
        return trimmed.to_string();
    }
    // Room for the ellipsis stays inside the limit.
    let keep: String = trimmed.chars().take(MAX_ECHOED_BODY_CHARS - 1).collect();
    format!("{keep}…")
}

/// Remove an API key from text that may contain request URLs.
pub fn redact_api_key(text: &str, api_key: &str) -> String {
    let redacted = API_KEY_QUERY.replace_all(text, format!("${{1}}{REDACTED}"));
    let key = api_key.trim();
    if key.is_empty() {
        redacted.into_owned()
    } else {
        redacted.replace(key, REDACTED)
    }
}

/// Flatten a catalog-service error document into one readable line:
/// title, message and per-field validation errors.
pub fn flatten_error_detail(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return truncate_body(body);
    };

    let mut parts: Vec<String> = Vec::new();
    collect_error_parts(&value, &mut parts);
    parts.dedup();

    if parts.is_empty() {
        truncate_body(body)
    } else {
        parts.join("; ")
    }
}

fn collect_error_parts(value: &Value, parts: &mut Vec<String>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_error_parts(item, parts);
            }
        }
        Value::Object(map) => {
            for key in ["title", "message", "detail"] {
                if let Some(text) = map.get(key).and_then(Value::as_str)
                    && !text.trim().is_empty()
                {
                    parts.push(text.trim().to_string());
                }
            }

            if let Some(message) = map.get("errorMessage").and_then(Value::as_str) {
                match map.get("propertyName").and_then(Value::as_str) {
                    Some(property) if !property.is_empty() => {
                        parts.push(format!("{property}: {message}"))
                    }
                    _ => parts.push(message.to_string()),
                }
            }

            if let Some(errors) = map.get("errors") {
                match errors {
                    Value::Object(fields) => {
                        for (field, messages) in fields {
                            let joined = match messages {
                                Value::Array(list) => list
                                    .iter()
                                    .filter_map(Value::as_str)
                                    .collect::<Vec<_>>()
                                    .join(", "),
                                Value::String(text) => text.clone(),
                                other => other.to_string(),
                            };
                            parts.push(format!("{field}: {joined}"));
                        }
                    }
                    other => collect_error_parts(other, parts),
                }
            }
        }
        Value::String(text) if !text.trim().is_empty() => {
            parts.push(text.trim().to_string())
        }
        _ => {}
    }
}
