//! Operator payload templates.
//!
//! A template is a JSON document with `{{ dotted.path }}` placeholders that
//! are resolved against the render context (`candidate`, `options`,
//! `defaults`). `{{ path ?? <json> }}` supplies a fallback for missing
//! values. A placeholder that forms a whole JSON string (`"{{ path }}"`) is
//! replaced by the value itself, so numbers and objects keep their type;
//! inside a longer string the value is spliced in as text.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unclosed placeholder at byte {0}")]
    Unclosed(usize),
    #[error("empty placeholder at byte {0}")]
    EmptyPlaceholder(usize),
    #[error("rendered template is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("rendered template must be a JSON object")]
    NotAnObject,
}

/// Renders an operator template over a JSON context.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, context: &Value) -> Result<Map<String, Value>, TemplateError>;
}

/// The default `{{ path }}` renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderRenderer;

impl TemplateRenderer for PlaceholderRenderer {
    fn render(&self, template: &str, context: &Value) -> Result<Map<String, Value>, TemplateError> {
        let text = substitute(template, context)?;
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(TemplateError::NotAnObject),
            Err(err) => Err(TemplateError::InvalidJson(err.to_string())),
        }
    }
}

fn substitute(template: &str, context: &Value) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0usize;
    let mut in_string = false;

    while let Some(start) = rest.find("{{") {
        let literal = &rest[..start];
        in_string = track_string_state(literal, in_string);
        out.push_str(literal);

        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            return Err(TemplateError::Unclosed(offset + start));
        };
        let expression = after_open[..end].trim();
        if expression.is_empty() {
            return Err(TemplateError::EmptyPlaceholder(offset + start));
        }

        let value = evaluate(expression, context);
        let mut consumed = start + 2 + end + 2;
        let tail = &rest[consumed..];

        if in_string {
            if out.ends_with('"') && tail.starts_with('"') && !ends_with_escaped_quote(&out) {
                // Whole-string placeholder: drop the quotes, emit typed JSON.
                out.pop();
                out.push_str(&value.to_string());
                consumed += 1;
                in_string = false;
            } else {
                out.push_str(&escape_fragment(&value));
            }
        } else {
            out.push_str(&value.to_string());
        }

        offset += consumed;
        rest = &rest[consumed..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Whether we are inside a JSON string literal after `text`.
fn track_string_state(text: &str, mut in_string: bool) -> bool {
    let mut escaped = false;
    for c in text.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
        } else if c == '"' {
            in_string = true;
        }
    }
    in_string
}

fn ends_with_escaped_quote(out: &str) -> bool {
    let without_quote = &out[..out.len() - 1];
    let backslashes = without_quote.chars().rev().take_while(|c| *c == '\\').count();
    backslashes % 2 == 1
}

/// Render `value` as text for splicing into an existing JSON string.
fn escape_fragment(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => {
            let quoted = Value::String(text.clone()).to_string();
            quoted[1..quoted.len() - 1].to_string()
        }
        other => {
            let quoted = Value::String(other.to_string()).to_string();
            quoted[1..quoted.len() - 1].to_string()
        }
    }
}

fn evaluate(expression: &str, context: &Value) -> Value {
    let (path, fallback) = match expression.split_once("??") {
        Some((path, fallback)) => (path.trim(), Some(fallback.trim())),
        None => (expression, None),
    };

    match lookup_path(context, path) {
        Some(value) if !value.is_null() => value.clone(),
        _ => fallback.map(parse_fallback).unwrap_or(Value::Null),
    }
}

fn parse_fallback(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Resolve `a.b.0.c` against `root`; numeric segments index arrays.
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .try_fold(root, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> Value {
        json!({
            "candidate": {
                "title": "The \"Quoted\" Book",
                "foreignBookId": "555",
                "editions": [{"foreignEditionId": "e-1"}],
                "author": {"authorName": "Jane Doe", "id": 7}
            },
            "options": {"searchForMissing": true, "qualityProfileId": 3},
            "defaults": {"rootFolderPath": "/books", "tags": [1, 2]}
        })
    }

    #[test]
    fn whole_string_placeholders_keep_json_types() {
        let template = r#"{
            "title": "{{ candidate.title }}",
            "qualityProfileId": "{{ options.qualityProfileId }}",
            "tags": {{ defaults.tags }},
            "author": "{{candidate.author}}",
            "edition": "{{ candidate.editions.0.foreignEditionId }}"
        }"#;

        let rendered = PlaceholderRenderer.render(template, &context()).unwrap();
        assert_eq!(rendered["title"], json!("The \"Quoted\" Book"));
        assert_eq!(rendered["qualityProfileId"], json!(3));
        assert_eq!(rendered["tags"], json!([1, 2]));
        assert_eq!(rendered["author"]["id"], json!(7));
        assert_eq!(rendered["edition"], json!("e-1"));
    }

    #[test]
    fn fragments_are_spliced_as_text() {
        let template = r#"{"label": "{{ candidate.author.authorName }}: {{ candidate.title }} #{{ options.qualityProfileId }}"}"#;
        let rendered = PlaceholderRenderer.render(template, &context()).unwrap();
        assert_eq!(
            rendered["label"],
            json!("Jane Doe: The \"Quoted\" Book #3")
        );
    }

    #[test]
    fn missing_values_render_null_or_fallback() {
        let template = r#"{
            "missing": "{{ candidate.nope }}",
            "monitored": {{ options.monitored ?? true }},
            "folder": "{{ options.rootFolderPath ?? "/fallback" }}"
        }"#;
        let rendered = PlaceholderRenderer.render(template, &context()).unwrap();
        assert_eq!(rendered["missing"], Value::Null);
        assert_eq!(rendered["monitored"], json!(true));
        assert_eq!(rendered["folder"], json!("/fallback"));
    }

    #[test]
    fn malformed_templates_are_rejected() {
        assert_eq!(
            PlaceholderRenderer.render(r#"{"a": {{ candidate.title "#, &context()),
            Err(TemplateError::Unclosed(6))
        );
        assert!(matches!(
            PlaceholderRenderer.render(r#"{"a": {{ }} }"#, &context()),
            Err(TemplateError::EmptyPlaceholder(_))
        ));
        assert_eq!(
            PlaceholderRenderer.render("[1, 2]", &context()),
            Err(TemplateError::NotAnObject)
        );
        assert!(matches!(
            PlaceholderRenderer.render("{ nope", &context()),
            Err(TemplateError::InvalidJson(_))
        ));
    }
}
