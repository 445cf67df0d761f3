//! Gap-filling normalization of a creation payload against live reference
//! data.
//!
//! Steps run in a fixed order (quality profile, metadata profile, root
//! folder, monitoring defaults, tags, editions, `authorId`, author
//! enrichment, author defaults). Values the caller already set are kept;
//! only missing fields are filled and invalid null markers removed. A
//! reference lookup that fails is logged and the step keeps what it has.

use std::collections::HashMap;

use quire_model::serde_helpers::value_as_id;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use super::PayloadOptions;
use crate::catalog::reference::ReferenceLookup;

/// How far author enrichment may go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SanitizeMode {
    /// Look authors up and import them into the catalog when unknown.
    #[default]
    Build,
    /// Look authors up only; never create catalog entities.
    Approval,
}

pub struct Sanitizer<'a> {
    references: &'a dyn ReferenceLookup,
    options: &'a PayloadOptions,
    mode: SanitizeMode,
}

impl std::fmt::Debug for Sanitizer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sanitizer")
            .field("options", self.options)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl<'a> Sanitizer<'a> {
    pub fn new(
        references: &'a dyn ReferenceLookup,
        options: &'a PayloadOptions,
        mode: SanitizeMode,
    ) -> Self {
        Self {
            references,
            options,
            mode,
        }
    }

    pub async fn sanitize(&self, payload: &mut Map<String, Value>) {
        self.apply_quality_profile(payload).await;
        apply_metadata_profile(payload, self.options.metadata_profile_id);
        self.apply_root_folder(payload).await;
        apply_monitoring_defaults(payload, self.options.search_for_missing);
        normalize_tags(payload, &self.options.tags);
        normalize_editions(payload);
        normalize_author_id(payload);
        self.enrich_author(payload).await;
        apply_author_defaults(payload, self.options.search_for_missing);
    }

    async fn apply_quality_profile(&self, payload: &mut Map<String, Value>) {
        let preferred = payload
            .get("qualityProfileId")
            .and_then(value_as_id)
            .unwrap_or(self.options.quality_profile_id);

        let resolved = match self.references.valid_quality_profile_id(preferred).await {
            Ok(id) => id,
            Err(err) => {
                warn!(error = %err, preferred, "quality profile lookup failed; keeping preferred id");
                preferred
            }
        };

        set_id_or_remove(payload, "qualityProfileId", resolved);

        let mut nested = Vec::new();
        for_each_author_scope(payload, |scope| {
            if let Some(id) = scope.get("qualityProfileId").and_then(value_as_id) {
                nested.push(id);
            }
        });
        nested.sort_unstable();
        nested.dedup();

        // Nested ids the service does not know are replaced by `resolved`.
        let mut replacements = HashMap::new();
        for id in nested.into_iter().filter(|id| *id != resolved) {
            let known = match self.references.valid_quality_profile_id(id).await {
                Ok(valid) => valid == id,
                Err(err) => {
                    warn!(error = %err, id, "quality profile lookup failed; keeping nested id");
                    true
                }
            };
            if !known {
                debug!(id, resolved, "replacing unknown nested quality profile");
                replacements.insert(id, resolved);
            }
        }

        for_each_author_scope(payload, |scope| {
            let id = scope
                .get("qualityProfileId")
                .and_then(value_as_id)
                .map(|id| replacements.get(&id).copied().unwrap_or(id))
                .unwrap_or(resolved);
            set_id_or_remove(scope, "qualityProfileId", id);
        });
    }

    async fn apply_root_folder(&self, payload: &mut Map<String, Value>) {
        let explicit = payload
            .get("rootFolderPath")
            .and_then(non_empty_text)
            .map(str::to_string);
        let preferred = explicit.unwrap_or_else(|| self.options.root_folder_path.clone());

        let resolved = match self.references.valid_root_folder_path(&preferred).await {
            Ok(path) => path,
            Err(err) => {
                warn!(error = %err, "root folder lookup failed; keeping preferred path");
                preferred
            }
        };

        if resolved.is_empty() {
            payload.remove("rootFolderPath");
            return;
        }
        payload.insert("rootFolderPath".into(), json!(resolved));
        for_each_author_scope(payload, |scope| {
            if scope.get("rootFolderPath").and_then(non_empty_text).is_none() {
                scope.insert("rootFolderPath".into(), json!(resolved));
            }
        });
    }

    async fn enrich_author(&self, payload: &mut Map<String, Value>) {
        let top_level_id = payload.get("authorId").and_then(value_as_id);
        let mut author = match payload.remove("author") {
            Some(Value::Object(author)) => author,
            Some(Value::String(name)) if !name.trim().is_empty() => {
                let mut author = Map::new();
                author.insert("authorName".into(), json!(name.trim()));
                author
            }
            Some(Value::Null) | Some(Value::String(_)) | None => match top_level_id {
                Some(id) => {
                    let mut author = Map::new();
                    author.insert("id".into(), json!(id));
                    author
                }
                None => return,
            },
            Some(other) => {
                debug!("leaving author of unexpected shape untouched");
                payload.insert("author".into(), other);
                return;
            }
        };

        let author_id = author.get("id").and_then(value_as_id);
        set_id_or_remove(&mut author, "id", author_id.unwrap_or(0));

        if author.get("foreignAuthorId").and_then(non_empty_text).is_none() {
            let mut id = author_id;
            if id.is_none()
                && let Some(name) = author_name(&author)
            {
                id = self.resolve_author_by_name(&name).await;
                if let Some(id) = id {
                    author.insert("id".into(), json!(id));
                }
            }
            if let Some(id) = id {
                self.backfill_author(&mut author, id).await;
            }
        }

        if top_level_id.is_none()
            && let Some(id) = author.get("id").and_then(value_as_id)
        {
            payload.insert("authorId".into(), json!(id));
        }
        payload.insert("author".into(), Value::Object(author));
    }

    async fn resolve_author_by_name(&self, name: &str) -> Option<i64> {
        match self.references.author_id_by_name(name).await {
            Ok(Some(id)) => return Some(id),
            Ok(None) => debug!(author = name, "author not found in catalog"),
            Err(err) => warn!(author = name, error = %err, "author lookup failed"),
        }

        if self.mode == SanitizeMode::Approval {
            return None;
        }

        let cleaned = clean_author_name(name);
        if cleaned.is_empty() {
            return None;
        }
        match self.references.create_author(&cleaned).await {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(author = %cleaned, error = %err, "author import failed");
                None
            }
        }
    }

    async fn backfill_author(&self, author: &mut Map<String, Value>, id: i64) {
        match self.references.author_by_id(id).await {
            Ok(details) => {
                if author_name(author).is_none()
                    && let Some(name) = details.author_name
                {
                    author.insert("authorName".into(), json!(name));
                }
                if author.get("foreignAuthorId").and_then(non_empty_text).is_none()
                    && let Some(foreign) = details.foreign_author_id
                {
                    author.insert("foreignAuthorId".into(), json!(foreign));
                }
            }
            Err(err) => warn!(id, error = %err, "author backfill failed"),
        }
    }
}

fn apply_metadata_profile(payload: &mut Map<String, Value>, default_id: i64) {
    let id = payload
        .get("metadataProfileId")
        .and_then(value_as_id)
        .unwrap_or(default_id);
    set_id_or_remove(payload, "metadataProfileId", id);
    for_each_author_scope(payload, |scope| fill_id(scope, "metadataProfileId", id));
}

fn apply_monitoring_defaults(payload: &mut Map<String, Value>, search_for_missing: bool) {
    let monitored = payload.get("monitored").and_then(as_flag).unwrap_or(true);
    payload.insert("monitored".into(), json!(monitored));

    fill_object(
        payload,
        "addOptions",
        [
            ("monitor", json!("all")),
            ("searchForMissingBooks", json!(search_for_missing)),
        ],
    );
}

/// Coerce `tags` into a list of integer ids. A missing `tags` key only gets
/// the default list when one is configured.
fn normalize_tags(payload: &mut Map<String, Value>, default_tags: &[i64]) {
    match payload.get("tags").and_then(coerce_tags) {
        Some(tags) => {
            payload.insert("tags".into(), json!(tags));
        }
        None if default_tags.is_empty() => {
            payload.remove("tags");
        }
        None => {
            payload.insert("tags".into(), json!(default_tags));
        }
    }
}

fn coerce_tags(value: &Value) -> Option<Vec<i64>> {
    match value {
        Value::Array(items) => Some(items.iter().filter_map(tag_id).collect()),
        Value::String(text) => {
            let ids: Vec<i64> = text
                .split(',')
                .filter_map(|part| part.trim().parse().ok())
                .collect();
            (!ids.is_empty()).then_some(ids)
        }
        Value::Number(_) => tag_id(value).map(|id| vec![id]),
        _ => None,
    }
}

fn tag_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn normalize_editions(payload: &mut Map<String, Value>) {
    let mut editions = match payload.remove("editions") {
        Some(Value::Array(items)) => items,
        Some(Value::Object(edition)) => vec![Value::Object(edition)],
        _ => Vec::new(),
    };

    if editions.is_empty()
        && let Some(foreign_edition_id) = payload.get("foreignEditionId").and_then(id_text)
    {
        editions.push(json!({
            "foreignEditionId": foreign_edition_id,
            "monitored": true,
        }));
    }

    payload.insert("editions".into(), Value::Array(editions));
}

/// Numeric-like `authorId` values become integers; anything else is removed.
fn normalize_author_id(payload: &mut Map<String, Value>) {
    if let Some(raw) = payload.get("authorId") {
        let id = value_as_id(raw).unwrap_or(0);
        set_id_or_remove(payload, "authorId", id);
    }
}

fn apply_author_defaults(payload: &mut Map<String, Value>, search_for_missing: bool) {
    let tags = payload.get("tags").cloned();
    let Some(Value::Object(author)) = payload.get_mut("author") else {
        return;
    };

    fill_object(
        author,
        "addOptions",
        [
            ("monitor", json!("all")),
            ("monitored", json!(true)),
            ("searchForMissingBooks", json!(search_for_missing)),
        ],
    );

    if let Some(tags) = tags
        && !author.get("tags").is_some_and(Value::is_array)
    {
        author.insert("tags".into(), tags);
    }
}

/// Strip bracketed qualifiers and stray punctuation from an author name
/// before importing it.
pub fn clean_author_name(name: &str) -> String {
    let mut cleaned = String::with_capacity(name.len());
    let mut depth = 0usize;
    for c in name.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => cleaned.push(c),
            _ => {}
        }
    }

    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| matches!(c, ',' | ';' | ':' | '-' | '/'))
        .trim()
        .to_string()
}

fn author_name(author: &Map<String, Value>) -> Option<String> {
    ["authorName", "name"]
        .iter()
        .filter_map(|key| author.get(*key))
        .find_map(non_empty_text)
        .map(|name| name.trim().to_string())
}

/// Run `apply` on the nested author object and on its `value` sub-object.
fn for_each_author_scope(
    payload: &mut Map<String, Value>,
    mut apply: impl FnMut(&mut Map<String, Value>),
) {
    if let Some(Value::Object(author)) = payload.get_mut("author") {
        apply(author);
        if let Some(Value::Object(value)) = author.get_mut("value") {
            apply(value);
        }
    }
}

fn set_id_or_remove(map: &mut Map<String, Value>, key: &str, id: i64) {
    if id > 0 {
        map.insert(key.into(), json!(id));
    } else {
        map.remove(key);
    }
}

fn fill_id(map: &mut Map<String, Value>, key: &str, id: i64) {
    match map.get(key).and_then(value_as_id) {
        Some(existing) => {
            map.insert(key.into(), json!(existing));
        }
        None => set_id_or_remove(map, key, id),
    }
}

/// Ensure `map[key]` is an object and fill the given keys where missing.
fn fill_object(
    map: &mut Map<String, Value>,
    key: &str,
    defaults: impl IntoIterator<Item = (&'static str, Value)>,
) {
    let mut object = match map.remove(key) {
        Some(Value::Object(object)) => object,
        _ => Map::new(),
    };
    for (field, value) in defaults {
        object.entry(field).or_insert(value);
    }
    map.insert(key.into(), Value::Object(object));
}

fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn non_empty_text(value: &Value) -> Option<&str> {
    value
        .as_str()
        .map(str::trim)
        .filter(|text| !text.is_empty() && !text.eq_ignore_ascii_case("null"))
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        other => non_empty_text(other).map(str::to_string),
    }
}
