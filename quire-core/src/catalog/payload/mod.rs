//! Creation payloads: typed base, operator template overlay, sanitization.

pub mod sanitize;
pub mod template;

use std::sync::Arc;

use quire_model::CandidateRecord;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

pub use sanitize::{SanitizeMode, Sanitizer, clean_author_name};
pub use template::{PlaceholderRenderer, TemplateError, TemplateRenderer};

use super::{InstanceDefaults, reference::ReferenceLookup};
use crate::error::CatalogError;

/// Per-attempt knobs; start from [`PayloadOptions::from_defaults`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadOptions {
    pub quality_profile_id: i64,
    pub metadata_profile_id: i64,
    pub root_folder_path: String,
    pub tags: Vec<i64>,
    pub search_for_missing: bool,
}

impl PayloadOptions {
    pub fn from_defaults(defaults: &InstanceDefaults) -> Self {
        Self {
            quality_profile_id: defaults.quality_profile_id,
            metadata_profile_id: defaults.metadata_profile_id,
            root_folder_path: defaults.root_folder_path.clone(),
            tags: defaults.tags.clone(),
            search_for_missing: defaults.search_for_missing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOptions {
    pub monitor: String,
    pub search_for_missing_books: bool,
}

/// Typed base payload: the selected candidate plus the fields the catalog
/// service needs to create it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookPayload {
    #[serde(flatten)]
    pub candidate: CandidateRecord,
    pub monitored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_profile_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_profile_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_folder_path: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<i64>,
    pub add_options: AddOptions,
}

impl BookPayload {
    pub fn new(candidate: CandidateRecord, options: &PayloadOptions) -> Self {
        Self {
            candidate,
            monitored: true,
            quality_profile_id: (options.quality_profile_id > 0)
                .then_some(options.quality_profile_id),
            metadata_profile_id: (options.metadata_profile_id > 0)
                .then_some(options.metadata_profile_id),
            root_folder_path: Some(options.root_folder_path.clone())
                .filter(|path| !path.is_empty()),
            tags: options.tags.clone(),
            add_options: AddOptions {
                monitor: "all".into(),
                search_for_missing_books: options.search_for_missing,
            },
        }
    }

    pub fn into_map(self) -> Result<Map<String, Value>, CatalogError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(CatalogError::Validation(
                "book payload did not serialize to an object".into(),
            )),
            Err(err) => Err(CatalogError::Validation(format!(
                "book payload could not be serialized: {err}"
            ))),
        }
    }
}

/// Builds sanitized creation payloads for one catalog instance.
#[derive(Clone)]
pub struct PayloadBuilder {
    references: Arc<dyn ReferenceLookup>,
    renderer: Arc<dyn TemplateRenderer>,
    template: Option<String>,
    defaults: InstanceDefaults,
}

impl std::fmt::Debug for PayloadBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadBuilder")
            .field("template", &self.template.is_some())
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl PayloadBuilder {
    pub fn new(references: Arc<dyn ReferenceLookup>, defaults: InstanceDefaults) -> Self {
        Self {
            references,
            renderer: Arc::new(PlaceholderRenderer),
            template: None,
            defaults,
        }
    }

    pub fn with_template(mut self, template: Option<String>) -> Self {
        self.template = template.filter(|template| !template.trim().is_empty());
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn defaults(&self) -> &InstanceDefaults {
        &self.defaults
    }

    pub fn options(&self) -> PayloadOptions {
        PayloadOptions::from_defaults(&self.defaults)
    }

    /// Typed base with the operator template overlaid, before sanitization.
    ///
    /// A template that fails to render is logged and skipped so the typed
    /// base still goes out.
    pub fn render(
        &self,
        candidate: &CandidateRecord,
        options: &PayloadOptions,
    ) -> Result<Map<String, Value>, CatalogError> {
        let mut payload = BookPayload::new(candidate.clone(), options).into_map()?;

        let Some(template) = self.template.as_deref() else {
            return Ok(payload);
        };

        let context = json!({
            "candidate": candidate,
            "options": options,
            "defaults": &self.defaults,
        });
        match self.renderer.render(template, &context) {
            Ok(overlay) => {
                debug!(keys = overlay.len(), "applying payload template");
                payload.extend(overlay);
            }
            Err(err) => warn!(error = %err, "payload template failed to render; using base payload"),
        }
        Ok(payload)
    }

    pub async fn build_value(
        &self,
        candidate: &CandidateRecord,
        options: &PayloadOptions,
        mode: SanitizeMode,
    ) -> Result<Map<String, Value>, CatalogError> {
        if candidate.title.trim().is_empty() {
            return Err(CatalogError::Validation("candidate has no title".into()));
        }
        let mut payload = self.render(candidate, options)?;
        Sanitizer::new(self.references.as_ref(), options, mode)
            .sanitize(&mut payload)
            .await;
        Ok(payload)
    }

    /// Serialized, sanitized payload for `candidate`.
    pub async fn build(
        &self,
        candidate: &CandidateRecord,
        options: &PayloadOptions,
    ) -> Result<Vec<u8>, CatalogError> {
        let payload = self
            .build_value(candidate, options, SanitizeMode::Build)
            .await?;
        to_bytes(&payload)
    }

    /// Re-sanitize a previously built payload.
    pub async fn build_from_raw(
        &self,
        raw: &[u8],
        mode: SanitizeMode,
    ) -> Result<Vec<u8>, CatalogError> {
        let mut payload = match serde_json::from_slice::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(CatalogError::Validation(
                    "stored payload is not a JSON object".into(),
                ));
            }
            Err(err) => {
                return Err(CatalogError::Validation(format!(
                    "stored payload is not valid JSON: {err}"
                )));
            }
        };

        let options = self.options();
        Sanitizer::new(self.references.as_ref(), &options, mode)
            .sanitize(&mut payload)
            .await;
        to_bytes(&payload)
    }
}

fn to_bytes(payload: &Map<String, Value>) -> Result<Vec<u8>, CatalogError> {
    serde_json::to_vec(payload)
        .map_err(|err| CatalogError::Validation(format!("payload could not be serialized: {err}")))
}
