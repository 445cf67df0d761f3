use std::{fmt, time::Duration};

use quire_model::CollectionKind;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_ADD_ENDPOINT, DEFAULT_ADD_METHOD, DEFAULT_APPROVAL_TOKEN_TTL,
    DEFAULT_LOOKUP_CACHE_TTL, DEFAULT_LOOKUP_ENDPOINT, DEFAULT_LOOKUP_TIMEOUT,
    DEFAULT_METADATA_PROFILE_ID, DEFAULT_MONITOR_ATTEMPT_TIMEOUT,
    DEFAULT_MONITOR_BUDGET, DEFAULT_MONITOR_INTERVAL, DEFAULT_PROBE_TIMEOUT,
    DEFAULT_QUALITY_PROFILE_ID, DEFAULT_SUBMIT_TIMEOUT,
};
use crate::util::{deserialize_duration, normalize_endpoint, serialize_duration};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub catalogs: CatalogsConfig,
    pub engine: EngineConfig,
}

impl Config {
    /// Settings for `kind`, only when the instance is actually usable.
    pub fn catalog(&self, kind: CollectionKind) -> Option<&CatalogInstanceConfig> {
        self.catalogs.get(kind).filter(|cfg| cfg.is_configured())
    }

    pub fn normalize(&mut self) {
        for instance in [&mut self.catalogs.ebook, &mut self.catalogs.audiobook]
            .into_iter()
            .flatten()
        {
            instance.normalize();
        }
    }
}

/// Catalog-service instances, one per collection kind.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogsConfig {
    pub ebook: Option<CatalogInstanceConfig>,
    pub audiobook: Option<CatalogInstanceConfig>,
}

impl CatalogsConfig {
    pub fn get(&self, kind: CollectionKind) -> Option<&CatalogInstanceConfig> {
        match kind {
            CollectionKind::Ebook => self.ebook.as_ref(),
            CollectionKind::Audiobook => self.audiobook.as_ref(),
        }
    }

    pub fn get_or_insert(&mut self, kind: CollectionKind) -> &mut CatalogInstanceConfig {
        match kind {
            CollectionKind::Ebook => self.ebook.get_or_insert_with(Default::default),
            CollectionKind::Audiobook => {
                self.audiobook.get_or_insert_with(Default::default)
            }
        }
    }
}

/// Connection and payload defaults for one catalog-service instance.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogInstanceConfig {
    /// API root, e.g. `http://readarr:8787/api/v1`.
    pub base_url: String,
    pub api_key: String,
    pub lookup_endpoint: String,
    pub add_endpoint: String,
    pub add_method: String,
    /// Operator template rendered over the candidate; its keys overlay the
    /// generated base payload.
    pub add_payload_template: Option<String>,
    pub default_quality_profile_id: i64,
    pub default_metadata_profile_id: i64,
    pub default_root_folder_path: String,
    pub default_tags: Vec<i64>,
    pub search_for_missing: bool,
    pub insecure_skip_verify: bool,
}

impl Default for CatalogInstanceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            lookup_endpoint: DEFAULT_LOOKUP_ENDPOINT.to_string(),
            add_endpoint: DEFAULT_ADD_ENDPOINT.to_string(),
            add_method: DEFAULT_ADD_METHOD.to_string(),
            add_payload_template: None,
            default_quality_profile_id: DEFAULT_QUALITY_PROFILE_ID,
            default_metadata_profile_id: DEFAULT_METADATA_PROFILE_ID,
            default_root_folder_path: String::new(),
            default_tags: Vec::new(),
            search_for_missing: true,
            insecure_skip_verify: false,
        }
    }
}

impl fmt::Debug for CatalogInstanceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogInstanceConfig")
            .field("base_url", &self.base_url)
            .field(
                "api_key",
                &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" },
            )
            .field("lookup_endpoint", &self.lookup_endpoint)
            .field("add_endpoint", &self.add_endpoint)
            .field("add_method", &self.add_method)
            .field("add_payload_template", &self.add_payload_template.is_some())
            .field("default_quality_profile_id", &self.default_quality_profile_id)
            .field("default_metadata_profile_id", &self.default_metadata_profile_id)
            .field("default_root_folder_path", &self.default_root_folder_path)
            .field("default_tags", &self.default_tags)
            .field("search_for_missing", &self.search_for_missing)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .finish()
    }
}

impl CatalogInstanceConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let mut config = Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            ..Self::default()
        };
        config.normalize();
        config
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.trim().is_empty() && !self.api_key.trim().is_empty()
    }

    pub fn normalize(&mut self) {
        self.base_url = self.base_url.trim().trim_end_matches('/').to_string();
        self.api_key = self.api_key.trim().to_string();
        self.lookup_endpoint = normalize_endpoint(&self.lookup_endpoint);
        self.add_endpoint = normalize_endpoint(&self.add_endpoint);
        self.add_method = self.add_method.trim().to_ascii_uppercase();
        if self.lookup_endpoint.is_empty() {
            self.lookup_endpoint = DEFAULT_LOOKUP_ENDPOINT.to_string();
        }
        if self.add_endpoint.is_empty() {
            self.add_endpoint = DEFAULT_ADD_ENDPOINT.to_string();
        }
        if self.add_method.is_empty() {
            self.add_method = DEFAULT_ADD_METHOD.to_string();
        }
        if self
            .add_payload_template
            .as_deref()
            .is_some_and(|template| template.trim().is_empty())
        {
            self.add_payload_template = None;
        }
    }
}

/// Timeouts and schedules for the reconciliation engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    #[serde(
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub lookup_cache_ttl: Duration,
    #[serde(
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub lookup_timeout: Duration,
    /// Timeout for reference-data probes (profiles, folders, authors).
    #[serde(
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub probe_timeout: Duration,
    #[serde(
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub submit_timeout: Duration,
    #[serde(
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub approval_token_ttl: Duration,
    pub monitor: MonitorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookup_cache_ttl: DEFAULT_LOOKUP_CACHE_TTL,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            approval_token_ttl: DEFAULT_APPROVAL_TOKEN_TTL,
            monitor: MonitorConfig::default(),
        }
    }
}

/// Schedule of the post-creation monitor task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    #[serde(
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub interval: Duration,
    /// Total lifetime of the task; it stops unconditionally afterwards.
    #[serde(
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub budget: Duration,
    #[serde(
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub attempt_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_MONITOR_INTERVAL,
            budget: DEFAULT_MONITOR_BUDGET,
            attempt_timeout: DEFAULT_MONITOR_ATTEMPT_TIMEOUT,
        }
    }
}
