//! Catalog-service integration: lookup, selection, reference data, payload
//! building, submission and monitoring for each configured instance.

pub mod client;
pub mod lookup;
pub mod monitor;
pub mod payload;
pub mod reference;
pub mod selector;
pub mod submit;

use std::{sync::Arc, time::Duration};

use quire_config::{CatalogInstanceConfig, Config, EngineConfig};
use quire_model::{CandidateRecord, CollectionKind};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::{cache::CatalogCache, error::CatalogError};
use client::CatalogClient;
use lookup::LookupClient;
use monitor::MonitorTarget;
use payload::PayloadBuilder;
use reference::{ReferenceLookup, ReferenceResolver};
use submit::Submitter;

/// Operator defaults of one instance, as seen by the resolver and templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDefaults {
    pub quality_profile_id: i64,
    pub metadata_profile_id: i64,
    pub root_folder_path: String,
    pub tags: Vec<i64>,
    pub search_for_missing: bool,
}

impl From<&CatalogInstanceConfig> for InstanceDefaults {
    fn from(config: &CatalogInstanceConfig) -> Self {
        Self {
            quality_profile_id: config.default_quality_profile_id,
            metadata_profile_id: config.default_metadata_profile_id,
            root_folder_path: config.default_root_folder_path.trim().to_string(),
            tags: config.default_tags.clone(),
            search_for_missing: config.search_for_missing,
        }
    }
}

/// One configured catalog-service instance and the clients built over it.
#[derive(Debug, Clone)]
pub struct CatalogService {
    kind: CollectionKind,
    client: CatalogClient,
    lookup: LookupClient,
    references: Arc<ReferenceResolver>,
    builder: PayloadBuilder,
    submitter: Arc<Submitter>,
    probe_timeout: Duration,
}

impl CatalogService {
    pub fn new(
        kind: CollectionKind,
        config: &CatalogInstanceConfig,
        engine: &EngineConfig,
        cache: Arc<CatalogCache>,
    ) -> Result<Self, CatalogError> {
        let client = CatalogClient::new(config)?;
        let defaults = InstanceDefaults::from(config);

        let lookup = LookupClient::new(
            client.clone(),
            cache.clone(),
            config.lookup_endpoint.clone(),
            engine.lookup_timeout,
        );
        let references = Arc::new(ReferenceResolver::new(
            client.clone(),
            cache,
            defaults.clone(),
            engine.probe_timeout,
        ));
        let builder = PayloadBuilder::new(references.clone() as Arc<dyn ReferenceLookup>, defaults)
            .with_template(config.add_payload_template.clone());
        let submitter = Arc::new(Submitter::new(
            client.clone(),
            config.add_endpoint.clone(),
            &config.add_method,
            engine.submit_timeout,
        )?);

        Ok(Self {
            kind,
            client,
            lookup,
            references,
            builder,
            submitter,
            probe_timeout: engine.probe_timeout,
        })
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    pub fn base_url(&self) -> &str {
        self.client.base_url()
    }

    pub fn client(&self) -> &CatalogClient {
        &self.client
    }

    pub fn references(&self) -> &Arc<ReferenceResolver> {
        &self.references
    }

    pub fn builder(&self) -> &PayloadBuilder {
        &self.builder
    }

    pub fn submitter(&self) -> &Arc<Submitter> {
        &self.submitter
    }

    pub fn monitor_target(&self) -> Arc<dyn MonitorTarget> {
        self.submitter.clone()
    }

    pub async fn lookup(&self, term: &str) -> Result<Vec<CandidateRecord>, CatalogError> {
        self.lookup.lookup(term).await
    }

    pub async fn probe(&self) -> Result<Value, CatalogError> {
        self.client.probe(self.probe_timeout).await
    }
}

/// Catalog services by collection kind, sharing one cache.
#[derive(Debug, Clone, Default)]
pub struct Catalogs {
    ebook: Option<CatalogService>,
    audiobook: Option<CatalogService>,
    cache: Arc<CatalogCache>,
}

impl Catalogs {
    pub fn from_config(config: &Config) -> Result<Self, CatalogError> {
        let cache = Arc::new(CatalogCache::new(config.engine.lookup_cache_ttl));
        Self::with_cache(config, cache)
    }

    pub fn with_cache(config: &Config, cache: Arc<CatalogCache>) -> Result<Self, CatalogError> {
        let mut catalogs = Self {
            ebook: None,
            audiobook: None,
            cache,
        };
        for kind in [CollectionKind::Ebook, CollectionKind::Audiobook] {
            if let Some(instance) = config.catalog(kind) {
                let service =
                    CatalogService::new(kind, instance, &config.engine, catalogs.cache.clone())?;
                info!(kind = %kind, base_url = %service.base_url(), "catalog service configured");
                catalogs.insert(service);
            }
        }
        Ok(catalogs)
    }

    pub fn insert(&mut self, service: CatalogService) {
        match service.kind() {
            CollectionKind::Ebook => self.ebook = Some(service),
            CollectionKind::Audiobook => self.audiobook = Some(service),
        }
    }

    pub fn get(&self, kind: CollectionKind) -> Option<&CatalogService> {
        match kind {
            CollectionKind::Ebook => self.ebook.as_ref(),
            CollectionKind::Audiobook => self.audiobook.as_ref(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogService> {
        self.ebook.iter().chain(self.audiobook.iter())
    }

    pub fn cache(&self) -> &Arc<CatalogCache> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_configured_instances_are_registered() {
        let mut config = Config::default();
        config.catalogs.ebook = Some(CatalogInstanceConfig::new("http://readarr:8787/api/v1", "key"));
        config.catalogs.audiobook = Some(CatalogInstanceConfig::new("http://audio:8787/api/v1", ""));

        let catalogs = Catalogs::from_config(&config).unwrap();
        assert!(catalogs.get(CollectionKind::Ebook).is_some());
        assert!(catalogs.get(CollectionKind::Audiobook).is_none());
        assert_eq!(catalogs.iter().count(), 1);
    }

    #[test]
    fn default_registry_has_no_services() {
        let catalogs = Catalogs::default();
        assert_eq!(catalogs.iter().count(), 0);
        assert_eq!(
            catalogs.cache().lookup_ttl(),
            quire_config::constants::DEFAULT_LOOKUP_CACHE_TTL
        );
    }

    #[test]
    fn defaults_come_from_instance_config() {
        let mut instance = CatalogInstanceConfig::new("http://r", "k");
        instance.default_root_folder_path = " /books ".into();
        instance.default_tags = vec![3];
        let defaults = InstanceDefaults::from(&instance);
        assert_eq!(defaults.root_folder_path, "/books");
        assert_eq!(defaults.tags, vec![3]);
        assert!(defaults.search_for_missing);
    }
}
