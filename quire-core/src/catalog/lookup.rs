use std::{sync::Arc, time::Duration};

use quire_model::CandidateRecord;
use tracing::{debug, info};

use super::client::{CatalogClient, CatalogRequest};
use crate::{cache::CatalogCache, error::CatalogError};

/// Cached search against the catalog service's lookup endpoint.
#[derive(Debug, Clone)]
pub struct LookupClient {
    client: CatalogClient,
    cache: Arc<CatalogCache>,
    endpoint: String,
    timeout: Duration,
}

impl LookupClient {
    pub fn new(
        client: CatalogClient,
        cache: Arc<CatalogCache>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            cache,
            endpoint: endpoint.into(),
            timeout,
        }
    }

    pub async fn lookup(&self, term: &str) -> Result<Vec<CandidateRecord>, CatalogError> {
        let term = term.trim();
        if term.is_empty() {
            return Err(CatalogError::Validation("lookup term is empty".into()));
        }

        let scope = self.client.base_url();
        if let Some(hit) = self.cache.cached_lookup(scope, term) {
            debug!(term, results = hit.len(), "lookup cache hit");
            return Ok(hit);
        }

        let request = CatalogRequest::get(&self.endpoint, self.timeout).query("term", term);
        let records: Vec<CandidateRecord> = self.client.get_json(request).await?;

        info!(term, results = records.len(), "catalog lookup");
        self.cache.store_lookup(scope, term, records.clone());
        Ok(records)
    }
}
