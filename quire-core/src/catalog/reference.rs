//! Live reference data (quality profiles, root folders, authors) owned by the
//! catalog service.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use quire_model::{AuthorDetails, QualityProfile, RootFolder};
use reqwest::Method;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::{
    InstanceDefaults,
    client::{CatalogClient, CatalogRequest},
};
use crate::{
    cache::CatalogCache,
    error::{CatalogError, flatten_error_detail},
};

/// Highest id probed when the profile list endpoint is unavailable.
const QUALITY_PROFILE_SWEEP_LIMIT: i64 = 25;

/// Reference lookups the payload sanitizer depends on.
#[async_trait]
pub trait ReferenceLookup: Send + Sync {
    /// `preferred` if the service knows it, else the configured default, else
    /// the first available profile, else `0` (omit the field).
    async fn valid_quality_profile_id(&self, preferred: i64) -> Result<i64, CatalogError>;

    /// Same pattern as [`Self::valid_quality_profile_id`]; empty means omit.
    async fn valid_root_folder_path(&self, preferred: &str) -> Result<String, CatalogError>;

    async fn author_id_by_name(&self, name: &str) -> Result<Option<i64>, CatalogError>;

    /// Import an author into the catalog and return its new id.
    async fn create_author(&self, name: &str) -> Result<i64, CatalogError>;

    async fn author_by_id(&self, id: i64) -> Result<AuthorDetails, CatalogError>;
}

/// [`ReferenceLookup`] against a live catalog-service instance.
#[derive(Debug, Clone)]
pub struct ReferenceResolver {
    client: CatalogClient,
    cache: Arc<CatalogCache>,
    defaults: InstanceDefaults,
    timeout: Duration,
}

impl ReferenceResolver {
    pub fn new(
        client: CatalogClient,
        cache: Arc<CatalogCache>,
        defaults: InstanceDefaults,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            cache,
            defaults,
            timeout,
        }
    }

    pub fn defaults(&self) -> &InstanceDefaults {
        &self.defaults
    }

    pub async fn quality_profiles(&self) -> Result<Vec<QualityProfile>, CatalogError> {
        match self
            .client
            .get_json::<Vec<QualityProfile>>(CatalogRequest::get("/qualityprofile", self.timeout))
            .await
        {
            Ok(profiles) if !profiles.is_empty() => Ok(profiles),
            Ok(_) => self.sweep_quality_profiles().await,
            Err(err) => {
                warn!(error = %err, "quality profile list unavailable; probing ids");
                self.sweep_quality_profiles().await
            }
        }
    }

    /// Probe `/qualityprofile/{id}` upwards from 1 until the service answers
    /// 404.
    async fn sweep_quality_profiles(&self) -> Result<Vec<QualityProfile>, CatalogError> {
        let mut found = Vec::new();
        for id in 1..=QUALITY_PROFILE_SWEEP_LIMIT {
            let endpoint = format!("/qualityprofile/{id}");
            let response = match self
                .client
                .execute(CatalogRequest::get(&endpoint, self.timeout))
                .await
            {
                Ok(response) => response,
                Err(err) if found.is_empty() => return Err(err),
                Err(err) => {
                    debug!(id, error = %err, "quality profile sweep interrupted");
                    break;
                }
            };

            if response.status.as_u16() == 404 {
                break;
            }
            match response.error_for_status().and_then(|ok| ok.json::<QualityProfile>()) {
                Ok(profile) => found.push(profile),
                Err(err) if found.is_empty() => return Err(err),
                Err(_) => break,
            }
        }
        debug!(count = found.len(), "quality profile sweep finished");
        Ok(found)
    }

    pub async fn root_folders(&self) -> Result<Vec<RootFolder>, CatalogError> {
        self.client
            .get_json(CatalogRequest::get("/rootfolder", self.timeout))
            .await
    }

    async fn search_authors(&self, name: &str) -> Result<Vec<AuthorDetails>, CatalogError> {
        self.client
            .get_json(CatalogRequest::get("/author/lookup", self.timeout).query("term", name))
            .await
    }

    fn author_payload(&self, name: &str, foreign_id: &str, tier: AuthorPayloadTier) -> Value {
        let mut payload = json!({
            "authorName": name,
            "foreignAuthorId": foreign_id,
            "monitored": true,
        });
        if tier == AuthorPayloadTier::Minimal {
            return payload;
        }

        let defaults = &self.defaults;
        payload["monitorNewItems"] = json!("all");
        payload["addOptions"] = json!({
            "monitor": "all",
            "searchForMissingBooks": defaults.search_for_missing,
        });
        if defaults.quality_profile_id > 0 {
            payload["qualityProfileId"] = json!(defaults.quality_profile_id);
        }
        if defaults.metadata_profile_id > 0 {
            payload["metadataProfileId"] = json!(defaults.metadata_profile_id);
        }
        if !defaults.tags.is_empty() {
            payload["tags"] = json!(defaults.tags);
        }
        if tier == AuthorPayloadTier::Full && !defaults.root_folder_path.is_empty() {
            payload["rootFolderPath"] = json!(defaults.root_folder_path);
        }
        payload
    }

    async fn post_author(&self, payload: &Value) -> Result<i64, AuthorCreateFailure> {
        let response = self
            .client
            .execute(CatalogRequest::new(Method::POST, "/author", self.timeout).json(payload))
            .await
            .map_err(AuthorCreateFailure::Transport)?;

        if !response.is_success() {
            return Err(AuthorCreateFailure::Rejected {
                status: response.status.as_u16(),
                detail: flatten_error_detail(&response.body),
            });
        }

        let created: AuthorDetails = response.json().map_err(AuthorCreateFailure::Transport)?;
        created.id.ok_or_else(|| {
            AuthorCreateFailure::Transport(CatalogError::InvalidResponse {
                status: response.status.as_u16(),
                url: response.url.clone(),
                message: "created author has no id".into(),
                body: crate::error::truncate_body(&response.body),
            })
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthorPayloadTier {
    Full,
    NoRootFolder,
    Minimal,
}

enum AuthorCreateFailure {
    Transport(CatalogError),
    Rejected { status: u16, detail: String },
}

impl AuthorCreateFailure {
    /// Next payload tier worth trying after this failure, if any.
    fn fallback(&self, current: AuthorPayloadTier) -> Option<AuthorPayloadTier> {
        let Self::Rejected { detail, .. } = self else {
            return None;
        };
        let detail = detail.to_ascii_lowercase();
        let mentions_null_reference = detail.contains("object reference not set")
            || detail.contains("null reference")
            || detail.contains("nullreference");

        match current {
            AuthorPayloadTier::Full if detail.contains("root folder") => {
                Some(AuthorPayloadTier::NoRootFolder)
            }
            AuthorPayloadTier::Full | AuthorPayloadTier::NoRootFolder
                if detail.contains("quality") || mentions_null_reference =>
            {
                Some(AuthorPayloadTier::Minimal)
            }
            _ => None,
        }
    }

    fn into_error(self, name: &str) -> CatalogError {
        match self {
            Self::Transport(err) => err,
            Self::Rejected { status, detail } => CatalogError::ReferenceResolution {
                what: "author",
                message: format!("creating {name:?} failed with HTTP {status}: {detail}"),
            },
        }
    }
}

/// Pick `preferred`, else `fallback`, else the first of `available`.
fn choose<'a, T: PartialEq + ?Sized>(
    available: &[&'a T],
    preferred: Option<&'a T>,
    fallback: Option<&'a T>,
) -> Option<&'a T> {
    preferred
        .filter(|wanted| available.contains(wanted))
        .or_else(|| fallback.filter(|wanted| available.contains(wanted)))
        .or_else(|| available.first().copied())
}

#[async_trait]
impl ReferenceLookup for ReferenceResolver {
    async fn valid_quality_profile_id(&self, preferred: i64) -> Result<i64, CatalogError> {
        let profiles = self.quality_profiles().await?;
        let ids: Vec<&i64> = profiles.iter().map(|profile| &profile.id).collect();
        let preferred = (preferred > 0).then_some(&preferred);
        let fallback =
            (self.defaults.quality_profile_id > 0).then_some(&self.defaults.quality_profile_id);

        let chosen = choose(&ids, preferred, fallback).copied().unwrap_or(0);
        if chosen == 0 {
            warn!("catalog service reports no quality profiles");
        }
        Ok(chosen)
    }

    async fn valid_root_folder_path(&self, preferred: &str) -> Result<String, CatalogError> {
        let folders = self.root_folders().await?;
        let paths: Vec<&str> = folders.iter().map(|folder| folder.path.as_str()).collect();
        let preferred = Some(preferred.trim()).filter(|path| !path.is_empty());
        let fallback = Some(self.defaults.root_folder_path.as_str()).filter(|path| !path.is_empty());

        let chosen = choose(&paths, preferred, fallback).unwrap_or_default();
        if chosen.is_empty() {
            warn!("catalog service reports no root folders");
        }
        Ok(chosen.to_string())
    }

    async fn author_id_by_name(&self, name: &str) -> Result<Option<i64>, CatalogError> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }

        let scope = self.client.base_url();
        if let Some(id) = self.cache.author_id(scope, name) {
            debug!(author = name, id, "author id cache hit");
            return Ok(Some(id));
        }

        let results = self.search_authors(name).await?;
        let exact = results
            .iter()
            .find(|author| author.id.is_some() && author.name_matches(name));
        let chosen = exact.or_else(|| results.iter().find(|author| author.id.is_some()));

        let Some(author) = chosen else {
            debug!(author = name, results = results.len(), "no catalog author id for name");
            return Ok(None);
        };
        let Some(id) = author.id else {
            return Ok(None);
        };

        let reported = author.author_name.as_deref().unwrap_or(name);
        self.cache.remember_author(scope, name, id, reported);
        Ok(Some(id))
    }

    async fn create_author(&self, name: &str) -> Result<i64, CatalogError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CatalogError::Validation("author name is empty".into()));
        }

        let results = self.search_authors(name).await?;
        let candidate = results
            .iter()
            .find(|author| author.name_matches(name) && author.foreign_author_id.is_some())
            .or_else(|| results.iter().find(|author| author.foreign_author_id.is_some()));
        let Some(candidate) = candidate else {
            return Err(CatalogError::ReferenceResolution {
                what: "author",
                message: format!("no catalog match for {name:?}"),
            });
        };

        // Already part of the library.
        if let Some(id) = candidate.id {
            let reported = candidate.author_name.as_deref().unwrap_or(name);
            self.cache.remember_author(self.client.base_url(), name, id, reported);
            return Ok(id);
        }

        let foreign_id = candidate.foreign_author_id.as_deref().unwrap_or_default();
        let reported = candidate
            .author_name
            .clone()
            .unwrap_or_else(|| name.to_string());

        let mut tier = AuthorPayloadTier::Full;
        loop {
            let payload = self.author_payload(&reported, foreign_id, tier);
            match self.post_author(&payload).await {
                Ok(id) => {
                    info!(author = %reported, id, ?tier, "imported author into catalog");
                    self.cache
                        .remember_author(self.client.base_url(), name, id, &reported);
                    return Ok(id);
                }
                Err(failure) => match failure.fallback(tier) {
                    Some(next) => {
                        warn!(author = %reported, ?tier, ?next, "author import rejected; retrying with a smaller payload");
                        tier = next;
                    }
                    None => return Err(failure.into_error(name)),
                },
            }
        }
    }

    async fn author_by_id(&self, id: i64) -> Result<AuthorDetails, CatalogError> {
        let endpoint = format!("/author/{id}");
        let author: AuthorDetails = self
            .client
            .get_json(CatalogRequest::get(&endpoint, self.timeout))
            .await?;

        if let Some(name) = author.author_name.as_deref() {
            self.cache
                .remember_author(self.client.base_url(), name, id, name);
        }
        Ok(author)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_then_default_then_first() {
        let available = [&3, &5, &8];
        assert_eq!(choose(&available, Some(&5), Some(&8)), Some(&5));
        assert_eq!(choose(&available, Some(&4), Some(&8)), Some(&8));
        assert_eq!(choose(&available, Some(&4), Some(&9)), Some(&3));
        assert_eq!(choose::<i64>(&[], Some(&4), Some(&9)), None);

        let folders = ["/books", "/audio"];
        let refs: Vec<&str> = folders.to_vec();
        assert_eq!(choose(&refs, Some("/audio"), None), Some("/audio"));
        assert_eq!(choose(&refs, Some("/nope"), None), Some("/books"));
    }

    #[test]
    fn author_fallback_tiers_follow_error_text() {
        let rejected = |detail: &str| AuthorCreateFailure::Rejected {
            status: 400,
            detail: detail.into(),
        };

        assert_eq!(
            rejected("RootFolderPath: Root folder does not exist").fallback(AuthorPayloadTier::Full),
            Some(AuthorPayloadTier::NoRootFolder)
        );
        assert_eq!(
            rejected("QualityProfileId: invalid").fallback(AuthorPayloadTier::NoRootFolder),
            Some(AuthorPayloadTier::Minimal)
        );
        assert_eq!(
            rejected("Object reference not set to an instance of an object")
                .fallback(AuthorPayloadTier::Full),
            Some(AuthorPayloadTier::Minimal)
        );
        assert_eq!(rejected("quality").fallback(AuthorPayloadTier::Minimal), None);
        assert_eq!(rejected("something else").fallback(AuthorPayloadTier::Full), None);
    }
}
