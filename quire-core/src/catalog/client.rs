use std::{fmt, time::Duration};

use quire_config::CatalogInstanceConfig;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::{CatalogError, redact_api_key, truncate_body};

const API_KEY_HEADER: &str = "X-Api-Key";
const API_KEY_PARAM: &str = "apikey";

/// One request against the catalog service.
#[derive(Debug, Clone)]
pub struct CatalogRequest<'a> {
    pub method: Method,
    pub endpoint: &'a str,
    pub query: Vec<(&'a str, String)>,
    pub body: Option<&'a Value>,
    pub timeout: Duration,
}

impl<'a> CatalogRequest<'a> {
    pub fn get(endpoint: &'a str, timeout: Duration) -> Self {
        Self {
            method: Method::GET,
            endpoint,
            query: Vec::new(),
            body: None,
            timeout,
        }
    }

    pub fn new(method: Method, endpoint: &'a str, timeout: Duration) -> Self {
        Self {
            method,
            endpoint,
            query: Vec::new(),
            body: None,
            timeout,
        }
    }

    pub fn query(mut self, key: &'a str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }

    pub fn json(mut self, body: &'a Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Raw response with the redacted URL it came from.
#[derive(Debug, Clone)]
pub struct CatalogResponse {
    pub status: StatusCode,
    pub url: String,
    pub body: String,
}

impl CatalogResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Fail with [`CatalogError::Status`] unless the status is 2xx.
    pub fn error_for_status(self) -> Result<Self, CatalogError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(CatalogError::Status {
                status: self.status.as_u16(),
                url: self.url,
                body: truncate_body(&self.body),
            })
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, CatalogError> {
        serde_json::from_str(&self.body).map_err(|err| CatalogError::InvalidResponse {
            status: self.status.as_u16(),
            url: self.url.clone(),
            message: err.to_string(),
            body: truncate_body(&self.body),
        })
    }
}

/// Thin authenticated HTTP client for one catalog-service instance.
///
/// The API key travels both as a header and as a query parameter because
/// some reverse proxies strip custom headers.
#[derive(Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl CatalogClient {
    pub fn new(config: &CatalogInstanceConfig) -> Result<Self, CatalogError> {
        if config.insecure_skip_verify {
            warn!(base_url = %config.base_url, "TLS verification disabled for catalog service");
        }

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .user_agent(concat!("quire/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| CatalogError::Transport {
                url: config.base_url.clone(),
                message: err.to_string(),
                timed_out: false,
            })?;

        Ok(Self::with_http(http, &config.base_url, &config.api_key))
    }

    pub fn with_http(http: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn redact(&self, text: &str) -> String {
        redact_api_key(text, &self.api_key)
    }

    fn build_url(&self, request: &CatalogRequest<'_>) -> Result<Url, CatalogError> {
        let raw = format!("{}{}", self.base_url, request.endpoint);
        let mut url = Url::parse(&raw).map_err(|err| {
            CatalogError::Validation(format!(
                "invalid catalog endpoint {}: {err}",
                self.redact(&raw)
            ))
        })?;

        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
            pairs.append_pair(API_KEY_PARAM, &self.api_key);
        }

        Ok(url)
    }

    /// Send `request` and read the full body. Only transport failures are
    /// errors here; status handling is up to the caller.
    pub async fn execute(
        &self,
        request: CatalogRequest<'_>,
    ) -> Result<CatalogResponse, CatalogError> {
        let url = self.build_url(&request)?;
        let shown_url = self.redact(url.as_str());

        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(request.timeout);
        if let Some(body) = request.body {
            builder = builder.json(body);
        }

        debug!(method = %request.method, url = %shown_url, "catalog request");

        let response = builder
            .send()
            .await
            .map_err(|err| self.transport_error(&shown_url, err))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| self.transport_error(&shown_url, err))?;

        Ok(CatalogResponse {
            status,
            url: shown_url,
            body,
        })
    }

    /// GET `endpoint` and decode a 2xx JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        request: CatalogRequest<'_>,
    ) -> Result<T, CatalogError> {
        self.execute(request).await?.error_for_status()?.json()
    }

    /// Cheap connectivity check against `/system/status`.
    pub async fn probe(&self, timeout: Duration) -> Result<Value, CatalogError> {
        self.get_json(CatalogRequest::get("/system/status", timeout))
            .await
    }

    fn transport_error(&self, shown_url: &str, err: reqwest::Error) -> CatalogError {
        let timed_out = err.is_timeout();
        CatalogError::Transport {
            url: shown_url.to_string(),
            message: self.redact(&err.without_url().to_string()),
            timed_out,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_carry_query_and_key() {
        let client = CatalogClient::with_http(
            reqwest::Client::new(),
            "http://readarr:8787/api/v1/",
            "k3y",
        );
        let request = CatalogRequest::get("/book/lookup", Duration::from_secs(1))
            .query("term", "the hobbit");
        let url = client.build_url(&request).unwrap();

        assert_eq!(
            url.as_str(),
            "http://readarr:8787/api/v1/book/lookup?term=the+hobbit&apikey=k3y"
        );
        assert!(!client.redact(url.as_str()).contains("k3y"));
    }

    #[test]
    fn invalid_base_url_is_a_validation_error() {
        let client = CatalogClient::with_http(reqwest::Client::new(), "not a url", "k");
        let err = client
            .build_url(&CatalogRequest::get("/book", Duration::from_secs(1)))
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
    }
}
