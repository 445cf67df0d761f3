use std::time::Duration;

use async_trait::async_trait;
use quire_model::serde_helpers::value_as_id;
use reqwest::Method;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{
    client::{CatalogClient, CatalogRequest},
    monitor::MonitorTarget,
};
use crate::error::{CatalogError, ErrorKind, classify_error, truncate_body};

const MONITOR_ENDPOINT: &str = "/book/monitor";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// The service created a new entity.
    Created { id: Option<i64> },
    /// The service already had it; `id` is the existing entity when it could
    /// be recovered.
    AlreadyExists { id: Option<i64> },
}

impl SubmissionOutcome {
    pub fn id(&self) -> Option<i64> {
        match self {
            Self::Created { id } | Self::AlreadyExists { id } => *id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub outcome: SubmissionOutcome,
    pub sent_payload: String,
    pub response_body: String,
}

#[derive(Debug, Clone)]
pub struct SubmissionFailure {
    pub error: CatalogError,
    pub sent_payload: String,
    pub response_body: Option<String>,
}

/// Sends creation payloads and absorbs duplicate conflicts.
#[derive(Debug, Clone)]
pub struct Submitter {
    client: CatalogClient,
    endpoint: String,
    method: Method,
    timeout: Duration,
}

impl Submitter {
    pub fn new(
        client: CatalogClient,
        endpoint: impl Into<String>,
        method: &str,
        timeout: Duration,
    ) -> Result<Self, CatalogError> {
        let method = Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| CatalogError::Validation(format!("invalid add method {method:?}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            method,
            timeout,
        })
    }

    fn add_request<'a>(&'a self, method: Method, body: &'a Value) -> CatalogRequest<'a> {
        CatalogRequest::new(method, &self.endpoint, self.timeout)
            .query("includeAllAuthorBooks", "false")
            .json(body)
    }

    pub async fn submit(&self, payload: &[u8]) -> Result<Submission, SubmissionFailure> {
        let sent_payload = String::from_utf8_lossy(payload).into_owned();
        let body: Value = match serde_json::from_slice(payload) {
            Ok(body) => body,
            Err(err) => {
                return Err(SubmissionFailure {
                    error: CatalogError::Validation(format!("payload is not valid JSON: {err}")),
                    sent_payload,
                    response_body: None,
                });
            }
        };

        let response = match self
            .client
            .execute(self.add_request(self.method.clone(), &body))
            .await
        {
            Ok(response) => response,
            Err(error) => {
                return Err(SubmissionFailure {
                    error,
                    sent_payload,
                    response_body: None,
                });
            }
        };

        if response.is_success() {
            let id = serde_json::from_str::<Value>(&response.body)
                .ok()
                .and_then(|created| first_id(&created));
            info!(status = %response.status, ?id, "catalog accepted creation payload");
            return Ok(Submission {
                outcome: SubmissionOutcome::Created { id },
                sent_payload,
                response_body: response.body,
            });
        }

        let status = response.status.as_u16();
        if classify_error(&response.body, status) == ErrorKind::Duplicate {
            info!(status, "catalog reports an existing entry; monitoring it instead");
            let id = self.recover_existing(&body).await;
            if let Some(id) = id
                && let Err(err) = self.set_monitored(&[id], true).await
            {
                warn!(id, error = %err, "could not monitor existing entry");
            }
            return Ok(Submission {
                outcome: SubmissionOutcome::AlreadyExists { id },
                sent_payload,
                response_body: response.body,
            });
        }

        let response_body = response.body.clone();
        let error = response
            .error_for_status()
            .err()
            .unwrap_or_else(|| CatalogError::Validation(truncate_body(&response_body)));
        Err(SubmissionFailure {
            error,
            sent_payload,
            response_body: Some(response_body),
        })
    }

    /// Re-issue the payload as a GET on the add endpoint and pick out the
    /// existing entity's id.
    async fn recover_existing(&self, body: &Value) -> Option<i64> {
        let response = match self
            .client
            .execute(self.add_request(Method::GET, body))
            .await
            .and_then(|response| response.error_for_status())
        {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "could not look up existing entry");
                return None;
            }
        };

        match response.json::<Value>() {
            Ok(found) => existing_id(&found, body),
            Err(err) => {
                warn!(error = %err, "existing entry lookup returned an unexpected body");
                None
            }
        }
    }

    pub async fn set_monitored(&self, ids: &[i64], monitored: bool) -> Result<(), CatalogError> {
        let body = json!({ "bookIds": ids, "monitored": monitored });
        self.client
            .execute(CatalogRequest::new(Method::PUT, MONITOR_ENDPOINT, self.timeout).json(&body))
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl MonitorTarget for Submitter {
    async fn set_monitored(&self, ids: &[i64], monitored: bool) -> Result<(), CatalogError> {
        Submitter::set_monitored(self, ids, monitored).await
    }
}

fn first_id(value: &Value) -> Option<i64> {
    match value {
        Value::Array(items) => items.first().and_then(first_id),
        other => other.get("id").and_then(value_as_id),
    }
}

/// Prefer the element whose foreign book or edition id matches the payload,
/// else the first element.
fn existing_id(found: &Value, payload: &Value) -> Option<i64> {
    let items = match found {
        Value::Array(items) => items,
        other => return other.get("id").and_then(value_as_id),
    };

    let matches_field = |item: &Value, field: &str| {
        let wanted = payload.get(field).and_then(foreign_id);
        wanted.is_some() && item.get(field).and_then(foreign_id) == wanted
    };

    items
        .iter()
        .find(|item| matches_field(item, "foreignBookId") || matches_field(item, "foreignEditionId"))
        .or_else(|| items.first())
        .and_then(|item| item.get("id"))
        .and_then(value_as_id)
}

fn foreign_id(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
