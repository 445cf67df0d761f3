use std::{fmt, sync::Arc};

use dashmap::{DashMap, mapref::entry::Entry};
use parking_lot::Mutex;
use quire_config::{Config, MonitorConfig};
use quire_model::{
    ApprovalAction, BookRequest, CandidateRecord, IdentifierKind, NewBookRequest, RequestId,
    RequestStatus,
};
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{
    events::{ApprovalEvent, ApprovalEventBus},
    store::{RequestStore, StatusUpdate, StoreError},
    tokens::{ApprovalTokens, TokenError},
};
use crate::{
    catalog::{
        CatalogService, Catalogs,
        monitor::{MonitorHandle, spawn_monitor},
        payload::SanitizeMode,
        selector::{IdentifierQuery, derive_author, select},
        submit::SubmissionOutcome,
    },
    error::CatalogError,
};

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Token(#[from] TokenError),
}

impl ApprovalError {
    fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Token(_) => StatusCode::BAD_REQUEST,
            Self::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::Backend(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Catalog(CatalogError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Catalog(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Final state of one approval, decline or retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalOutcome {
    pub request_id: RequestId,
    pub status: RequestStatus,
    pub reason: Option<String>,
}

/// Drives book requests from `pending` to their final status.
pub struct ApprovalEngine {
    store: Arc<dyn RequestStore>,
    catalogs: Catalogs,
    tokens: Arc<ApprovalTokens>,
    events: ApprovalEventBus,
    monitor: MonitorConfig,
    in_flight: DashMap<RequestId, ()>,
    monitors: Mutex<Vec<MonitorHandle>>,
}

impl fmt::Debug for ApprovalEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalEngine")
            .field("catalogs", &self.catalogs)
            .field("tokens", &self.tokens)
            .field("monitor", &self.monitor)
            .field("in_flight", &self.in_flight.len())
            .field("monitors", &self.monitors.lock().len())
            .finish_non_exhaustive()
    }
}

/// Releases a request's in-flight slot when dropped.
struct InFlightGuard<'a> {
    slots: &'a DashMap<RequestId, ()>,
    id: RequestId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.slots.remove(&self.id);
    }
}

impl ApprovalEngine {
    pub fn new(store: Arc<dyn RequestStore>, catalogs: Catalogs) -> Self {
        Self {
            store,
            catalogs,
            tokens: Arc::new(ApprovalTokens::default()),
            events: ApprovalEventBus::default(),
            monitor: MonitorConfig::default(),
            in_flight: DashMap::new(),
            monitors: Mutex::new(Vec::new()),
        }
    }

    pub fn from_config(config: &Config, store: Arc<dyn RequestStore>) -> Result<Self, CatalogError> {
        let catalogs = Catalogs::from_config(config)?;
        Ok(Self::new(store, catalogs)
            .with_monitor_config(config.engine.monitor)
            .with_tokens(Arc::new(ApprovalTokens::new(
                config.engine.approval_token_ttl,
            ))))
    }

    pub fn with_monitor_config(mut self, monitor: MonitorConfig) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_tokens(mut self, tokens: Arc<ApprovalTokens>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_events(mut self, events: ApprovalEventBus) -> Self {
        self.events = events;
        self
    }

    pub fn store(&self) -> &Arc<dyn RequestStore> {
        &self.store
    }

    pub fn catalogs(&self) -> &Catalogs {
        &self.catalogs
    }

    pub fn tokens(&self) -> &Arc<ApprovalTokens> {
        &self.tokens
    }

    pub fn events(&self) -> &ApprovalEventBus {
        &self.events
    }

    fn claim(&self, id: RequestId) -> Result<InFlightGuard<'_>, ApprovalError> {
        match self.in_flight.entry(id) {
            Entry::Occupied(_) => Err(ApprovalError::validation(format!(
                "request {id} is already being processed"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(InFlightGuard {
                    slots: &self.in_flight,
                    id,
                })
            }
        }
    }

    /// Store a new request, capturing the catalog candidate it should become.
    ///
    /// Lookup problems never block intake; the request is stored without a
    /// payload and approval will ask for a fresh request.
    pub async fn prepare_request(
        &self,
        mut request: NewBookRequest,
    ) -> Result<BookRequest, ApprovalError> {
        if request.title.trim().is_empty() {
            return Err(ApprovalError::validation("request title is required"));
        }

        let has_payload = request
            .catalog_payload
            .as_deref()
            .is_some_and(|payload| !payload.trim().is_empty());
        if !has_payload && let Some(service) = self.catalogs.get(request.collection_kind) {
            match self.capture_payload(service, &request).await {
                Ok(payload) => request.catalog_payload = payload,
                Err(err) => {
                    warn!(title = %request.title, error = %err, "catalog lookup failed at intake")
                }
            }
        }

        let created = self.store.create_request(request).await?;
        info!(
            request_id = %created.id,
            kind = %created.collection_kind,
            has_payload = created.catalog_payload.is_some(),
            "book request created"
        );
        Ok(created)
    }

    async fn capture_payload(
        &self,
        service: &CatalogService,
        request: &NewBookRequest,
    ) -> Result<Option<String>, CatalogError> {
        let term = search_term(request);
        let candidates = service.lookup(&term).await?;

        let candidate: Option<CandidateRecord> = if request.has_identifiers() {
            select(&candidates, &IdentifierQuery::from(request)).map(|selection| {
                debug!(matched_by = ?selection.matched_by, "candidate selected");
                selection.candidate
            })
        } else {
            candidates.into_iter().next().map(|mut candidate| {
                derive_author(&mut candidate);
                candidate
            })
        };

        let Some(candidate) = candidate else {
            info!(term = %term, "no catalog candidate matched the request");
            return Ok(None);
        };

        let builder = service.builder();
        let payload = builder
            .build_value(&candidate, &builder.options(), SanitizeMode::Approval)
            .await?;
        Ok(Some(Value::Object(payload).to_string()))
    }

    /// Approve a pending request and, when a catalog service is configured
    /// for its collection kind, send it there.
    pub async fn process_approval(
        &self,
        request_id: RequestId,
        actor: &str,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let _guard = self.claim(request_id)?;
        let request = self.store.get_request(request_id).await?;
        if request.status != RequestStatus::Pending {
            return Err(ApprovalError::validation(format!(
                "request {request_id} is {}; only pending requests can be approved",
                request.status
            )));
        }

        let Some(service) = self.catalogs.get(request.collection_kind) else {
            let reason = format!(
                "approved; no {} catalog service is configured",
                request.collection_kind
            );
            self.store.approve_request(request_id, actor).await?;
            info!(%request_id, actor, "request approved without catalog submission");
            self.events.publish(ApprovalEvent::Approved {
                request_id,
                actor: actor.to_string(),
            });
            return Ok(ApprovalOutcome {
                request_id,
                status: RequestStatus::Approved,
                reason: Some(reason),
            });
        };

        let payload = stored_payload(&request)?;
        self.store.approve_request(request_id, actor).await?;
        info!(%request_id, actor, "request approved; submitting to catalog");
        self.submit_stored(service, request_id, payload).await
    }

    /// Resubmit an approved request's stored payload.
    pub async fn retry(
        &self,
        request_id: RequestId,
        actor: &str,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let _guard = self.claim(request_id)?;
        let request = self.store.get_request(request_id).await?;
        if request.status != RequestStatus::Approved {
            return Err(ApprovalError::validation(format!(
                "request {request_id} is {}; only approved requests can be retried",
                request.status
            )));
        }
        let payload = stored_payload(&request)?;
        let Some(service) = self.catalogs.get(request.collection_kind) else {
            return Err(ApprovalError::validation(format!(
                "no {} catalog service is configured",
                request.collection_kind
            )));
        };

        self.store
            .update_request_status(
                request_id,
                StatusUpdate::new(RequestStatus::Processing)
                    .reason("retrying catalog submission")
                    .actor(actor),
            )
            .await?;
        info!(%request_id, actor, "retrying catalog submission");
        self.submit_stored(service, request_id, payload).await
    }

    pub async fn decline(
        &self,
        request_id: RequestId,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let _guard = self.claim(request_id)?;
        let request = self.store.get_request(request_id).await?;
        if !matches!(request.status, RequestStatus::Pending | RequestStatus::Approved) {
            return Err(ApprovalError::validation(format!(
                "request {request_id} is {}; only pending or approved requests can be declined",
                request.status
            )));
        }

        let reason = reason
            .map(str::trim)
            .filter(|reason| !reason.is_empty())
            .map(str::to_string);
        let mut update = StatusUpdate::new(RequestStatus::Declined).actor(actor);
        update.reason = reason.clone();
        self.store.update_request_status(request_id, update).await?;

        info!(%request_id, actor, "request declined");
        self.events.publish(ApprovalEvent::Declined {
            request_id,
            actor: actor.to_string(),
        });
        Ok(ApprovalOutcome {
            request_id,
            status: RequestStatus::Declined,
            reason,
        })
    }

    /// Issue a one-click token for a pending request.
    pub async fn issue_token(
        &self,
        request_id: RequestId,
        action: ApprovalAction,
    ) -> Result<String, ApprovalError> {
        let request = self.store.get_request(request_id).await?;
        if request.status != RequestStatus::Pending {
            return Err(ApprovalError::validation(format!(
                "request {request_id} is {}; tokens are only issued for pending requests",
                request.status
            )));
        }
        let (key, _) = self.tokens.issue(request_id, action);
        Ok(key)
    }

    pub async fn redeem_token(
        &self,
        key: &str,
        actor: &str,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let token = self.tokens.redeem(key)?;
        match token.action {
            ApprovalAction::Approve => self.process_approval(token.request_id, actor).await,
            ApprovalAction::Decline => self.decline(token.request_id, actor, None).await,
        }
    }

    async fn submit_stored(
        &self,
        service: &CatalogService,
        request_id: RequestId,
        stored: &str,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let payload = match service
            .builder()
            .build_from_raw(stored.as_bytes(), SanitizeMode::Approval)
            .await
        {
            Ok(payload) => payload,
            Err(err) => {
                let reason = format!("stored payload could not be prepared: {err}");
                return self.record_failure(request_id, reason, None).await;
            }
        };

        match service.submitter().submit(&payload).await {
            Ok(submission) => {
                let reason = queued_reason(submission.outcome);
                self.store
                    .update_request_status(
                        request_id,
                        StatusUpdate::new(RequestStatus::Queued)
                            .reason(reason.clone())
                            .submission(submission.sent_payload, Some(submission.response_body)),
                    )
                    .await?;

                if let SubmissionOutcome::Created { id: Some(id) } = submission.outcome {
                    let handle = spawn_monitor(service.monitor_target(), id, self.monitor);
                    let mut monitors = self.monitors.lock();
                    monitors.retain(|handle| !handle.is_finished());
                    monitors.push(handle);
                }

                info!(%request_id, reason = %reason, "request queued in catalog");
                self.events.publish(ApprovalEvent::Queued {
                    request_id,
                    reason: reason.clone(),
                });
                Ok(ApprovalOutcome {
                    request_id,
                    status: RequestStatus::Queued,
                    reason: Some(reason),
                })
            }
            Err(failure) => {
                let reason = failure.error.to_string();
                self.record_failure(
                    request_id,
                    reason,
                    Some((failure.sent_payload, failure.response_body)),
                )
                .await
            }
        }
    }

    async fn record_failure(
        &self,
        request_id: RequestId,
        reason: String,
        submission: Option<(String, Option<String>)>,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let mut update = StatusUpdate::new(RequestStatus::Error).reason(reason.clone());
        if let Some((sent, response)) = submission {
            update = update.submission(sent, response);
        }
        self.store.update_request_status(request_id, update).await?;

        warn!(%request_id, reason = %reason, "catalog submission failed");
        self.events.publish(ApprovalEvent::Failed {
            request_id,
            reason: reason.clone(),
        });
        Ok(ApprovalOutcome {
            request_id,
            status: RequestStatus::Error,
            reason: Some(reason),
        })
    }

    /// Monitor tasks still running.
    pub fn active_monitors(&self) -> usize {
        let mut monitors = self.monitors.lock();
        monitors.retain(|handle| !handle.is_finished());
        monitors.len()
    }

    /// Cancel every monitor task and wait for them to stop.
    pub async fn shutdown_monitors(&self) {
        let handles: Vec<MonitorHandle> = std::mem::take(&mut *self.monitors.lock());
        for handle in &handles {
            handle.cancel();
        }
        for handle in handles {
            let entity_id = handle.entity_id();
            if handle.join().await.is_none() {
                warn!(entity_id, "monitor task ended abnormally");
            }
        }
    }
}

fn stored_payload(request: &BookRequest) -> Result<&str, ApprovalError> {
    let payload = request.stored_payload().ok_or_else(|| {
        ApprovalError::validation(format!(
            "request {} has no catalog payload; submit a fresh request",
            request.id
        ))
    })?;
    serde_json::from_str::<Value>(payload).map_err(|err| {
        ApprovalError::validation(format!(
            "request {} has an unreadable catalog payload ({err}); submit a fresh request",
            request.id
        ))
    })?;
    Ok(payload)
}

fn queued_reason(outcome: SubmissionOutcome) -> String {
    match outcome {
        SubmissionOutcome::Created { id: Some(id) } => format!("queued in catalog as book {id}"),
        SubmissionOutcome::Created { id: None } => "queued in catalog".to_string(),
        SubmissionOutcome::AlreadyExists { id: Some(id) } => {
            format!("already in catalog as book {id}; monitoring enabled")
        }
        SubmissionOutcome::AlreadyExists { id: None } => "already in catalog".to_string(),
    }
}

/// Lookup term for a new request: the strongest identifier, else
/// `"title author"`.
pub fn search_term(request: &NewBookRequest) -> String {
    let identifiers = IdentifierQuery::from(request);
    if let Some(identifier) = IdentifierKind::PRIORITY
        .iter()
        .find_map(|kind| identifiers.get(*kind))
    {
        return identifier.to_string();
    }

    let author = request
        .authors
        .iter()
        .map(|author| author.trim())
        .find(|author| !author.is_empty())
        .unwrap_or_default();
    format!("{} {}", request.title.trim(), author)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use quire_model::CollectionKind;
    use serde_json::json;

    use super::*;
    use crate::approval::store::InMemoryRequestStore;

    fn engine() -> (ApprovalEngine, Arc<InMemoryRequestStore>) {
        let store = Arc::new(InMemoryRequestStore::new());
        let engine = ApprovalEngine::new(store.clone(), Catalogs::default());
        (engine, store)
    }

    async fn pending(engine: &ApprovalEngine, payload: Option<&str>) -> RequestId {
        let mut request = NewBookRequest::new("reader", "Book", CollectionKind::Ebook);
        request.catalog_payload = payload.map(str::to_string);
        engine.prepare_request(request).await.unwrap().id
    }

    #[test]
    fn search_terms_follow_identifier_priority() {
        let mut request = NewBookRequest::new("u", " Dune ", CollectionKind::Ebook);
        request.authors = vec!["".into(), "Frank Herbert".into()];
        assert_eq!(search_term(&request), "Dune Frank Herbert");

        request.asin = Some("b000abc".into());
        assert_eq!(search_term(&request), "B000ABC");
        request.isbn10 = Some("0-441-17271-7".into());
        assert_eq!(search_term(&request), "0441172717");
        request.isbn13 = Some("978-0-441-17271-9".into());
        assert_eq!(search_term(&request), "9780441172719");
    }

    #[tokio::test]
    async fn approval_without_catalog_service_marks_approved() {
        let (engine, store) = engine();
        let mut events = engine.events().subscribe();
        let id = pending(&engine, None).await;

        let outcome = engine.process_approval(id, "admin").await.unwrap();
        assert_eq!(outcome.status, RequestStatus::Approved);

        let stored = store.get_request(id).await.unwrap();
        assert_eq!(stored.status, RequestStatus::Approved);
        assert!(stored.approved_at.is_some());
        assert_eq!(stored.sent_payload, None);
        assert!(matches!(events.recv().await.unwrap(), ApprovalEvent::Approved { .. }));
    }

    #[tokio::test]
    async fn only_pending_requests_can_be_approved() {
        let (engine, _) = engine();
        let id = pending(&engine, None).await;
        engine.decline(id, "admin", Some("dup")).await.unwrap();

        let err = engine.process_approval(id, "admin").await.unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn retry_requires_approved_request_with_payload() {
        let (engine, _) = engine();

        let id = pending(&engine, Some(&json!({"title": "Book"}).to_string())).await;
        let err = engine.retry(id, "admin").await.unwrap_err();
        assert!(matches!(err, ApprovalError::Validation(_)));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let empty = pending(&engine, Some("  ")).await;
        engine.process_approval(empty, "admin").await.unwrap();
        let err = engine.retry(empty, "admin").await.unwrap_err();
        assert!(err.is_client_error());
        assert!(err.to_string().contains("submit a fresh request"));
    }

    #[tokio::test]
    async fn decline_is_allowed_from_pending_and_approved_only() {
        let (engine, store) = engine();
        let id = pending(&engine, None).await;
        engine.process_approval(id, "admin").await.unwrap();

        let outcome = engine.decline(id, "admin", Some(" no longer wanted ")).await.unwrap();
        assert_eq!(outcome.status, RequestStatus::Declined);
        assert_eq!(outcome.reason.as_deref(), Some("no longer wanted"));
        assert_eq!(store.get_request(id).await.unwrap().status, RequestStatus::Declined);

        assert!(engine.decline(id, "admin", None).await.unwrap_err().is_client_error());
    }

    #[tokio::test]
    async fn tokens_dispatch_their_action_once() {
        let (engine, store) = engine();
        let id = pending(&engine, None).await;
        let key = engine.issue_token(id, ApprovalAction::Decline).await.unwrap();

        let outcome = engine.redeem_token(&key, "link").await.unwrap();
        assert_eq!(outcome.status, RequestStatus::Declined);
        assert_eq!(store.get_request(id).await.unwrap().approver_id.as_deref(), Some("link"));

        let err = engine.redeem_token(&key, "link").await.unwrap_err();
        assert!(matches!(err, ApprovalError::Token(TokenError::Unknown)));
        assert!(engine.issue_token(id, ApprovalAction::Approve).await.is_err());
    }

    #[tokio::test]
    async fn concurrent_processing_of_one_request_is_rejected() {
        let (engine, _) = engine();
        let id = pending(&engine, None).await;

        let guard = engine.claim(id).unwrap();
        let err = engine.process_approval(id, "admin").await.unwrap_err();
        assert!(err.to_string().contains("already being processed"));
        drop(guard);

        assert!(engine.process_approval(id, "admin").await.is_ok());
    }

    #[tokio::test]
    async fn missing_requests_are_not_found() {
        let (engine, _) = engine();
        let err = engine.process_approval(RequestId(404), "admin").await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(err.is_client_error());
    }
}
