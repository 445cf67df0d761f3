use std::{
    collections::HashMap,
    sync::atomic::{AtomicI64, Ordering},
};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use quire_model::{BookRequest, NewBookRequest, RequestId, RequestStatus};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("request {0} not found")]
    NotFound(RequestId),
    #[error("request store failure: {0}")]
    Backend(String),
}

/// A status transition plus the audit fields that go with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: RequestStatus,
    pub reason: Option<String>,
    pub actor: Option<String>,
    pub sent_payload: Option<String>,
    pub response_body: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: RequestStatus) -> Self {
        Self {
            status,
            reason: None,
            actor: None,
            sent_payload: None,
            response_body: None,
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Record what was sent to the catalog service and what it answered.
    pub fn submission(mut self, sent_payload: String, response_body: Option<String>) -> Self {
        self.sent_payload = Some(sent_payload);
        self.response_body = response_body;
        self
    }
}

/// Persistence for book requests.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn create_request(&self, request: NewBookRequest) -> Result<BookRequest, StoreError>;

    async fn get_request(&self, id: RequestId) -> Result<BookRequest, StoreError>;

    async fn update_request_status(
        &self,
        id: RequestId,
        update: StatusUpdate,
    ) -> Result<BookRequest, StoreError>;

    /// Mark the request approved by `actor`. `approved_at` is only set by
    /// the first approval.
    async fn approve_request(&self, id: RequestId, actor: &str) -> Result<BookRequest, StoreError>;
}

/// Process-local [`RequestStore`].
#[derive(Debug)]
pub struct InMemoryRequestStore {
    requests: RwLock<HashMap<RequestId, BookRequest>>,
    next_id: AtomicI64,
}

impl Default for InMemoryRequestStore {
    fn default() -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.requests.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.read().is_empty()
    }

    /// All requests ordered by id.
    pub fn list(&self) -> Vec<BookRequest> {
        let mut requests: Vec<BookRequest> = self.requests.read().values().cloned().collect();
        requests.sort_by_key(|request| request.id);
        requests
    }

    fn modify<F>(&self, id: RequestId, apply: F) -> Result<BookRequest, StoreError>
    where
        F: FnOnce(&mut BookRequest),
    {
        let mut requests = self.requests.write();
        let request = requests.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        apply(request);
        request.updated_at = Utc::now();
        Ok(request.clone())
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn create_request(&self, request: NewBookRequest) -> Result<BookRequest, StoreError> {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let now = Utc::now();
        let created = BookRequest {
            id,
            created_at: now,
            updated_at: now,
            requester_id: request.requester_id,
            title: request.title,
            authors: request.authors,
            isbn10: request.isbn10,
            isbn13: request.isbn13,
            asin: request.asin,
            collection_kind: request.collection_kind,
            status: RequestStatus::Pending,
            status_reason: None,
            approver_id: None,
            approved_at: None,
            catalog_payload: request.catalog_payload,
            sent_payload: None,
            service_response: None,
        };
        self.requests.write().insert(id, created.clone());
        Ok(created)
    }

    async fn get_request(&self, id: RequestId) -> Result<BookRequest, StoreError> {
        self.requests
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn update_request_status(
        &self,
        id: RequestId,
        update: StatusUpdate,
    ) -> Result<BookRequest, StoreError> {
        self.modify(id, |request| {
            request.status = update.status;
            request.status_reason = update.reason;
            if let Some(actor) = update.actor {
                request.approver_id = Some(actor);
            }
            if let Some(sent) = update.sent_payload {
                request.sent_payload = Some(sent);
                request.service_response = update.response_body;
            }
        })
    }

    async fn approve_request(&self, id: RequestId, actor: &str) -> Result<BookRequest, StoreError> {
        self.modify(id, |request| {
            request.status = RequestStatus::Approved;
            request.status_reason = None;
            request.approver_id = Some(actor.to_string());
            if request.approved_at.is_none() {
                request.approved_at = Some(Utc::now());
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use quire_model::CollectionKind;

    use super::*;

    #[tokio::test]
    async fn first_approval_wins() {
        let store = InMemoryRequestStore::new();
        let created = store
            .create_request(NewBookRequest::new("u1", "Book", CollectionKind::Ebook))
            .await
            .unwrap();
        assert_eq!(created.status, RequestStatus::Pending);

        let first = store.approve_request(created.id, "admin").await.unwrap();
        let second = store.approve_request(created.id, "other").await.unwrap();
        assert_eq!(first.approved_at, second.approved_at);
        assert_eq!(second.approver_id.as_deref(), Some("other"));
    }

    #[tokio::test]
    async fn audit_fields_only_change_with_a_submission() {
        let store = InMemoryRequestStore::new();
        let id = store
            .create_request(NewBookRequest::new("u1", "Book", CollectionKind::Ebook))
            .await
            .unwrap()
            .id;

        let declined = store
            .update_request_status(id, StatusUpdate::new(RequestStatus::Declined).reason("no"))
            .await
            .unwrap();
        assert_eq!(declined.sent_payload, None);
        assert_eq!(declined.status_reason.as_deref(), Some("no"));

        let failed = store
            .update_request_status(
                id,
                StatusUpdate::new(RequestStatus::Error)
                    .submission("{}".into(), Some("boom".into())),
            )
            .await
            .unwrap();
        assert_eq!(failed.sent_payload.as_deref(), Some("{}"));
        assert_eq!(failed.service_response.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let store = InMemoryRequestStore::new();
        assert_eq!(
            store.get_request(RequestId(9)).await,
            Err(StoreError::NotFound(RequestId(9)))
        );
    }
}
