//! # Quire Core
//!
//! Reconciles user book requests against an external catalog/acquisition
//! service (a Readarr-compatible HTTP API) and drives their approval.
//!
//! ## Overview
//!
//! - **Lookup**: cached candidate search against the service's lookup endpoint
//! - **Selection**: identifier-priority matching (ISBN-13, ISBN-10, ASIN)
//! - **Payloads**: typed base payload, operator template overlay and a
//!   sanitizer that fills gaps from live reference data
//! - **Submission**: duplicate conflicts are absorbed by monitoring the
//!   existing entry; new entries get a background monitor task
//! - **Approval**: the request status state machine, one-click tokens and an
//!   in-process event bus
//!
//! ## Architecture
//!
//! - [`catalog`]: per-instance HTTP clients and the reconciliation pipeline
//! - [`approval`]: the state machine and its store/token/event collaborators
//! - [`cache`]: lookup and author caches shared across instances
//! - [`error`]: catalog error type and response classification
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use quire_config::Config;
//! use quire_core::approval::{ApprovalEngine, InMemoryRequestStore};
//! use quire_model::{CollectionKind, NewBookRequest};
//!
//! async fn approve_one(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = ApprovalEngine::from_config(config, Arc::new(InMemoryRequestStore::new()))?;
//!
//!     let mut request = NewBookRequest::new("reader", "Dune", CollectionKind::Ebook);
//!     request.isbn13 = Some("9780441172719".into());
//!     let created = engine.prepare_request(request).await?;
//!
//!     let outcome = engine.process_approval(created.id, "admin").await?;
//!     println!("request {} is now {}", outcome.request_id, outcome.status);
//!     Ok(())
//! }
//! ```

#![allow(missing_docs)]

pub mod approval;
pub mod cache;
pub mod catalog;
pub mod error;

pub use approval::{ApprovalEngine, ApprovalError, ApprovalOutcome};
pub use cache::CatalogCache;
pub use catalog::{CatalogService, Catalogs};
pub use error::{CatalogError, ErrorKind};

pub type Result<T, E = CatalogError> = std::result::Result<T, E>;
