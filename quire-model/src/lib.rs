//! Core data model definitions shared across Quire crates.
#![allow(missing_docs)]

pub mod candidate;
pub mod error;
pub mod ids;
pub mod reference;
pub mod request;
pub mod serde_helpers;
pub mod token;

// Intentionally curated re-exports for downstream consumers.
pub use candidate::{
    AuthorRef, CandidateRecord, Identifier, IdentifierKind, clean_isbn,
    clean_marketplace_id,
};
pub use error::{ModelError, Result as ModelResult};
pub use ids::RequestId;
pub use reference::{AuthorDetails, QualityProfile, RootFolder};
pub use request::{BookRequest, CollectionKind, NewBookRequest, RequestStatus};
pub use token::{ApprovalAction, ApprovalToken};
