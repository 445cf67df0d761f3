//! Request approval: the status state machine and its collaborators.

pub mod engine;
pub mod events;
pub mod store;
pub mod tokens;

pub use engine::{ApprovalEngine, ApprovalError, ApprovalOutcome, search_term};
pub use events::{ApprovalEvent, ApprovalEventBus};
pub use store::{InMemoryRequestStore, RequestStore, StatusUpdate, StoreError};
pub use tokens::{ApprovalTokens, TokenError};
