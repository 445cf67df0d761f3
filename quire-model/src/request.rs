use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ModelError, RequestId};

/// Which catalog instance a request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Ebook,
    Audiobook,
}

impl CollectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ebook => "ebook",
            Self::Audiobook => "audiobook",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ebook" | "book" => Ok(Self::Ebook),
            "audiobook" | "audio" => Ok(Self::Audiobook),
            other => Err(ModelError::UnknownCollectionKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Queued,
    Declined,
    Error,
    Processing,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Queued => "queued",
            Self::Declined => "declined",
            Self::Error => "error",
            Self::Processing => "processing",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "queued" => Ok(Self::Queued),
            "declined" => Ok(Self::Declined),
            "error" => Ok(Self::Error),
            "processing" => Ok(Self::Processing),
            other => Err(ModelError::UnknownStatus(other.to_string())),
        }
    }
}

/// A user's request for a book, as persisted by the request store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRequest {
    pub id: RequestId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub requester_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub isbn10: Option<String>,
    pub isbn13: Option<String>,
    /// Marketplace id.
    pub asin: Option<String>,
    pub collection_kind: CollectionKind,
    pub status: RequestStatus,
    pub status_reason: Option<String>,
    pub approver_id: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    /// Creation payload captured from candidate selection at request time.
    pub catalog_payload: Option<String>,
    pub sent_payload: Option<String>,
    pub service_response: Option<String>,
}

impl BookRequest {
    pub fn stored_payload(&self) -> Option<&str> {
        self.catalog_payload
            .as_deref()
            .filter(|payload| !payload.trim().is_empty())
    }

    pub fn primary_author(&self) -> Option<&str> {
        self.authors
            .iter()
            .map(|author| author.trim())
            .find(|author| !author.is_empty())
    }
}

/// Fields supplied when a request is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBookRequest {
    pub requester_id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub isbn10: Option<String>,
    #[serde(default)]
    pub isbn13: Option<String>,
    #[serde(default)]
    pub asin: Option<String>,
    pub collection_kind: CollectionKind,
    #[serde(default)]
    pub catalog_payload: Option<String>,
}

impl NewBookRequest {
    pub fn new(
        requester_id: impl Into<String>,
        title: impl Into<String>,
        collection_kind: CollectionKind,
    ) -> Self {
        Self {
            requester_id: requester_id.into(),
            title: title.into(),
            authors: Vec::new(),
            isbn10: None,
            isbn13: None,
            asin: None,
            collection_kind,
            catalog_payload: None,
        }
    }

    pub fn has_identifiers(&self) -> bool {
        [&self.isbn13, &self.isbn10, &self.asin]
            .into_iter()
            .flatten()
            .any(|value| !value.trim().is_empty())
    }
}
