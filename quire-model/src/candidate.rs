use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::serde_helpers::{lenient_id, lenient_string};

/// Identifier classes used to disambiguate catalog candidates, in the order
/// the selector tries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentifierKind {
    Isbn13,
    Isbn10,
    /// Marketplace id (ASIN).
    Asin,
}

impl IdentifierKind {
    pub const PRIORITY: [IdentifierKind; 3] =
        [IdentifierKind::Isbn13, IdentifierKind::Isbn10, IdentifierKind::Asin];

    /// Parse an identifier type label as the catalog service spells it
    /// (`ISBN_13`, `isbn13`, `ISBN-10`, `ASIN`, ...).
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "ISBN13" | "EAN" | "EAN13" => Some(Self::Isbn13),
            "ISBN10" | "ISBN" => Some(Self::Isbn10),
            "ASIN" | "MARKETPLACEID" => Some(Self::Asin),
            _ => None,
        }
    }

    /// Normalize a raw identifier value for this class.
    pub fn clean(self, raw: &str) -> String {
        match self {
            Self::Isbn13 | Self::Isbn10 => clean_isbn(raw),
            Self::Asin => clean_marketplace_id(raw),
        }
    }

    /// Field names carrying this identifier on an edition object.
    fn edition_fields(self) -> &'static [&'static str] {
        match self {
            Self::Isbn13 => &["isbn13"],
            Self::Isbn10 => &["isbn10", "isbn"],
            Self::Asin => &["asin"],
        }
    }
}

/// Keep only `[0-9Xx]` and uppercase the check digit.
pub fn clean_isbn(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit() || *c == 'x' || *c == 'X')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

pub fn clean_marketplace_id(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl Identifier {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }

    pub fn identifier_kind(&self) -> Option<IdentifierKind> {
        IdentifierKind::from_label(&self.kind)
    }
}

/// Author reference embedded in a candidate or payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorRef {
    #[serde(default, deserialize_with = "lenient_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(
        default,
        alias = "name",
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub author_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub foreign_author_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuthorRef {
    pub fn with_id(id: i64) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            author_name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// One search result from the catalog service's lookup endpoint.
///
/// Unknown fields are kept in `extra` so templates can reach them and so the
/// record can be echoed back to the service unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorRef>,
    #[serde(default, deserialize_with = "lenient_id", skip_serializing_if = "Option::is_none")]
    pub author_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub foreign_book_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub foreign_work_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub foreign_edition_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<Identifier>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub editions: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CandidateRecord {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Cleaned identifier values of `kind`, from the explicit identifier list
    /// followed by the candidate's editions.
    pub fn identifier_values(&self, kind: IdentifierKind) -> Vec<String> {
        let explicit = self
            .identifiers
            .iter()
            .filter(|ident| ident.identifier_kind() == Some(kind))
            .map(|ident| kind.clean(&ident.value));

        let from_editions = self.editions.iter().flat_map(move |edition| {
            kind.edition_fields()
                .iter()
                .filter_map(move |field| edition.get(*field))
                .filter_map(Value::as_str)
                .map(move |raw| kind.clean(raw))
        });

        explicit
            .chain(from_editions)
            .filter(|value| !value.is_empty())
            .collect()
    }

    pub fn has_identifier(&self, kind: IdentifierKind, cleaned: &str) -> bool {
        !cleaned.is_empty()
            && self
                .identifier_values(kind)
                .iter()
                .any(|value| value == cleaned)
    }

    /// Best known author display name.
    pub fn author_name(&self) -> Option<&str> {
        self.author
            .as_ref()
            .and_then(|author| author.author_name.as_deref())
            .filter(|name| !name.trim().is_empty())
    }
}
