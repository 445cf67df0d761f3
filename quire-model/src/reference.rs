//! Live reference data owned by the catalog service.

use serde::{Deserialize, Serialize};

use crate::serde_helpers::{lenient_id, lenient_string};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityProfile {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootFolder {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<i64>,
    pub path: String,
}

/// Author record as returned by `/author/{id}` and `/author/lookup`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorDetails {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<i64>,
    #[serde(default, alias = "name", deserialize_with = "lenient_string")]
    pub author_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub foreign_author_id: Option<String>,
}

impl AuthorDetails {
    pub fn name_matches(&self, name: &str) -> bool {
        self.author_name
            .as_deref()
            .is_some_and(|candidate| candidate.trim().eq_ignore_ascii_case(name.trim()))
    }
}
