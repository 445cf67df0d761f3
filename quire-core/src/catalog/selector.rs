//! Picks the catalog candidate that corresponds to a request.
//!
//! Identifiers are tried strictly in the order ISBN-13, ISBN-10, marketplace
//! id. Within one identifier class the first candidate in list order wins, so
//! the lookup's own ranking breaks ties.

use quire_model::{
    AuthorRef, BookRequest, CandidateRecord, IdentifierKind, NewBookRequest,
};

/// Cleaned identifiers of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierQuery {
    pub isbn13: Option<String>,
    pub isbn10: Option<String>,
    pub marketplace_id: Option<String>,
}

impl IdentifierQuery {
    pub fn new(
        isbn13: Option<&str>,
        isbn10: Option<&str>,
        marketplace_id: Option<&str>,
    ) -> Self {
        let clean = |kind: IdentifierKind, raw: Option<&str>| {
            raw.map(|value| kind.clean(value))
                .filter(|value| !value.is_empty())
        };
        Self {
            isbn13: clean(IdentifierKind::Isbn13, isbn13),
            isbn10: clean(IdentifierKind::Isbn10, isbn10),
            marketplace_id: clean(IdentifierKind::Asin, marketplace_id),
        }
    }

    pub fn get(&self, kind: IdentifierKind) -> Option<&str> {
        match kind {
            IdentifierKind::Isbn13 => self.isbn13.as_deref(),
            IdentifierKind::Isbn10 => self.isbn10.as_deref(),
            IdentifierKind::Asin => self.marketplace_id.as_deref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.isbn13.is_none() && self.isbn10.is_none() && self.marketplace_id.is_none()
    }
}

impl From<&NewBookRequest> for IdentifierQuery {
    fn from(request: &NewBookRequest) -> Self {
        Self::new(
            request.isbn13.as_deref(),
            request.isbn10.as_deref(),
            request.asin.as_deref(),
        )
    }
}

impl From<&BookRequest> for IdentifierQuery {
    fn from(request: &BookRequest) -> Self {
        Self::new(
            request.isbn13.as_deref(),
            request.isbn10.as_deref(),
            request.asin.as_deref(),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub candidate: CandidateRecord,
    pub matched_by: IdentifierKind,
}

/// Choose the candidate matching `query`, or `None` when the query carries no
/// identifiers or none of them match.
pub fn select(candidates: &[CandidateRecord], query: &IdentifierQuery) -> Option<Selection> {
    IdentifierKind::PRIORITY.iter().find_map(|&kind| {
        let wanted = query.get(kind)?;
        candidates
            .iter()
            .find(|candidate| candidate.has_identifier(kind, wanted))
            .map(|candidate| {
                let mut candidate = candidate.clone();
                derive_author(&mut candidate);
                Selection {
                    candidate,
                    matched_by: kind,
                }
            })
    })
}

/// Fill in a best-effort author object when the candidate has none.
pub fn derive_author(candidate: &mut CandidateRecord) {
    let has_author = candidate
        .author
        .as_ref()
        .is_some_and(|author| author.id.is_some() || candidate_has_name(author));
    if has_author {
        return;
    }

    if let Some(id) = candidate.author_id {
        candidate.author = Some(AuthorRef::with_id(id));
        return;
    }

    if let Some(name) = candidate
        .author_title
        .as_deref()
        .and_then(|author_title| author_from_author_title(author_title, &candidate.title))
    {
        candidate.author = Some(AuthorRef::with_name(name));
    }
}

fn candidate_has_name(author: &AuthorRef) -> bool {
    author
        .author_name
        .as_deref()
        .is_some_and(|name| !name.trim().is_empty())
}

/// Parse `"last, first Title"` into `"first last"`.
pub fn author_from_author_title(author_title: &str, title: &str) -> Option<String> {
    let mut author = author_title.trim();
    let title = title.trim();

    if !title.is_empty() && author.len() >= title.len() {
        let split = author.len() - title.len();
        if author.is_char_boundary(split) && author[split..].eq_ignore_ascii_case(title) {
            author = author[..split].trim_end();
        }
    }

    let author = author.trim_end_matches([',', ';', ':', '-']).trim();
    if author.is_empty() {
        return None;
    }

    let name = match author.split_once(',') {
        Some((last, first)) => {
            let (last, first) = (last.trim(), first.trim());
            if first.is_empty() {
                last.to_string()
            } else {
                format!("{first} {last}")
            }
        }
        None => author.to_string(),
    };

    Some(name.split_whitespace().collect::<Vec<_>>().join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_model::Identifier;

    fn candidate(title: &str, identifiers: &[(&str, &str)]) -> CandidateRecord {
        CandidateRecord {
            title: title.into(),
            identifiers: identifiers
                .iter()
                .map(|(kind, value)| Identifier::new(*kind, *value))
                .collect(),
            ..CandidateRecord::default()
        }
    }

    #[test]
    fn isbn13_match_is_selected() {
        let candidates = vec![candidate("Book", &[("ISBN13", "9781111111111")])];
        let selection = select(
            &candidates,
            &IdentifierQuery::new(Some("9781111111111"), None, None),
        )
        .unwrap();

        assert_eq!(selection.candidate.title, "Book");
        assert_eq!(selection.matched_by, IdentifierKind::Isbn13);
    }

    #[test]
    fn isbn13_wins_regardless_of_other_identifiers() {
        let candidates = vec![
            candidate("By ISBN-10", &[("ISBN10", "0306406152")]),
            candidate("By ASIN", &[("ASIN", "B000000001")]),
            candidate("By ISBN-13", &[("ISBN13", "978-0-306-40615-7")]),
        ];
        let query = IdentifierQuery::new(
            Some("9780306406157"),
            Some("0-306-40615-2"),
            Some("b000000001"),
        );

        let selection = select(&candidates, &query).unwrap();
        assert_eq!(selection.candidate.title, "By ISBN-13");
    }

    #[test]
    fn falls_through_priority_order() {
        let candidates = vec![
            candidate("By ASIN", &[("ASIN", "B000000001")]),
            candidate("By ISBN-10", &[("ISBN10", "030640615X")]),
        ];

        let by_isbn10 = select(
            &candidates,
            &IdentifierQuery::new(Some("9780000000000"), Some("030640615x"), Some("B000000001")),
        )
        .unwrap();
        assert_eq!(by_isbn10.candidate.title, "By ISBN-10");

        let by_asin = select(
            &candidates,
            &IdentifierQuery::new(None, None, Some(" b000000001 ")),
        )
        .unwrap();
        assert_eq!(by_asin.matched_by, IdentifierKind::Asin);
    }

    #[test]
    fn first_candidate_in_list_order_wins_within_a_class() {
        let candidates = vec![
            candidate("First", &[("ISBN13", "9781111111111")]),
            candidate("Second", &[("ISBN13", "9781111111111")]),
        ];
        let selection = select(
            &candidates,
            &IdentifierQuery::new(Some("9781111111111"), None, None),
        )
        .unwrap();
        assert_eq!(selection.candidate.title, "First");
    }

    #[test]
    fn no_identifiers_or_no_match_is_not_found() {
        let candidates = vec![candidate("Book", &[("ISBN13", "9781111111111")])];
        assert!(select(&candidates, &IdentifierQuery::default()).is_none());
        assert!(
            select(
                &candidates,
                &IdentifierQuery::new(Some("9782222222222"), None, None)
            )
            .is_none()
        );
    }

    #[test]
    fn author_is_derived_from_id_or_author_title() {
        let mut by_id = candidate("Book", &[]);
        by_id.author_id = Some(12);
        derive_author(&mut by_id);
        assert_eq!(by_id.author.unwrap().id, Some(12));

        let mut by_title = candidate("The Hobbit", &[]);
        by_title.author_title = Some("tolkien, j.r.r. The Hobbit".into());
        derive_author(&mut by_title);
        assert_eq!(
            by_title.author.unwrap().author_name.as_deref(),
            Some("j.r.r. tolkien")
        );
    }

    #[test]
    fn author_title_equal_to_the_title_derives_no_author() {
        let mut record = CandidateRecord::titled("Some Book");
        record.author_title = Some("some book".into());
        derive_author(&mut record);
        assert_eq!(record.author, None);
    }

    #[test]
    fn author_title_parsing_edge_cases() {
        assert_eq!(
            author_from_author_title("Doe, Jane Some Book", "some book").as_deref(),
            Some("Jane Doe")
        );
        assert_eq!(
            author_from_author_title("Plato", "").as_deref(),
            Some("Plato")
        );
        assert_eq!(author_from_author_title("Book", "Book"), None);
        assert_eq!(
            author_from_author_title("Herbert,  Frank", "Dune").as_deref(),
            Some("Frank Herbert")
        );
    }
}
