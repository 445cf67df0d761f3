use std::{sync::Arc, time::Duration};

use httpmock::prelude::*;
use quire_config::{CatalogInstanceConfig, EngineConfig};
use quire_core::{
    CatalogCache, CatalogError, CatalogService,
    catalog::{reference::ReferenceLookup, submit::SubmissionOutcome},
};
use quire_model::CollectionKind;
use serde_json::json;

const API_KEY: &str = "secret-key-123";

fn service(server: &MockServer) -> CatalogService {
    let mut config = CatalogInstanceConfig::new(server.url("/api/v1"), API_KEY);
    config.default_root_folder_path = "/books".into();
    CatalogService::new(
        CollectionKind::Ebook,
        &config,
        &EngineConfig::default(),
        Arc::new(CatalogCache::new(Duration::from_secs(60))),
    )
    .unwrap()
}

#[tokio::test]
async fn lookups_are_cached_per_term() {
    let server = MockServer::start_async().await;
    let lookup = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1/book/lookup")
                .query_param("term", "dune")
                .query_param("apikey", API_KEY)
                .header("X-Api-Key", API_KEY);
            then.status(200).json_body(json!([
                { "title": "Dune", "foreignBookId": "123", "someFutureField": 5 }
            ]));
        })
        .await;

    let service = service(&server);
    let first = service.lookup("dune").await.unwrap();
    let second = service.lookup("  dune ").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first[0].foreign_book_id.as_deref(), Some("123"));
    assert_eq!(first[0].extra.get("someFutureField"), Some(&json!(5)));
    lookup.assert_calls_async(1).await;
}

#[tokio::test]
async fn errors_never_echo_the_api_key() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/book/lookup");
            then.status(401).body("Unauthorized");
        })
        .await;

    let err = service(&server).lookup("dune").await.unwrap_err();
    let text = err.to_string();

    assert_eq!(err.status(), Some(401));
    assert!(!text.contains(API_KEY), "api key leaked: {text}");
    assert!(text.contains("apikey=REDACTED"), "{text}");
}

#[tokio::test]
async fn quality_profiles_are_swept_when_the_list_is_unavailable() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/qualityprofile");
            then.status(500).body("boom");
        })
        .await;
    for id in [1, 2] {
        server
            .mock_async(move |when, then| {
                when.method(GET).path(format!("/api/v1/qualityprofile/{id}"));
                then.status(200)
                    .json_body(json!({ "id": id, "name": format!("Profile {id}") }));
            })
            .await;
    }
    // Unmatched ids answer 404, which ends the sweep.

    let service = service(&server);
    let profiles = service.references().quality_profiles().await.unwrap();
    assert_eq!(profiles.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 2]);

    let references = service.references();
    assert_eq!(references.valid_quality_profile_id(2).await.unwrap(), 2);
    assert_eq!(references.valid_quality_profile_id(9).await.unwrap(), 1);
}

#[tokio::test]
async fn root_folder_falls_back_to_the_first_known_path() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/rootfolder");
            then.status(200)
                .json_body(json!([{ "id": 1, "path": "/library" }, { "id": 2, "path": "/other" }]));
        })
        .await;

    let references = service(&server).references().clone();
    assert_eq!(references.valid_root_folder_path("/other").await.unwrap(), "/other");
    // Neither the preferred nor the configured default exist.
    assert_eq!(references.valid_root_folder_path("/nope").await.unwrap(), "/library");
}

#[tokio::test]
async fn existing_authors_are_not_recreated() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1/author/lookup")
                .query_param("term", "Jane Doe");
            then.status(200).json_body(json!([
                { "id": 7, "authorName": "Jane Doe", "foreignAuthorId": "ol1" }
            ]));
        })
        .await;
    let create = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/author");
            then.status(201).json_body(json!({ "id": 99 }));
        })
        .await;

    let references = service(&server).references().clone();
    assert_eq!(references.create_author("Jane Doe").await.unwrap(), 7);
    create.assert_calls_async(0).await;
}

#[tokio::test]
async fn imported_authors_are_remembered() {
    let server = MockServer::start_async().await;
    let search = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/author/lookup");
            then.status(200).json_body(json!([
                { "authorName": "Jane Doe", "foreignAuthorId": "ol1" }
            ]));
        })
        .await;
    let create = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/author");
            then.status(201)
                .json_body(json!({ "id": 12, "authorName": "Jane Doe" }));
        })
        .await;

    let references = service(&server).references().clone();
    assert_eq!(references.create_author("Jane Doe").await.unwrap(), 12);
    assert_eq!(references.author_id_by_name("jane doe").await.unwrap(), Some(12));

    create.assert_calls_async(1).await;
    search.assert_calls_async(1).await;
}

#[tokio::test]
async fn author_import_walks_every_payload_tier_before_giving_up() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/author/lookup");
            then.status(200).json_body(json!([
                { "authorName": "Jane Doe", "foreignAuthorId": "ol1" }
            ]));
        })
        .await;
    let create = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/author");
            then.status(400).json_body(json!([
                { "propertyName": "RootFolderPath", "errorMessage": "Root folder does not exist" },
                { "propertyName": "QualityProfileId", "errorMessage": "Quality profile does not exist" }
            ]));
        })
        .await;

    let err = service(&server)
        .references()
        .create_author("Jane Doe")
        .await
        .unwrap_err();

    assert!(matches!(err, CatalogError::ReferenceResolution { what: "author", .. }));
    assert!(err.to_string().contains("Quality profile does not exist"), "{err}");
    create.assert_calls_async(3).await;
}

#[tokio::test]
async fn successful_submission_reports_the_created_id() {
    let server = MockServer::start_async().await;
    let add = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v1/book")
                .query_param("includeAllAuthorBooks", "false");
            then.status(201).json_body(json!({ "id": 77, "title": "Dune" }));
        })
        .await;

    let submission = service(&server)
        .submitter()
        .submit(br#"{"title":"Dune","foreignBookId":"123"}"#)
        .await
        .unwrap();

    assert_eq!(submission.outcome, SubmissionOutcome::Created { id: Some(77) });
    assert_eq!(submission.sent_payload, r#"{"title":"Dune","foreignBookId":"123"}"#);
    add.assert_calls_async(1).await;
}

#[tokio::test]
async fn already_existing_books_are_monitored_instead() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/book");
            then.status(400)
                .json_body(json!([{ "errorMessage": "This book has already been added" }]));
        })
        .await;
    let existing = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/book");
            then.status(200).json_body(json!([
                { "id": 5, "foreignBookId": "999" },
                { "id": 6, "foreignBookId": "123" }
            ]));
        })
        .await;
    let monitor = server
        .mock_async(|when, then| {
            when.method(PUT).path("/api/v1/book/monitor");
            then.status(202).json_body(json!([]));
        })
        .await;

    let submission = service(&server)
        .submitter()
        .submit(br#"{"title":"Dune","foreignBookId":"123"}"#)
        .await
        .unwrap();

    assert_eq!(submission.outcome, SubmissionOutcome::AlreadyExists { id: Some(6) });
    existing.assert_calls_async(1).await;
    monitor.assert_calls_async(1).await;
}

#[tokio::test]
async fn other_rejections_are_failures_with_the_response_kept() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/book");
            then.status(400).body("Title is required");
        })
        .await;

    let failure = service(&server)
        .submitter()
        .submit(br#"{"foreignBookId":"123"}"#)
        .await
        .unwrap_err();

    assert_eq!(failure.error.status(), Some(400));
    assert_eq!(failure.response_body.as_deref(), Some("Title is required"));
    assert_eq!(failure.sent_payload, r#"{"foreignBookId":"123"}"#);
}

#[tokio::test]
async fn duplicates_without_a_recoverable_id_skip_monitoring() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/book");
            then.status(500)
                .body("duplicate key value violates unique constraint");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/book");
            then.status(200).json_body(json!([]));
        })
        .await;
    let monitor = server
        .mock_async(|when, then| {
            when.method(PUT).path("/api/v1/book/monitor");
            then.status(202).json_body(json!([]));
        })
        .await;

    let submission = service(&server)
        .submitter()
        .submit(br#"{"title":"Dune","foreignBookId":"123"}"#)
        .await
        .unwrap();

    assert_eq!(submission.outcome, SubmissionOutcome::AlreadyExists { id: None });
    monitor.assert_calls_async(0).await;
}
