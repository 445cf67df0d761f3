use std::{collections::HashMap, fs, time::Duration};

use quire_config::{ConfigLoadError, ConfigLoader, ConfigSource};
use quire_model::CollectionKind;

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults_apply_when_nothing_is_configured() {
    let dir = tempfile::tempdir().unwrap();
    let load = ConfigLoader::new()
        .without_env_file()
        .with_search_root(dir.path())
        .load_with_env(env_from(&[]))
        .unwrap();

    assert_eq!(load.source, ConfigSource::Default);
    assert!(load.config.catalog(CollectionKind::Ebook).is_none());
    assert_eq!(load.config.engine.monitor.interval, Duration::from_secs(30));
    assert_eq!(load.config.engine.monitor.budget, Duration::from_secs(300));
    assert!(!load.warnings.is_empty());
}

#[test]
fn toml_file_from_search_root_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("quire.toml"),
        r#"
[catalogs.ebook]
base_url = "http://readarr:8787/api/v1/"
api_key = "secret"
lookup_endpoint = "book/lookup"
default_root_folder_path = "/books"
default_tags = [3, 4]

[engine]
lookup_cache_ttl = "30m"
submit_timeout = 20

[engine.monitor]
interval = "10s"
"#,
    )
    .unwrap();

    let load = ConfigLoader::new()
        .without_env_file()
        .with_search_root(dir.path())
        .load_with_env(env_from(&[]))
        .unwrap();

    assert_eq!(load.source, ConfigSource::File(dir.path().join("quire.toml")));
    let ebook = load.config.catalog(CollectionKind::Ebook).unwrap();
    assert_eq!(ebook.base_url, "http://readarr:8787/api/v1");
    assert_eq!(ebook.lookup_endpoint, "/book/lookup");
    assert_eq!(ebook.add_endpoint, "/book");
    assert_eq!(ebook.add_method, "POST");
    assert_eq!(ebook.default_tags, vec![3, 4]);
    assert_eq!(load.config.engine.lookup_cache_ttl, Duration::from_secs(1800));
    assert_eq!(load.config.engine.submit_timeout, Duration::from_secs(20));
    assert_eq!(load.config.engine.monitor.interval, Duration::from_secs(10));
    assert_eq!(load.config.engine.monitor.budget, Duration::from_secs(300));
    assert!(load.config.catalog(CollectionKind::Audiobook).is_none());
}

#[test]
fn inline_json_and_env_overrides_combine() {
    let dir = tempfile::tempdir().unwrap();
    let load = ConfigLoader::new()
        .without_env_file()
        .with_search_root(dir.path())
        .load_with_env(env_from(&[
            (
                "QUIRE_CONFIG_JSON",
                r#"{"catalogs":{"audiobook":{"base_url":"http://audio/api/v1"}}}"#,
            ),
            ("QUIRE_AUDIOBOOK_API_KEY", "abc"),
            ("QUIRE_AUDIOBOOK_TAGS", "7,8"),
            ("QUIRE_EBOOK_BASE_URL", "http://ebook/api/v1"),
            ("QUIRE_EBOOK_API_KEY", "def"),
            ("QUIRE_EBOOK_INSECURE_SKIP_VERIFY", "true"),
        ]))
        .unwrap();

    assert_eq!(load.source, ConfigSource::EnvInline);
    let audio = load.config.catalog(CollectionKind::Audiobook).unwrap();
    assert_eq!(audio.api_key, "abc");
    assert_eq!(audio.default_tags, vec![7, 8]);
    let ebook = load.config.catalog(CollectionKind::Ebook).unwrap();
    assert!(ebook.insecure_skip_verify);
    assert!(
        load.warnings
            .items
            .iter()
            .any(|w| w.message.contains("verification is disabled"))
    );
}

#[test]
fn invalid_env_override_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = ConfigLoader::new()
        .without_env_file()
        .with_search_root(dir.path())
        .load_with_env(env_from(&[("QUIRE_EBOOK_QUALITY_PROFILE_ID", "high")]))
        .unwrap_err();

    assert!(matches!(err, ConfigLoadError::InvalidEnv { .. }));
}

#[test]
fn explicit_path_with_unknown_extension_tries_both_formats() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quire.conf");
    fs::write(
        &path,
        r#"{"catalogs":{"ebook":{"base_url":"http://r/api/v1","api_key":"k"}}}"#,
    )
    .unwrap();

    let load = ConfigLoader::new()
        .without_env_file()
        .load_with_env(env_from(&[("QUIRE_CONFIG_PATH", path.to_str().unwrap())]))
        .unwrap();

    assert_eq!(load.source, ConfigSource::EnvPath(path));
    assert!(load.config.catalog(CollectionKind::Ebook).is_some());
}

#[test]
fn unparsable_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("quire.toml"), "catalogs = [").unwrap();

    let err = ConfigLoader::new()
        .without_env_file()
        .with_search_root(dir.path())
        .load_with_env(env_from(&[]))
        .unwrap_err();

    assert!(matches!(err, ConfigLoadError::Parse { .. }));
}

#[test]
fn explicit_config_path_beats_the_environment() {
    let dir = tempfile::tempdir().unwrap();
    let chosen = dir.path().join("chosen.toml");
    fs::write(
        &chosen,
        "[catalogs.audiobook]\nbase_url = \"http://r/api/v1\"\napi_key = \"k\"\n",
    )
    .unwrap();

    let load = ConfigLoader::new()
        .without_env_file()
        .with_config_path(&chosen)
        .load_with_env(env_from(&[(
            "QUIRE_CONFIG_JSON",
            r#"{"catalogs":{"ebook":{"base_url":"http://x/api/v1","api_key":"k"}}}"#,
        )]))
        .unwrap();

    assert_eq!(load.source, ConfigSource::File(chosen));
    assert!(load.config.catalog(CollectionKind::Audiobook).is_some());
    assert!(load.config.catalog(CollectionKind::Ebook).is_none());
}
