use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn top_level_help_lists_commands() {
    let mut cmd = cargo_bin_cmd!("quirectl");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("lookup"))
        .stdout(predicate::str::contains("select"))
        .stdout(predicate::str::contains("build"));
}

#[test]
fn build_help_mentions_identifier_flags() {
    let mut cmd = cargo_bin_cmd!("quirectl");
    let output = cmd
        .arg("build")
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8_lossy(&output);
    for flag in ["--isbn13", "--isbn10", "--asin", "--term", "--kind"] {
        assert!(text.contains(flag), "build help missing {flag}");
    }
}

#[test]
fn check_without_services_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = cargo_bin_cmd!("quirectl");
    cmd.current_dir(dir.path())
        .env_remove("QUIRE_CONFIG_PATH")
        .env_remove("QUIRE_CONFIG_JSON")
        .env_remove("QUIRE_EBOOK_BASE_URL")
        .env_remove("QUIRE_AUDIOBOOK_BASE_URL")
        .args(["--no-env-file", "check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no catalog services are configured"));
}

#[test]
fn select_requires_an_identifier() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = cargo_bin_cmd!("quirectl");
    cmd.current_dir(dir.path())
        .env("QUIRE_CONFIG_JSON", r#"{"catalogs":{"ebook":{"base_url":"http://127.0.0.1:9/api/v1","api_key":"k"}}}"#)
        .args(["--no-env-file", "select"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--isbn13"));
}
