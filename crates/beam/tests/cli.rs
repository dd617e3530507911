//! End-to-end tests for the `beam` binary. Stdout is captured, so every
//! page command prints the expanded page instead of opening the UI.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const PAGE: &str = r#"{
    "type": "list",
    "title": "Fixture",
    "items": [
        {"title": "Next", "actions": [{"type": "read", "path": "next.json"}]}
    ]
}"#;

/// A `beam` command isolated from the user's configuration.
fn beam(dir: &TempDir) -> Command {
    let config = dir.path().join("empty.toml");
    if !config.exists() {
        std::fs::write(&config, "").unwrap();
    }
    let mut cmd = Command::cargo_bin("beam").unwrap();
    cmd.current_dir(dir.path())
        .env("BEAM_CONFIG", &config)
        .env_remove("RUST_LOG");
    cmd
}

fn write(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).unwrap();
}

#[test]
fn validate_accepts_a_good_page() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "page.json", PAGE);
    beam(&dir)
        .args(["validate", "page.json"])
        .assert()
        .success()
        .stdout("ok\n");
}

#[test]
fn validate_reports_the_failing_field() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "page.json", r#"{"type": "grid"}"#);
    beam(&dir)
        .args(["validate", "page.json"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::starts_with("error:"))
        .stderr(predicate::str::contains("$.type"));
}

#[test]
fn validate_reads_yaml_pages() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "page.yaml",
        "type: detail\ntext: hello\nactions:\n  - type: copy\n    text: hi\n",
    );
    beam(&dir)
        .args(["validate", "page.yaml"])
        .assert()
        .success();
}

#[test]
fn validate_reads_stdin() {
    let dir = TempDir::new().unwrap();
    beam(&dir)
        .arg("validate")
        .write_stdin(r#"{"type": "detail", "text": "hi"}"#)
        .assert()
        .success()
        .stdout("ok\n");
}

#[test]
fn read_prints_the_expanded_page() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "page.json", PAGE);
    let expected = dir.path().join("next.json").display().to_string();
    beam(&dir)
        .args(["read", "page.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"title\": \"Fixture\""))
        .stdout(predicate::str::contains(expected));
}

#[test]
fn read_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    beam(&dir)
        .args(["read", "missing.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.json"));
}

#[test]
fn run_prints_the_page_a_command_writes() {
    let dir = TempDir::new().unwrap();
    beam(&dir)
        .args(["run", "echo", r#"{"type":"detail","text":"from echo"}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("from echo"));
}

#[test]
fn run_single_argument_is_split_into_words() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "page.json", PAGE);
    beam(&dir)
        .args(["run", "cat page.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Fixture"));
}

#[test]
fn run_failure_surfaces_stderr() {
    let dir = TempDir::new().unwrap();
    beam(&dir)
        .args(["run", "sh", "-c", "echo boom >&2; exit 3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("boom"));
}

#[test]
fn root_lists_config_entries_and_manifest() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "beam.toml",
        "[general]\ntitle = \"Home\"\n\n[[root]]\ntitle = \"Files\"\ncommand = \"ls\"\n",
    );
    write(dir.path(), "beam.json", PAGE);
    beam(&dir)
        .env("BEAM_CONFIG", dir.path().join("beam.toml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"title\": \"Home\""))
        .stdout(predicate::str::contains("\"title\": \"Files\""))
        .stdout(predicate::str::contains("manifest:beam.json"));
}

#[test]
fn invalid_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "bad.toml", "[ui]\ntick_ms = 0\n");
    beam(&dir)
        .args(["--config", "bad.toml", "validate"])
        .write_stdin("{}")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("tick_ms"));
}

#[test]
fn unknown_log_format_is_rejected() {
    let dir = TempDir::new().unwrap();
    beam(&dir)
        .args(["--log-format", "xml", "validate"])
        .write_stdin(r#"{"type": "detail"}"#)
        .assert()
        .failure()
        .stderr(predicate::str::contains("xml"));
}
