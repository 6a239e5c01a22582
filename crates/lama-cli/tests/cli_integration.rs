//! CLI integration tests.
//!
//! Drive the `loglama` binary end-to-end against a temporary directory.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

/// A `loglama` command whose log dir and database live in `dir`.
fn loglama(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("loglama").expect("loglama binary");
    cmd.env_remove("LOGLAMA_CONFIG")
        .env_remove("LOGLAMA_DB_PATH")
        .env("RUST_LOG", "warn")
        .arg("--log-dir")
        .arg(dir.path().join("logs"));
    cmd
}

// ============================================================================
// Emit / Logs
// ============================================================================

#[test]
fn emitted_record_shows_up_in_logs() {
    let dir = TempDir::new().expect("temp dir");

    loglama(&dir)
        .args(["emit", "auth", "login failed", "-l", "error", "-x", "user=alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Stored record 1 (ERROR auth)"));

    loglama(&dir)
        .args(["logs", "--verbose"])
        .assert()
        .success()
        .stdout(predicate::str::contains("login failed"))
        .stdout(predicate::str::contains("\"user\":\"alice\""));
}

#[test]
fn logs_json_is_a_page_object() {
    let dir = TempDir::new().expect("temp dir");
    for message in ["one", "two", "three"] {
        loglama(&dir).args(["emit", "api", message]).assert().success();
    }

    let output = loglama(&dir)
        .args(["--format", "json", "logs", "-n", "2"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let page: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(page["total"], 3);
    assert_eq!(page["total_pages"], 2);
    assert_eq!(page["rows"][0]["message"], "three");
}

#[test]
fn unknown_level_is_an_error() {
    let dir = TempDir::new().expect("temp dir");
    loglama(&dir)
        .args(["logs", "--level", "LOUD"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn dotenv_file_supplies_settings() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join(".env"), "LOGLAMA_MAX_MESSAGE_LENGTH=5\n").expect("write .env");

    loglama(&dir)
        .current_dir(dir.path())
        .env_remove("LOGLAMA_MAX_MESSAGE_LENGTH")
        .args(["emit", "api", "truncate me"])
        .assert()
        .success();

    let output = loglama(&dir)
        .current_dir(dir.path())
        .env_remove("LOGLAMA_MAX_MESSAGE_LENGTH")
        .args(["--format", "json", "logs"])
        .output()
        .expect("run");
    let page: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(page["rows"][0]["message"], "trunc");
}

#[test]
fn real_environment_beats_dotenv_file() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join(".env"), "LOGLAMA_MAX_MESSAGE_LENGTH=5\n").expect("write .env");

    loglama(&dir)
        .current_dir(dir.path())
        .env("LOGLAMA_MAX_MESSAGE_LENGTH", "100")
        .args(["emit", "api", "kept whole"])
        .assert()
        .success();

    loglama(&dir)
        .current_dir(dir.path())
        .args(["logs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("kept whole"));
}

// ============================================================================
// Collect / Stats
// ============================================================================

#[test]
fn collect_imports_file_once() {
    let dir = TempDir::new().expect("temp dir");
    let logs = dir.path().join("logs");
    fs::create_dir_all(&logs).expect("mkdir");
    fs::write(
        logs.join("worker.log"),
        concat!(
            r#"{"timestamp":"2024-05-01T10:00:00Z","level":"INFO","message":"started"}"#,
            "\n",
            r#"{"timestamp":"2024-05-01T10:00:01Z","level":"ERROR","message":"crashed"}"#,
            "\n",
        ),
    )
    .expect("write log");

    loglama(&dir)
        .arg("collect")
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 2 record(s) from 1 source(s), 0 failed"));

    loglama(&dir)
        .arg("collect")
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 0 record(s)"));

    loglama(&dir)
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("Total Records:    2"))
        .stdout(predicate::str::contains("worker"));
}

// ============================================================================
// Clear / Export
// ============================================================================

#[test]
fn clear_needs_yes_then_export_is_empty() {
    let dir = TempDir::new().expect("temp dir");
    loglama(&dir).args(["emit", "api", "hello"]).assert().success();

    loglama(&dir).arg("clear").assert().failure();
    loglama(&dir)
        .args(["clear", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted 1 record(s)"));

    loglama(&dir)
        .args(["export", "--as", "json"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("["));
}
