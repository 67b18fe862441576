//! Integration tests for the CLI
//!
//! These run the built binary in a scratch directory, so the database and
//! configuration it sees are the ones written by each test.

#![allow(clippy::panic)] // Allow panic! in tests for clear failure messages

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const EXPERIMENT: &str = r#"
id = "api-drill"
name = "api drill"
duration_secs = 1
tags = ["smoke"]

[target]
kind = "service"
name = "api"
identifier = "api.internal"

[[faults]]
id = "down"
type = "unavailability"
duration = { secs = 1, nanos = 0 }
"#;

const CONFIG: &str = r#"
[policy]
name = "production"

[[policy.rules]]
name = "no-api"
condition = { kind = "forbidden_targets", targets = ["api"] }
"#;

fn cli(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_chaos-cli"))
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .env_remove("CHAOS_CONFIG")
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run chaos-cli: {e}"))
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn scratch() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("drill.toml"), EXPERIMENT).unwrap();
    dir
}

#[test]
fn validate_accepts_experiment_without_policy() {
    let dir = scratch();
    let output = cli(dir.path(), &["validate", "drill.toml"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("passes policy"));
}

#[test]
fn validate_rejects_forbidden_target() {
    let dir = scratch();
    fs::write(dir.path().join("chaos.toml"), CONFIG).unwrap();

    let output = cli(dir.path(), &["validate", "drill.toml"]);

    assert!(!output.status.success());
    assert!(stdout(&output).contains("no-api"));
}

#[test]
fn blast_radius_as_json() {
    let dir = scratch();
    let output = cli(dir.path(), &["blast-radius", "drill.toml", "--json"]);

    assert!(output.status.success());
    let radius: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(radius["impact"]["target_name"], "api");
    assert_eq!(radius["impact"]["fault_type"], "unavailability");
}

#[test]
fn score_of_clean_results_is_perfect() {
    let dir = scratch();
    fs::write(
        dir.path().join("results.json"),
        r#"{
            "status": "completed",
            "started_at": "2026-01-05T10:00:00Z",
            "finished_at": "2026-01-05T10:05:00Z",
            "duration": {"secs": 300, "nanos": 0},
            "hypothesis_valid": true
        }"#,
    )
    .unwrap();

    let output = cli(dir.path(), &["score", "results.json"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("100/100"));
}

#[test]
fn persisted_dry_run_can_be_listed_and_shown() {
    let dir = scratch();

    let run = cli(dir.path(), &["run", "drill.toml", "--dry-run", "--persist"]);
    assert!(run.status.success(), "run failed: {}", String::from_utf8_lossy(&run.stderr));
    let report: serde_json::Value = serde_json::from_str(&stdout(&run)).unwrap();
    assert_eq!(report["experiment_id"], "api-drill");
    assert_eq!(report["results"]["dry_run"], true);

    let list = cli(dir.path(), &["list", "--tag", "smoke"]);
    assert!(list.status.success());
    assert!(stdout(&list).contains("api-drill"));
    assert!(stdout(&list).contains("completed"));

    let show = cli(dir.path(), &["show", "api-drill"]);
    assert!(show.status.success());
    let stored: serde_json::Value = serde_json::from_str(&stdout(&show)).unwrap();
    assert_eq!(stored["status"], "completed");
}

#[test]
fn show_unknown_experiment_fails() {
    let dir = scratch();
    let output = cli(dir.path(), &["show", "missing"]);
    assert!(!output.status.success());
}
