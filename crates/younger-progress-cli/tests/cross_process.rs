//! End-to-end tests spawning real worker processes.
//!
//! Each test runs the `younger-progress` binary as a coordinator, which
//! spawns copies of itself as workers, and checks the JSON run summary.

use serde_json::Value;
use std::process::{Command, Output};

const BIN: &str = env!("CARGO_BIN_EXE_younger-progress");

/// Run the coordinator with `--hidden --json` plus `args`.
fn run_coordinator(args: &[&str]) -> Output {
    Command::new(BIN)
        .arg("run")
        .arg("--hidden")
        .arg("--json")
        .args(args)
        .output()
        .expect("Failed to run coordinator")
}

fn summary(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout
        .lines()
        .last()
        .unwrap_or_else(|| panic!("no summary on stdout, stderr: {}", String::from_utf8_lossy(&output.stderr)));
    serde_json::from_str(line).expect("summary should be JSON")
}

#[test]
fn test_two_workers_report_everything() {
    let output = run_coordinator(&["--total", "100", "--workers", "2", "--percent", "10"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let summary = summary(&output);
    assert_eq!(summary["interval"], 10);
    assert_eq!(summary["displayed_total"], 100);
    assert_eq!(summary["completed_workers"], 2);
    assert_eq!(summary["expected_workers"], 2);
    assert_eq!(summary["exit"], "all_workers_done");
    assert_eq!(summary["failed_workers"], 0);
}

#[test]
fn test_uneven_chunks_and_small_percent() {
    let output = run_coordinator(&["--total", "1001", "--workers", "7", "--percent", "0.5"]);
    assert!(output.status.success());

    let summary = summary(&output);
    assert_eq!(summary["interval"], 5);
    assert_eq!(summary["displayed_total"], 1001);
    assert_eq!(summary["completed_workers"], 7);
}

#[test]
fn test_slow_workers_still_aggregate() {
    let output = run_coordinator(&[
        "--total", "60", "--workers", "3", "--percent", "25", "--delay-ms", "2",
    ]);
    assert!(output.status.success());

    let summary = summary(&output);
    assert_eq!(summary["displayed_total"], 60);
    assert_eq!(summary["completed_workers"], 3);
}

#[test]
fn test_panicking_worker_flushes_before_exit() {
    // Worker 1 owns 50..100 and panics at item 75 after processing 25 items
    let output = run_coordinator(&[
        "--total", "100", "--workers", "2", "--percent", "10", "--fail-worker", "1",
    ]);
    assert!(!output.status.success());

    let summary = summary(&output);
    assert_eq!(summary["displayed_total"], 75);
    assert_eq!(summary["completed_workers"], 2);
    assert_eq!(summary["failed_workers"], 1);
}

#[test]
fn test_invalid_percent_is_rejected() {
    let output = run_coordinator(&["--total", "10", "--workers", "2", "--percent", "0"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("percent"));
}

#[test]
fn test_more_workers_than_items_is_rejected() {
    let output = run_coordinator(&["--total", "3", "--workers", "4"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("chunk_count"));
}

#[test]
fn test_worker_without_channel_fails() {
    let output = Command::new(BIN)
        .args(["worker", "--start", "0", "--end", "3"])
        .env_remove("YOUNGER_PROGRESS_HANDLE")
        .output()
        .expect("Failed to run worker");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("progress channel"));
}
