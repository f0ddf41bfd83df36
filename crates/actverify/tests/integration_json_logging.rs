//! Integration tests for JSON logging
//!
//! Logs go to stderr as one JSON object per line while stdout carries only
//! the report, so both streams stay machine-readable.

#![cfg(unix)]

use assert_cmd::Command;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

fn parse_log_lines(stderr: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(stderr)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .unwrap_or_else(|e| panic!("Failed to parse JSON line: {}\nError: {}", line, e))
        })
        .collect()
}

#[test]
fn test_json_logs_and_json_report_stay_separate() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("action.yml"),
        "runs:\n  using: node20\n  main: index.js\n",
    )
    .unwrap();
    fs::write(dir.path().join("index.js"), "printf foobar\n").unwrap();

    let mut cmd = Command::cargo_bin("actverify").unwrap();
    let output = cmd
        .env_remove("ACTVERIFY_LOG")
        .env_remove("RUST_LOG")
        .args(["--log-format", "json", "--log-level", "debug", "run"])
        .arg("--dist-dir")
        .arg(dir.path())
        .args(["--interpreter", "sh", "--output", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    // stdout is exactly one JSON document
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["passed"], true);

    let logs = parse_log_lines(&output.stderr);
    assert!(!logs.is_empty(), "debug level should produce log lines");
    for json in &logs {
        assert!(json["timestamp"].is_string());
        assert!(json["target"].is_string());
        assert!(json["fields"]["message"].is_string());
        let level = json["level"].as_str().unwrap();
        assert!(
            matches!(level, "TRACE" | "DEBUG" | "INFO" | "WARN" | "ERROR"),
            "unexpected level: {}",
            level
        );
    }

    // Captured child output is logged at debug level
    assert!(logs.iter().any(|json| json["fields"]["message"]
        .as_str()
        .is_some_and(|m| m.contains("[main] stdout: foobar"))));
}

#[test]
fn test_actverify_log_overrides_level_flag() {
    let mut cmd = Command::cargo_bin("actverify").unwrap();
    let output = cmd
        .env("ACTVERIFY_LOG", "error")
        .env_remove("RUST_LOG")
        .args(["--log-format", "json", "--log-level", "debug", "plan"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let logs = parse_log_lines(&output.stderr);
    assert!(
        logs.iter().all(|json| json["level"] == "ERROR"),
        "only error logs expected, got: {:?}",
        logs
    );
}
