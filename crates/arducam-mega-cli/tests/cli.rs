// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Integration tests for the arducam CLI
//!
//! These tests verify CLI commands work correctly end-to-end using the
//! assert_cmd crate pattern. Every command drives the simulated module, so
//! no hardware is required.

use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use std::{env, fs, path::PathBuf, time::Duration};

/// Helper to create a Command for the arducam binary
/// Uses ARDUCAM_BIN environment variable if set, otherwise uses cargo run
fn arducam_cmd() -> Command {
    if let Ok(bin_path) = env::var("ARDUCAM_BIN") {
        Command::new(bin_path)
    } else {
        let mut c = Command::new("cargo");
        c.args(["run", "--quiet", "--bin", "arducam", "--"]);
        c
    }
}

/// Get the test data directory (target/testdata/arducam-cli)
/// Creates it if it doesn't exist
fn get_test_data_dir() -> PathBuf {
    let test_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("target")
        .join("testdata")
        .join("arducam-cli");

    fs::create_dir_all(&test_dir).expect("Failed to create test data directory");
    test_dir
}

fn parse_json(stdout: &[u8]) -> serde_json::Value {
    serde_json::from_slice(stdout).expect("stdout is not valid JSON")
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

#[test]
fn test_cli_help() {
    arducam_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ArduCam Mega CLI"))
        .stdout(predicate::str::contains("info"))
        .stdout(predicate::str::contains("capture"));
}

#[test]
fn test_cli_version() {
    arducam_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("arducam"));
}

#[test]
fn test_capture_help() {
    arducam_cmd()
        .args(["capture", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--resolution"))
        .stdout(predicate::str::contains("--period"))
        .stdout(predicate::str::contains("--chunk-size"));
}

// =============================================================================
// Info Command
// =============================================================================

#[test]
fn test_info_text() {
    arducam_cmd()
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("=== ArduCam Mega ==="))
        .stdout(predicate::str::contains("Model:"))
        .stdout(predicate::str::contains("5MP"));
}

#[test]
fn test_info_caps() {
    arducam_cmd()
        .args(["info", "--caps"])
        .assert()
        .success()
        .stdout(predicate::str::contains("=== Capabilities ==="))
        .stdout(predicate::str::contains("JPEG"))
        .stdout(predicate::str::contains("YUYV"));
}

#[test]
fn test_info_json() {
    let output = arducam_cmd()
        .args(["info", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let info = parse_json(&output);
    assert_eq!(info["camera_id"], "0x01");
    assert!(info["caps"]["formats"].as_array().unwrap().len() == 3);
    assert!(info["resolutions"]
        .as_array()
        .unwrap()
        .iter()
        .any(|r| r == "2592x1944"));
}

#[test]
fn test_info_3mp_excludes_5mp_sizes() {
    let output = arducam_cmd()
        .args(["info", "--model", "3mp", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let info = parse_json(&output);
    let resolutions = info["resolutions"].as_array().unwrap();
    assert!(!resolutions.is_empty());
    assert!(!resolutions.iter().any(|r| r == "2592x1944"));
}

#[test]
fn test_info_unknown_model() {
    arducam_cmd()
        .args(["info", "--model", "12mp"])
        .assert()
        .failure()
        .code(2);
}

// =============================================================================
// Capture Command
// =============================================================================

#[test]
fn test_capture_single_shot_json() {
    let output = arducam_cmd()
        .args(["capture", "--frames", "3", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let metrics = parse_json(&output);
    assert_eq!(metrics["frames_captured"], 3);
    assert_eq!(metrics["faults"], 0);
    assert_eq!(metrics["dropped_frames"], 0);
}

#[test]
fn test_capture_continuous() {
    let output = arducam_cmd()
        .args([
            "capture",
            "--period",
            "5ms",
            "--frames",
            "5",
            "--frame-size",
            "2000",
            "--chunk-size",
            "512",
            "--json",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let metrics = parse_json(&output);
    assert_eq!(metrics["frames_captured"], 5);
    assert_eq!(metrics["bytes_captured"], 10_000);
}

#[test]
fn test_capture_metrics_text() {
    arducam_cmd()
        .args(["capture", "--frames", "2", "--metrics"])
        .assert()
        .success()
        .stdout(predicate::str::contains("=== Capture Metrics ==="))
        .stdout(predicate::str::contains("Frames captured:   2"));
}

#[test]
fn test_capture_invalid_resolution() {
    arducam_cmd()
        .args(["capture", "--resolution", "640"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Invalid resolution"));
}

#[test]
fn test_capture_unsupported_size() {
    // 2592x1944 is only advertised by the 5MP module
    arducam_cmd()
        .args(["capture", "--model", "3mp", "--resolution", "2592x1944"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_capture_zero_period() {
    arducam_cmd()
        .args(["capture", "--period", "0ms"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_capture_period_out_of_range() {
    arducam_cmd()
        .args(["capture", "--period", "18446744073709551615s"])
        .timeout(Duration::from_secs(60))
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("cannot start stream"));
}

#[test]
#[serial]
fn test_capture_output_files() {
    let dir = get_test_data_dir().join("frames");
    let _ = fs::remove_dir_all(&dir);

    arducam_cmd()
        .args(["capture", "--frames", "2", "--frame-size", "1024", "--output"])
        .arg(&dir)
        .assert()
        .success();

    let mut files: Vec<PathBuf> = fs::read_dir(&dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    files.sort();
    assert_eq!(files.len(), 2);

    for file in &files {
        assert_eq!(file.extension().unwrap(), "jpg");
        let data = fs::read(file).unwrap();
        assert_eq!(data.len(), 1024);
        assert_eq!(&data[..2], &[0xFF, 0xD8]);
        assert_eq!(&data[data.len() - 2..], &[0xFF, 0xD9]);
    }
}
