//! CLI argument validation tests.
//!
//! These tests verify that the CLI properly validates arguments and scenario
//! files and provides helpful error messages.

use predicates::prelude::*;

use super::helpers::{allocator_cmd, fixture_path};

#[test]
fn test_help_output() {
    allocator_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("allocator"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("positions"));
}

#[test]
fn test_run_help_output() {
    allocator_cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SCENARIO"))
        .stdout(predicate::str::contains("--steps"));
}

#[test]
fn test_invalid_command() {
    allocator_cmd()
        .arg("invalid_command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_run_missing_scenario() {
    allocator_cmd()
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_invalid_output_format() {
    allocator_cmd()
        .args(["run", &fixture_path("basic"), "--format", "invalid_format"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_scenario_file_not_found() {
    allocator_cmd()
        .args(["run", "does-not-exist.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read scenario"));
}

#[test]
fn test_malformed_scenario() {
    allocator_cmd()
        .args(["run", &fixture_path("malformed")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid scenario file"));
}
