//! Run command tests.

use predicates::prelude::*;

use super::helpers::{allocator_cmd, fixture_path, run_json};

#[test]
fn test_run_basic_table() {
    allocator_cmd()
        .args(["run", &fixture_path("basic")])
        .assert()
        .success()
        .stdout(predicate::str::contains("harvest"))
        .stdout(predicate::str::contains("advance 2592000s"))
        .stdout(predicate::str::contains("Total Assets"))
        .stdout(predicate::str::contains("Positions"))
        .stdout(predicate::str::contains("alpha"))
        .stdout(predicate::str::contains("delta"))
        .stdout(predicate::str::contains("40.00%"));
}

#[test]
fn test_run_basic_json() {
    let report = run_json(&["run", &fixture_path("basic"), "--format", "json"]);

    let steps = report["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 5);
    assert_eq!(steps[0]["action"], "harvest");
    assert_eq!(steps[0]["profit"], "0");
    // Thirty days of interest come back as profit
    assert_ne!(steps[2]["profit"], "0");
    assert_eq!(steps[2]["loss"], "0");

    assert_eq!(report["allocator"]["debt"], "100000");
    assert_eq!(report["allocator"]["emergency_exit"], false);

    let positions = report["positions"].as_array().unwrap();
    assert_eq!(positions.len(), 4);
    assert_eq!(positions[0]["pool"], "alpha");
    assert_eq!(positions[0]["weight_bps"], 4000);
}

#[test]
fn test_run_illiquid_reports_loss() {
    let report = run_json(&["run", &fixture_path("illiquid"), "--format", "json"]);

    let withdraw = &report["steps"].as_array().unwrap()[2];
    assert_eq!(withdraw["action"], "withdraw all");
    assert_ne!(withdraw["loss"], "0");
    assert_ne!(withdraw["liquidated"], "0");
    assert_eq!(report["allocator"]["debt"], "0");
    // The stuck credit is still valued
    assert_ne!(report["positions"][0]["value"], "0");
    assert_eq!(report["positions"][0]["redeemable"], "0");
}

#[test]
fn test_run_illiquid_table_warns() {
    allocator_cmd()
        .args(["run", &fixture_path("illiquid")])
        .assert()
        .success()
        .stdout(predicate::str::contains("withdraw all"))
        .stdout(predicate::str::contains("[ILLIQUID] alpha"));
}

#[test]
fn test_run_rejects_excess_loss() {
    allocator_cmd()
        .args(["run", &fixture_path("excess_loss")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Step 3 (withdraw all) failed"))
        .stderr(predicate::str::contains("exceeds limit"));
}

#[test]
fn test_run_unknown_pool() {
    allocator_cmd()
        .args(["run", &fixture_path("unknown_pool")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown pool: omega"));
}
