//! Positions command tests.

use predicates::prelude::*;

use super::helpers::{allocator_cmd, fixture_path, run_json};

#[test]
fn test_positions_table() {
    allocator_cmd()
        .args(["positions", &fixture_path("basic")])
        .assert()
        .success()
        .stdout(predicate::str::contains("Positions"))
        .stdout(predicate::str::contains("Free Liquidity"))
        .stdout(predicate::str::contains("gamma"))
        .stdout(predicate::str::contains("advance 2592000s").not());
}

#[test]
fn test_positions_json_has_no_steps() {
    let report = run_json(&["positions", &fixture_path("basic"), "--format", "json"]);
    assert!(report["steps"].as_array().unwrap().is_empty());
    assert_eq!(report["positions"].as_array().unwrap().len(), 4);
}

#[test]
fn test_positions_with_step_limit() {
    let report = run_json(&[
        "positions",
        &fixture_path("illiquid"),
        "--steps",
        "1",
        "--format",
        "json",
    ]);
    // Only the first harvest ran, so every position is fully redeemable
    for position in report["positions"].as_array().unwrap() {
        assert_eq!(position["value"], position["redeemable"]);
    }
    assert_eq!(report["allocator"]["debt"], "100000");
}

#[test]
fn test_positions_before_any_step() {
    let report = run_json(&[
        "positions",
        &fixture_path("basic"),
        "--steps",
        "0",
        "--format",
        "json",
    ]);
    assert_eq!(report["allocator"]["total_assets"], "0");
    assert_eq!(report["allocator"]["debt"], "0");
    assert_eq!(report["allocator"]["debt_outstanding"], "0");
}
