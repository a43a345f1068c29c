//! Test helper utilities for CLI integration tests.

#![allow(deprecated)] // Command::cargo_bin deprecation

use assert_cmd::Command;

/// Create a CLI command.
pub fn allocator_cmd() -> Command {
    Command::cargo_bin("allocator").unwrap()
}

/// Path of a fixture scenario file.
pub fn fixture_path(name: &str) -> String {
    format!(
        "{}/tests/fixtures/{}.json",
        env!("CARGO_MANIFEST_DIR"),
        name
    )
}

/// Run a command and parse its stdout as JSON.
pub fn run_json(args: &[&str]) -> serde_json::Value {
    let output = allocator_cmd()
        .args(args)
        .output()
        .expect("Failed to run allocator");
    assert!(
        output.status.success(),
        "allocator failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is not valid JSON")
}
