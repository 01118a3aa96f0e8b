//! Shared test helpers for integration tests
//!
//! This module provides common utilities used across all test files.

#![allow(dead_code)]

use assert_cmd::cargo;
use assert_cmd::Command;
use tempfile::TempDir;

/// Helper to get a utrace command with a clean environment
pub fn utrace() -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("utrace"));
    cmd.env_remove("UTRACE_USER")
        .env_remove("UTRACE_DB")
        .env_remove("UTRACE_LOG");
    cmd
}

/// Helper to create a test project whose acting user is the admin `alice`
pub fn setup_test_project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    utrace()
        .current_dir(tmp.path())
        .args(["init", "--admin", "alice"])
        .assert()
        .success();
    tmp
}

/// Helper to run a command in the project and capture trimmed stdout
pub fn run_ok(tmp: &TempDir, args: &[&str]) -> String {
    let output = utrace().current_dir(tmp.path()).args(args).output().unwrap();
    assert!(
        output.status.success(),
        "utrace {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Helper to register a unit; returns its id
pub fn create_test_unit(tmp: &TempDir, code: &str) -> String {
    run_ok(
        tmp,
        &[
            "unit", "new", code, "--name", "Drive motor", "--type", "motor",
            "--manufacturer", "Acme", "-o", "id",
        ],
    )
}

/// Helper to register a unit and assign its identity; returns the token
pub fn create_identified_unit(tmp: &TempDir, code: &str) -> String {
    create_test_unit(tmp, code);
    run_ok(tmp, &["track", "assign", code, "-o", "id"])
}

/// Helper to add a user with a role
pub fn create_test_user(tmp: &TempDir, username: &str, role: &str) {
    run_ok(tmp, &["user", "add", username, "--role", role]);
}
