//! CLI Integration Tests
//!
//! Runs the binaries against the offline fixture in `test-data/`.

#![cfg(not(coverage))]
#![allow(deprecated)] // Command::cargo_bin deprecation - no stable replacement yet

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn armory() -> Command {
    let mut cmd = Command::cargo_bin("armory").unwrap();
    cmd.env_remove("ARMORY_ACCESS_TOKEN")
        .env_remove("ARMORY_CONFIG")
        .env("NO_COLOR", "1")
        .args(["--config", "test-data/armory.yaml", "--fixture", "test-data/fixture.yaml"]);
    cmd
}

// ═══════════════════════════════════════════════════════════════════════════
// HELP AND VERSION TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("armory").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("armory"))
        .stdout(predicate::str::contains("COMMANDS"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("armory").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_export_help() {
    let mut cmd = Command::cargo_bin("armory").unwrap();
    cmd.args(["export", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Write a tab to CSV"));
}

#[test]
fn test_server_help() {
    let mut cmd = Command::cargo_bin("armory-server").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Bearer"))
        .stdout(predicate::str::contains("/api/v1/armory/issue"))
        .stdout(predicate::str::contains("/api/v1/armory/credit"))
        .stdout(predicate::str::contains("--port"));
}

// ═══════════════════════════════════════════════════════════════════════════
// AUTH TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_missing_token_fails() {
    armory()
        .args(["records", "א"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no access token"));
}

#[test]
fn test_unknown_token_fails() {
    armory()
        .args(["--token", "bogus", "records", "א"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Authentication expired"));
}

#[test]
fn test_token_from_env() {
    armory()
        .env("ARMORY_ACCESS_TOKEN", "tok-a")
        .args(["records", "א"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ישראל ישראלי"));
}

// ═══════════════════════════════════════════════════════════════════════════
// COMMAND TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_records_json() {
    let output = armory()
        .args(["--token", "tok-a", "records", "א", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let records: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(records.as_array().unwrap().len(), 2);
    assert_eq!(records[1]["הערות"], "מאופסן");
}

#[test]
fn test_records_unknown_range() {
    armory()
        .args(["--token", "tok-a", "records", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
}

#[test]
fn test_records_of_other_unit_denied() {
    armory()
        .args(["--token", "tok-a", "records", "ב"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Access denied"));
}

#[test]
fn test_export_of_other_unit_denied() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("other.csv");
    armory()
        .args(["--token", "tok-a", "export", "ב"])
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Access denied"));
    assert!(!out.exists());
}

#[test]
fn test_logistics() {
    armory()
        .args(["--token", "tok-a", "logistics", "לוגיסטיקה-א"])
        .assert()
        .success()
        .stdout(predicate::str::contains("הזמנה (2)"))
        .stdout(predicate::str::contains("החתמה (1)"))
        .stdout(predicate::str::contains("דני"));
}

#[test]
fn test_logistics_hidden_without_permission() {
    armory()
        .args(["--token", "tok-none", "logistics", "לוגיסטיקה-א"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Access denied"));
}

#[test]
fn test_balances_reports_shortage() {
    armory()
        .args(["--token", "tok-log", "balances"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Weapons"))
        .stdout(predicate::str::contains("Shortages: M16"));
}

#[test]
fn test_export_csv() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("roster.csv");
    armory()
        .args(["--token", "tok-a", "export", "א"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 records"));

    let csv = std::fs::read_to_string(&out).unwrap();
    assert!(csv.starts_with("\"שם מלא\",\"סוג נשק\""));
    assert_eq!(csv.lines().count(), 3);
}

#[test]
fn test_bad_config_fails() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("bad.yaml");
    std::fs::write(&config, "spreadsheet_id: \"\"\n").unwrap();
    let mut cmd = Command::cargo_bin("armory").unwrap();
    cmd.env_remove("ARMORY_CONFIG")
        .arg("--config")
        .arg(&config)
        .args(["--fixture", "test-data/fixture.yaml", "--token", "tok-a", "balances"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("spreadsheet_id"));
}
