//! Integration tests for the `cocolink` CLI binary.
//!
//! These tests validate argument parsing, help output, shell completions,
//! and error handling without a live controller.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

const FAKE_CA: &str = "-----BEGIN CERTIFICATE-----\n\
    MIIBszCCAVmgAwIBAgIUQ29Db1Rlc3RBbmNob3IwCgYIKoZIzj0EAwIwEjEQMA4G\n\
    -----END CERTIFICATE-----\n";

/// JWT whose `exp` is in 1970.
const EXPIRED_TOKEN: &str = "eyJhbGciOiJIUzI1NiJ9.eyJleHAiOjEwMDB9.c2ln";

/// Build a [`Command`] for the `cocolink` binary with env isolation.
///
/// Clears all `COCOLINK_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn cocolink_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("cocolink");
    cmd.env("HOME", "/tmp/cocolink-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/cocolink-test-nonexistent")
        .env_remove("COCOLINK_PROFILE")
        .env_remove("COCOLINK_HOST")
        .env_remove("COCOLINK_PORT")
        .env_remove("COCOLINK_TOKEN")
        .env_remove("COCOLINK_CA_CERT")
        .env_remove("COCOLINK_OUTPUT")
        .env_remove("COCOLINK_TIMEOUT");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = cocolink_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    cocolink_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("Niko Home Control")
            .and(predicate::str::contains("devices"))
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("thermostat")),
    );
}

#[test]
fn test_version_flag() {
    cocolink_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("cocolink"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    cocolink_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    cocolink_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_devices_without_controller() {
    cocolink_cmd()
        .arg("devices")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("No controller configured"));
}

#[test]
fn test_expired_token_is_auth_error() {
    let dir = tempfile::tempdir().unwrap();
    let ca = dir.path().join("ca.pem");
    std::fs::write(&ca, FAKE_CA).unwrap();

    cocolink_cmd()
        .args(["--host", "127.0.0.1", "--token", EXPIRED_TOKEN, "--ca-cert"])
        .arg(&ca)
        .arg("devices")
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("expired"));
}

#[test]
fn test_unreadable_ca_is_usage_error() {
    cocolink_cmd()
        .args([
            "--host",
            "127.0.0.1",
            "--token",
            EXPIRED_TOKEN,
            "--ca-cert",
            "/tmp/cocolink-test-nonexistent/ca.pem",
            "info",
        ])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("ca_cert"));
}

#[test]
fn test_invalid_thermostat_mode() {
    let output = cocolink_cmd()
        .args(["thermostat", "mode", "living", "sauna"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("sauna"));
}

#[test]
fn test_invalid_action_value() {
    cocolink_cmd()
        .args(["action", "kitchen", "sideways"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_invalid_output_format() {
    let output = cocolink_cmd()
        .args(["--output", "invalid", "devices"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("invalid") || text.contains("possible values"),
        "Expected error about valid output formats:\n{text}"
    );
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_show_no_config() {
    cocolink_cmd().args(["config", "show"]).assert().success();
}

#[test]
fn test_config_use_unknown_profile() {
    cocolink_cmd()
        .args(["config", "use", "cabin"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cabin"));
}

// ── Subcommand help discovery ───────────────────────────────────────

#[test]
fn test_access_subcommands_exist() {
    cocolink_cmd()
        .args(["access", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("unlock")
                .and(predicate::str::contains("bell"))
                .and(predicate::str::contains("ring-and-come-in")),
        );
}

#[test]
fn test_config_subcommands_exist() {
    cocolink_cmd()
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("show")
                .and(predicate::str::contains("profiles"))
                .and(predicate::str::contains("set-token")),
        );
}
