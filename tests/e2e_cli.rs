//! CLI end-to-end tests
//!
//! Tests for the dovimux command-line interface.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

#[allow(deprecated)]
fn dovimux_cmd() -> Command {
    Command::cargo_bin("dovimux").unwrap()
}

#[test]
fn no_args_shows_help() {
    let mut cmd = dovimux_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn help_flag() {
    let mut cmd = dovimux_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("dovimux"))
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_command() {
    let mut cmd = dovimux_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("dovimux"));
}

#[test]
fn check_tools_lists_every_tool() {
    let mut cmd = dovimux_cmd();
    // Succeeds or fails depending on what's installed, but always lists
    // the known tools.
    cmd.arg("check-tools")
        .assert()
        .stdout(
            predicate::str::contains("ffmpeg")
                .and(predicate::str::contains("ffprobe"))
                .and(predicate::str::contains("dovi_tool"))
                .and(predicate::str::contains("MP4Box")),
        );
}

#[test]
fn probe_missing_file_fails() {
    let mut cmd = dovimux_cmd();
    cmd.args(["probe", "/nonexistent/file.mkv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn remux_missing_file_fails() {
    let mut cmd = dovimux_cmd();
    cmd.args(["remux", "/nonexistent/file.mkv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn validate_default_config() {
    let mut cmd = dovimux_cmd();
    cmd.arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("valid"));
}

#[test]
fn validate_config_with_warnings() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.json");
    fs::write(
        &config,
        r#"{"include_ancestor_ids": "not-an-id", "primary_user": " "}"#,
    )
    .unwrap();

    let mut cmd = dovimux_cmd();
    cmd.args(["validate", config.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("warning"));
}

#[test]
fn validate_rejects_malformed_json() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.json");
    fs::write(&config, "{not json").unwrap();

    let mut cmd = dovimux_cmd();
    cmd.args(["validate", config.to_str().unwrap()])
        .assert()
        .failure();
}

#[test]
fn downmux_help_mentions_profile() {
    let mut cmd = dovimux_cmd();
    cmd.args(["downmux", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Profile 7"));
}
