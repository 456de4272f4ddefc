use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn sifter_cmd(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("sifter").expect("sifter binary");
    cmd.env("HOME", home).env("USERPROFILE", home);
    cmd
}

#[test]
fn help_lists_top_level_commands() {
    let home = TempDir::new().expect("home");
    sifter_cmd(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("daemon"))
        .stdout(contains("session"))
        .stdout(contains("list"));
}

#[test]
fn daemon_status_without_daemon_reports_not_running() {
    let home = TempDir::new().expect("home");
    let assert = sifter_cmd(home.path())
        .args(["daemon", "status"])
        .assert()
        .success();
    let value: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("status json");
    assert_eq!(value["running"], serde_json::Value::Bool(false));
    assert!(value["socket"]
        .as_str()
        .expect("socket path")
        .ends_with("daemon.sock"));
}

#[test]
fn daemon_stop_without_daemon_is_not_an_error() {
    let home = TempDir::new().expect("home");
    sifter_cmd(home.path())
        .args(["daemon", "stop"])
        .assert()
        .success()
        .stdout(contains("daemon is not running"));
}

#[test]
fn list_without_daemon_fails_with_hint() {
    let home = TempDir::new().expect("home");
    sifter_cmd(home.path())
        .arg("list")
        .assert()
        .failure()
        .stderr(contains("sifter daemon start"));
}

#[test]
fn notify_rejects_malformed_dictionary_before_contacting_daemon() {
    let home = TempDir::new().expect("home");
    sifter_cmd(home.path())
        .args(["session", "notify", "not json"])
        .assert()
        .failure()
        .stderr(contains("invalid device dictionary JSON"));
}

#[test]
fn remove_rejects_non_numeric_id() {
    let home = TempDir::new().expect("home");
    sifter_cmd(home.path())
        .args(["remove", "abc"])
        .assert()
        .failure()
        .stderr(contains("invalid value"));
}
