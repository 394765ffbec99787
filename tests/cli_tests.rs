//! Runs the upgrade binary against a file-backed SQLite database.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use tempfile::TempDir;

const TEST_KEY: &str = "YWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWE=";

const CLEARED_VARS: &[&str] = &[
    "UALERT_PROFILE",
    "UALERT_DATABASE_URL",
    "UALERT_DATA_PATH",
    "UALERT_SECRET_KEY",
    "UALERT_UPGRADE_BACKUP_ACKNOWLEDGED",
    "UALERT_UPGRADE_ROUTE_STRATEGY",
    "UALERT_LOG_LEVEL",
    "RUST_LOG",
];

fn write_env(dir: &Path, with_key: bool) {
    let db_path = dir.join("alerting.db");
    let mut contents = format!(
        "UALERT_DATABASE_URL=sqlite://{}?mode=rwc\nUALERT_LOG_LEVEL=warn\n",
        db_path.display()
    );
    if with_key {
        contents.push_str(&format!("UALERT_SECRET_KEY={TEST_KEY}\n"));
    }
    fs::write(dir.join(".env"), contents).unwrap();
}

fn upgrade_cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("alerting-upgrade").unwrap();
    for var in CLEARED_VARS {
        cmd.env_remove(var);
    }
    cmd.arg("--env-dir")
        .arg(dir)
        .arg("--data-path")
        .arg(dir.join("data"))
        .arg("--apply-schema");
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(output).unwrap()
}

#[test]
fn refuses_to_run_without_backup_acknowledgement() {
    let dir = TempDir::new().unwrap();
    write_env(dir.path(), true);

    let stdout = stdout_of(&mut upgrade_cmd(dir.path()));
    assert!(stdout.contains("Backup not acknowledged"), "stdout: {stdout}");
}

#[test]
fn second_run_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    write_env(dir.path(), true);

    let first = stdout_of(upgrade_cmd(dir.path()).arg("--acknowledge-backup"));
    assert!(first.starts_with("Migrated 0 alert(s)"), "stdout: {first}");

    let second = stdout_of(upgrade_cmd(dir.path()).arg("--acknowledge-backup"));
    assert!(second.contains("already applied"), "stdout: {second}");
}

#[test]
fn unacknowledged_run_needs_no_secret_key() {
    let dir = TempDir::new().unwrap();
    write_env(dir.path(), false);

    let stdout = stdout_of(&mut upgrade_cmd(dir.path()));
    assert!(stdout.contains("Backup not acknowledged"), "stdout: {stdout}");
}

#[test]
fn missing_secret_key_fails() {
    let dir = TempDir::new().unwrap();
    write_env(dir.path(), false);

    let output = upgrade_cmd(dir.path())
        .arg("--acknowledge-backup")
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8(output).unwrap();
    assert!(stderr.contains("UALERT_SECRET_KEY"), "stderr: {stderr}");
}

#[test]
fn rejects_unknown_route_strategy() {
    let dir = TempDir::new().unwrap();
    write_env(dir.path(), true);

    upgrade_cmd(dir.path())
        .args(["--route-strategy", "sideways"])
        .assert()
        .failure();
}
