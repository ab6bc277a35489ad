#![allow(clippy::unwrap_used)]
// End-to-end tests for the `keafly` binary.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

fn keafly(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("keafly").unwrap();
    cmd.env_remove("KEAFLY_PROFILE")
        .env_remove("KEAFLY_OUTPUT")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(config)
        .arg("--color")
        .arg("never");
    cmd
}

fn write_config(dir: &TempDir, port: u16) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        format!(
            r#"
default_profile = "lab"

[profiles.lab]

[[profiles.lab.machines]]
address = "127.0.0.1"
agent_port = {port}
daemons = ["dhcp4"]
"#
        ),
    )
    .unwrap();
    path
}

async fn mock_command(server: &MockServer, command: &str, body: Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"command": command})))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn dhcp4_agent() -> MockServer {
    let server = MockServer::start().await;
    mock_command(
        &server,
        "version-get",
        json!([{"result": 0, "text": "2.6.1", "arguments": {"extended": "2.6.1 (tarball)"}}]),
    )
    .await;
    mock_command(
        &server,
        "config-get",
        json!([{"result": 0, "arguments": {"Dhcp4": {
            "subnet4": [{"id": 1, "subnet": "192.0.2.0/24"}]
        }}}]),
    )
    .await;
    mock_command(
        &server,
        "status-get",
        json!([{"result": 0, "arguments": {"pid": 42, "uptime": 300, "reload": 60}}]),
    )
    .await;
    server
}

// ── Offline commands ────────────────────────────────────────────────

#[test]
fn help_lists_fleet_commands() {
    Command::cargo_bin("keafly")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("leases"))
        .stdout(predicate::str::contains("serve"));
}

#[test]
fn config_path_echoes_override() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, 8000);
    keafly(&path)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn config_profiles_marks_default() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, 8000);
    keafly(&path)
        .args(["config", "profiles"])
        .assert()
        .success()
        .stdout(predicate::str::contains("lab *"));
}

#[test]
fn unknown_profile_exits_not_found() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, 8000);
    keafly(&path)
        .args(["-p", "prod", "pull"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("prod"));
}

#[test]
fn empty_lease_search_is_a_usage_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, 9);
    keafly(&path)
        .args(["-q", "leases", "search", " "])
        .assert()
        .code(2);
}

// ── Fleet commands ──────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn pull_reports_daemon_state_as_json() {
    let server = dhcp4_agent().await;
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, server.address().port());

    let output = keafly(&path).args(["-o", "json", "pull"]).output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let rows: Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "dhcp4");
    assert_eq!(rows[0]["version"], "2.6.1");
    assert_eq!(rows[0]["active"], true);
    assert_eq!(rows[0]["uptime"], 300);
}

#[test]
fn unreachable_daemon_is_reported_inactive() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, 9);

    let output = keafly(&path)
        .args(["-o", "json", "pull"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let rows: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows[0]["active"], false);
    assert!(String::from_utf8_lossy(&output.stderr).contains("no answer from daemons"));
}
