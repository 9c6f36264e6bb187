use std::path::{Path, PathBuf};

use assert_cmd::Command;

const CONFIG: &str = r#"
default_server = "web01"

[defaults]
parallel = 4
timeout = 15

[server.web01]
host = "10.0.0.11"
username = "deploy"
keypath = "~/.ssh/id_ed25519"

[server.web02]
host = "10.0.0.12"
username = "deploy"
keypath = "~/.ssh/id_ed25519"

[server.db01]
host = "10.0.0.21"
username = "postgres"
use_password = true

[groups]
web = ["web01", "web02"]

[tags]
db01 = ["prod"]

[command_aliases]
disk = "df -h"
"#;

fn write_config(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

fn remotex(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("remotex").unwrap();
    cmd.arg("--config").arg(config);
    for var in [
        "REMOTEX_DEFAULT_SERVER",
        "REMOTEX_OUTPUT_MODE",
        "REMOTEX_PARALLEL",
        "REMOTEX_TIMEOUT",
        "REMOTEX_AUDIT_ENABLED",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn test_dry_run_lists_hosts_without_connecting() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), CONFIG);

    let out = stdout_of(remotex(&config).args(["exec-all", "--dry-run", "uptime"]));

    assert!(out.contains("Dry run"));
    assert!(out.contains("web01"));
    assert!(out.contains("db01"));
    assert!(out.contains("Parallel: 3"));
    assert!(!dir.path().join("history.json").exists());
}

#[test]
fn test_dry_run_json_expands_command_alias() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), CONFIG);

    let out = stdout_of(remotex(&config).args(["exec-group", "web", "--dry-run", "--json", "@disk"]));

    let plan: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(plan["command"], "df -h");
    assert_eq!(plan["hosts"], serde_json::json!(["web01", "web02"]));
    assert_eq!(plan["timeout"], 15);
}

#[test]
fn test_missing_group_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), CONFIG);

    remotex(&config)
        .args(["exec-group", "nope", "uptime"])
        .assert()
        .code(23);
}

#[test]
fn test_validate_reports_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        "[defaults]\nparallel = 0\n\n[groups]\nweb = [\"ghost\"]\n",
    );

    remotex(&config)
        .args(["config", "validate"])
        .assert()
        .code(21);

    let good = write_config(dir.path(), CONFIG);
    remotex(&good).args(["config", "validate"]).assert().success();
}

#[test]
fn test_group_and_tag_edits_are_saved() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), CONFIG);

    remotex(&config)
        .args(["group", "add", "all-web", "web01,web02"])
        .assert()
        .success();
    remotex(&config)
        .args(["tag", "add", "web02", "canary"])
        .assert()
        .success();

    let saved = std::fs::read_to_string(&config).unwrap();
    assert!(saved.contains("all-web"));
    assert!(saved.contains("canary"));

    let out = stdout_of(remotex(&config).args(["exec-tag", "canary", "--dry-run", "uptime"]));
    assert!(out.contains("web02"));
    assert!(!out.contains("web01"));
}

#[test]
fn test_group_with_unknown_server_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), CONFIG);

    remotex(&config)
        .args(["group", "add", "bad", "web01,ghost"])
        .assert()
        .code(22);
}

#[test]
fn test_empty_history() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), CONFIG);

    let out = stdout_of(remotex(&config).args(["history", "list"]));
    assert!(out.contains("No history"));
}

#[test]
fn test_failed_host_fails_bulk_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), CONFIG);

    remotex(&config)
        .args(["exec-multi", "ghost", "--", "echo", "hi"])
        .assert()
        .code(1);

    let output = remotex(&config)
        .args(["exec-multi", "ghost", "--json", "--", "echo", "hi"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["failed"], 1);
    assert_eq!(report["results"][0]["error"], "Failed to parse SSH config");

    let history = std::fs::read_to_string(dir.path().join("history.json")).unwrap();
    assert!(history.contains("exec-multi"));
}

#[test]
fn test_dry_run_quiet_and_csv_list_hosts_only() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), CONFIG);

    let out = stdout_of(remotex(&config).args(["exec-group", "web", "--dry-run", "--quiet", "uptime"]));
    assert_eq!(out, "web01\nweb02\n");

    let out = stdout_of(remotex(&config).args(["exec-group", "web", "--dry-run", "--csv", "uptime"]));
    assert_eq!(out, "Host\nweb01\nweb02\n");
}

#[test]
fn test_server_add_edit_info_remove() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), CONFIG);

    remotex(&config)
        .args(["server", "add", "web03", "--host", "10.0.0.13", "--user", "deploy"])
        .assert()
        .success();
    remotex(&config)
        .args(["server", "add", "web03", "--host", "10.0.0.99", "--user", "deploy"])
        .assert()
        .code(50);
    remotex(&config)
        .args(["server", "edit", "web03", "--port", "2222"])
        .assert()
        .success();

    let out = stdout_of(remotex(&config).args(["server", "info", "web03"]));
    assert!(out.contains("10.0.0.13"));
    assert!(out.contains("2222"));

    remotex(&config)
        .args(["server", "remove", "web01"])
        .assert()
        .success();
    let saved = std::fs::read_to_string(&config).unwrap();
    assert!(!saved.contains("[server.web01]"));
    assert!(saved.contains("[server.web03]"));
    remotex(&config).args(["config", "validate"]).assert().success();
}

#[test]
fn test_quick_command_unknown_server() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), CONFIG);

    remotex(&config)
        .args(["uptime", "--server", "ghost"])
        .assert()
        .code(22);
}
