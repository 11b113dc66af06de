//! CLI argument parsing tests for ravel

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;

/// A ravel command isolated in its own home directory
fn ravel(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ravel"));
    cmd.env("HOME", home)
        .env_remove("OPENAI_API_KEY")
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &Path, value: serde_json::Value) -> std::path::PathBuf {
    let path = dir.join("config.json");
    std::fs::write(&path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
    path
}

#[test]
fn test_help_flag() {
    let home = TempDir::new().unwrap();
    ravel(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("A tool-calling agent runtime"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("tools"));
}

#[test]
fn test_version_flag() {
    let home = TempDir::new().unwrap();
    ravel(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_no_args_shows_usage() {
    let home = TempDir::new().unwrap();
    ravel(home.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_unknown_subcommand() {
    let home = TempDir::new().unwrap();
    ravel(home.path())
        .arg("deploy")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_run_help_lists_options() {
    let home = TempDir::new().unwrap();
    ravel(home.path())
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--prompt"))
        .stdout(predicate::str::contains("--max-steps"))
        .stdout(predicate::str::contains("--verbose"));
}

#[test]
fn test_run_rejects_non_numeric_max_steps() {
    let home = TempDir::new().unwrap();
    ravel(home.path())
        .args(["run", "--prompt", "hi", "--max-steps", "many"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_run_empty_stdin_prompt_is_noop() {
    let home = TempDir::new().unwrap();
    ravel(home.path())
        .arg("run")
        .write_stdin("   \n")
        .assert()
        .success()
        .stderr(predicate::str::contains("Empty prompt"));
}

#[test]
fn test_run_without_api_key_fails() {
    let home = TempDir::new().unwrap();
    ravel(home.path())
        .args(["run", "--prompt", "hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No API key configured"));
}

#[test]
fn test_run_with_invalid_config_fails() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();

    ravel(home.path())
        .args(["run", "--prompt", "hello", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_tools_lists_builtin_tools() {
    let home = TempDir::new().unwrap();
    let config = write_config(home.path(), json!({}));

    ravel(home.path())
        .arg("tools")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::diff("ask_human\nexec\nterminate\n"));
}

#[test]
fn test_tools_respects_disabled_tools() {
    let home = TempDir::new().unwrap();
    let config = write_config(
        home.path(),
        json!({
            "tools": {
                "exec": { "enabled": false },
                "ask_human": { "enabled": false }
            }
        }),
    );

    ravel(home.path())
        .args(["tools", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::diff("terminate\n"));
}

#[test]
fn test_tools_fails_on_required_unreachable_server() {
    let home = TempDir::new().unwrap();
    let config = write_config(
        home.path(),
        json!({
            "tools": { "exec": { "enabled": false } },
            "mcp": {
                "servers": [{
                    "name": "ghost",
                    "transport": "stdio",
                    "command": "/nonexistent/ravel-mcp-server",
                    "required": true
                }]
            }
        }),
    );

    ravel(home.path())
        .args(["tools", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("ghost"));
}

#[test]
fn test_init_creates_config_and_workspace() {
    let home = TempDir::new().unwrap();
    ravel(home.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initializing ravel"));

    let data = home.path().join(".ravel");
    assert!(data.join("config.json").exists());
    assert!(data.join("workspace").is_dir());

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(data.join("config.json")).unwrap()).unwrap();
    assert_eq!(written["agent"]["max_steps"], 20);
}

#[test]
fn test_run_rejects_zero_max_steps() {
    let home = TempDir::new().unwrap();
    ravel(home.path())
        .args(["run", "--prompt", "hi", "--max-steps", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_steps must be at least 1"));
}
