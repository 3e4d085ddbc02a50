//! The `icebox` binary: exit statuses, output and error messages.
//!
//! Every run gets its own `HOME` so the user's config and cache are never
//! touched, and installs are offline from a seeded cache so npm is not needed.

use crate::common::TestWorkspace;
use assert_cmd::Command;
use icebox::test_utils::{RecordingInstaller, write_lockfile};
use predicates::prelude::*;
use serde_json::json;

fn icebox(ws: &TestWorkspace) -> Command {
    let mut cmd = Command::cargo_bin("icebox").unwrap();
    cmd.env("HOME", ws.home())
        .env("USERPROFILE", ws.home())
        .env_remove("ICEBOX_CONFIG")
        .env_remove("ICEBOX_CACHE_DIR")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_version() {
    let ws = TestWorkspace::new();
    icebox(&ws)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("icebox"));
}

#[test]
fn test_missing_lockfile_fails() {
    let ws = TestWorkspace::new();
    icebox(&ws)
        .args(["install", "-C"])
        .arg(ws.project())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Cannot find npm-shrinkwrap.json"));
}

#[test]
fn test_missing_directory_fails() {
    let ws = TestWorkspace::new();
    icebox(&ws)
        .args(["install", "-C"])
        .arg(ws.temp.path().join("nowhere"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Directory does not exist"));
}

#[test]
fn test_invalid_version_is_reported() {
    let ws = TestWorkspace::new();
    write_lockfile(&ws.project(), &json!({ "dependencies": { "io": { "version": false } } }))
        .unwrap();

    icebox(&ws)
        .current_dir(ws.project())
        .args(["install", "--offline", "-d"])
        .arg(ws.cache_dir())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid value false for io.version"));
}

#[test]
fn test_offline_cache_miss_fails() {
    let ws = TestWorkspace::new();
    write_lockfile(&ws.project(), &json!({ "dependencies": { "io": { "version": "0.0.1" } } }))
        .unwrap();

    icebox(&ws)
        .current_dir(ws.project())
        .args(["install", "--offline", "--force", "-d"])
        .arg(ws.cache_dir())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("io@0.0.1 is not cached and offline mode is enabled"));
}

#[test]
fn test_empty_lockfile_creates_node_modules() {
    let ws = TestWorkspace::new();
    write_lockfile(&ws.project(), &json!({ "name": "app", "version": "1.0.0" })).unwrap();

    icebox(&ws)
        .current_dir(ws.project())
        .args(["install", "--offline", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    assert!(ws.project().join("node_modules").is_dir());
    assert!(ws.home().join(".icebox/cache").is_dir());
}

#[tokio::test]
async fn test_offline_install_from_seeded_cache() {
    let ws = TestWorkspace::new();
    ws.seed_cache(RecordingInstaller::new().with_module("io", "0.0.1"), "io", "0.0.1")
        .await;
    write_lockfile(&ws.project(), &json!({ "dependencies": { "io": { "version": "0.0.1" } } }))
        .unwrap();

    icebox(&ws)
        .current_dir(ws.project())
        .env("ICEBOX_CACHE_DIR", ws.cache_dir())
        .args(["install", "--offline"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Installation complete!"))
        .stdout(predicate::str::contains("1 from cache"));

    assert!(ws.project().join("node_modules/io/package.json").is_file());
}

#[test]
fn test_missing_config_file_fails() {
    let ws = TestWorkspace::new();
    write_lockfile(&ws.project(), &json!({})).unwrap();

    icebox(&ws)
        .current_dir(ws.project())
        .arg("--config")
        .arg(ws.temp.path().join("missing.toml"))
        .args(["install", "--offline"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Config file not found"));
}

#[test]
fn test_config_file_sets_cache_dir() {
    let ws = TestWorkspace::new();
    write_lockfile(&ws.project(), &json!({})).unwrap();
    let config = ws.temp.path().join("icebox.toml");
    let cache = ws.temp.path().join("configured-cache");
    std::fs::write(&config, format!("cache_dir = {:?}\n", cache.to_string_lossy())).unwrap();

    icebox(&ws)
        .current_dir(ws.project())
        .env("ICEBOX_CONFIG", &config)
        .args(["install", "--offline", "-q"])
        .assert()
        .success();

    assert!(cache.join(".locks").is_dir());
}

#[test]
fn test_unknown_flag_is_rejected() {
    let ws = TestWorkspace::new();
    icebox(&ws).args(["install", "--frozen"]).assert().failure();
}
