//! Whole-project installs through `install_project`.

use crate::common::TestWorkspace;
use icebox::core::IceboxError;
use icebox::installer::install_project;
use icebox::test_utils::{ModuleFixture, RecordingInstaller, init_test_logging, write_lockfile};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_install_single_module() {
    init_test_logging(None);
    let ws = TestWorkspace::new();
    let installer = Arc::new(RecordingInstaller::new().with_module("io", "0.0.1"));
    write_lockfile(
        &ws.project(),
        &json!({
            "name": "app",
            "version": "1.0.0",
            "dependencies": {
                "io": {
                    "version": "0.0.1",
                    "from": "io@0.0.1",
                    "resolved": "https://registry.npmjs.org/io/-/io-0.0.1.tgz"
                }
            }
        }),
    )
    .unwrap();

    let report = install_project(&ws.config(), installer.clone()).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.exit_code(), 0);
    let calls = installer.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].name, "io");
    assert_eq!(calls[0].version, "0.0.1");
    assert_eq!(calls[0].resolved, "https://registry.npmjs.org/io/-/io-0.0.1.tgz");
    assert!(ws.project().join("node_modules/io/package.json").is_file());
}

#[tokio::test]
async fn test_install_from_subdirectory() {
    let ws = TestWorkspace::new();
    let installer = Arc::new(RecordingInstaller::new().with_module("io", "0.0.1"));
    write_lockfile(&ws.project(), &json!({ "dependencies": { "io": { "version": "0.0.1" } } }))
        .unwrap();
    let nested = ws.project().join("src/lib");
    std::fs::create_dir_all(&nested).unwrap();
    let mut config = ws.config();
    config.cwd = nested.clone();

    install_project(&config, installer).await.unwrap();

    assert!(ws.project().join("node_modules/io").is_dir());
    assert!(!nested.join("node_modules").exists());
}

#[tokio::test]
async fn test_git_dependency_uses_commit_as_version() {
    let ws = TestWorkspace::new();
    let commit = "8ad8a1f2c8d1b7e7e4b1a2f3c4d5e6f708192a3b";
    let resolved = format!("git+https://github.com/example/fiz.git#{commit}");
    let installer = Arc::new(
        RecordingInstaller::new().with_fixture(ModuleFixture::new("fiz", commit).manifest(&json!({
            "name": "fiz",
            "version": "0.1.0",
            "gitHead": commit,
            "_resolved": resolved
        }))),
    );
    write_lockfile(
        &ws.project(),
        &json!({ "dependencies": { "fiz": { "version": "0.1.0", "resolved": resolved } } }),
    )
    .unwrap();

    install_project(&ws.config(), installer.clone()).await.unwrap();

    assert_eq!(installer.calls()[0].version, commit);
    assert!(ws.cache_dir().join("fiz").join(commit).join("data/package.json").is_file());
}

#[cfg(unix)]
#[tokio::test]
async fn test_bin_links_are_created() {
    let ws = TestWorkspace::new();
    let installer = Arc::new(
        RecordingInstaller::new().with_fixture(
            ModuleFixture::new("mkdirp", "0.5.1")
                .manifest(&json!({ "name": "mkdirp", "version": "0.5.1", "bin": "bin/cmd.js" }))
                .file("bin/cmd.js", "#!/usr/bin/env node\n"),
        ),
    );
    write_lockfile(&ws.project(), &json!({ "dependencies": { "mkdirp": { "version": "0.5.1" } } }))
        .unwrap();

    install_project(&ws.config(), installer).await.unwrap();

    let link = ws.project().join("node_modules/.bin/mkdirp");
    assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
    assert_eq!(
        std::fs::read_link(&link).unwrap(),
        std::path::PathBuf::from("../mkdirp/bin/cmd.js")
    );
}

#[tokio::test]
async fn test_failure_without_force_stops_before_later_siblings() {
    let ws = TestWorkspace::new();
    let installer = Arc::new(RecordingInstaller::new().with_module("a", "1.0.0").with_module("c", "1.0.0"));
    write_lockfile(
        &ws.project(),
        &json!({
            "dependencies": {
                "a": { "version": "1.0.0" },
                "b": { "version": "1.0.0" },
                "c": { "version": "1.0.0" }
            }
        }),
    )
    .unwrap();

    let result = install_project(&ws.config(), installer.clone()).await;

    assert!(result.is_err());
    let names: Vec<String> = installer.calls().into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert!(ws.project().join("node_modules/a").is_dir());
    assert!(!ws.project().join("node_modules/c").exists());
}

#[tokio::test]
async fn test_force_installs_remaining_siblings() {
    let ws = TestWorkspace::new();
    let installer = Arc::new(RecordingInstaller::new().with_module("a", "1.0.0").with_module("c", "1.0.0"));
    write_lockfile(
        &ws.project(),
        &json!({
            "dependencies": {
                "a": { "version": "1.0.0" },
                "b": { "version": "1.0.0" },
                "c": { "version": "1.0.0" }
            }
        }),
    )
    .unwrap();
    let mut config = ws.config();
    config.force = true;

    let report = install_project(&config, installer).await.unwrap();

    assert_eq!(report.installed, 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].key.spec(), "b@1.0.0");
    assert_eq!(report.exit_code(), 2);
    assert!(ws.project().join("node_modules/c").is_dir());
    assert!(!ws.project().join("node_modules/b").exists());
}

#[tokio::test]
async fn test_invalid_lockfile_entry_is_rejected_before_install() {
    let ws = TestWorkspace::new();
    let installer = Arc::new(RecordingInstaller::new().with_module("io", "0.0.1"));
    write_lockfile(&ws.project(), &json!({ "dependencies": { "io": { "version": false } } }))
        .unwrap();

    let err = install_project(&ws.config(), installer.clone()).await.unwrap_err();

    assert!(matches!(
        err.chain().find_map(|e| e.downcast_ref::<IceboxError>()),
        Some(IceboxError::InvalidDependency { .. })
    ));
    assert!(installer.calls().is_empty());
    assert!(!ws.project().join("node_modules").exists());
}

#[tokio::test]
async fn test_missing_lockfile() {
    let ws = TestWorkspace::new();
    let err = install_project(&ws.config(), Arc::new(RecordingInstaller::new())).await.unwrap_err();

    assert!(matches!(
        err.chain().find_map(|e| e.downcast_ref::<IceboxError>()),
        Some(IceboxError::LockfileNotFound { .. })
    ));
}
