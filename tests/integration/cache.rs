//! Cache decomposition and reuse across projects.

use crate::common::{TestWorkspace, cached_specs};
use icebox::installer::install_project;
use icebox::test_utils::{ModuleFixture, RecordingInstaller, write_lockfile};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_one_install_fills_an_entry_per_module() {
    let ws = TestWorkspace::new();
    let installer = Arc::new(
        RecordingInstaller::new().with_fixture(
            ModuleFixture::new("buffer", "4.0.0")
                .nested("base64-js", "0.0.8")
                .nested("ieee754", "1.1.6")
                .nested("isarray", "1.0.0"),
        ),
    );
    write_lockfile(
        &ws.project(),
        &json!({ "dependencies": { "buffer": { "version": "4.0.0" } } }),
    )
    .unwrap();

    let report = install_project(&ws.config(), installer.clone()).await.unwrap();

    assert_eq!(report.installed, 1);
    assert_eq!(report.cache_additions, 4);
    assert_eq!(
        cached_specs(&ws.cache_dir()),
        vec!["base64-js@0.0.8", "buffer@4.0.0", "ieee754@1.1.6", "isarray@1.0.0"]
    );
    assert_eq!(installer.calls().len(), 1);

    // Only the module's own files are stored; its dependencies have their own entries
    assert!(!ws.cache_dir().join("buffer/4.0.0/data/node_modules").exists());
    let deps = std::fs::read_to_string(ws.cache_dir().join("buffer/4.0.0/deps.json")).unwrap();
    let deps: serde_json::Value = serde_json::from_str(&deps).unwrap();
    assert_eq!(
        deps,
        json!({
            "base64-js@0.0.8": {},
            "ieee754@1.1.6": {},
            "isarray@1.0.0": {}
        })
    );
}

#[tokio::test]
async fn test_install_clears_abandoned_staging() {
    let ws = TestWorkspace::new();
    let abandoned = ws.cache_dir().join(".staging/entry-crashed/entry/data");
    std::fs::create_dir_all(&abandoned).unwrap();
    std::fs::write(abandoned.join("package.json"), "{}").unwrap();
    write_lockfile(&ws.project(), &json!({ "dependencies": {} })).unwrap();

    install_project(&ws.config(), Arc::new(RecordingInstaller::new())).await.unwrap();

    assert!(!ws.cache_dir().join(".staging/entry-crashed").exists());
}

#[tokio::test]
async fn test_nested_entries_serve_other_projects() {
    let ws = TestWorkspace::new();
    let installer = Arc::new(
        RecordingInstaller::new()
            .with_fixture(ModuleFixture::new("a", "1.0.0").nested("c", "2.0.0")),
    );
    write_lockfile(
        &ws.project(),
        &json!({
            "dependencies": {
                "a": { "version": "1.0.0", "dependencies": { "c": { "version": "2.0.0" } } }
            }
        }),
    )
    .unwrap();
    install_project(&ws.config(), installer.clone()).await.unwrap();

    // A second project needing only c is served entirely from the cache
    let other = ws.temp.path().join("other");
    write_lockfile(&other, &json!({ "dependencies": { "c": { "version": "2.0.0" } } })).unwrap();
    let mut config = ws.config();
    config.cwd = other.clone();
    config.offline = true;

    let report = install_project(&config, installer.clone()).await.unwrap();

    assert_eq!(report.cache_hits, 1);
    assert_eq!(installer.calls().len(), 1);
    assert!(other.join("node_modules/c/package.json").is_file());
}

#[tokio::test]
async fn test_scoped_modules_are_cached_under_their_scope() {
    let ws = TestWorkspace::new();
    let installer = Arc::new(RecordingInstaller::new().with_module("@types/node", "20.1.0"));
    write_lockfile(
        &ws.project(),
        &json!({ "dependencies": { "@types/node": { "version": "20.1.0" } } }),
    )
    .unwrap();

    install_project(&ws.config(), installer.clone()).await.unwrap();

    assert_eq!(cached_specs(&ws.cache_dir()), vec!["@types/node@20.1.0"]);
    assert!(ws.project().join("node_modules/@types/node/package.json").is_file());
    assert_eq!(
        installer.calls()[0].resolved,
        "https://registry.npmjs.org/@types/node/-/node-20.1.0.tgz"
    );
}
