//! Test utilities for icebox
//!
//! Shared by unit tests and the integration suite (through the `test-utils`
//! feature):
//!
//! - [`init_test_logging`] routes `tracing` output to the test harness
//! - [`write_package`] and [`write_lockfile`] create fixture files
//! - [`RecordingInstaller`] stands in for npm, laying out canned module trees
//!   and recording every install call

use crate::constants::{DEPENDENCY_DIR_NAME, LOCKFILE_NAME, MODULE_MANIFEST_NAME};
use crate::core::IceboxError;
use crate::npm::PackageInstaller;
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};
use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging once per process.
///
/// Uses `level` when given, else `RUST_LOG` when set; otherwise logging stays
/// off. Output goes through the test writer so it is captured per test.
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

/// Writes `<dir>/package.json` with the given name and version, creating `dir`.
pub fn write_package(dir: &Path, name: &str, version: &str) -> Result<()> {
    write_manifest(dir, &serde_json::json!({ "name": name, "version": version }))
}

/// Writes `<dir>/package.json` with arbitrary content, creating `dir`.
pub fn write_manifest(dir: &Path, manifest: &serde_json::Value) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join(MODULE_MANIFEST_NAME), serde_json::to_string_pretty(manifest)?)?;
    Ok(())
}

/// Writes `<dir>/npm-shrinkwrap.json` and returns its path.
pub fn write_lockfile(dir: &Path, lockfile: &serde_json::Value) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(LOCKFILE_NAME);
    std::fs::write(&path, serde_json::to_string_pretty(lockfile)?)?;
    Ok(path)
}

/// A module [`RecordingInstaller`] knows how to "install".
#[derive(Debug, Clone)]
pub struct ModuleFixture {
    /// Package name
    pub name: String,
    /// Version the lockfile asks for (commit for git modules)
    pub version: String,
    /// Files relative to the installed module directory, `package.json` included
    pub files: Vec<(String, String)>,
}

impl ModuleFixture {
    /// A module with just a `package.json`.
    #[must_use]
    pub fn new(name: &str, version: &str) -> Self {
        let manifest = serde_json::json!({ "name": name, "version": version });
        Self {
            name: name.to_string(),
            version: version.to_string(),
            files: vec![(MODULE_MANIFEST_NAME.to_string(), manifest.to_string())],
        }
    }

    /// Replaces the module's `package.json`.
    #[must_use]
    pub fn manifest(mut self, manifest: &serde_json::Value) -> Self {
        self.files.retain(|(path, _)| path != MODULE_MANIFEST_NAME);
        self.files.push((MODULE_MANIFEST_NAME.to_string(), manifest.to_string()));
        self
    }

    /// Adds a file to the module.
    #[must_use]
    pub fn file(mut self, path: &str, content: &str) -> Self {
        self.files.push((path.to_string(), content.to_string()));
        self
    }

    /// Nests `name@version` under this module's `node_modules`.
    #[must_use]
    pub fn nested(self, name: &str, version: &str) -> Self {
        let manifest = serde_json::json!({ "name": name, "version": version });
        self.file(
            &format!("{DEPENDENCY_DIR_NAME}/{name}/{MODULE_MANIFEST_NAME}"),
            &manifest.to_string(),
        )
    }
}

/// One call made to a [`RecordingInstaller`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallCall {
    /// Requested name
    pub name: String,
    /// Requested version
    pub version: String,
    /// Requested source
    pub resolved: String,
    /// Prefix the module was installed under
    pub prefix: PathBuf,
}

/// Fake [`PackageInstaller`] serving canned modules.
///
/// Installing a module it has no fixture for fails like npm would for a
/// missing package.
#[derive(Debug, Default)]
pub struct RecordingInstaller {
    fixtures: Vec<ModuleFixture>,
    calls: Mutex<Vec<InstallCall>>,
}

impl RecordingInstaller {
    /// An installer with no modules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module with just a `package.json`.
    #[must_use]
    pub fn with_module(self, name: &str, version: &str) -> Self {
        self.with_fixture(ModuleFixture::new(name, version))
    }

    /// Adds a module fixture.
    #[must_use]
    pub fn with_fixture(mut self, fixture: ModuleFixture) -> Self {
        self.fixtures.push(fixture);
        self
    }

    /// Calls made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<InstallCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PackageInstaller for RecordingInstaller {
    async fn install(
        &self,
        name: &str,
        version: &str,
        resolved: &str,
        prefix: &Path,
    ) -> Result<PathBuf> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(InstallCall {
                name: name.to_string(),
                version: version.to_string(),
                resolved: resolved.to_string(),
                prefix: prefix.to_path_buf(),
            });
        }

        let fixture = self
            .fixtures
            .iter()
            .find(|f| f.name == name && f.version == version)
            .ok_or_else(|| IceboxError::NpmCommandError {
                operation: "install".to_string(),
                stderr: format!("404 Not Found - {resolved}"),
            })?;

        let module_dir = prefix.join(DEPENDENCY_DIR_NAME).join(name);
        for (path, content) in &fixture.files {
            let path = module_dir.join(path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, content)?;
        }
        Ok(module_dir)
    }
}
