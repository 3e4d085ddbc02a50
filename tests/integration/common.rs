//! Helpers shared by the integration tests.

use icebox::cache::Cache;
use icebox::config::InstallConfig;
use icebox::npm::RetryPolicy;
use icebox::test_utils::RecordingInstaller;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A temporary workspace with a project directory and a cache directory.
pub struct TestWorkspace {
    pub temp: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("project")).unwrap();
        Self {
            temp,
        }
    }

    pub fn project(&self) -> PathBuf {
        self.temp.path().join("project")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.temp.path().join("cache")
    }

    pub fn home(&self) -> PathBuf {
        self.temp.path().join("home")
    }

    /// Install settings for this workspace, with retries that never wait.
    pub fn config(&self) -> InstallConfig {
        let mut config = InstallConfig::new(self.project(), self.cache_dir());
        config.retry = RetryPolicy::new(1, Duration::ZERO);
        config
    }

    /// Fills the cache with `name@version` through `installer`.
    pub async fn seed_cache(&self, installer: RecordingInstaller, name: &str, version: &str) {
        let cache = Cache::new(self.cache_dir(), Arc::new(installer)).unwrap();
        let resolved = format!("https://registry.npmjs.org/{name}/-/{name}-{version}.tgz");
        cache.add(name, version, &resolved).await.unwrap();
    }
}

/// Lists the cache entries under `cache_dir` as `name@version`, sorted.
pub fn cached_specs(cache_dir: &Path) -> Vec<String> {
    let mut specs = Vec::new();
    for entry in walkdir::WalkDir::new(cache_dir).min_depth(1).max_depth(4) {
        let entry = entry.unwrap();
        if entry.file_name() != "deps.json" {
            continue;
        }
        let version_dir = entry.path().parent().unwrap();
        let relative = version_dir.strip_prefix(cache_dir).unwrap();
        let version = relative.file_name().unwrap().to_string_lossy().to_string();
        let name = relative.parent().unwrap().to_string_lossy().replace('\\', "/");
        specs.push(format!("{name}@{version}"));
    }
    specs.sort();
    specs
}
