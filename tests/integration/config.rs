//! Global config file discovery under the user's home directory.

use icebox::config::{ConfigOverrides, GlobalConfig, InstallConfig};
use serial_test::serial;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Points `HOME` at a directory for the guard's lifetime.
struct HomeGuard {
    previous: Option<OsString>,
}

impl HomeGuard {
    fn set(home: &Path) -> Self {
        let previous = std::env::var_os("HOME");
        // SAFETY: tests touching the environment are serialized
        unsafe { std::env::set_var("HOME", home) };
        Self {
            previous,
        }
    }
}

impl Drop for HomeGuard {
    fn drop(&mut self) {
        // SAFETY: tests touching the environment are serialized
        unsafe {
            match self.previous.take() {
                Some(home) => std::env::set_var("HOME", home),
                None => std::env::remove_var("HOME"),
            }
        }
    }
}

#[cfg(unix)]
#[tokio::test]
#[serial]
async fn test_default_config_location() {
    let temp = TempDir::new().unwrap();
    let _home = HomeGuard::set(temp.path());
    std::fs::create_dir_all(temp.path().join(".icebox")).unwrap();
    std::fs::write(
        temp.path().join(".icebox/config.toml"),
        "registry = \"http://localhost:4873\"\nretry_attempts = 2\n",
    )
    .unwrap();

    let config = GlobalConfig::load().await.unwrap();

    assert_eq!(config.registry.as_deref(), Some("http://localhost:4873"));
    assert_eq!(config.retry_attempts, Some(2));
}

#[cfg(unix)]
#[tokio::test]
#[serial]
async fn test_no_config_file_means_defaults() {
    let temp = TempDir::new().unwrap();
    let _home = HomeGuard::set(temp.path());

    assert_eq!(GlobalConfig::load().await.unwrap(), GlobalConfig::default());
}

#[cfg(unix)]
#[test]
#[serial]
fn test_cache_dir_expands_home() {
    let temp = TempDir::new().unwrap();
    let _home = HomeGuard::set(temp.path());

    let global = GlobalConfig {
        cache_dir: Some("~/modules".to_string()),
        ..GlobalConfig::default()
    };
    let overrides = ConfigOverrides {
        cwd: Some(PathBuf::from("/project")),
        ..ConfigOverrides::default()
    };
    let config = InstallConfig::resolve(&global, &overrides).unwrap();
    assert_eq!(config.cache_dir, temp.path().join("modules"));

    let config = InstallConfig::resolve(&GlobalConfig::default(), &overrides).unwrap();
    assert_eq!(config.cache_dir, temp.path().join(".icebox").join("cache"));
}
