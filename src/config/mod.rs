//! Configuration for an install run.
//!
//! Settings are layered, later layers winning:
//!
//! 1. Built-in defaults
//! 2. The global config file ([`GlobalConfig`], `~/.icebox/config.toml`)
//! 3. Environment variables (`ICEBOX_CACHE_DIR`)
//! 4. Command-line flags
//!
//! Environment variables reach this module through the flag parser (clap's
//! `env` support), so layers 3 and 4 arrive together as [`ConfigOverrides`].
//! The result is an [`InstallConfig`], which is passed explicitly to every
//! component that needs it.

pub mod global;

pub use global::GlobalConfig;

use crate::constants::DEFAULT_REGISTRY;
use crate::npm::RetryPolicy;
use crate::utils::{get_home_dir, resolve_path};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Values given on the command line (or through their environment variables).
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Directory to start the lockfile search from
    pub cwd: Option<PathBuf>,
    /// Cache root
    pub cache_dir: Option<PathBuf>,
    /// Continue past failing modules
    pub force: bool,
    /// Never contact the network
    pub offline: bool,
    /// Proxy for npm
    pub http_proxy: Option<String>,
    /// Registry URL
    pub registry: Option<String>,
    /// Verbose output
    pub verbose: bool,
}

/// Fully resolved settings for one install run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallConfig {
    /// Directory the lockfile search starts from
    pub cwd: PathBuf,
    /// Cache root
    pub cache_dir: PathBuf,
    /// Record failing modules and keep going instead of aborting
    pub force: bool,
    /// Fail on any cache miss instead of installing with npm
    pub offline: bool,
    /// Proxy for npm's HTTP and HTTPS traffic
    pub http_proxy: Option<String>,
    /// Registry explicitly configured; `None` leaves npm's own setting alone
    pub registry: Option<String>,
    /// Forward `--verbose` to npm
    pub verbose: bool,
    /// Install retry behaviour
    pub retry: RetryPolicy,
    /// Per-attempt npm install timeout
    pub install_timeout: Option<Duration>,
}

impl InstallConfig {
    /// Default settings rooted at `cwd` with the cache at `cache_dir`.
    #[must_use]
    pub fn new(cwd: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            cache_dir: cache_dir.into(),
            force: false,
            offline: false,
            http_proxy: None,
            registry: None,
            verbose: false,
            retry: RetryPolicy::default(),
            install_timeout: None,
        }
    }

    /// Merges the global config file and command-line overrides over the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the working directory or home directory cannot be
    /// determined, or a configured path cannot be expanded.
    pub fn resolve(global: &GlobalConfig, overrides: &ConfigOverrides) -> Result<Self> {
        let cwd = match overrides.cwd {
            Some(ref cwd) => cwd.clone(),
            None => std::env::current_dir().context("Cannot determine current working directory")?,
        };

        let cache_dir = match (&overrides.cache_dir, &global.cache_dir) {
            (Some(dir), _) => resolve_path(&dir.to_string_lossy())?,
            (None, Some(dir)) => resolve_path(dir)?,
            (None, None) => default_cache_dir()?,
        };

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy::new(
            global.retry_attempts.unwrap_or(defaults.max_attempts),
            global.retry_delay_secs.map_or(defaults.delay, Duration::from_secs),
        );

        Ok(Self {
            cwd,
            cache_dir,
            force: overrides.force,
            offline: overrides.offline,
            http_proxy: overrides.http_proxy.clone().or_else(|| global.http_proxy.clone()),
            registry: overrides.registry.clone().or_else(|| global.registry.clone()),
            verbose: overrides.verbose,
            retry,
            install_timeout: global.install_timeout_secs.map(Duration::from_secs),
        })
    }

    /// Registry base used to synthesize missing `resolved` URLs.
    #[must_use]
    pub fn registry_base(&self) -> &str {
        self.registry.as_deref().unwrap_or(DEFAULT_REGISTRY)
    }
}

/// `~/.icebox/cache`
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn default_cache_dir() -> Result<PathBuf> {
    Ok(get_home_dir()?.join(".icebox").join("cache"))
}
