//! User-wide configuration file.
//!
//! Settings that rarely change between projects (where the cache lives, which
//! registry and proxy to use, how hard to retry) can be kept in
//! `~/.icebox/config.toml` instead of being passed on every invocation:
//!
//! ```toml
//! cache_dir = "~/.cache/icebox"
//! registry = "https://registry.npmjs.org"
//! http_proxy = "http://proxy.internal:3128"
//! retry_attempts = 5
//! retry_delay_secs = 2
//! install_timeout_secs = 600
//! ```
//!
//! Every field is optional. The file's location can be changed with
//! `--config` or the `ICEBOX_CONFIG` environment variable.

use crate::core::IceboxError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Contents of the global configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Cache root; `~` and `$VAR` are expanded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,

    /// Registry npm fetches from and missing `resolved` URLs point at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,

    /// Proxy for npm's HTTP and HTTPS traffic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_proxy: Option<String>,

    /// Install attempts per module, including the first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_attempts: Option<u32>,

    /// Seconds to wait between install attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_secs: Option<u64>,

    /// Seconds before a single npm install is abandoned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_timeout_secs: Option<u64>,
}

impl GlobalConfig {
    /// Loads the config from the default location, or defaults if there is no file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Loads from `path` when given, else from the default location.
    ///
    /// A missing default file yields defaults. An explicitly requested file
    /// that does not exist is an error.
    ///
    /// # Errors
    ///
    /// Returns [`IceboxError::ConfigError`] for an explicit path that does
    /// not exist, or an error if the file cannot be read or parsed.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(IceboxError::ConfigError {
                        message: format!("Config file not found: {}", path.display()),
                    }
                    .into());
                }
                Self::load_from(&path).await
            }
            None => {
                let path = Self::default_path()?;
                if path.exists() {
                    Self::load_from(&path).await
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Loads from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML for
    /// this structure.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read global config from {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .map_err(IceboxError::from)
            .with_context(|| format!("Failed to parse global config from {}", path.display()))?;

        tracing::debug!("Loaded global config from {}", path.display());
        Ok(config)
    }

    /// `~/.icebox/config.toml`
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn default_path() -> Result<PathBuf> {
        Ok(crate::utils::get_home_dir()?.join(".icebox").join("config.toml"))
    }
}
