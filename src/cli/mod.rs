//! Command-line interface for icebox.
//!
//! # Commands
//!
//! - `install` - Install the modules pinned in `npm-shrinkwrap.json` into
//!   `node_modules`, using and filling the module cache
//!
//! # Global Options
//!
//! - `--verbose` - Enable debug output (cache hits and misses, npm command lines)
//! - `--quiet` - Only print errors
//! - `--config` - Use a specific global config file
//!
//! # Examples
//!
//! ```bash
//! # Install from the lockfile in the current directory or a parent
//! icebox install
//!
//! # Install without touching the network
//! icebox install --offline
//!
//! # Keep going past modules that fail, e.g. platform-specific ones
//! icebox install --force
//!
//! # Use a separate cache and a private registry
//! icebox install -d /tmp/icebox-cache -r http://localhost:4873
//! ```
//!
//! # Exit Status
//!
//! - `0` - every module was installed
//! - `1` - the install failed
//! - `2` - `--force` run finished, but some modules failed

pub mod install;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::GlobalConfig;
use crate::constants::CONFIG_PATH_ENV;

/// Settings derived from the global flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliConfig {
    /// Default log filter (`RUST_LOG` wins when set)
    pub log_level: &'static str,

    /// Print debug output and forward `--verbose` to npm
    pub verbose: bool,

    /// Only print errors
    pub quiet: bool,

    /// Global config file to load instead of the default
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    /// Log filter for the subscriber: `RUST_LOG` when set, else [`CliConfig::log_level`].
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.log_level))
    }
}

/// Install npm-shrinkwrap.json dependencies from a local module cache.
#[derive(Parser, Debug)]
#[command(
    name = "icebox",
    about = "Install npm-shrinkwrap.json dependencies from a local module cache",
    version,
    long_about = "icebox installs the modules pinned in npm-shrinkwrap.json into node_modules. \
    Every module is stored once in a local cache, so repeated installs are fast and can run \
    fully offline."
)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the global config file (default: ~/.icebox/config.toml)
    #[arg(long, global = true, value_name = "PATH", env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Install dependencies from npm-shrinkwrap.json
    Install(install::InstallCommand),
}

impl Cli {
    /// Settings from the global flags.
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        };

        CliConfig {
            log_level,
            verbose: self.verbose,
            quiet: self.quiet,
            config_path: self.config.clone(),
        }
    }

    /// Runs the command and returns the process exit status.
    ///
    /// # Errors
    ///
    /// Returns any error that makes the command fail outright.
    pub async fn execute(self) -> Result<i32> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Runs the command with explicit settings.
    ///
    /// # Errors
    ///
    /// Returns any error that makes the command fail outright.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<i32> {
        let global = GlobalConfig::load_with_optional(config.config_path.clone()).await?;

        match self.command {
            Commands::Install(cmd) => cmd.execute(&global, &config).await,
        }
    }
}
