//! Install a project's dependencies from its `npm-shrinkwrap.json`.
//!
//! The command looks for `npm-shrinkwrap.json` in the working directory and
//! its parents, rebuilds `node_modules` next to it, and copies every pinned
//! module out of the cache. Modules that are not cached yet are installed
//! once with npm into a scratch area, split into per-module cache entries
//! and then copied into place.
//!
//! # Examples
//!
//! Install from the nearest lockfile:
//! ```bash
//! icebox install
//! ```
//!
//! Install a project somewhere else, with a throwaway cache:
//! ```bash
//! icebox install -C ~/src/app -d /tmp/icebox-cache
//! ```
//!
//! Fail on the first module that is not cached:
//! ```bash
//! icebox install --offline
//! ```
//!
//! Install through a proxy and keep going past failures:
//! ```bash
//! icebox install --http-proxy http://proxy.internal:3128 --force
//! ```
//!
//! # Error Conditions
//!
//! - No `npm-shrinkwrap.json` in the directory or any parent
//! - Lockfile that is not valid JSON or has malformed entries
//! - Module missing from the cache in `--offline` mode
//! - npm not installed, or an install that keeps failing after retries

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use super::CliConfig;
use crate::config::{ConfigOverrides, GlobalConfig, InstallConfig};
use crate::constants::CACHE_DIR_ENV;
use crate::installer::{InstallReport, install_project};
use crate::npm::{NpmInstaller, NpmOptions};

/// Command to install the modules pinned in `npm-shrinkwrap.json`.
#[derive(Args, Debug)]
pub struct InstallCommand {
    /// Directory to start looking for npm-shrinkwrap.json from
    #[arg(short = 'C', long, value_name = "DIR")]
    cwd: Option<PathBuf>,

    /// Cache directory (default: ~/.icebox/cache)
    #[arg(short = 'd', long, value_name = "DIR", env = CACHE_DIR_ENV)]
    cache_dir: Option<PathBuf>,

    /// Keep going when a module fails to install
    ///
    /// Failed modules and everything nested under them are left out of
    /// node_modules and listed at the end; the exit status is 2.
    #[arg(short, long)]
    force: bool,

    /// Only install from the cache, never run npm
    #[arg(short, long)]
    offline: bool,

    /// Proxy npm should use for HTTP and HTTPS
    #[arg(short = 'p', long, value_name = "URL")]
    http_proxy: Option<String>,

    /// Registry npm should install from
    #[arg(short, long, value_name = "URL")]
    registry: Option<String>,
}

impl InstallCommand {
    /// Flag values as configuration overrides.
    #[must_use]
    pub fn overrides(&self, verbose: bool) -> ConfigOverrides {
        ConfigOverrides {
            cwd: self.cwd.clone(),
            cache_dir: self.cache_dir.clone(),
            force: self.force,
            offline: self.offline,
            http_proxy: self.http_proxy.clone(),
            registry: self.registry.clone(),
            verbose,
        }
    }

    /// Runs the install and returns the exit status.
    ///
    /// # Errors
    ///
    /// Returns an error when the install fails outright; tolerated `--force`
    /// failures are reported through the exit status instead.
    pub async fn execute(self, global: &GlobalConfig, cli: &CliConfig) -> Result<i32> {
        let config = InstallConfig::resolve(global, &self.overrides(cli.verbose))?;
        let installer = Arc::new(NpmInstaller::new(NpmOptions::from_config(&config)));

        let report = install_project(&config, installer).await?;
        if !cli.quiet {
            print_summary(&report);
        }
        Ok(report.exit_code())
    }
}

fn print_summary(report: &InstallReport) {
    if report.is_success() {
        println!("\n{}", "Installation complete!".green().bold());
    } else {
        println!("\n{}", "Installation finished with failures".yellow().bold());
    }
    println!("  {} modules installed", report.installed);
    println!("  {} from cache", report.cache_hits);
    println!("  {} cache entries added", report.cache_additions);

    if report.is_success() {
        return;
    }

    println!("\n{}", "Failed modules:".red().bold());
    for failed in &report.failed {
        println!("  {} {}", "✗".red(), failed.key);
        println!("    {}", failed.reason.dimmed());
    }
    if report.skipped > 0 {
        println!("  {} nested modules skipped", report.skipped);
    }
}
