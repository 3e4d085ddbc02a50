//! The external package installer.
//!
//! icebox never talks to a registry itself. On a cache miss it asks npm to
//! install exactly one module into a scratch prefix and then takes the result
//! apart into cache entries. [`PackageInstaller`] is that seam; [`NpmInstaller`]
//! is the real implementation and tests substitute a fake.
//!
//! # Install flow
//!
//! 1. For registry tarballs, query the module's `os` field with
//!    `npm view <name>@<version> os --json` and refuse modules that exclude the
//!    host platform. Source-control installs skip the check.
//! 2. Run `npm --prefix <scratch> install <resolved>` under the configured
//!    [`RetryPolicy`].
//! 3. Return `<scratch>/node_modules/<name>`.

pub mod command;
pub mod retry;

pub use command::{NpmCommand, NpmCommandOutput, find_npm};
pub use retry::{AttemptOutcome, RetryFailure, RetryPolicy, RetryState};

use crate::config::InstallConfig;
use crate::constants::{DEPENDENCY_DIR_NAME, NPM_VIEW_TIMEOUT};
use crate::core::IceboxError;
use crate::lockfile::tree::is_source_control_url;
use crate::utils::{ensure_dir, npm_platform};
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Installs a single module into a prefix directory.
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    /// Installs `name@version` from `resolved` under `prefix`.
    ///
    /// Returns the installed module directory, `<prefix>/node_modules/<name>`,
    /// with the module's own dependencies nested below it.
    async fn install(
        &self,
        name: &str,
        version: &str,
        resolved: &str,
        prefix: &Path,
    ) -> Result<PathBuf>;
}

/// Settings for [`NpmInstaller`].
#[derive(Debug, Clone, Default)]
pub struct NpmOptions {
    /// Program to run instead of the npm on `PATH`
    pub program: Option<PathBuf>,
    /// HTTP(S) proxy for npm
    pub proxy: Option<String>,
    /// Registry npm should fetch from
    pub registry: Option<String>,
    /// Forward `--verbose` to npm
    pub verbose: bool,
    /// Retry behaviour for installs
    pub retry: RetryPolicy,
    /// Per-attempt install timeout
    pub install_timeout: Option<Duration>,
}

impl NpmOptions {
    /// Options for a run described by `config`.
    #[must_use]
    pub fn from_config(config: &InstallConfig) -> Self {
        Self {
            program: None,
            proxy: config.http_proxy.clone(),
            registry: config.registry.clone(),
            verbose: config.verbose,
            retry: config.retry,
            install_timeout: config.install_timeout,
        }
    }
}

/// [`PackageInstaller`] backed by the `npm` executable.
#[derive(Debug, Clone, Default)]
pub struct NpmInstaller {
    options: NpmOptions,
}

impl NpmInstaller {
    /// Creates an installer with the given options.
    #[must_use]
    pub const fn new(options: NpmOptions) -> Self {
        Self {
            options,
        }
    }

    fn command(&self, base: NpmCommand) -> NpmCommand {
        let cmd = base
            .proxy(self.options.proxy.as_deref())
            .registry(self.options.registry.as_deref())
            .verbose(self.options.verbose);
        match self.options.program {
            Some(ref program) => cmd.program(program),
            None => cmd,
        }
    }

    /// Fails with [`IceboxError::PlatformIncompatible`] if the module excludes this host.
    ///
    /// A failed metadata query is logged and treated as unrestricted; if the
    /// registry is unreachable the install that follows fails and is retried.
    async fn check_platform(&self, name: &str, version: &str) -> Result<()> {
        let query = self
            .command(NpmCommand::view_os(name, version))
            .with_timeout(Some(NPM_VIEW_TIMEOUT))
            .with_context(format!("{name}@{version}"))
            .execute()
            .await;

        let output = match query {
            Ok(output) => output,
            Err(e) => {
                if matches!(e.downcast_ref::<IceboxError>(), Some(IceboxError::NpmNotFound)) {
                    return Err(e);
                }
                warn!(target: "npm", "Could not read supported platforms of {name}@{version}: {e:#}");
                return Ok(());
            }
        };

        let platforms = parse_os_field(&output.stdout);
        let platform = npm_platform();
        if platform_allowed(&platforms, platform) {
            Ok(())
        } else {
            debug!(target: "npm", "{name}@{version} supports {platforms:?}, host is {platform}");
            Err(IceboxError::PlatformIncompatible {
                name: name.to_string(),
                version: version.to_string(),
                platform: platform.to_string(),
            }
            .into())
        }
    }
}

#[async_trait]
impl PackageInstaller for NpmInstaller {
    async fn install(
        &self,
        name: &str,
        version: &str,
        resolved: &str,
        prefix: &Path,
    ) -> Result<PathBuf> {
        if !is_source_control_url(resolved) {
            self.check_platform(name, version).await?;
        }

        ensure_dir(prefix)?;
        let policy = self.options.retry;

        let result = policy
            .run(|attempt| {
                info!(
                    target: "npm",
                    "Installing {name}@{version} (attempt {attempt}/{})",
                    policy.max_attempts
                );
                let cmd = self
                    .command(NpmCommand::install(resolved))
                    .prefix(prefix)
                    .with_timeout(self.options.install_timeout)
                    .with_context(format!("{name}@{version}"));
                async move { cmd.execute().await.map(|_| ()) }
            })
            .await;

        match result {
            Ok(()) => {}
            Err(failure) if failure.exhausted => {
                return Err(IceboxError::InstallFailed {
                    name: name.to_string(),
                    version: version.to_string(),
                    url: resolved.to_string(),
                    attempts: failure.attempts,
                    reason: format!("{:#}", failure.error),
                }
                .into());
            }
            Err(failure) => return Err(failure.error),
        }

        let module_dir = prefix.join(DEPENDENCY_DIR_NAME).join(name);
        if !module_dir.is_dir() {
            return Err(IceboxError::InvalidModule {
                path: module_dir.display().to_string(),
                reason: format!("npm reported success but {name} was not installed"),
            }
            .into());
        }
        Ok(module_dir)
    }
}

/// Parses `npm view ... os --json` output into a list of platform entries.
///
/// npm prints a JSON string for a single value, an array for several, and
/// nothing at all when the field is unset.
#[must_use]
pub fn parse_os_field(stdout: &str) -> Vec<String> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::String(platform)) => vec![platform],
        Ok(serde_json::Value::Array(values)) => values
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Ok(_) => Vec::new(),
        Err(e) => {
            debug!(target: "npm", "Ignoring unparseable os field {trimmed:?}: {e}");
            Vec::new()
        }
    }
}

/// Whether a module with `os` entries `platforms` may be installed on `platform`.
///
/// `!name` entries exclude a platform. If any positive entries exist, only
/// those platforms are allowed. An empty list allows everything.
#[must_use]
pub fn platform_allowed(platforms: &[String], platform: &str) -> bool {
    let mut has_positive = false;
    let mut listed = false;
    for entry in platforms {
        if let Some(excluded) = entry.strip_prefix('!') {
            if excluded == platform {
                return false;
            }
        } else {
            has_positive = true;
            listed |= entry == platform;
        }
    }
    !has_positive || listed
}
