//! Installing a project's dependency tree from the cache.
//!
//! [`TreeInstaller`] walks a [`DependencyTree`] depth-first and, for every
//! node, makes sure the module is cached (fetching it with npm on a miss) and
//! copies it into place:
//!
//! ```text
//! project/node_modules/
//! ├── buffer/                      <- node buffer@4.0.0
//! │   └── node_modules/
//! │       └── bar/                 <- child of buffer
//! │           └── node_modules/
//! │               └── fiz/         <- child of bar
//! └── io/
//! ```
//!
//! Nodes are visited parent first, siblings in key order, one at a time.
//!
//! # Failure policy
//!
//! - Without `--force` the first failing module aborts the run.
//! - With `--force` the failure is recorded in the [`InstallReport`], the
//!   module's children are skipped (their parent directory was never
//!   created), and the walk continues.
//! - A cache miss in offline mode always aborts, with or without `--force`.
//!
//! [`install_project`] wraps the walk with everything around it: finding the
//! lockfile, locking the cache and resetting `node_modules`.

use crate::cache::{Cache, CacheLock};
use crate::config::InstallConfig;
use crate::constants::{DEPENDENCY_DIR_NAME, EXIT_TOLERATED_FAILURES};
use crate::core::IceboxError;
use crate::lockfile::{DependencyKey, DependencyNode, DependencyTree, Lockfile};
use crate::npm::PackageInstaller;
use crate::utils::fs::{ensure_dir, remove_path};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A module that could not be installed in a `--force` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedModule {
    /// The module's key
    pub key: DependencyKey,
    /// Error message, including causes
    pub reason: String,
}

/// What an install run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Modules copied into the project
    pub installed: usize,
    /// Modules that were already cached
    pub cache_hits: usize,
    /// Cache entries created by npm installs (nested modules included)
    pub cache_additions: usize,
    /// Modules that failed (only with `--force`)
    pub failed: Vec<FailedModule>,
    /// Descendants of failed modules that were not attempted
    pub skipped: usize,
}

impl InstallReport {
    /// Whether every module was installed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Process exit status for this outcome: 0, or 2 when failures were tolerated.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            EXIT_TOLERATED_FAILURES
        }
    }
}

/// Walks a dependency tree into a project's `node_modules`.
#[derive(Debug)]
pub struct TreeInstaller<'a> {
    cache: &'a Cache,
    force: bool,
    offline: bool,
}

impl<'a> TreeInstaller<'a> {
    /// Creates an orchestrator over `cache`.
    #[must_use]
    pub const fn new(cache: &'a Cache, force: bool, offline: bool) -> Self {
        Self {
            cache,
            force,
            offline,
        }
    }

    /// Deletes and recreates `<project_root>/node_modules`, then installs `tree` into it.
    ///
    /// # Errors
    ///
    /// - [`IceboxError::OfflineCacheMiss`] on any cache miss in offline mode
    /// - without force, the first module failure
    /// - file system errors resetting `node_modules`
    pub async fn install(&self, tree: &DependencyTree, project_root: &Path) -> Result<InstallReport> {
        let target = project_root.join(DEPENDENCY_DIR_NAME);
        remove_path(&target)?;
        ensure_dir(&target)?;

        let mut report = InstallReport::default();
        let mut stack: Vec<(&DependencyNode, PathBuf)> =
            tree.dependencies.values().rev().map(|node| (node, target.clone())).collect();

        while let Some((node, target)) = stack.pop() {
            let key = &node.key;
            match self.install_node(key, &target, &mut report).await {
                Ok(()) => {
                    report.installed += 1;
                    let child_target = target.join(&key.name).join(DEPENDENCY_DIR_NAME);
                    stack.extend(
                        node.children.values().rev().map(|child| (child, child_target.clone())),
                    );
                }
                Err(e) => {
                    if is_offline_miss(&e) {
                        return Err(e);
                    }
                    error!(
                        "Failed to install {} {} from {}: {e:#}",
                        key.name, key.version, key.resolved
                    );
                    if !self.force {
                        return Err(e);
                    }
                    let skipped = node.len() - 1;
                    if skipped > 0 {
                        warn!("Skipping {skipped} module(s) nested under {}", key.spec());
                    }
                    report.skipped += skipped;
                    report.failed.push(FailedModule {
                        key: key.clone(),
                        reason: format!("{e:#}"),
                    });
                }
            }
        }

        Ok(report)
    }

    async fn install_node(
        &self,
        key: &DependencyKey,
        target: &Path,
        report: &mut InstallReport,
    ) -> Result<()> {
        if self.cache.query(&key.name, &key.version) {
            report.cache_hits += 1;
        } else if self.offline {
            return Err(IceboxError::OfflineCacheMiss {
                name: key.name.clone(),
                version: key.version.clone(),
                url: key.resolved.clone(),
            }
            .into());
        } else {
            info!("Fetching {}", key);
            let stored = self.cache.add(&key.name, &key.version, &key.resolved).await?;
            report.cache_additions += stored.len();
        }

        debug!("Materializing {} into {}", key.spec(), target.display());
        self.cache.materialize(&key.name, &key.version, target)
    }
}

fn is_offline_miss(error: &anyhow::Error) -> bool {
    error
        .chain()
        .any(|cause| matches!(cause.downcast_ref::<IceboxError>(), Some(IceboxError::OfflineCacheMiss { .. })))
}

/// Installs the project found from `config.cwd` using `installer` for cache misses.
///
/// Finds the nearest lockfile, builds its tree, takes the cache lock for the
/// whole run (clearing entries a crashed run left half-staged) and rebuilds
/// the project's `node_modules`.
///
/// # Errors
///
/// Returns lockfile, validation, locking and install errors; see
/// [`TreeInstaller::install`] for the failure policy.
pub async fn install_project(
    config: &InstallConfig,
    installer: Arc<dyn PackageInstaller>,
) -> Result<InstallReport> {
    let lockfile = Lockfile::discover(&config.cwd)?;
    info!("Using lockfile {}", lockfile.path.display());
    let tree = lockfile.dependency_tree(config.registry_base())?;

    let cache = Cache::new(&config.cache_dir, installer)?;
    let _lock = CacheLock::acquire_cache(cache.root()).await?;
    cache.clear_staging()?;
    debug!("Using cache {}", cache.root().display());

    info!("Installing {} module(s)", tree.len());
    let report = TreeInstaller::new(&cache, config.force, config.offline)
        .install(&tree, lockfile.project_root())
        .await?;

    info!(
        "Installed {} module(s): {} from cache, {} new cache entries",
        report.installed, report.cache_hits, report.cache_additions
    );
    if !report.is_success() {
        warn!(
            "{} module(s) failed and {} nested module(s) were skipped",
            report.failed.len(),
            report.skipped
        );
    }
    Ok(report)
}
