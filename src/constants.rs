//! Global constants used throughout the icebox codebase.
//!
//! This module contains file names, retry parameters, exit codes and other
//! values that are shared across multiple modules. Defining them centrally
//! keeps magic strings and numbers discoverable.

use std::time::Duration;

/// Name of the lockfile icebox installs from.
pub const LOCKFILE_NAME: &str = "npm-shrinkwrap.json";

/// Name of the manifest file that marks a directory as a node module.
pub const MODULE_MANIFEST_NAME: &str = "package.json";

/// Name of the per-project (and per-module) dependency directory.
pub const DEPENDENCY_DIR_NAME: &str = "node_modules";

/// Name of the directory that holds executable links inside a dependency directory.
pub const BIN_DIR_NAME: &str = ".bin";

/// Registry used to synthesize tarball URLs when a lockfile entry has no `resolved` field.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";

/// Name of the directory inside a cache entry holding the module's own files.
pub const CACHE_DATA_DIR: &str = "data";

/// Name of the frozen dependency document inside a cache entry.
pub const CACHE_DEPS_FILE: &str = "deps.json";

/// Scratch prefix the external installer writes into, relative to the cache root.
pub const CACHE_SCRATCH_DIR: &str = ".temp";

/// Staging area for cache entries being assembled, relative to the cache root.
pub const CACHE_STAGING_DIR: &str = ".staging";

/// Lock directory, relative to the cache root.
pub const CACHE_LOCKS_DIR: &str = ".locks";

/// Maximum number of npm install attempts before giving up (10).
pub const DEFAULT_INSTALL_ATTEMPTS: u32 = 10;

/// Fixed delay between npm install attempts (5 seconds).
pub const DEFAULT_INSTALL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Timeout for the `npm view ... os` platform query (60 seconds).
///
/// The query is metadata only, so a hung registry connection should not stall
/// the run the way an install may legitimately take minutes.
pub const NPM_VIEW_TIMEOUT: Duration = Duration::from_secs(60);

/// Environment variable overriding the cache directory.
pub const CACHE_DIR_ENV: &str = "ICEBOX_CACHE_DIR";

/// Environment variable overriding the global configuration file path.
pub const CONFIG_PATH_ENV: &str = "ICEBOX_CONFIG";

/// Process exit status when a `--force` run completed but some modules failed.
pub const EXIT_TOLERATED_FAILURES: i32 = 2;
