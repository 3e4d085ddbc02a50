//! icebox - install npm-shrinkwrap.json dependencies from a local module cache
//!
//! icebox reads a project's `npm-shrinkwrap.json`, which pins every module of
//! the dependency tree to an exact version and source, and rebuilds the
//! project's `node_modules` from a cache keyed by `name@version`. npm is only
//! run for modules that are not cached yet, and each of those installs is
//! split into one cache entry per module so later projects can reuse them.
//!
//! # Architecture Overview
//!
//! ```text
//! npm-shrinkwrap.json ──> lockfile::TreeBuilder ──> DependencyTree
//!                                                        │
//!                                        installer::TreeInstaller (depth-first)
//!                                                        │
//!                          cache hit? ──no──> Cache::add ──> npm::NpmInstaller
//!                              │                  │ (scratch install, split into entries)
//!                             yes                 ▼
//!                              └──────────> Cache::materialize ──> node_modules/<name>
//! ```
//!
//! # Cache Layout
//!
//! ```text
//! ~/.icebox/cache/
//! ├── .locks/cache.lock        exclusive lock held for a whole install run
//! ├── .temp/node_modules/      npm scratch prefix, emptied before each install
//! ├── .staging/                entries being assembled, cleared under the lock
//! ├── io/0.0.1/
//! │   ├── data/                the module's files, without node_modules
//! │   └── deps.json            frozen tree of its nested dependencies
//! └── @scope/util/1.0.0/
//! ```
//!
//! # Core Modules
//!
//! - [`lockfile`] - finding and parsing `npm-shrinkwrap.json` into a [`lockfile::DependencyTree`]
//! - [`manifest`] - reading installed modules' `package.json`
//! - [`cache`] - the module cache and its lock
//! - [`npm`] - running npm, platform checks and retries
//! - [`installer`] - walking the tree into `node_modules`
//! - [`config`] - global config file and per-run settings
//! - [`cli`] - command-line interface
//! - [`core`] - error types and user-facing error formatting
//! - [`utils`] - file system and platform helpers

pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod installer;
pub mod lockfile;
pub mod manifest;
pub mod npm;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
