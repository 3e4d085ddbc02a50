//! Lockfile discovery and loading.
//!
//! icebox installs from `npm-shrinkwrap.json`, the lockfile npm writes with
//! `npm shrinkwrap`. The file pins every module in the project's
//! `node_modules` layout to an exact version and source URL, so no version
//! resolution is needed: the nested `dependencies` objects are turned
//! straight into a [`DependencyTree`] by [`tree::TreeBuilder`].
//!
//! # Discovery
//!
//! The lockfile is searched for in the working directory and then in each
//! parent directory, the same way npm locates the project root. The nearest
//! one wins, and the directory containing it becomes the project root whose
//! `node_modules` is rebuilt.
//!
//! # Example
//!
//! ```rust,no_run
//! use icebox::lockfile::Lockfile;
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let lockfile = Lockfile::discover(Path::new("."))?;
//! let tree = lockfile.dependency_tree("https://registry.npmjs.org")?;
//! println!("{} modules pinned", tree.len());
//! # Ok(())
//! # }
//! ```

pub mod tree;

pub use tree::{DependencyKey, DependencyNode, DependencyTree, TreeBuilder};

use crate::constants::LOCKFILE_NAME;
use crate::core::IceboxError;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// A parsed lockfile and where it was found.
#[derive(Debug, Clone)]
pub struct Lockfile {
    /// Absolute path of the lockfile
    pub path: PathBuf,
    /// Raw JSON document
    pub document: Value,
}

impl Lockfile {
    /// Finds the nearest lockfile at or above `start` and loads it.
    ///
    /// # Errors
    ///
    /// - [`IceboxError::DirectoryNotFound`] if `start` does not exist
    /// - [`IceboxError::LockfileNotFound`] if no ancestor holds a lockfile
    /// - any error from [`Lockfile::load`]
    pub fn discover(start: &Path) -> Result<Self> {
        let path = find_lockfile(start)?;
        Self::load(&path)
    }

    /// Loads and parses the lockfile at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a JSON object.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read lockfile: {}", path.display()))?;

        let document: Value = serde_json::from_str(&content)
            .map_err(|e| IceboxError::LockfileParseError {
                file: path.display().to_string(),
                reason: e.to_string(),
            })
            .with_context(|| {
                format!(
                    "Invalid JSON in lockfile: {}\n\n\
                    Regenerate it with 'npm shrinkwrap' if it was edited by hand",
                    path.display()
                )
            })?;

        if !document.is_object() {
            return Err(IceboxError::LockfileParseError {
                file: path.display().to_string(),
                reason: "top-level value is not an object".to_string(),
            }
            .into());
        }

        Ok(Self {
            path: path.to_path_buf(),
            document,
        })
    }

    /// Directory containing the lockfile; its `node_modules` is the install target.
    #[must_use]
    pub fn project_root(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Builds the dependency tree, synthesizing missing tarball URLs under `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`IceboxError::InvalidDependency`] for malformed entries.
    pub fn dependency_tree(&self, registry: &str) -> Result<DependencyTree> {
        TreeBuilder::new(registry)
            .build(&self.document)
            .with_context(|| format!("Invalid dependency declaration in {}", self.path.display()))
    }
}

/// Searches `start` and its ancestors for a lockfile.
///
/// `start` is made absolute first so the search can climb past it.
///
/// # Errors
///
/// Returns [`IceboxError::DirectoryNotFound`] if `start` is not an existing
/// directory, or [`IceboxError::LockfileNotFound`] if the filesystem root is
/// reached without finding one.
pub fn find_lockfile(start: &Path) -> Result<PathBuf> {
    if !start.is_dir() {
        return Err(IceboxError::DirectoryNotFound {
            path: start.display().to_string(),
        }
        .into());
    }

    let start = start
        .canonicalize()
        .with_context(|| format!("Cannot resolve directory: {}", start.display()))?;

    let mut current = start.as_path();
    loop {
        let candidate = current.join(LOCKFILE_NAME);
        if candidate.is_file() {
            return Ok(candidate);
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }

    Err(IceboxError::LockfileNotFound {
        path: start.display().to_string(),
    }
    .into())
}
