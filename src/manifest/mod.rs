//! Reading installed node modules from disk.
//!
//! After npm installs a module into the scratch prefix, the result is a
//! directory tree like:
//!
//! ```text
//! node_modules/readable-stream/
//! ├── package.json
//! ├── lib/...
//! └── node_modules/
//!     ├── isarray/package.json
//!     └── @scope/
//!         └── util/package.json
//! ```
//!
//! A directory is a module when it holds a `package.json` with string `name`
//! and `version` fields. This module reads those manifests
//! ([`ModuleManifest`], [`ModuleStat`]), finds every module nested in an
//! install ([`discover_modules`]) and computes the frozen dependency tree
//! stored alongside each cache entry ([`FrozenDeps`]).
//!
//! Nested modules are only looked for under `node_modules` directories (and
//! the `@scope` directories inside them). A `package.json` elsewhere in a
//! module, such as a test fixture, is part of that module's files.

use crate::constants::{DEPENDENCY_DIR_NAME, MODULE_MANIFEST_NAME};
use crate::core::IceboxError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// The `package.json` fields icebox reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleManifest {
    /// Package name, possibly scoped (`@scope/name`)
    pub name: Option<String>,
    /// Installed version
    pub version: Option<String>,
    /// Executables the package exposes
    pub bin: Option<BinField>,
    /// Commit the package was built from, set by npm for git installs
    #[serde(rename = "gitHead")]
    pub git_head: Option<String>,
    /// Source npm recorded for the install
    #[serde(rename = "_resolved")]
    pub resolved: Option<String>,
}

/// The `bin` field in either of npm's two shapes.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BinField {
    /// `"bin": "./cli.js"`, a single command named after the package
    Single(String),
    /// `"bin": { "cmd": "./cli.js" }`
    Map(BTreeMap<String, String>),
    /// Anything else; npm ignores it and so do we
    Other(serde_json::Value),
}

impl ModuleManifest {
    /// Reads `<dir>/package.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IceboxError::InvalidModule`] if the file is missing or is not
    /// valid JSON.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MODULE_MANIFEST_NAME);
        let content = std::fs::read_to_string(&path).map_err(|e| IceboxError::InvalidModule {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| {
            IceboxError::InvalidModule {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Executables as `command → script path`, the script relative to the module root.
    ///
    /// The single-string form names the command after the package, dropping
    /// any scope.
    #[must_use]
    pub fn bin_commands(&self) -> BTreeMap<String, String> {
        match &self.bin {
            Some(BinField::Map(commands)) => commands.clone(),
            Some(BinField::Single(script)) => self
                .name
                .as_deref()
                .map(|name| {
                    let command = name.rsplit('/').next().unwrap_or(name);
                    BTreeMap::from([(command.to_string(), script.clone())])
                })
                .unwrap_or_default(),
            Some(BinField::Other(_)) | None => BTreeMap::new(),
        }
    }
}

/// Name and cache version of an installed module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleStat {
    /// Package name
    pub name: String,
    /// Version, or the git commit for modules installed from git
    pub version: String,
}

impl ModuleStat {
    /// Reads the stat of the module in `dir`.
    ///
    /// When npm recorded a `git+` source and a `gitHead`, the commit is used
    /// as the version so the entry matches the lockfile key.
    ///
    /// # Errors
    ///
    /// Returns [`IceboxError::InvalidModule`] if `dir` has no readable
    /// `package.json` or it lacks a string `name` or `version`.
    pub fn read(dir: &Path) -> Result<Self> {
        let manifest = ModuleManifest::load(dir)?;
        Self::from_manifest(&manifest).ok_or_else(|| {
            IceboxError::InvalidModule {
                path: dir.join(MODULE_MANIFEST_NAME).display().to_string(),
                reason: "missing \"name\" or \"version\"".to_string(),
            }
            .into()
        })
    }

    fn from_manifest(manifest: &ModuleManifest) -> Option<Self> {
        let name = manifest.name.clone()?;
        let mut version = manifest.version.clone()?;

        let from_git = manifest.resolved.as_deref().is_some_and(|r| r.starts_with("git+"));
        if from_git {
            if let Some(head) = manifest.git_head.as_deref().filter(|h| !h.is_empty()) {
                version = head.to_string();
            }
        }

        Some(Self {
            name,
            version,
        })
    }

    /// `name@version`, the key form used in `deps.json`.
    #[must_use]
    pub fn spec(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

/// Frozen dependency tree of an installed module, as stored in `deps.json`.
///
/// Keys are the module's nested dependencies as `name@version`; each value is
/// that dependency's own nested tree. The module itself is not a key.
/// Serializes as plain nested JSON objects with sorted keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrozenDeps(pub BTreeMap<String, FrozenDeps>);

impl FrozenDeps {
    /// Computes the tree of modules installed under `<dir>/node_modules`.
    ///
    /// A directory there without a valid manifest is transparent: modules
    /// nested beneath it are attached to `dir`'s tree.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be listed.
    pub fn nested_in(dir: &Path) -> Result<Self> {
        let mut deps = BTreeMap::new();
        for child in child_module_dirs(dir)? {
            match ModuleStat::read(&child) {
                Ok(stat) => {
                    deps.insert(stat.spec(), Self::nested_in(&child)?);
                }
                Err(e) => {
                    debug!("{} is not a valid node module, skipping: {e:#}", child.display());
                    deps.extend(Self::nested_in(&child)?.0);
                }
            }
        }
        Ok(Self(deps))
    }
}

/// Directories directly under `<dir>/node_modules` that may be modules, descending into `@scope` dirs.
fn child_module_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let dependency_dir = dir.join(DEPENDENCY_DIR_NAME);
    if !dependency_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut dirs = Vec::new();
    for entry in list_dirs(&dependency_dir)? {
        let name = entry.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        if name.starts_with('.') {
            continue;
        }
        if name.starts_with('@') {
            dirs.extend(list_dirs(&entry)?);
        } else {
            dirs.push(entry);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn list_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list directory: {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to list directory: {}", dir.display()))?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

/// Finds every valid module in an installed module tree, `root` first.
///
/// Walks `root` descending only through `node_modules`, `@scope` directories
/// and the module directories inside them; symlinks are not followed.
/// Directories without a valid manifest are skipped but still searched.
///
/// # Errors
///
/// Returns an error if the tree cannot be walked.
pub fn discover_modules(root: &Path) -> Result<Vec<PathBuf>> {
    let mut modules = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || is_module_tree_dir(entry.path()));

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_dir() || is_container_dir(entry.path()) {
            continue;
        }
        if ModuleStat::read(entry.path()).is_ok() {
            modules.push(entry.path().to_path_buf());
        } else {
            debug!("{} is not a valid node module, skipping", entry.path().display());
        }
    }

    Ok(modules)
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

/// `node_modules` itself, or an `@scope` directory directly inside one.
fn is_container_dir(path: &Path) -> bool {
    let name = file_name(path);
    let parent = path.parent().map(file_name).unwrap_or_default();
    name == DEPENDENCY_DIR_NAME || (name.starts_with('@') && parent == DEPENDENCY_DIR_NAME)
}

fn is_module_tree_dir(path: &Path) -> bool {
    if is_container_dir(path) {
        return true;
    }
    if file_name(path).starts_with('.') {
        return false;
    }
    let Some(parent) = path.parent() else {
        return false;
    };
    let parent_name = file_name(parent);
    let grandparent_name = parent.parent().map(file_name).unwrap_or_default();
    parent_name == DEPENDENCY_DIR_NAME
        || (parent_name.starts_with('@') && grandparent_name == DEPENDENCY_DIR_NAME)
}
