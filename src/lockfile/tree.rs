//! Canonical dependency tree built from a lockfile's nested declarations.
//!
//! npm lockfiles describe the `node_modules` layout directly: every entry may
//! carry its own `dependencies` mapping for modules that npm nested under it
//! instead of hoisting. This module turns that mapping into a tree of
//! [`DependencyNode`]s keyed by [`DependencyKey`], the unit the cache and the
//! install orchestrator work with.
//!
//! # Key derivation
//!
//! ```text
//! "fiz": { "version": "9.0.0", "resolved": "git+http://github.com/fiz#abc123" }
//!   => DependencyKey { name: "fiz", version: "abc123", resolved: "git+http://github.com/fiz#abc123" }
//!
//! "buffer": { "version": "4.4.0" }
//!   => DependencyKey { name: "buffer", version: "4.4.0",
//!                      resolved: "https://registry.npmjs.org/buffer/-/buffer-4.4.0.tgz" }
//! ```
//!
//! The same name may appear at several depths with different versions; those
//! are different keys and different cache entries.

use crate::core::IceboxError;
use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// URL prefixes that mark a module as coming from source control rather than a registry tarball.
const SOURCE_CONTROL_PREFIXES: &[&str] = &["git+", "git://", "github:"];

/// Identity of one installable module instance.
///
/// A structured key rather than a joined string, so no field value can ever
/// be confused with a separator. Ordering is by name, then version, then
/// source, which makes traversal order deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DependencyKey {
    /// Module name, including any `@scope/` prefix
    pub name: String,
    /// Pinned semantic version, or the commit id for source-control modules
    pub version: String,
    /// Source URL handed to the installer
    pub resolved: String,
}

impl DependencyKey {
    /// Creates a key from its three parts.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        resolved: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            resolved: resolved.into(),
        }
    }

    /// `name@version`, the form npm and the logs use.
    #[must_use]
    pub fn spec(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

impl fmt::Display for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} from {}", self.name, self.version, self.resolved)
    }
}

/// One module in the tree plus the modules nested beneath it.
///
/// Children live in an ordered map, so two nodes are equal exactly when they
/// have the same key and the same set of child subtrees, whatever order the
/// lockfile listed them in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyNode {
    /// This module's identity
    pub key: DependencyKey,
    /// Modules installed in this module's own `node_modules`
    pub children: BTreeMap<DependencyKey, DependencyNode>,
}

impl DependencyNode {
    /// Creates a node without children.
    #[must_use]
    pub const fn leaf(key: DependencyKey) -> Self {
        Self {
            key,
            children: BTreeMap::new(),
        }
    }

    /// Number of nodes in this subtree, including this one.
    #[must_use]
    pub fn len(&self) -> usize {
        1 + self.children.values().map(Self::len).sum::<usize>()
    }

    /// Always false; a node counts itself. Present for clippy's `len_without_is_empty`.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    fn merge(&mut self, other: Self) {
        merge_into(&mut self.children, other.children);
    }
}

/// The project's dependency tree: the merged root `dependencies` and `devDependencies`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyTree {
    /// Top-level modules, installed directly into the project's `node_modules`
    pub dependencies: BTreeMap<DependencyKey, DependencyNode>,
}

impl DependencyTree {
    /// Total number of nodes in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dependencies.values().map(DependencyNode::len).sum()
    }

    /// Whether the lockfile declared no dependencies at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}

fn merge_into(
    target: &mut BTreeMap<DependencyKey, DependencyNode>,
    source: BTreeMap<DependencyKey, DependencyNode>,
) {
    for (key, node) in source {
        match target.get_mut(&key) {
            Some(existing) => existing.merge(node),
            None => {
                target.insert(key, node);
            }
        }
    }
}

/// Builds [`DependencyTree`]s from parsed lockfile JSON.
///
/// The registry base is only used to synthesize `resolved` URLs for entries
/// that omit them.
#[derive(Debug, Clone)]
pub struct TreeBuilder {
    registry: String,
}

impl TreeBuilder {
    /// Creates a builder that synthesizes tarball URLs under `registry`.
    pub fn new(registry: impl Into<String>) -> Self {
        Self {
            registry: registry.into().trim_end_matches('/').to_string(),
        }
    }

    /// Builds the tree from a lockfile document.
    ///
    /// Reads both `dependencies` and `devDependencies` at the root; a module
    /// declared in both with the same key becomes a single node.
    ///
    /// # Errors
    ///
    /// Returns [`IceboxError::InvalidDependency`] for any entry whose
    /// `version` is not a string, whose `dependencies` is not an object, or
    /// which is not an object itself.
    pub fn build(&self, lockfile: &Value) -> Result<DependencyTree> {
        let mut tree = DependencyTree::default();

        for section in ["dependencies", "devDependencies"] {
            let Some(declarations) = lockfile.get(section) else {
                continue;
            };
            let declarations = declarations.as_object().ok_or_else(|| {
                invalid_field("<root>", section, declarations, "object")
            })?;
            merge_into(&mut tree.dependencies, self.build_children(declarations)?);
        }

        Ok(tree)
    }

    /// Builds the child map for one `dependencies` object.
    pub fn build_children(
        &self,
        declarations: &Map<String, Value>,
    ) -> Result<BTreeMap<DependencyKey, DependencyNode>> {
        let mut children = BTreeMap::new();
        for (name, declaration) in declarations {
            let node = self.build_node(name, declaration)?;
            merge_into(
                &mut children,
                BTreeMap::from([(node.key.clone(), node)]),
            );
        }
        Ok(children)
    }

    fn build_node(&self, name: &str, declaration: &Value) -> Result<DependencyNode> {
        let entry = declaration
            .as_object()
            .ok_or_else(|| invalid_field(name, "<entry>", declaration, "object"))?;

        let version = match entry.get("version") {
            Some(Value::String(version)) => version.as_str(),
            Some(other) => return Err(invalid_field(name, "version", other, "string").into()),
            None => return Err(invalid_field(name, "version", &Value::Null, "string").into()),
        };

        let resolved = match entry.get("resolved") {
            Some(Value::String(url)) if !url.is_empty() => url.clone(),
            _ => default_resolved_url(&self.registry, name, version),
        };

        let children = match entry.get("dependencies") {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(Value::Object(nested)) => self.build_children(nested)?,
            Some(other) => {
                return Err(invalid_field(name, "dependencies", other, "object").into());
            }
        };

        let version = effective_version(version, &resolved);
        Ok(DependencyNode {
            key: DependencyKey::new(name, version, resolved),
            children,
        })
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_REGISTRY)
    }
}

fn invalid_field(name: &str, field: &str, value: &Value, expected: &str) -> IceboxError {
    IceboxError::InvalidDependency {
        name: name.to_string(),
        field: field.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    }
}

/// Tarball URL npm serves `name@version` from on `registry`.
///
/// Scoped packages keep the scope in the path but not in the file name:
/// `@types/node` → `<registry>/@types/node/-/node-<version>.tgz`.
#[must_use]
pub fn default_resolved_url(registry: &str, name: &str, version: &str) -> String {
    let basename = name.rsplit('/').next().unwrap_or(name);
    format!("{}/{name}/-/{basename}-{version}.tgz", registry.trim_end_matches('/'))
}

/// Whether a resolved URL points at a source-control origin rather than a registry tarball.
#[must_use]
pub fn is_source_control_url(url: &str) -> bool {
    SOURCE_CONTROL_PREFIXES.iter().any(|prefix| url.starts_with(prefix))
}

/// The commit reference of a source-control URL (`...#<commit>`), if it has one.
#[must_use]
pub fn source_control_commit(url: &str) -> Option<&str> {
    if !is_source_control_url(url) {
        return None;
    }
    url.rsplit_once('#').map(|(_, commit)| commit).filter(|commit| !commit.is_empty())
}

/// The version a module is cached under: its commit for source-control URLs, else `declared`.
#[must_use]
pub fn effective_version(declared: &str, resolved: &str) -> String {
    source_control_commit(resolved).unwrap_or(declared).to_string()
}
