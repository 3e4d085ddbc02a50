//! Content-keyed store of installed node modules.
//!
//! The cache holds one entry per `(name, version)`. An entry is a single
//! module's own files plus a record of the dependency tree it was installed
//! with; modules nested under it in `node_modules` are separate entries of
//! their own. That decomposition is what lets one fetch from the registry
//! serve every project and every depth that uses the same module version.
//!
//! # Layout
//!
//! ```text
//! ~/.icebox/cache/
//! ├── .locks/cache.lock          # held for the duration of an install run
//! ├── .temp/node_modules/...     # npm's scratch prefix, reset before each add
//! ├── .staging/entry-XXXXXX/     # entries being assembled
//! ├── io/0.0.1/
//! │   ├── data/                  # module files, without node_modules
//! │   └── deps.json              # {"<dep>@<version>": {...}} for each nested module
//! └── @types/node/20.1.0/...
//! ```
//!
//! Directories starting with `.` are internal; npm package names cannot start
//! with a dot, so they never collide with entries.
//!
//! # Operations
//!
//! - [`Cache::query`]: whether an entry exists (its `data/` is non-empty)
//! - [`Cache::add`]: install a module with npm and store it and everything
//!   nested in it
//! - [`Cache::materialize`]: copy an entry into a project's `node_modules` and
//!   link its executables into `.bin`
//! - [`Cache::clear_staging`]: drop half-assembled entries left by a crashed run

pub mod lock;

pub use lock::CacheLock;

use crate::constants::{
    BIN_DIR_NAME, CACHE_DATA_DIR, CACHE_DEPS_FILE, CACHE_SCRATCH_DIR, CACHE_STAGING_DIR,
    DEPENDENCY_DIR_NAME,
};
use crate::core::IceboxError;
use crate::manifest::{FrozenDeps, ModuleManifest, ModuleStat, discover_modules};
use crate::npm::PackageInstaller;
use crate::utils::fs::{
    copy_dir, copy_dir_excluding, create_symlink, ensure_dir, is_non_empty_dir, normalize_path,
    remove_path, set_executable, write_json_file,
};
use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error};

/// The on-disk module cache.
pub struct Cache {
    root: PathBuf,
    installer: Arc<dyn PackageInstaller>,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache").field("root", &self.root).finish_non_exhaustive()
    }
}

impl Cache {
    /// Opens (creating if needed) the cache at `root`, fetching misses with `installer`.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` cannot be created.
    pub fn new(root: impl Into<PathBuf>, installer: Arc<dyn PackageInstaller>) -> Result<Self> {
        let root = root.into();
        ensure_dir(&root).with_context(|| format!("Cannot use cache directory {}", root.display()))?;
        Ok(Self {
            root,
            installer,
        })
    }

    /// Cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<name>/<version>`
    #[must_use]
    pub fn entry_dir(&self, name: &str, version: &str) -> PathBuf {
        self.root.join(name).join(version)
    }

    /// `<root>/<name>/<version>/data`
    #[must_use]
    pub fn data_dir(&self, name: &str, version: &str) -> PathBuf {
        self.entry_dir(name, version).join(CACHE_DATA_DIR)
    }

    /// npm's install prefix, `<root>/.temp`.
    #[must_use]
    pub fn scratch_dir(&self) -> PathBuf {
        self.root.join(CACHE_SCRATCH_DIR)
    }

    fn staging_root(&self) -> PathBuf {
        self.root.join(CACHE_STAGING_DIR)
    }

    /// Whether `name@version` is cached.
    ///
    /// Only checks that the entry's `data/` exists and is non-empty; contents
    /// are not verified.
    #[must_use]
    pub fn query(&self, name: &str, version: &str) -> bool {
        if validate_entry_key(name, version).is_err() {
            return false;
        }
        let hit = is_non_empty_dir(&self.data_dir(name, version));
        debug!(
            target: "cache",
            "Cache {} for {name}@{version} ({})",
            if hit { "hit" } else { "miss" },
            self.entry_dir(name, version).display()
        );
        hit
    }

    /// Removes entries a crashed run left in the staging area.
    ///
    /// Must only be called while holding the cache lock, since another
    /// process may be staging entries otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the staging area cannot be removed.
    pub fn clear_staging(&self) -> Result<()> {
        let staging_root = self.staging_root();
        if staging_root.exists() {
            debug!(target: "cache", "Clearing {}", staging_root.display());
            remove_path(&staging_root)?;
        }
        Ok(())
    }

    /// Installs `name@version` from `resolved` with npm and stores the result.
    ///
    /// The installed module is stored under `name@version`; every module
    /// nested under it is stored under the name and version from its own
    /// `package.json`. Modules already cached are left untouched. Each entry
    /// is assembled in the staging area and renamed into place, so
    /// [`Cache::query`] never sees a partial entry.
    ///
    /// Returns the entries that were newly stored.
    ///
    /// # Errors
    ///
    /// Installer errors are logged and returned unchanged. File system
    /// errors carry the path involved.
    pub async fn add(&self, name: &str, version: &str, resolved: &str) -> Result<Vec<ModuleStat>> {
        validate_entry_key(name, version)?;

        let scratch = self.scratch_dir();
        // Leftovers from the previous install would be picked up as peers
        remove_path(&scratch.join(DEPENDENCY_DIR_NAME))?;
        ensure_dir(&scratch)?;

        let module_dir = match self.installer.install(name, version, resolved, &scratch).await {
            Ok(dir) => dir,
            Err(e) => {
                error!("Failed to install {name}@{version} from {resolved}: {e:#}");
                return Err(e);
            }
        };

        let requested = ModuleStat {
            name: name.to_string(),
            version: version.to_string(),
        };

        let mut stored = Vec::new();
        for dir in discover_modules(&module_dir)? {
            let stat = if dir == module_dir {
                requested.clone()
            } else {
                ModuleStat::read(&dir)?
            };
            if self.store(&dir, &stat)? {
                stored.push(stat);
            }
        }

        if !self.query(name, version) {
            return Err(IceboxError::InvalidModule {
                path: module_dir.display().to_string(),
                reason: format!("npm did not produce a valid module for {name}@{version}"),
            }
            .into());
        }

        Ok(stored)
    }

    /// Copies one installed module into its cache entry; false if it was already cached.
    fn store(&self, module_dir: &Path, stat: &ModuleStat) -> Result<bool> {
        if validate_entry_key(&stat.name, &stat.version).is_err() {
            debug!(target: "cache", "Not caching {} with unusable name or version", module_dir.display());
            return Ok(false);
        }
        if self.query(&stat.name, &stat.version) {
            return Ok(false);
        }

        debug!(target: "cache", "Copying {} to cache", stat.spec());
        let staging_root = self.staging_root();
        ensure_dir(&staging_root)?;
        let slot = tempfile::Builder::new()
            .prefix("entry-")
            .tempdir_in(&staging_root)
            .with_context(|| format!("Failed to create staging directory in {}", staging_root.display()))?;
        let staging = slot.path().join("entry");
        copy_dir_excluding(module_dir, &staging.join(CACHE_DATA_DIR), &[DEPENDENCY_DIR_NAME])?;

        let deps = FrozenDeps::nested_in(module_dir)?;
        write_json_file(&staging.join(CACHE_DEPS_FILE), &deps)?;

        let entry = self.entry_dir(&stat.name, &stat.version);
        // Whatever is here has an empty or missing data/ and is not a valid entry
        remove_path(&entry)?;
        if let Some(parent) = entry.parent() {
            ensure_dir(parent)?;
        }
        std::fs::rename(&staging, &entry).map_err(|e| IceboxError::FileSystemError {
            operation: "publish cache entry".to_string(),
            path: entry.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(true)
    }

    /// Copies the cached `name@version` into `target_dependency_dir/<name>` and links its executables.
    ///
    /// Any existing `target_dependency_dir/<name>` is replaced. Each `bin`
    /// command becomes `target_dependency_dir/.bin/<command>`, a relative
    /// symlink to the script, and the script is made executable.
    ///
    /// # Errors
    ///
    /// - [`IceboxError::CacheEntryMissing`] if the entry is not cached
    /// - [`IceboxError::InvalidModule`] if the copied module has no readable `package.json`
    /// - file system errors while copying or linking
    pub fn materialize(&self, name: &str, version: &str, target_dependency_dir: &Path) -> Result<()> {
        if !self.query(name, version) {
            return Err(IceboxError::CacheEntryMissing {
                name: name.to_string(),
                version: version.to_string(),
            }
            .into());
        }

        let module_dir = target_dependency_dir.join(name);
        remove_path(&module_dir)?;
        copy_dir(&self.data_dir(name, version), &module_dir)
            .with_context(|| format!("Failed to materialize {name}@{version}"))?;

        let manifest = ModuleManifest::load(&module_dir)?;
        let commands = manifest.bin_commands();
        if commands.is_empty() {
            return Ok(());
        }

        let bin_dir = target_dependency_dir.join(BIN_DIR_NAME);
        ensure_dir(&bin_dir)?;
        for (command, script) in commands {
            if !is_plain_file_name(&command) {
                debug!("Skipping bin entry {command:?} of {name}@{version}");
                continue;
            }
            let link_target = normalize_path(&Path::new("..").join(name).join(&script));
            create_symlink(&link_target, &bin_dir.join(&command))?;

            let script_path = module_dir.join(&script);
            if script_path.is_file() {
                set_executable(&script_path)?;
            }
        }

        Ok(())
    }
}

/// Rejects names and versions that would address a path outside their entry.
fn validate_entry_key(name: &str, version: &str) -> Result<()> {
    let name_ok = !name.is_empty()
        && !name.starts_with('.')
        && Path::new(name).components().all(|c| matches!(c, Component::Normal(_)))
        && name.split('/').count() <= 2;
    if !name_ok {
        return Err(IceboxError::InvalidDependency {
            name: name.to_string(),
            field: "name".to_string(),
            value: format!("{name:?}"),
            expected: "package name".to_string(),
        }
        .into());
    }
    if !is_plain_file_name(version) {
        return Err(IceboxError::InvalidDependency {
            name: name.to_string(),
            field: "version".to_string(),
            value: format!("{version:?}"),
            expected: "version or commit".to_string(),
        }
        .into());
    }
    Ok(())
}

fn is_plain_file_name(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Lays out a fixed module tree under the prefix, like npm would.
    struct FixtureInstaller {
        files: Vec<(&'static str, &'static str)>,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl PackageInstaller for FixtureInstaller {
        async fn install(&self, name: &str, _: &str, _: &str, prefix: &Path) -> Result<PathBuf> {
            *self.calls.lock().unwrap() += 1;
            let root = prefix.join("node_modules");
            for (path, content) in &self.files {
                let path = root.join(path);
                std::fs::create_dir_all(path.parent().unwrap())?;
                std::fs::write(path, content)?;
            }
            Ok(root.join(name))
        }
    }

    struct FailingInstaller;

    #[async_trait]
    impl PackageInstaller for FailingInstaller {
        async fn install(&self, _: &str, _: &str, _: &str, _: &Path) -> Result<PathBuf> {
            Err(anyhow!("registry unavailable"))
        }
    }

    fn readable_stream() -> FixtureInstaller {
        FixtureInstaller {
            files: vec![
                ("readable-stream/package.json", r#"{"name":"readable-stream","version":"1.0.0","bin":{"rs":"./bin/rs.js"}}"#),
                ("readable-stream/bin/rs.js", "#!/usr/bin/env node\n"),
                ("readable-stream/node_modules/isarray/package.json", r#"{"name":"isarray","version":"0.0.1"}"#),
                ("readable-stream/node_modules/isarray/index.js", "module.exports = Array.isArray;"),
                ("readable-stream/node_modules/@scope/util/package.json", r#"{"name":"@scope/util","version":"1.0.0"}"#),
                ("readable-stream/node_modules/@scope/util/node_modules/inner/package.json", r#"{"name":"inner","version":"2.0.0"}"#),
            ],
            calls: Mutex::new(0),
        }
    }

    fn cache(temp: &TempDir, installer: impl PackageInstaller + 'static) -> Cache {
        Cache::new(temp.path().join("cache"), Arc::new(installer)).unwrap()
    }

    #[tokio::test]
    async fn test_add_decomposes_install() {
        let temp = TempDir::new().unwrap();
        let cache = cache(&temp, readable_stream());

        assert!(!cache.query("readable-stream", "1.0.0"));
        let stored = cache.add("readable-stream", "1.0.0", "https://r/rs.tgz").await.unwrap();
        assert_eq!(stored.len(), 4);

        for (name, version) in
            [("readable-stream", "1.0.0"), ("isarray", "0.0.1"), ("@scope/util", "1.0.0"), ("inner", "2.0.0")]
        {
            assert!(cache.query(name, version), "{name}@{version} should be cached");
            assert!(!cache.data_dir(name, version).join("node_modules").exists());
        }
        assert!(!cache.query("isarray", "1.0.0"));
    }

    #[tokio::test]
    async fn test_deps_json_format() {
        let temp = TempDir::new().unwrap();
        let cache = cache(&temp, readable_stream());
        cache.add("readable-stream", "1.0.0", "https://r/rs.tgz").await.unwrap();

        let content =
            std::fs::read_to_string(cache.entry_dir("@scope/util", "1.0.0").join(CACHE_DEPS_FILE)).unwrap();
        assert_eq!(content, "{\n    \"inner@2.0.0\": {}\n}");

        // Only the module's dependencies are recorded, not the module itself
        let content =
            std::fs::read_to_string(cache.entry_dir("readable-stream", "1.0.0").join(CACHE_DEPS_FILE)).unwrap();
        let deps: FrozenDeps = serde_json::from_str(&content).unwrap();
        assert_eq!(
            serde_json::to_value(&deps).unwrap(),
            serde_json::json!({
                "@scope/util@1.0.0": { "inner@2.0.0": {} },
                "isarray@0.0.1": {}
            })
        );

        let content = std::fs::read_to_string(cache.entry_dir("isarray", "0.0.1").join(CACHE_DEPS_FILE)).unwrap();
        assert_eq!(content, "{}");
    }

    #[tokio::test]
    async fn test_add_clears_scratch_between_installs() {
        let temp = TempDir::new().unwrap();
        let cache = cache(&temp, readable_stream());
        let leftover = cache.scratch_dir().join("node_modules/leftover");
        std::fs::create_dir_all(&leftover).unwrap();

        cache.add("readable-stream", "1.0.0", "https://r/rs.tgz").await.unwrap();
        assert!(!leftover.exists());
    }

    #[tokio::test]
    async fn test_add_skips_cached_entries() {
        let temp = TempDir::new().unwrap();
        let cache = cache(&temp, readable_stream());
        cache.add("readable-stream", "1.0.0", "https://r/rs.tgz").await.unwrap();

        let marker = cache.data_dir("isarray", "0.0.1").join("marker");
        std::fs::write(&marker, "kept").unwrap();
        let stored = cache.add("readable-stream", "1.0.0", "https://r/rs.tgz").await.unwrap();

        assert!(stored.is_empty());
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_add_propagates_installer_error() {
        let temp = TempDir::new().unwrap();
        let cache = cache(&temp, FailingInstaller);

        let err = cache.add("io", "0.0.1", "https://r/io.tgz").await.unwrap_err();
        assert_eq!(err.to_string(), "registry unavailable");
        assert!(!cache.query("io", "0.0.1"));
    }

    #[tokio::test]
    async fn test_materialize_links_bin() {
        let temp = TempDir::new().unwrap();
        let cache = cache(&temp, readable_stream());
        cache.add("readable-stream", "1.0.0", "https://r/rs.tgz").await.unwrap();

        let target = temp.path().join("project/node_modules");
        std::fs::create_dir_all(&target).unwrap();
        cache.materialize("readable-stream", "1.0.0", &target).unwrap();

        assert!(target.join("readable-stream/package.json").exists());
        assert!(!target.join("readable-stream/node_modules").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let link = target.join(".bin/rs");
            assert_eq!(std::fs::read_link(&link).unwrap(), PathBuf::from("../readable-stream/bin/rs.js"));
            assert!(link.exists());
            let mode = std::fs::metadata(target.join("readable-stream/bin/rs.js")).unwrap().permissions().mode();
            assert_ne!(mode & 0o111, 0);
        }
    }

    #[tokio::test]
    async fn test_materialize_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let cache = cache(&temp, readable_stream());
        cache.add("readable-stream", "1.0.0", "https://r/rs.tgz").await.unwrap();

        let target = temp.path().join("node_modules");
        cache.materialize("@scope/util", "1.0.0", &target).unwrap();
        std::fs::write(target.join("@scope/util/stale"), "x").unwrap();
        cache.materialize("@scope/util", "1.0.0", &target).unwrap();

        let mut files: Vec<_> = walkdir::WalkDir::new(&target)
            .into_iter()
            .map(|e| e.unwrap().path().strip_prefix(&target).unwrap().to_path_buf())
            .collect();
        files.sort();
        assert_eq!(
            files,
            vec![
                PathBuf::new(),
                PathBuf::from("@scope"),
                PathBuf::from("@scope/util"),
                PathBuf::from("@scope/util/package.json"),
            ]
        );
    }

    #[test]
    fn test_materialize_missing_entry() {
        let temp = TempDir::new().unwrap();
        let cache = cache(&temp, FailingInstaller);
        let err = cache.materialize("io", "0.0.1", temp.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IceboxError>(),
            Some(IceboxError::CacheEntryMissing { .. })
        ));
    }

    #[test]
    fn test_materialize_requires_manifest() {
        let temp = TempDir::new().unwrap();
        let cache = cache(&temp, FailingInstaller);
        let data = cache.data_dir("x", "1.0.0");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join("index.js"), "module.exports = 1;").unwrap();

        let target = temp.path().join("node_modules");
        let err = cache.materialize("x", "1.0.0", &target).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<IceboxError>(),
            Some(IceboxError::InvalidModule { .. })
        ));
    }

    #[test]
    fn test_clear_staging_removes_leftovers() {
        let temp = TempDir::new().unwrap();
        let cache = cache(&temp, FailingInstaller);
        let leftover = cache.root().join(".staging/entry-abc123/entry/data");
        std::fs::create_dir_all(&leftover).unwrap();
        std::fs::write(leftover.join("index.js"), "").unwrap();

        cache.clear_staging().unwrap();
        assert!(!cache.root().join(".staging").exists());

        // Nothing to clear is fine
        cache.clear_staging().unwrap();
    }

    #[test]
    fn test_query_ignores_empty_data() {
        let temp = TempDir::new().unwrap();
        let cache = cache(&temp, FailingInstaller);
        std::fs::create_dir_all(cache.data_dir("io", "0.0.1")).unwrap();
        assert!(!cache.query("io", "0.0.1"));
    }

    #[test]
    fn test_entry_key_validation() {
        assert!(validate_entry_key("io", "0.0.1").is_ok());
        assert!(validate_entry_key("@types/node", "20.1.0").is_ok());
        assert!(validate_entry_key("../etc", "1.0.0").is_err());
        assert!(validate_entry_key(".temp", "1.0.0").is_err());
        assert!(validate_entry_key("a/b/c", "1.0.0").is_err());
        assert!(validate_entry_key("io", "../x").is_err());
        assert!(validate_entry_key("", "1.0.0").is_err());
    }
}
