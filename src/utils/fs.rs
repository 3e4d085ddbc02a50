//! File system utilities for cache and project operations
//!
//! This module provides the directory copy, removal and JSON helpers the cache
//! store and install orchestrator are built on. Every function attaches the
//! offending path to its error so a failed install can be reproduced from the
//! log alone.
//!
//! # Examples
//!
//! ```rust,no_run
//! use icebox::utils::fs::{copy_dir_excluding, ensure_dir, remove_dir_all};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! ensure_dir(Path::new("out"))?;
//! // Copy a module without its nested dependencies
//! copy_dir_excluding(Path::new("scratch/node_modules/io"), Path::new("out/io"), &["node_modules"])?;
//! remove_dir_all(Path::new("scratch"))?;
//! # Ok(())
//! # }
//! ```
//!
//! # Platform Considerations
//!
//! - **Unix**: symbolic links inside copied trees are recreated as links and
//!   file permissions are preserved by [`std::fs::copy`]
//! - **Windows**: symbolic links inside copied trees are skipped

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Ensures a directory exists, creating it and all parent directories if necessary.
///
/// # Errors
///
/// Returns an error if the path exists but is not a directory, or creation fails.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    } else if !path.is_dir() {
        return Err(anyhow::anyhow!("Path exists but is not a directory: {}", path.display()));
    }
    Ok(())
}

/// Atomically writes bytes to a file using a write-then-rename strategy.
///
/// The content is written to a `.tmp` sibling, synced, and renamed over the
/// target so readers never observe a partially written file.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let temp_path = path.with_extension("tmp");

    {
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

        file.write_all(content)
            .with_context(|| format!("Failed to write to temp file: {}", temp_path.display()))?;

        file.sync_all().with_context(|| "Failed to sync file to disk")?;
    }

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;

    Ok(())
}

/// Recursively copies a directory and all its contents to a new location.
///
/// Equivalent to [`copy_dir_excluding`] with nothing excluded.
pub fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    copy_dir_excluding(src, dst, &[])
}

/// Recursively copies a directory, skipping the named top-level entries.
///
/// Only entries directly inside `src` are matched against `exclude`, so
/// excluding `node_modules` drops a module's own dependency directory while
/// keeping any `node_modules` deeper in its source tree (fixtures, vendored
/// code) intact.
///
/// # Behavior
///
/// - Creates the destination directory if it doesn't exist
/// - Copies regular files, preserving permissions
/// - Recreates symbolic links with their original target on Unix
/// - Overwrites existing files in the destination
pub fn copy_dir_excluding(src: &Path, dst: &Path, exclude: &[&str]) -> Result<()> {
    ensure_dir(dst)?;

    for entry in
        fs::read_dir(src).with_context(|| format!("Failed to read directory: {}", src.display()))?
    {
        let entry = entry.with_context(|| format!("Failed to read entry in: {}", src.display()))?;
        let file_name = entry.file_name();
        if exclude.iter().any(|excluded| file_name == *excluded) {
            continue;
        }

        let file_type = entry
            .file_type()
            .with_context(|| format!("Failed to stat: {}", entry.path().display()))?;
        let src_path = entry.path();
        let dst_path = dst.join(&file_name);

        if file_type.is_dir() {
            copy_dir_excluding(&src_path, &dst_path, &[])?;
        } else if file_type.is_file() {
            fs::copy(&src_path, &dst_path).with_context(|| {
                format!(
                    "Failed to copy file from {} to {}",
                    src_path.display(),
                    dst_path.display()
                )
            })?;
        } else if file_type.is_symlink() {
            copy_symlink(&src_path, &dst_path)?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let target = fs::read_link(src)
        .with_context(|| format!("Failed to read symlink: {}", src.display()))?;
    remove_path(dst)?;
    std::os::unix::fs::symlink(&target, dst)
        .with_context(|| format!("Failed to create symlink: {}", dst.display()))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, _dst: &Path) -> Result<()> {
    tracing::debug!("Skipping symlink {}", src.display());
    Ok(())
}

/// Recursively removes a directory and all its contents.
///
/// Safe to call on a path that doesn't exist.
pub fn remove_dir_all(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove directory: {}", path.display()))?;
    }
    Ok(())
}

/// Removes whatever is at `path` (file, symlink or directory) if anything is.
///
/// Dangling symlinks are removed too, which `Path::exists` alone would miss.
pub fn remove_path(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => remove_dir_all(path),
        Ok(_) => fs::remove_file(path)
            .with_context(|| format!("Failed to remove file: {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to stat: {}", path.display())),
    }
}

/// Whether `path` is a directory containing at least one entry.
#[must_use]
pub fn is_non_empty_dir(path: &Path) -> bool {
    fs::read_dir(path).map(|mut entries| entries.next().is_some()).unwrap_or(false)
}

/// Normalizes a path by resolving `.` and `..` components.
///
/// Purely lexical: symbolic links are not resolved and the path need not exist.
///
/// ```rust
/// use icebox::utils::fs::normalize_path;
/// use std::path::{Path, PathBuf};
///
/// assert_eq!(normalize_path(Path::new("../io/./bin/../cli.js")), PathBuf::from("../io/cli.js"));
/// ```
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Leading `..` has nothing to cancel against and must be kept
                match components.last() {
                    Some(Component::Normal(_)) => {
                        components.pop();
                    }
                    _ => components.push(component),
                }
            }
            c => components.push(c),
        }
    }

    components.iter().collect()
}

/// Creates a symbolic link at `link` pointing at `target`, replacing anything already there.
///
/// `target` is stored verbatim, so relative targets resolve against the
/// link's own directory.
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    remove_path(link)?;

    #[cfg(unix)]
    std::os::unix::fs::symlink(target, link).with_context(|| {
        format!("Failed to create symlink {} -> {}", link.display(), target.display())
    })?;

    #[cfg(windows)]
    std::os::windows::fs::symlink_file(target, link).with_context(|| {
        format!("Failed to create symlink {} -> {}", link.display(), target.display())
    })?;

    Ok(())
}

/// Adds the executable bits to a file (Unix only; a no-op elsewhere).
pub fn set_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path)
            .with_context(|| format!("Failed to stat: {}", path.display()))?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(permissions.mode() | 0o111);
        fs::set_permissions(path, permissions)
            .with_context(|| format!("Failed to set permissions on: {}", path.display()))?;
    }

    #[cfg(not(unix))]
    let _ = path;

    Ok(())
}

/// Writes data as 4-space indented JSON to a file atomically.
///
/// Map key order is whatever `data` serializes in; use ordered maps for
/// stable output.
pub fn write_json_file<T>(path: &Path, data: &T) -> Result<()>
where
    T: Serialize,
{
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    data.serialize(&mut serializer)
        .with_context(|| format!("Failed to serialize JSON for: {}", path.display()))?;

    atomic_write(path, &buf).with_context(|| format!("Failed to write JSON file: {}", path.display()))
}
