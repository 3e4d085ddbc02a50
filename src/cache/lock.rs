//! Process-level lock on a cache directory.
//!
//! Every `add` reuses the same scratch prefix (`<cache>/.temp`), so two icebox
//! processes sharing a cache must not install at the same time. An install run
//! holds [`CacheLock`] from start to finish; a second process blocks in
//! [`CacheLock::acquire`] until the first one exits.
//!
//! ```text
//! {cache_dir}/.locks/cache.lock
//! ```
//!
//! The lock file itself is never deleted; only the OS lock on it matters.

use crate::constants::CACHE_LOCKS_DIR;
use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Name of the lock guarding the whole cache.
pub const CACHE_LOCK_NAME: &str = "cache";

/// An exclusive lock held until dropped.
#[derive(Debug)]
pub struct CacheLock {
    file: File,
    path: PathBuf,
}

impl CacheLock {
    /// Acquires the exclusive lock named `name` under `cache_dir`, waiting for other holders.
    ///
    /// Creates `.locks/` if needed. The blocking wait runs on tokio's blocking
    /// pool so the runtime stays responsive.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock directory or file cannot be created, or
    /// the file system does not support locking.
    pub async fn acquire(cache_dir: &Path, name: &str) -> Result<Self> {
        let locks_dir = cache_dir.join(CACHE_LOCKS_DIR);
        tokio::fs::create_dir_all(&locks_dir).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotADirectory {
                anyhow::anyhow!(
                    "Cannot create directory: cache path is not a directory ({})",
                    cache_dir.display()
                )
            } else if e.kind() == std::io::ErrorKind::PermissionDenied {
                anyhow::anyhow!(
                    "Permission denied: cannot create locks directory at {}",
                    locks_dir.display()
                )
            } else {
                anyhow::anyhow!("Failed to create directory {}: {}", locks_dir.display(), e)
            }
        })?;

        let lock_path = locks_dir.join(format!("{name}.lock"));
        let open_path = lock_path.clone();
        tracing::debug!(target: "cache", "Acquiring lock {}", lock_path.display());

        let file = tokio::task::spawn_blocking(move || -> Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&open_path)
                .with_context(|| format!("Failed to open lock file: {}", open_path.display()))?;

            file.lock_exclusive()
                .with_context(|| format!("Failed to acquire lock: {}", open_path.display()))?;

            Ok(file)
        })
        .await
        .context("Failed to spawn blocking task for lock acquisition")??;

        tracing::debug!(target: "cache", "Acquired lock {}", lock_path.display());
        Ok(Self {
            file,
            path: lock_path,
        })
    }

    /// Acquires the lock guarding the whole cache for an install run.
    ///
    /// # Errors
    ///
    /// See [`CacheLock::acquire`].
    pub async fn acquire_cache(cache_dir: &Path) -> Result<Self> {
        Self::acquire(cache_dir, CACHE_LOCK_NAME).await
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        #[allow(unstable_name_collisions)]
        if let Err(e) = self.file.unlock() {
            tracing::warn!(target: "cache", "Failed to unlock {}: {}", self.path.display(), e);
        }
    }
}
