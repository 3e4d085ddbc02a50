//! Cross-platform utilities shared by the cache store and install orchestrator.

pub mod fs;
pub mod platform;

pub use fs::{copy_dir, copy_dir_excluding, ensure_dir, normalize_path, remove_dir_all};
pub use platform::{get_home_dir, npm_platform, resolve_path};
