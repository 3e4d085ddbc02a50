//! Platform detection and platform-dependent paths.
//!
//! npm names operating systems after Node's `process.platform` (`darwin`,
//! `win32`, `linux`, ...), which differs from Rust's `std::env::consts::OS` for
//! macOS and Windows. Module `os` restrictions are written in npm's naming, so
//! the host platform is always reported that way here.

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Checks if the current platform is Windows.
#[must_use]
pub const fn is_windows() -> bool {
    cfg!(windows)
}

/// Returns the host operating system in npm (`process.platform`) naming.
#[must_use]
pub fn npm_platform() -> &'static str {
    npm_platform_name(std::env::consts::OS)
}

/// Maps a Rust OS name (`std::env::consts::OS`) to npm's naming.
#[must_use]
pub fn npm_platform_name(rust_os: &'static str) -> &'static str {
    match rust_os {
        "macos" => "darwin",
        "windows" => "win32",
        "solaris" | "illumos" => "sunos",
        other => other,
    }
}

/// Returns the user's home directory.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn get_home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| {
        let platform_help = if is_windows() {
            "On Windows: Check that the USERPROFILE environment variable is set"
        } else {
            "On Unix/Linux: Check that the HOME environment variable is set"
        };
        anyhow::anyhow!("Could not determine home directory.\n\n{platform_help}")
    })
}

/// Expands a leading `~` and `$VAR` / `${VAR}` references in a configured path.
///
/// # Errors
///
/// Returns an error if a referenced environment variable is not set.
pub fn resolve_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path).with_context(|| {
        format!(
            "Failed to expand path: {path}\n\n\
            Check that every variable it references ($VAR or ${{VAR}}) is set"
        )
    })?;
    Ok(PathBuf::from(expanded.as_ref()))
}
