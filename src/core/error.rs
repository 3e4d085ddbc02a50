//! Error handling for icebox
//!
//! This module provides the error types and user-friendly error reporting for
//! icebox. The error system is built around two principles:
//! 1. **Strongly-typed errors** so install policy (offline aborts, retryability,
//!    force mode) can be decided by matching on a variant
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Architecture
//!
//! - [`IceboxError`] - Enumerated error types for every failure icebox reports
//! - [`ErrorContext`] - Wrapper that adds details and a suggestion for display
//!
//! # Error Categories
//!
//! - **Lockfile**: [`IceboxError::LockfileNotFound`], [`IceboxError::LockfileParseError`],
//!   [`IceboxError::InvalidDependency`]
//! - **Installer**: [`IceboxError::NpmNotFound`], [`IceboxError::NpmCommandError`],
//!   [`IceboxError::PlatformIncompatible`], [`IceboxError::InstallFailed`]
//! - **Cache**: [`IceboxError::OfflineCacheMiss`], [`IceboxError::CacheEntryMissing`],
//!   [`IceboxError::InvalidModule`]
//! - **File System**: [`IceboxError::FileSystemError`]
//!
//! # Examples
//!
//! ```rust,no_run
//! use icebox::core::{IceboxError, user_friendly_error};
//!
//! let error = IceboxError::OfflineCacheMiss {
//!     name: "io".to_string(),
//!     version: "0.0.1".to_string(),
//!     url: "https://registry.npmjs.org/io/-/io-0.0.1.tgz".to_string(),
//! };
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display(); // Prints a coloured error with a suggestion
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for icebox operations
///
/// Each variant represents one failure mode with enough context (module name,
/// version, source, path) to reproduce the failure from the log alone.
#[derive(Error, Debug)]
pub enum IceboxError {
    /// No lockfile was found at or above the working directory
    #[error("Cannot find npm-shrinkwrap.json in {path} or any parent directory")]
    LockfileNotFound {
        /// Directory the search started from
        path: String,
    },

    /// The working directory passed to icebox does not exist
    #[error("Directory does not exist: {path}")]
    DirectoryNotFound {
        /// The missing directory
        path: String,
    },

    /// The lockfile is not valid JSON or not a JSON object
    #[error("Invalid lockfile syntax in {file}")]
    LockfileParseError {
        /// Path to the lockfile
        file: String,
        /// Parser error message
        reason: String,
    },

    /// A lockfile dependency entry has a field of the wrong type
    ///
    /// Raised while building the dependency tree, before any install activity.
    #[error("Invalid value {value} for {name}.{field}, expected {expected}")]
    InvalidDependency {
        /// Name of the dependency entry
        name: String,
        /// Offending field (`version`, `dependencies`, ...)
        field: String,
        /// The offending JSON value, rendered
        value: String,
        /// Expected JSON type
        expected: String,
    },

    /// The `npm` executable could not be located in PATH
    #[error("npm is not installed or not found in PATH")]
    NpmNotFound,

    /// A single npm invocation exited unsuccessfully
    #[error("npm operation failed: {operation}")]
    NpmCommandError {
        /// The npm subcommand that failed (e.g., "install", "view")
        operation: String,
        /// Captured error output
        stderr: String,
    },

    /// The module declares an `os` restriction that excludes this host
    ///
    /// Never retried.
    #[error("Cannot install {name}@{version} on platform {platform}")]
    PlatformIncompatible {
        /// Module name
        name: String,
        /// Module version
        version: String,
        /// Host platform in npm naming
        platform: String,
    },

    /// Every install attempt failed
    #[error("Failed to install {name}@{version} from {url} after {attempts} attempt(s)")]
    InstallFailed {
        /// Module name
        name: String,
        /// Module version
        version: String,
        /// Source URL passed to npm
        url: String,
        /// Number of attempts made
        attempts: u32,
        /// The last error observed
        reason: String,
    },

    /// A module is missing from the cache while running offline
    ///
    /// Always fatal to the whole run, regardless of force mode.
    #[error("Module {name}@{version} is not cached and offline mode is enabled")]
    OfflineCacheMiss {
        /// Module name
        name: String,
        /// Module version
        version: String,
        /// Source URL the module would be fetched from
        url: String,
    },

    /// Materialize was asked for an entry that does not exist
    #[error("Cache entry {name}@{version} does not exist")]
    CacheEntryMissing {
        /// Module name
        name: String,
        /// Module version
        version: String,
    },

    /// A module directory has a missing or unreadable `package.json`
    #[error("Invalid node module at {path}: {reason}")]
    InvalidModule {
        /// Module directory
        path: String,
        /// What was wrong with its manifest
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// File system error
    #[error("File system error: {operation} ({path})")]
    FileSystemError {
        /// The file system operation that failed
        operation: String,
        /// Path where the file system error occurred
        path: String,
        /// Underlying reason
        reason: String,
    },

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Other error
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

impl IceboxError {
    /// Whether another install attempt could plausibly succeed.
    ///
    /// Platform incompatibility and a missing npm binary are permanent for the
    /// lifetime of the process.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::PlatformIncompatible { .. } | Self::NpmNotFound)
    }
}

impl Clone for IceboxError {
    fn clone(&self) -> Self {
        match self {
            Self::LockfileNotFound {
                path,
            } => Self::LockfileNotFound {
                path: path.clone(),
            },
            Self::DirectoryNotFound {
                path,
            } => Self::DirectoryNotFound {
                path: path.clone(),
            },
            Self::LockfileParseError {
                file,
                reason,
            } => Self::LockfileParseError {
                file: file.clone(),
                reason: reason.clone(),
            },
            Self::InvalidDependency {
                name,
                field,
                value,
                expected,
            } => Self::InvalidDependency {
                name: name.clone(),
                field: field.clone(),
                value: value.clone(),
                expected: expected.clone(),
            },
            Self::NpmNotFound => Self::NpmNotFound,
            Self::NpmCommandError {
                operation,
                stderr,
            } => Self::NpmCommandError {
                operation: operation.clone(),
                stderr: stderr.clone(),
            },
            Self::PlatformIncompatible {
                name,
                version,
                platform,
            } => Self::PlatformIncompatible {
                name: name.clone(),
                version: version.clone(),
                platform: platform.clone(),
            },
            Self::InstallFailed {
                name,
                version,
                url,
                attempts,
                reason,
            } => Self::InstallFailed {
                name: name.clone(),
                version: version.clone(),
                url: url.clone(),
                attempts: *attempts,
                reason: reason.clone(),
            },
            Self::OfflineCacheMiss {
                name,
                version,
                url,
            } => Self::OfflineCacheMiss {
                name: name.clone(),
                version: version.clone(),
                url: url.clone(),
            },
            Self::CacheEntryMissing {
                name,
                version,
            } => Self::CacheEntryMissing {
                name: name.clone(),
                version: version.clone(),
            },
            Self::InvalidModule {
                path,
                reason,
            } => Self::InvalidModule {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::ConfigError {
                message,
            } => Self::ConfigError {
                message: message.clone(),
            },
            Self::FileSystemError {
                operation,
                path,
                reason,
            } => Self::FileSystemError {
                operation: operation.clone(),
                path: path.clone(),
                reason: reason.clone(),
            },
            // toml errors are not Clone
            Self::TomlError(e) => Self::Other {
                message: format!("TOML parsing error: {e}"),
            },
            Self::Other {
                message,
            } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

/// Error context wrapper that provides user-friendly error information
///
/// Combines an [`IceboxError`] with optional details (why it happened) and a
/// suggestion (what to do about it).
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying icebox error
    pub error: IceboxError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: IceboxError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors
    ///
    /// - Error message: red and bold
    /// - Details: yellow
    /// - Suggestion: green
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error to a user-friendly [`ErrorContext`] with actionable suggestions
///
/// Recognizes [`IceboxError`] anywhere in the error chain, common
/// [`std::io::Error`] kinds, and falls back to the full error chain for
/// everything else.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    // Context layers wrap the typed error, so look through the whole chain
    if let Some(icebox_error) = error.chain().find_map(|e| e.downcast_ref::<IceboxError>()) {
        let mut ctx = create_error_context(icebox_error.clone());
        if ctx.details.is_none() {
            let outer = error.to_string();
            if outer != icebox_error.to_string() {
                ctx.details = Some(outer);
            }
        }
        return ctx;
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(IceboxError::FileSystemError {
                    operation: "file access".to_string(),
                    path: "unknown".to_string(),
                    reason: io_error.to_string(),
                })
                .with_suggestion("Check ownership and permissions of the cache and project directories")
                .with_details("icebox does not have permission to read or write a file it needs");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(IceboxError::FileSystemError {
                    operation: "file access".to_string(),
                    path: "unknown".to_string(),
                    reason: io_error.to_string(),
                })
                .with_suggestion("Check that the file or directory exists and the path is correct");
            }
            _ => {}
        }
    }

    // Generic error - include the full error chain for better diagnostics
    let mut message = error.to_string();
    let chain: Vec<String> =
        error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(IceboxError::Other {
        message,
    })
}

/// Map each [`IceboxError`] variant to an [`ErrorContext`] with tailored suggestions.
fn create_error_context(error: IceboxError) -> ErrorContext {
    match &error {
        IceboxError::LockfileNotFound { .. } => ErrorContext::new(error.clone())
            .with_suggestion("Run 'npm shrinkwrap' in your project to generate npm-shrinkwrap.json, or pass --cwd")
            .with_details("icebox looks for npm-shrinkwrap.json in the working directory and its parents"),

        IceboxError::LockfileParseError { file, reason } => ErrorContext::new(error.clone())
            .with_suggestion(format!("Check that {file} is valid JSON"))
            .with_details(reason.clone()),

        IceboxError::InvalidDependency { name, .. } => ErrorContext::new(error.clone())
            .with_suggestion(format!(
                "Fix the '{name}' entry in npm-shrinkwrap.json or regenerate it with 'npm shrinkwrap'"
            ))
            .with_details("Every lockfile entry needs a string 'version' and an object 'dependencies' (if present)"),

        IceboxError::NpmNotFound => ErrorContext::new(error.clone())
            .with_suggestion("Install Node.js and npm, and make sure 'npm' is in your PATH")
            .with_details("icebox delegates fetching modules to npm on a cache miss"),

        IceboxError::NpmCommandError { stderr, .. } => ErrorContext::new(error.clone())
            .with_suggestion("Check your network connection, registry URL and proxy settings")
            .with_details(stderr.trim().to_string()),

        IceboxError::PlatformIncompatible { name, .. } => ErrorContext::new(error.clone())
            .with_suggestion(format!(
                "Re-run with --force to skip '{name}', or remove it from the lockfile for this platform"
            ))
            .with_details("The module's package metadata restricts the operating systems it supports"),

        IceboxError::InstallFailed { reason, .. } => ErrorContext::new(error.clone())
            .with_suggestion("Check your network connection, or re-run with --force to continue past failing modules")
            .with_details(reason.clone()),

        IceboxError::OfflineCacheMiss { .. } => ErrorContext::new(error.clone())
            .with_suggestion("Run the install once without --offline to populate the cache")
            .with_details("Offline mode never contacts the registry, so every module must already be cached"),

        IceboxError::FileSystemError { path, reason, .. } => ErrorContext::new(error.clone())
            .with_suggestion("Check free disk space and permissions")
            .with_details(format!("{path}: {reason}")),

        _ => ErrorContext::new(error.clone()),
    }
}
