//! Builder for `npm` invocations.
//!
//! Every call icebox makes to npm goes through [`NpmCommand`], which puts the
//! global options in a fixed order, captures output, applies an optional
//! timeout and logs the command line under the `npm` tracing target.
//!
//! ```text
//! npm [--prefix P] [--proxy X --https-proxy X] [--verbose] [--registry R] <args...>
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::core::IceboxError;

/// Locates the npm executable on `PATH`.
///
/// # Errors
///
/// Returns [`IceboxError::NpmNotFound`] if npm is not installed.
pub fn find_npm() -> Result<PathBuf> {
    which::which("npm").map_err(|_| IceboxError::NpmNotFound.into())
}

/// A single npm invocation.
#[derive(Debug, Clone, Default)]
pub struct NpmCommand {
    /// Program to run; located on `PATH` when unset
    program: Option<PathBuf>,

    /// Subcommand and its arguments
    args: Vec<String>,

    /// Value for `--prefix`
    prefix: Option<PathBuf>,

    /// Value for `--proxy` and `--https-proxy`
    proxy: Option<String>,

    /// Value for `--registry`
    registry: Option<String>,

    /// Whether to pass `--verbose`
    verbose: bool,

    /// Maximum run time; `None` waits indefinitely
    timeout_duration: Option<Duration>,

    /// Short description used in log lines
    context: Option<String>,
}

/// Captured output of a successful npm invocation.
#[derive(Debug, Clone)]
pub struct NpmCommandOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

impl NpmCommand {
    /// Creates an empty command.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `npm install <source>`.
    #[must_use]
    pub fn install(source: &str) -> Self {
        Self::new().args(["install", source])
    }

    /// `npm view <name>@<version> os --json`, the platforms a package supports.
    #[must_use]
    pub fn view_os(name: &str, version: &str) -> Self {
        Self::new().arg("view").arg(format!("{name}@{version}")).args(["os", "--json"])
    }

    /// Runs `program` instead of the npm found on `PATH`.
    #[must_use]
    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// Adds a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Installs under `dir` (`--prefix`).
    #[must_use]
    pub fn prefix(mut self, dir: impl AsRef<Path>) -> Self {
        self.prefix = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Routes HTTP and HTTPS traffic through `proxy`.
    #[must_use]
    pub fn proxy(mut self, proxy: Option<&str>) -> Self {
        self.proxy = proxy.map(str::to_string);
        self
    }

    /// Uses `registry` instead of npm's configured registry.
    #[must_use]
    pub fn registry(mut self, registry: Option<&str>) -> Self {
        self.registry = registry.map(str::to_string);
        self
    }

    /// Passes `--verbose` to npm.
    #[must_use]
    pub const fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Kills the process if it runs longer than `duration`.
    #[must_use]
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Labels log lines for this command, e.g. with the module being installed.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Full argument list in the order npm receives it.
    #[must_use]
    pub fn build_args(&self) -> Vec<String> {
        let mut full_args = Vec::new();
        if let Some(ref prefix) = self.prefix {
            full_args.push("--prefix".to_string());
            full_args.push(prefix.display().to_string());
        }
        if let Some(ref proxy) = self.proxy {
            full_args.extend(["--proxy".to_string(), proxy.clone()]);
            full_args.extend(["--https-proxy".to_string(), proxy.clone()]);
        }
        if self.verbose {
            full_args.push("--verbose".to_string());
        }
        if let Some(ref registry) = self.registry {
            full_args.push("--registry".to_string());
            full_args.push(registry.clone());
        }
        full_args.extend(self.args.iter().cloned());
        full_args
    }

    fn operation(&self) -> String {
        self.args.first().cloned().unwrap_or_else(|| "unknown".to_string())
    }

    /// Runs the command and waits for it to finish.
    ///
    /// # Errors
    ///
    /// - [`IceboxError::NpmNotFound`] if no program is set and npm is not on `PATH`
    /// - [`IceboxError::NpmCommandError`] on a non-zero exit or timeout, with
    ///   npm's stderr (or stdout when stderr is empty)
    pub async fn execute(self) -> Result<NpmCommandOutput> {
        let start = std::time::Instant::now();
        let program = match self.program.clone() {
            Some(program) => program,
            None => find_npm()?,
        };
        let full_args = self.build_args();
        let command_line = format!("npm {}", full_args.join(" "));

        if let Some(ref ctx) = self.context {
            tracing::debug!(target: "npm", "({}) Executing command: {}", ctx, command_line);
        } else {
            tracing::debug!(target: "npm", "Executing command: {}", command_line);
        }

        let mut cmd = Command::new(&program);
        cmd.args(&full_args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let output_future = cmd.output();
        let output = if let Some(duration) = self.timeout_duration {
            if let Ok(result) = timeout(duration, output_future).await {
                result.with_context(|| format!("Failed to execute {command_line}"))?
            } else {
                tracing::warn!(
                    target: "npm",
                    "Command timed out after {} seconds: {}",
                    duration.as_secs(),
                    command_line
                );
                return Err(IceboxError::NpmCommandError {
                    operation: self.operation(),
                    stderr: format!(
                        "npm timed out after {} seconds. Check network connectivity, \
                        or try running the command manually: {command_line}",
                        duration.as_secs()
                    ),
                }
                .into());
            }
        } else {
            output_future.await.with_context(|| format!("Failed to execute {command_line}"))?
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            tracing::debug!(
                target: "npm",
                "Command failed with exit code: {:?}",
                output.status.code()
            );
            if !stderr.is_empty() {
                tracing::debug!(target: "npm", "Error: {}", stderr.trim());
            }
            return Err(IceboxError::NpmCommandError {
                operation: self.operation(),
                stderr: if stderr.trim().is_empty() {
                    stdout
                } else {
                    stderr
                },
            }
            .into());
        }

        if !stdout.trim().is_empty() {
            tracing::trace!(target: "npm", "{}", stdout.trim());
        }
        if !stderr.trim().is_empty() {
            tracing::trace!(target: "npm", "{}", stderr.trim());
        }

        let elapsed = start.elapsed();
        if elapsed.as_secs() > 1 {
            if let Some(ref ctx) = self.context {
                tracing::info!(target: "npm::perf", "({}) npm {} took {:.2}s", ctx, self.operation(), elapsed.as_secs_f64());
            } else {
                tracing::info!(target: "npm::perf", "npm {} took {:.2}s", self.operation(), elapsed.as_secs_f64());
            }
        }

        Ok(NpmCommandOutput {
            stdout,
            stderr,
        })
    }
}
