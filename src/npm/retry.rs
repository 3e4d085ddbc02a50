//! Bounded retry for npm installs.
//!
//! Registry installs fail transiently often enough (timeouts, dropped
//! connections, registry 5xx) that a single failure should not end a run.
//! [`RetryPolicy`] retries a fallible async operation a fixed number of times
//! with a fixed pause between attempts.
//!
//! The policy is an explicit state machine:
//!
//! ```text
//! Attempting(1) --ok--> Succeeded
//!      |
//!    error (retryable, attempt < max) --> Retrying --sleep--> Attempting(n+1)
//!      |
//!    error (permanent, or attempt == max) --> Exhausted
//! ```

use crate::constants::{DEFAULT_INSTALL_ATTEMPTS, DEFAULT_INSTALL_RETRY_DELAY};
use crate::core::IceboxError;
use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;

/// Where a retried operation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Running the given attempt (1-based)
    Attempting {
        /// Attempt number
        attempt: u32,
    },
    /// An attempt failed; the next one starts after the delay
    Retrying {
        /// Number of the upcoming attempt
        next_attempt: u32,
    },
    /// The operation succeeded
    Succeeded {
        /// Attempts used, including the successful one
        attempts: u32,
    },
    /// No further attempts will be made
    Exhausted {
        /// Attempts used
        attempts: u32,
    },
}

/// Result of a single attempt, as far as the policy is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The attempt succeeded
    Success,
    /// The attempt failed and another attempt may succeed
    RetryableFailure,
    /// The attempt failed in a way retrying cannot fix
    PermanentFailure,
}

/// The error of the final attempt of a failed run.
#[derive(Debug)]
pub struct RetryFailure {
    /// Error returned by the last attempt
    pub error: anyhow::Error,
    /// Attempts made
    pub attempts: u32,
    /// Whether the run stopped because attempts ran out (as opposed to a permanent error)
    pub exhausted: bool,
}

/// Fixed-interval retry with a bounded number of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first; at least 1
    pub max_attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_INSTALL_ATTEMPTS,
            delay: DEFAULT_INSTALL_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` of 0 is treated as 1.
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// State following `attempt` finishing with `outcome`.
    #[must_use]
    pub const fn next_state(&self, attempt: u32, outcome: AttemptOutcome) -> RetryState {
        match outcome {
            AttemptOutcome::Success => RetryState::Succeeded {
                attempts: attempt,
            },
            AttemptOutcome::RetryableFailure if attempt < self.max_attempts => {
                RetryState::Retrying {
                    next_attempt: attempt + 1,
                }
            }
            AttemptOutcome::RetryableFailure | AttemptOutcome::PermanentFailure => {
                RetryState::Exhausted {
                    attempts: attempt,
                }
            }
        }
    }

    /// Drives `operation` until it succeeds or the policy gives up.
    ///
    /// `operation` receives the 1-based attempt number. Errors carrying a
    /// non-retryable [`IceboxError`] anywhere in their chain end the run
    /// after that attempt.
    ///
    /// # Errors
    ///
    /// Returns a [`RetryFailure`] holding the last attempt's error.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, RetryFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut delays = FixedInterval::new(self.delay);
        let mut attempt = 1;

        loop {
            let error = match operation(attempt).await {
                Ok(value) => {
                    tracing::trace!("Succeeded on attempt {attempt}/{}", self.max_attempts);
                    return Ok(value);
                }
                Err(error) => error,
            };

            let outcome = if is_retryable(&error) {
                AttemptOutcome::RetryableFailure
            } else {
                AttemptOutcome::PermanentFailure
            };

            match self.next_state(attempt, outcome) {
                RetryState::Retrying {
                    next_attempt,
                } => {
                    let delay = delays.next().unwrap_or(self.delay);
                    tracing::warn!(
                        "Attempt {attempt}/{} failed, retrying in {}s: {error:#}",
                        self.max_attempts,
                        delay.as_secs()
                    );
                    tokio::time::sleep(delay).await;
                    attempt = next_attempt;
                }
                RetryState::Exhausted {
                    attempts,
                } => {
                    return Err(RetryFailure {
                        error,
                        attempts,
                        exhausted: outcome == AttemptOutcome::RetryableFailure,
                    });
                }
                RetryState::Attempting {
                    ..
                }
                | RetryState::Succeeded {
                    ..
                } => {
                    return Err(RetryFailure {
                        error,
                        attempts: attempt,
                        exhausted: false,
                    });
                }
            }
        }
    }
}

/// An error is retryable unless an [`IceboxError`] in its chain says otherwise.
#[must_use]
pub fn is_retryable(error: &anyhow::Error) -> bool {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<IceboxError>())
        .is_none_or(IceboxError::is_retryable)
}
