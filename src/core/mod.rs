//! Core types and error handling for icebox
//!
//! Everything else in the crate reports failures through [`IceboxError`],
//! usually wrapped in an [`anyhow::Error`] with added context. The CLI turns
//! those into an [`ErrorContext`] via [`user_friendly_error`].

pub mod error;

pub use error::{ErrorContext, IceboxError, user_friendly_error};
