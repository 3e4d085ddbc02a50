//! Integration test suite for icebox
//!
//! End-to-end tests of installing projects from `npm-shrinkwrap.json`. npm is
//! never run: library tests use the recording installer from
//! `icebox::test_utils`, and binary tests install offline from a cache seeded
//! the same way.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **install**: whole-project installs through `install_project`
//! - **cache**: cache decomposition and reuse across projects
//! - **cli**: the `icebox` binary, exit statuses and error output
//! - **config**: global config file discovery

mod cache;
mod cli;
mod common;
mod config;
mod install;
