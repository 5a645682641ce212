//! # gomod-branch-audit
//!
//! Audits the dependencies of a `go.mod` manifest against their upstream
//! git repositories: for every module pinned to a pseudo-version, it asks
//! the remote which branches contain the pinned commit and flags modules
//! whose commit does not live on a sanctioned branch (e.g. `main` or
//! `release-*`).
//!
//! Intended for CI pipelines, which can render the violations as JSON,
//! YAML or a simple table, and push them as line-anchored review comments
//! onto the pull request that introduced the dependency.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod analysis;
pub mod cli;
pub mod comments;
pub mod manifest;
pub mod render;
pub mod scm;

pub use crate::cli::Cli;

/// The current version of gomod-branch-audit.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
