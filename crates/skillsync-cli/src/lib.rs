//! # skillsync-cli
//!
//! Command-line interface for the upstream skill synchronizer.
//!
//! ## Commands
//!
//! - `skillsync sync`: pull upstream changes into local skill directories
//! - `skillsync check`: report outdated skills without changing anything
//! - `skillsync status`: print the manifest
//! - `skillsync add`: register a new upstream-tracked skill
//! - `skillsync completions`: shell completions
//!
//! Exit codes: 0 on success, 1 when any skill failed or the run could not
//! start, 130 when interrupted.

pub mod commands;
pub mod output;

pub use commands::{Cli, Outcome};
