//! # skillsync-config
//!
//! Configuration for the synchronizer. Reads from `skillsync.toml`, environment
//! variables, and CLI overrides, in that precedence order.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::SyncConfig;
pub use schema::{ConfigWarning, GithubConfig, LoggingConfig, SessionConfig, WarningSeverity};
