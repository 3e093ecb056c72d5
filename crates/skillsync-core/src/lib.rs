//! # skillsync-core
//!
//! Shared vocabulary for the skillsync workspace: manifest records, per-entry
//! sync outcomes, upstream file payloads, and the unified error type.

pub mod error;
pub mod types;

pub use error::{ErrorKind, Result, SyncError};
pub use types::*;
