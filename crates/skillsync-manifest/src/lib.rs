//! # skillsync-manifest
//!
//! The provenance manifest (`upstream.json`) records, for every skill pulled
//! from an upstream GitHub repository, where it comes from and which commit
//! is currently materialized on disk.
//!
//! ## Format
//!
//! ```json
//! {
//!   "bun": {
//!     "sourceRepo": "org/bun-skills",
//!     "sourcePath": "skills/bun",
//!     "sourceRef": "main",
//!     "lastSyncedSha": "abc123",
//!     "lastSyncedAt": "2025-01-02T03:04:05Z"
//!   }
//! }
//! ```
//!
//! An array of records carrying `skillName` is accepted on read; writes always
//! use the keyed form above. [`ManifestStore`] is the only component that
//! touches the file.

pub mod manifest;
pub mod store;

pub use manifest::Manifest;
pub use store::{ManifestStore, StagedManifest, validate_entry};
