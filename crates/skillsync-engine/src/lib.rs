//! # skillsync-engine
//!
//! The sync engine and the session that drives it.
//!
//! ```text
//!   upstream.json ──load──▶ Manifest
//!                              │
//!                              ▼
//!                        ┌───────────┐   per entry   ┌────────────┐
//!                        │  Session  │ ────────────▶ │   Engine   │
//!                        │ (reduce)  │ ◀──────────── │  sync_one  │
//!                        └─────┬─────┘   SyncResult  └─────┬──────┘
//!                              │                           │ resolve / fetch
//!                    save if changed                       ▼
//!                              │                     RemoteSource
//!                              ▼                     (GitHub API)
//!                        upstream.json
//! ```
//!
//! A skill update is a full subtree replace: the local directory ends up
//! holding exactly the upstream files at the new SHA.

pub mod engine;
pub mod session;
pub mod writer;

pub use engine::SyncEngine;
pub use session::{SessionOptions, SessionReport, SessionSummary, SyncSession};
pub use writer::SkillWriter;
