use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for the whole synchronizer.
#[derive(Error, Debug)]
pub enum SyncError {
    // ── Manifest errors ────────────────────────────────────────
    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("manifest validation failed: {field}: {reason}")]
    ManifestValidation { field: String, reason: String },

    // ── Remote errors ──────────────────────────────────────────
    #[error("not found upstream: {0}")]
    NotFound(String),

    #[error("github rate limit hit, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("github api error: HTTP {status}: {message}")]
    Api { status: u16, message: String },

    // ── Local filesystem errors ────────────────────────────────
    #[error("write failed: {path}: {reason}")]
    Write { path: String, reason: String },

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Coarse classification of a [`SyncError`], stable across releases and
/// printed in summaries and JSON output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Manifest,
    NotFound,
    RateLimit,
    TransientNetwork,
    Api,
    Write,
    Config,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Manifest => "manifest",
            ErrorKind::NotFound => "not_found",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::TransientNetwork => "transient_network",
            ErrorKind::Api => "api",
            ErrorKind::Write => "write",
            ErrorKind::Config => "config",
            ErrorKind::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Manifest(_) | SyncError::ManifestValidation { .. } => ErrorKind::Manifest,
            SyncError::NotFound(_) => ErrorKind::NotFound,
            SyncError::RateLimited { .. } => ErrorKind::RateLimit,
            SyncError::TransientNetwork(_) => ErrorKind::TransientNetwork,
            SyncError::Api { .. } => ErrorKind::Api,
            SyncError::Write { .. } | SyncError::Io(_) => ErrorKind::Write,
            SyncError::Config(_) => ErrorKind::Config,
            SyncError::Serialization(_) | SyncError::Other(_) => ErrorKind::Other,
        }
    }

    /// Only manifest errors abort a whole run; everything else is scoped to
    /// the entry that produced it.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Manifest
    }

    /// Errors the fetcher retries on its own before giving up.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::TransientNetwork(_))
    }

    /// Wait carried by a rate-limit error.
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            SyncError::RateLimited { retry_after_secs } => {
                Some(std::time::Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        }
    }

    pub fn write(path: impl AsRef<std::path::Path>, reason: impl std::fmt::Display) -> Self {
        SyncError::Write {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
