use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, SyncError};

/// Name of a tracked skill; doubles as its local directory name.
pub type SkillName = String;

/// Git commit hash as returned by GitHub.
pub type CommitSha = String;

/// Provenance record for one upstream-tracked skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// Filled from the object key in the keyed manifest form, read from the
    /// record itself in the array form. Never written back inside the record.
    #[serde(default, skip_serializing)]
    pub skill_name: SkillName,
    /// `owner/repo` of the upstream repository.
    pub source_repo: String,
    /// Path inside the upstream repository that maps to the skill root.
    pub source_path: String,
    /// Branch or tag to track. `None` tracks the repository's default branch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    #[serde(default)]
    pub last_synced_sha: Option<CommitSha>,
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Fields this tool does not know about, carried through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ManifestEntry {
    pub fn new(skill_name: &str, source_repo: &str, source_path: &str) -> Self {
        Self {
            skill_name: skill_name.to_string(),
            source_repo: source_repo.to_string(),
            source_path: source_path.to_string(),
            source_ref: None,
            last_synced_sha: None,
            last_synced_at: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_ref(mut self, source_ref: &str) -> Self {
        self.source_ref = Some(source_ref.to_string());
        self
    }

    pub fn with_sha(mut self, sha: &str) -> Self {
        self.last_synced_sha = Some(sha.to_string());
        self
    }

    /// Split `source_repo` into `(owner, repo)`.
    pub fn owner_repo(&self) -> Option<(&str, &str)> {
        let (owner, repo) = self.source_repo.split_once('/')?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        Some((owner, repo))
    }

    /// Record a successful sync in place.
    pub fn mark_synced(&mut self, sha: &str, at: DateTime<Utc>) {
        self.last_synced_sha = Some(sha.to_string());
        self.last_synced_at = Some(at);
    }
}

/// A single file of upstream content, path relative to the skill root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub path: String,
    pub content: Vec<u8>,
}

impl RemoteFile {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Unchanged,
    Updated,
    Failed,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Unchanged => f.write_str("unchanged"),
            SyncStatus::Updated => f.write_str("updated"),
            SyncStatus::Failed => f.write_str("failed"),
        }
    }
}

/// Cloneable snapshot of the error that failed an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub kind: ErrorKind,
    pub message: String,
    /// Present for rate-limit failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl From<&SyncError> for SyncFailure {
    fn from(err: &SyncError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            retry_after_secs: err.retry_after().map(|d| d.as_secs()),
        }
    }
}

/// Outcome of syncing one manifest entry. Built fresh every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub skill_name: SkillName,
    pub status: SyncStatus,
    /// Upstream SHA observed for this entry (the new one when updated).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<CommitSha>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub files_written: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SyncFailure>,
}

impl SyncResult {
    pub fn unchanged(skill_name: &str, sha: &str) -> Self {
        Self {
            skill_name: skill_name.to_string(),
            status: SyncStatus::Unchanged,
            sha: Some(sha.to_string()),
            synced_at: None,
            files_written: 0,
            error: None,
        }
    }

    pub fn updated(skill_name: &str, sha: &str, at: DateTime<Utc>, files_written: usize) -> Self {
        Self {
            skill_name: skill_name.to_string(),
            status: SyncStatus::Updated,
            sha: Some(sha.to_string()),
            synced_at: Some(at),
            files_written,
            error: None,
        }
    }

    pub fn failed(skill_name: &str, err: &SyncError) -> Self {
        Self {
            skill_name: skill_name.to_string(),
            status: SyncStatus::Failed,
            sha: None,
            synced_at: None,
            files_written: 0,
            error: Some(SyncFailure::from(err)),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == SyncStatus::Failed
    }

    /// Rate-limit wait carried by a failed result, if any.
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        self.error
            .as_ref()
            .filter(|e| e.kind == ErrorKind::RateLimit)
            .and_then(|e| e.retry_after_secs)
            .map(std::time::Duration::from_secs)
    }
}

/// Outcome of a read-only freshness check for one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub skill_name: SkillName,
    pub recorded_sha: Option<CommitSha>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_sha: Option<CommitSha>,
    pub outdated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SyncFailure>,
}
