use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info, warn};

use crate::writer::SkillWriter;
use skillsync_core::{CheckResult, ManifestEntry, Result, SyncError, SyncFailure, SyncResult};
use skillsync_github::RemoteSource;

/// Brings one skill directory in line with its upstream.
///
/// `sync_one` never returns an error: every failure is caught at the entry
/// boundary and reported as a failed [`SyncResult`], so one broken skill
/// cannot stop the others.
pub struct SyncEngine {
    remote: Arc<dyn RemoteSource>,
    writer: SkillWriter,
    /// Writes for one skill finish before the next skill's writes begin.
    write_gate: TokioMutex<()>,
}

impl SyncEngine {
    pub fn new(remote: Arc<dyn RemoteSource>, skills_dir: impl Into<PathBuf>) -> Self {
        Self {
            remote,
            writer: SkillWriter::new(skills_dir),
            write_gate: TokioMutex::new(()),
        }
    }

    pub fn skills_dir(&self) -> &Path {
        self.writer.skills_dir()
    }

    pub fn remote_name(&self) -> &str {
        self.remote.name()
    }

    /// Sync a single entry.
    ///
    /// 1. Resolve the upstream HEAD for the tracked ref.
    /// 2. Same as `lastSyncedSha`: report unchanged, touch nothing else.
    /// 3. Otherwise fetch the tree at that SHA and replace the local
    ///    directory with it.
    ///
    /// The returned result carries the new SHA and timestamp; the caller
    /// merges them into the manifest.
    pub async fn sync_one(&self, entry: &ManifestEntry) -> SyncResult {
        match self.try_sync(entry).await {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    skill = %entry.skill_name,
                    repo = %entry.source_repo,
                    kind = %e.kind(),
                    error = %e,
                    "skill sync failed"
                );
                SyncResult::failed(&entry.skill_name, &e)
            }
        }
    }

    async fn try_sync(&self, entry: &ManifestEntry) -> Result<SyncResult> {
        let name = entry.skill_name.as_str();
        let head = self
            .remote
            .resolve_head_sha(&entry.source_repo, entry.source_ref.as_deref())
            .await?;

        if entry.last_synced_sha.as_deref() == Some(head.as_str()) {
            debug!(skill = name, sha = %head, "up to date");
            return Ok(SyncResult::unchanged(name, &head));
        }

        let files = self
            .remote
            .fetch_tree(&entry.source_repo, &head, &entry.source_path)
            .await?;
        // git has no empty directories; an empty listing means the path is gone
        if files.is_empty() {
            return Err(SyncError::NotFound(format!(
                "{}:{}@{} has no files",
                entry.source_repo, entry.source_path, head
            )));
        }

        let written = {
            let _gate = self.write_gate.lock().await;
            let writer = self.writer.clone();
            let skill = name.to_string();
            // filesystem work stays off the async workers; resolves keep running
            tokio::task::spawn_blocking(move || writer.replace(&skill, &files))
                .await
                .map_err(|e| SyncError::write(self.writer.skill_dir(name), e))??
        };

        info!(
            skill = name,
            from = entry.last_synced_sha.as_deref().unwrap_or("none"),
            to = %head,
            files = written,
            "skill updated"
        );
        Ok(SyncResult::updated(name, &head, Utc::now(), written))
    }

    /// Compare the recorded SHA with upstream without fetching or writing.
    pub async fn check_one(&self, entry: &ManifestEntry) -> CheckResult {
        let remote = self
            .remote
            .resolve_head_sha(&entry.source_repo, entry.source_ref.as_deref())
            .await;
        match remote {
            Ok(sha) => CheckResult {
                skill_name: entry.skill_name.clone(),
                recorded_sha: entry.last_synced_sha.clone(),
                outdated: entry.last_synced_sha.as_deref() != Some(sha.as_str()),
                remote_sha: Some(sha),
                error: None,
            },
            Err(e) => {
                warn!(skill = %entry.skill_name, kind = %e.kind(), error = %e, "check failed");
                CheckResult {
                    skill_name: entry.skill_name.clone(),
                    recorded_sha: entry.last_synced_sha.clone(),
                    remote_sha: None,
                    outdated: false,
                    error: Some(SyncFailure::from(&e)),
                }
            }
        }
    }
}
