use futures::{StreamExt, future, stream};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::SyncEngine;
use skillsync_config::SessionConfig;
use skillsync_core::{
    CheckResult, ManifestEntry, Result, SkillName, SyncError, SyncResult, SyncStatus,
};
use skillsync_manifest::{Manifest, ManifestStore};

/// Knobs for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Entries in flight at once. 1 processes strictly in order.
    pub concurrency: usize,
    /// Rate-limit waits up to this long are sat out and the entry retried
    /// once. Longer waits leave the entry failed for the next run.
    pub max_rate_limit_wait: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            max_rate_limit_wait: Duration::from_secs(60),
        }
    }
}

impl From<&SessionConfig> for SessionOptions {
    fn from(config: &SessionConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            max_rate_limit_wait: Duration::from_secs(config.max_rate_limit_wait_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub unchanged: usize,
    pub updated: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    /// One result per visited entry, ordered by skill name.
    pub results: Vec<SyncResult>,
    /// Selected entries never started because the run was interrupted.
    pub skipped: Vec<SkillName>,
    pub interrupted: bool,
    /// Whether the manifest was written back to disk.
    pub persisted: bool,
    /// Input manifest with every updated result merged in.
    #[serde(skip)]
    pub updated_manifest: Manifest,
}

impl SessionReport {
    pub fn summary(&self) -> SessionSummary {
        let mut summary = SessionSummary {
            skipped: self.skipped.len(),
            ..Default::default()
        };
        for result in &self.results {
            match result.status {
                SyncStatus::Unchanged => summary.unchanged += 1,
                SyncStatus::Updated => summary.updated += 1,
                SyncStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }

    pub fn failures(&self) -> impl Iterator<Item = &SyncResult> {
        self.results.iter().filter(|r| r.is_failed())
    }

    /// At least one entry was updated.
    pub fn changed(&self) -> bool {
        self.results.iter().any(|r| r.status == SyncStatus::Updated)
    }

    /// Every selected entry was visited and none failed.
    pub fn is_success(&self) -> bool {
        !self.interrupted && self.skipped.is_empty() && self.failures().next().is_none()
    }
}

/// Drives [`SyncEngine`] across the manifest.
///
/// The manifest is passed in as a value and an updated copy comes back;
/// results are folded into the draft by the single consumer of the result
/// stream, so concurrent entries never write shared state.
pub struct SyncSession {
    engine: Arc<SyncEngine>,
    options: SessionOptions,
}

impl SyncSession {
    pub fn new(engine: Arc<SyncEngine>, options: SessionOptions) -> Self {
        Self { engine, options }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Sync every selected entry and return the results with the updated
    /// manifest. Nothing is persisted here.
    ///
    /// Once `cancel` fires no new entry is started; entries already in
    /// flight run to completion and the rest are reported as skipped.
    pub async fn run(
        &self,
        manifest: &Manifest,
        filter: &[String],
        cancel: &CancellationToken,
    ) -> Result<SessionReport> {
        let selected = select(manifest, filter)?;
        let concurrency = self.options.concurrency.max(1);
        info!(
            entries = selected.len(),
            concurrency,
            remote = self.engine.remote_name(),
            "sync session started"
        );

        let mut draft = manifest.clone();
        let mut results: Vec<SyncResult> = Vec::with_capacity(selected.len());

        let mut pending = stream::iter(selected.iter())
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .map(move |entry| self.visit(entry, cancel))
            .buffer_unordered(concurrency);

        while let Some(result) = pending.next().await {
            draft.apply(&result);
            results.push(result);
        }

        results.sort_by(|a, b| a.skill_name.cmp(&b.skill_name));
        let visited: BTreeSet<&str> = results.iter().map(|r| r.skill_name.as_str()).collect();
        let skipped: Vec<SkillName> = selected
            .iter()
            .filter(|e| !visited.contains(e.skill_name.as_str()))
            .map(|e| e.skill_name.clone())
            .collect();
        let interrupted = cancel.is_cancelled();
        if interrupted {
            warn!(skipped = skipped.len(), "sync interrupted; remaining entries not started");
        }

        let report = SessionReport {
            results,
            skipped,
            interrupted,
            persisted: false,
            updated_manifest: draft,
        };
        let summary = report.summary();
        info!(
            unchanged = summary.unchanged,
            updated = summary.updated,
            failed = summary.failed,
            skipped = summary.skipped,
            "sync session finished"
        );
        Ok(report)
    }

    /// Load the manifest, run, and save it back if any entry changed.
    ///
    /// A manifest that cannot be loaded aborts before any network call.
    pub async fn run_with_store(
        &self,
        store: &ManifestStore,
        filter: &[String],
        cancel: &CancellationToken,
    ) -> Result<SessionReport> {
        let manifest = store.load()?;
        let mut report = self.run(&manifest, filter, cancel).await?;
        if report.changed() {
            store.save(&report.updated_manifest)?;
            report.persisted = true;
            info!(path = %store.path().display(), "manifest saved");
        }
        Ok(report)
    }

    /// Resolve upstream SHAs for the selected entries; no fetches, no writes.
    pub async fn check(
        &self,
        manifest: &Manifest,
        filter: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<CheckResult>> {
        let selected = select(manifest, filter)?;
        let mut checks: Vec<CheckResult> = stream::iter(selected.iter())
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .map(|entry| self.engine.check_one(entry))
            .buffer_unordered(self.options.concurrency.max(1))
            .collect()
            .await;
        checks.sort_by(|a, b| a.skill_name.cmp(&b.skill_name));
        Ok(checks)
    }

    /// One visit to one entry. A short rate-limit wait is sat out and the
    /// entry tried once more; the entry still yields a single result.
    async fn visit(&self, entry: &ManifestEntry, cancel: &CancellationToken) -> SyncResult {
        let result = self.engine.sync_one(entry).await;
        let Some(wait) = result.retry_after() else {
            return result;
        };

        if wait > self.options.max_rate_limit_wait {
            warn!(
                skill = %entry.skill_name,
                wait_secs = wait.as_secs(),
                "rate limited; deferring to next run"
            );
            return result;
        }

        info!(skill = %entry.skill_name, wait_secs = wait.as_secs(), "rate limited; waiting to retry");
        tokio::select! {
            _ = tokio::time::sleep(wait) => self.engine.sync_one(entry).await,
            _ = cancel.cancelled() => result,
        }
    }
}

/// Entries named by `filter`, or all of them when it is empty. Unknown
/// names are a manifest error so a typo fails before any network call.
fn select(manifest: &Manifest, filter: &[String]) -> Result<Vec<ManifestEntry>> {
    if filter.is_empty() {
        return Ok(manifest.entries().cloned().collect());
    }

    let wanted: BTreeSet<&str> = filter.iter().map(String::as_str).collect();
    let unknown: Vec<&str> = wanted
        .iter()
        .copied()
        .filter(|name| !manifest.contains(name))
        .collect();
    if !unknown.is_empty() {
        return Err(SyncError::Manifest(format!(
            "no such skill in manifest: {}",
            unknown.join(", ")
        )));
    }

    Ok(manifest
        .entries()
        .filter(|e| wanted.contains(e.skill_name.as_str()))
        .cloned()
        .collect())
}
