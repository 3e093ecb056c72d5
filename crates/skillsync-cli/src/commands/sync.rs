use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{Outcome, build_session};
use crate::output;
use skillsync_config::SyncConfig;
use skillsync_core::CheckResult;
use skillsync_engine::{SessionReport, SessionSummary};
use skillsync_manifest::ManifestStore;

#[derive(Serialize)]
struct SyncOutput<'a> {
    summary: SessionSummary,
    #[serde(flatten)]
    report: &'a SessionReport,
}

#[derive(Serialize)]
struct CheckOutput<'a> {
    outdated: usize,
    failed: usize,
    results: &'a [CheckResult],
}

pub(super) async fn cmd_sync(
    config: &SyncConfig,
    skills: &[String],
    json: bool,
) -> skillsync_core::Result<Outcome> {
    let store = ManifestStore::new(&config.sync.manifest);
    let session = build_session(config)?;

    let cancel = CancellationToken::new();
    let watcher = watch_interrupt(cancel.clone());
    let report = session.run_with_store(&store, skills, &cancel).await;
    watcher.abort();
    let report = report?;

    if json {
        output::emit_json(&SyncOutput {
            summary: report.summary(),
            report: &report,
        })?;
    } else {
        output::print_sync_report(&report);
    }

    Ok(if report.interrupted {
        Outcome::Interrupted
    } else if report.is_success() {
        Outcome::Success
    } else {
        Outcome::Failed
    })
}

pub(super) async fn cmd_check(
    config: &SyncConfig,
    skills: &[String],
    json: bool,
) -> skillsync_core::Result<Outcome> {
    let manifest = ManifestStore::new(&config.sync.manifest).load()?;
    let session = build_session(config)?;

    let cancel = CancellationToken::new();
    let watcher = watch_interrupt(cancel.clone());
    let checks = session.check(&manifest, skills, &cancel).await;
    watcher.abort();
    let checks = checks?;

    let failed = checks.iter().filter(|c| c.error.is_some()).count();
    if json {
        output::emit_json(&CheckOutput {
            outdated: checks.iter().filter(|c| c.outdated).count(),
            failed,
            results: &checks,
        })?;
    } else {
        output::print_checks(&checks);
    }

    Ok(if cancel.is_cancelled() {
        Outcome::Interrupted
    } else if failed > 0 {
        Outcome::Failed
    } else {
        Outcome::Success
    })
}

/// Cancel `token` on Ctrl-C. In-flight skills finish; nothing new starts.
fn watch_interrupt(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight skills");
            token.cancel();
        }
    })
}
