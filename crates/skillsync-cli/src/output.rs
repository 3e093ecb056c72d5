use console::style;
use serde::Serialize;
use std::path::Path;

use skillsync_core::{CheckResult, SyncError, SyncResult, SyncStatus};
use skillsync_engine::SessionReport;
use skillsync_manifest::Manifest;

const SHORT_SHA_LEN: usize = 7;

pub fn emit_json<T: Serialize>(value: &T) -> skillsync_core::Result<()> {
    let payload = serde_json::to_string_pretty(value).map_err(SyncError::from)?;
    println!("{payload}");
    Ok(())
}

pub fn short_sha(sha: &str) -> &str {
    sha.get(..SHORT_SHA_LEN).unwrap_or(sha)
}

fn name_width<'a>(names: impl Iterator<Item = &'a str>) -> usize {
    names.map(str::len).max().unwrap_or(0).max(4)
}

fn result_line(result: &SyncResult, width: usize) -> String {
    let sha = result.sha.as_deref().map(short_sha).unwrap_or("-");
    match result.status {
        SyncStatus::Updated => format!(
            "  {} {:width$}  {}  {} ({} files)",
            style("✓").green(),
            result.skill_name,
            style("updated  ").green(),
            sha,
            result.files_written,
        ),
        SyncStatus::Unchanged => format!(
            "  {} {:width$}  {}  {}",
            style("=").dim(),
            result.skill_name,
            style("unchanged").dim(),
            sha,
        ),
        SyncStatus::Failed => {
            let detail = result
                .error
                .as_ref()
                .map(|e| format!("[{}] {}", e.kind, e.message))
                .unwrap_or_default();
            format!(
                "  {} {:width$}  {}  {}",
                style("✗").red(),
                result.skill_name,
                style("failed   ").red(),
                detail,
            )
        }
    }
}

pub fn print_sync_report(report: &SessionReport) {
    let width = name_width(
        report
            .results
            .iter()
            .map(|r| r.skill_name.as_str())
            .chain(report.skipped.iter().map(String::as_str)),
    );

    for result in &report.results {
        println!("{}", result_line(result, width));
    }
    for name in &report.skipped {
        println!("  {} {:width$}  {}", style("-").yellow(), name, style("skipped").yellow());
    }

    let summary = report.summary();
    println!();
    println!(
        "{} {} updated, {} unchanged, {} failed{}",
        style("Summary:").bold(),
        summary.updated,
        summary.unchanged,
        summary.failed,
        if summary.skipped > 0 {
            format!(", {} skipped", summary.skipped)
        } else {
            String::new()
        }
    );

    if summary.failed > 0 {
        println!();
        println!("{}", style("Failures:").red().bold());
        for failure in report.failures() {
            if let Some(ref err) = failure.error {
                println!("  {} ({}): {}", failure.skill_name, err.kind, err.message);
                if let Some(secs) = err.retry_after_secs {
                    println!("    retry after {secs}s");
                }
            }
        }
    }
    if report.interrupted {
        println!();
        println!("{}", style("Interrupted: skipped skills were left untouched.").yellow());
    }
}

pub fn print_checks(checks: &[CheckResult]) {
    let width = name_width(checks.iter().map(|c| c.skill_name.as_str()));
    for check in checks {
        let recorded = check.recorded_sha.as_deref().map(short_sha).unwrap_or("never");
        match (&check.error, &check.remote_sha) {
            (Some(err), _) => println!(
                "  {} {:width$}  {}  [{}] {}",
                style("✗").red(),
                check.skill_name,
                style("error   ").red(),
                err.kind,
                err.message
            ),
            (None, Some(remote)) if check.outdated => println!(
                "  {} {:width$}  {}  {} -> {}",
                style("↑").yellow(),
                check.skill_name,
                style("outdated").yellow(),
                recorded,
                short_sha(remote)
            ),
            _ => println!(
                "  {} {:width$}  {}  {}",
                style("=").dim(),
                check.skill_name,
                style("current ").dim(),
                recorded
            ),
        }
    }

    let outdated = checks.iter().filter(|c| c.outdated).count();
    let failed = checks.iter().filter(|c| c.error.is_some()).count();
    println!();
    println!(
        "{} {} outdated, {} current, {} failed",
        style("Summary:").bold(),
        outdated,
        checks.len() - outdated - failed,
        failed
    );
}

pub fn print_status(manifest: &Manifest, path: &Path) {
    println!("{} {}", style("Manifest:").bold(), path.display());
    if manifest.is_empty() {
        println!("  (no upstream-tracked skills)");
        return;
    }
    println!();

    let width = name_width(manifest.entries().map(|e| e.skill_name.as_str()));
    for entry in manifest.entries() {
        let source = format!("{}:{}", entry.source_repo, entry.source_path);
        let git_ref = entry.source_ref.as_deref().unwrap_or("(default)");
        let sha = entry.last_synced_sha.as_deref().map(short_sha).unwrap_or("never");
        let at = entry
            .last_synced_at
            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "  {:width$}  {}  {}  {}  {}",
            style(&entry.skill_name).bold(),
            source,
            style(git_ref).dim(),
            sha,
            style(at).dim()
        );
    }
}
