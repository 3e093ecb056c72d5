use std::path::Path;
use tracing::info;

use super::Outcome;
use crate::output;
use skillsync_core::{ManifestEntry, SyncError};
use skillsync_manifest::{ManifestStore, validate_entry};

pub(super) fn cmd_status(manifest_path: &Path) -> skillsync_core::Result<Outcome> {
    let manifest = ManifestStore::new(manifest_path).load()?;
    output::print_status(&manifest, manifest_path);
    Ok(Outcome::Success)
}

/// Register a skill with no SHA yet; the next sync pulls it.
pub(super) fn cmd_add(
    manifest_path: &Path,
    skill: &str,
    repo: &str,
    path: &str,
    git_ref: Option<&str>,
) -> skillsync_core::Result<Outcome> {
    let store = ManifestStore::new(manifest_path);
    let mut manifest = store.load_or_default()?;

    let mut entry = ManifestEntry::new(skill.trim(), repo.trim(), path.trim().trim_matches('/'));
    if let Some(r) = git_ref.map(str::trim).filter(|r| !r.is_empty()) {
        entry = entry.with_ref(r);
    }
    validate_entry(&entry)?;
    if manifest.contains(&entry.skill_name) {
        return Err(SyncError::ManifestValidation {
            field: format!("'{}'", entry.skill_name),
            reason: "already tracked in the manifest".into(),
        });
    }

    manifest.insert(entry.clone())?;
    store.save(&manifest)?;
    info!(skill = %entry.skill_name, repo = %entry.source_repo, "skill registered");

    println!(
        "Added {} <- {}:{}{}",
        entry.skill_name,
        entry.source_repo,
        entry.source_path,
        entry
            .source_ref
            .as_deref()
            .map(|r| format!(" @ {r}"))
            .unwrap_or_default()
    );
    println!("Run `skillsync sync --skill {}` to pull it.", entry.skill_name);
    Ok(Outcome::Success)
}
