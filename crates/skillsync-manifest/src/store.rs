use regex::Regex;
use std::fs::Permissions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::manifest::Manifest;
use skillsync_core::{ManifestEntry, Result, SyncError};

static KEBAB_CASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").expect("valid regex"));

/// The only reader and writer of the manifest file.
///
/// Saves go through a temp file in the manifest's directory followed by a
/// rename, so readers see either the old document or the new one.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read, parse and validate the manifest. A missing file is an error.
    pub fn load(&self) -> Result<Manifest> {
        if !self.path.exists() {
            return Err(SyncError::Manifest(format!(
                "manifest not found: {}",
                self.path.display()
            )));
        }
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            SyncError::Manifest(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        let manifest = parse(&raw).map_err(|e| match e {
            SyncError::Manifest(msg) => {
                SyncError::Manifest(format!("{}: {}", self.path.display(), msg))
            }
            other => other,
        })?;
        info!(path = ?self.path, entries = manifest.len(), "loaded manifest");
        Ok(manifest)
    }

    /// Like [`ManifestStore::load`], but a missing file yields an empty manifest.
    pub fn load_or_default(&self) -> Result<Manifest> {
        if self.path.exists() {
            self.load()
        } else {
            debug!(path = ?self.path, "manifest not found, starting empty");
            Ok(Manifest::new())
        }
    }

    /// Atomically replace the manifest file with `manifest`.
    pub fn save(&self, manifest: &Manifest) -> Result<()> {
        self.stage(manifest)?.commit()
    }

    /// Write `manifest` to a temp file next to the target without touching
    /// the target. Nothing is published until [`StagedManifest::commit`];
    /// dropping the stage discards the temp file.
    pub fn stage(&self, manifest: &Manifest) -> Result<StagedManifest> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| SyncError::write(&dir, e))?;

        let mut body = serde_json::to_string_pretty(manifest)?;
        body.push('\n');

        let mut temp = tempfile::Builder::new()
            .prefix(".upstream.")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|e| SyncError::write(&dir, e))?;
        // temp files are created 0600; keep the published mode readable
        if let Some(perms) = published_permissions(&self.path) {
            temp.as_file()
                .set_permissions(perms)
                .map_err(|e| SyncError::write(temp.path(), e))?;
        }
        temp.write_all(body.as_bytes())
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| SyncError::write(temp.path(), e))?;

        debug!(temp = ?temp.path(), "staged manifest");
        Ok(StagedManifest {
            temp,
            target: self.path.clone(),
        })
    }
}

/// Mode for the file about to replace `target`: the target's own, or 0644
/// when it does not exist yet.
fn published_permissions(target: &Path) -> Option<Permissions> {
    match std::fs::metadata(target) {
        Ok(meta) => Some(meta.permissions()),
        Err(_) => default_permissions(),
    }
}

#[cfg(unix)]
fn default_permissions() -> Option<Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions() -> Option<Permissions> {
    None
}

/// A fully written manifest waiting to be renamed into place.
#[derive(Debug)]
pub struct StagedManifest {
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedManifest {
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Rename the staged file over the manifest.
    pub fn commit(self) -> Result<()> {
        let target = self.target;
        self.temp
            .persist(&target)
            .map_err(|e| SyncError::write(&target, e.error))?;
        info!(path = ?target, "saved manifest");
        Ok(())
    }
}

/// Parse and validate a manifest document.
pub fn parse(raw: &str) -> Result<Manifest> {
    let mut manifest: Manifest =
        serde_json::from_str(raw).map_err(|e| SyncError::Manifest(format!("invalid manifest: {e}")))?;
    for entry in manifest.entries_mut() {
        normalize(entry);
    }
    for entry in manifest.entries() {
        validate_entry(entry)?;
    }
    Ok(manifest)
}

fn normalize(entry: &mut ManifestEntry) {
    entry.source_repo = entry.source_repo.trim().to_string();
    entry.source_path = entry.source_path.trim().trim_matches('/').to_string();
    if entry.source_ref.as_deref().is_some_and(|r| r.trim().is_empty()) {
        entry.source_ref = None;
    }
    if entry.last_synced_sha.as_deref().is_some_and(|s| s.trim().is_empty()) {
        entry.last_synced_sha = None;
    }
}

/// Check one entry. Used on load and before registering new entries.
pub fn validate_entry(entry: &ManifestEntry) -> Result<()> {
    let name = &entry.skill_name;
    let invalid = |field: &str, reason: String| SyncError::ManifestValidation {
        field: format!("{name}.{field}"),
        reason,
    };

    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.starts_with('.')
    {
        return Err(SyncError::ManifestValidation {
            field: format!("'{name}'"),
            reason: "skill name must be a plain directory name".into(),
        });
    }
    if !KEBAB_CASE.is_match(name) {
        warn!(skill = %name, "skill name is not kebab-case");
    }

    if entry.owner_repo().is_none() {
        return Err(invalid(
            "sourceRepo",
            format!("'{}' is not in owner/repo form", entry.source_repo),
        ));
    }

    if entry.source_path.split('/').any(|seg| seg == "..") {
        return Err(invalid(
            "sourcePath",
            format!("'{}' must not contain '..'", entry.source_path),
        ));
    }

    Ok(())
}
