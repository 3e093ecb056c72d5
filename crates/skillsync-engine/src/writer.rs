//! Full subtree replacement of a skill directory.
//!
//! A sync never merges with what is on disk: the skill directory ends up
//! holding exactly the fetched files and nothing else. Local edits inside a
//! synced skill are overwritten on the next update.

use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use skillsync_core::{RemoteFile, Result, SyncError};

#[derive(Debug, Clone)]
pub struct SkillWriter {
    skills_dir: PathBuf,
}

impl SkillWriter {
    pub fn new(skills_dir: impl Into<PathBuf>) -> Self {
        Self {
            skills_dir: skills_dir.into(),
        }
    }

    pub fn skills_dir(&self) -> &Path {
        &self.skills_dir
    }

    pub fn skill_dir(&self, skill: &str) -> PathBuf {
        self.skills_dir.join(skill)
    }

    /// Replace the contents of `<skills_dir>/<skill>` with exactly `files`.
    ///
    /// Files are written into a sibling staging directory first, which is
    /// then swapped in. If anything fails before the swap, the existing
    /// directory is left as it was. Returns the number of files written.
    pub fn replace(&self, skill: &str, files: &[RemoteFile]) -> Result<usize> {
        if !is_plain_component(skill) {
            return Err(SyncError::write(self.skill_dir(skill), "invalid skill directory name"));
        }
        let relative: Vec<PathBuf> = files
            .iter()
            .map(|f| safe_relative_path(&f.path).ok_or_else(|| {
                SyncError::write(self.skill_dir(skill), format!("unsafe upstream path '{}'", f.path))
            }))
            .collect::<Result<_>>()?;

        fs::create_dir_all(&self.skills_dir).map_err(|e| SyncError::write(&self.skills_dir, e))?;

        let staging = tempfile::Builder::new()
            .prefix(&format!(".{skill}."))
            .suffix(".staging")
            .tempdir_in(&self.skills_dir)
            .map_err(|e| SyncError::write(&self.skills_dir, e))?;

        for (file, rel) in files.iter().zip(&relative) {
            let dest = staging.path().join(rel);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| SyncError::write(&dest, e))?;
            }
            fs::write(&dest, &file.content).map_err(|e| SyncError::write(&dest, e))?;
        }

        self.swap_in(skill, staging.path())?;
        // staging now lives at the skill path; dropping the guard finds nothing to remove
        drop(staging);

        debug!(skill, files = files.len(), "skill directory replaced");
        Ok(files.len())
    }

    fn swap_in(&self, skill: &str, staged: &Path) -> Result<()> {
        let target = self.skill_dir(skill);
        if !target.exists() {
            return fs::rename(staged, &target).map_err(|e| SyncError::write(&target, e));
        }

        let backup = self.skills_dir.join(format!(".{skill}.old"));
        if backup.exists() {
            remove_path(&backup).map_err(|e| SyncError::write(&backup, e))?;
        }
        fs::rename(&target, &backup).map_err(|e| SyncError::write(&target, e))?;

        if let Err(e) = fs::rename(staged, &target) {
            if let Err(restore) = fs::rename(&backup, &target) {
                warn!(
                    skill,
                    backup = %backup.display(),
                    error = %restore,
                    "could not restore previous skill directory"
                );
            }
            return Err(SyncError::write(&target, e));
        }

        if let Err(e) = remove_path(&backup) {
            warn!(skill, path = %backup.display(), error = %e, "failed to remove old skill directory");
        }
        Ok(())
    }
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn is_plain_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}

/// `path` as a relative path that stays inside the skill directory, or
/// `None` for empty segments, `.`/`..`, absolute paths and prefixes.
fn safe_relative_path(path: &str) -> Option<PathBuf> {
    if path.is_empty() || path.contains('\\') {
        return None;
    }
    let mut out = PathBuf::new();
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return None;
        }
        out.push(segment);
    }
    // catches drive prefixes and anything else split('/') would miss
    if out.components().all(|c| matches!(c, Component::Normal(_))) {
        Some(out)
    } else {
        None
    }
}
