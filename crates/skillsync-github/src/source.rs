use async_trait::async_trait;
use skillsync_core::{CommitSha, RemoteFile, Result};

/// Where upstream skill content comes from.
///
/// Implemented by [`crate::GitHubFetcher`] for the real API and by
/// [`crate::MockRemote`] for tests.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Human-readable name, e.g. "github".
    fn name(&self) -> &str;

    /// Current commit SHA of `git_ref` in `repo` (`owner/repo`).
    /// `None` resolves the repository's default branch.
    async fn resolve_head_sha(&self, repo: &str, git_ref: Option<&str>) -> Result<CommitSha>;

    /// Every file under `path` at commit `sha`, paths relative to `path`,
    /// sorted by path. A missing path is `SyncError::NotFound`.
    async fn fetch_tree(&self, repo: &str, sha: &str, path: &str) -> Result<Vec<RemoteFile>>;
}
