use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::source::RemoteSource;
use skillsync_core::{CommitSha, RemoteFile, Result, SyncError};

/// Scripted failure for a [`MockRemote`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFailure {
    NotFound,
    RateLimited(u64),
    Transient,
    Api(u16),
}

impl MockFailure {
    fn to_error(&self, what: &str) -> SyncError {
        match self {
            MockFailure::NotFound => SyncError::NotFound(what.to_string()),
            MockFailure::RateLimited(secs) => SyncError::RateLimited {
                retry_after_secs: *secs,
            },
            MockFailure::Transient => SyncError::TransientNetwork(format!("connection reset: {what}")),
            MockFailure::Api(status) => SyncError::Api {
                status: *status,
                message: format!("mock failure for {what}"),
            },
        }
    }
}

/// A call observed by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    ResolveHead {
        repo: String,
        git_ref: Option<String>,
    },
    FetchTree {
        repo: String,
        sha: String,
        path: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Op {
    Resolve,
    Tree,
}

#[derive(Debug, Clone)]
struct FailureRule {
    failure: MockFailure,
    /// `None` fails every call.
    remaining: Option<u32>,
}

#[derive(Default)]
struct MockState {
    /// `repo` or `repo@ref` -> head SHA.
    heads: HashMap<String, CommitSha>,
    /// `repo:path` -> files under that path.
    trees: HashMap<String, Vec<RemoteFile>>,
    failures: HashMap<(Op, String), FailureRule>,
    calls: Vec<MockCall>,
}

/// In-memory [`RemoteSource`] for tests.
///
/// Heads and trees are keyed by repository (and ref / path). Failures can be
/// scripted per repository, either permanently or for the next call only.
/// Cloning shares state, so a test can keep a handle after handing the mock
/// to an engine.
#[derive(Clone, Default)]
pub struct MockRemote {
    state: Arc<Mutex<MockState>>,
    latency: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

fn head_key(repo: &str, git_ref: Option<&str>) -> String {
    match git_ref {
        Some(r) => format!("{repo}@{r}"),
        None => repo.to_string(),
    }
}

fn tree_key(repo: &str, path: &str) -> String {
    format!("{repo}:{}", path.trim_matches('/'))
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Head SHA for `repo` at `git_ref` (`None` = default branch).
    pub fn with_head(self, repo: &str, git_ref: Option<&str>, sha: &str) -> Self {
        self.set_head(repo, git_ref, sha);
        self
    }

    pub fn with_file(self, repo: &str, path: &str, file: &str, content: &str) -> Self {
        self.set_file(repo, path, file, content);
        self
    }

    /// Fail every `resolve_head_sha` call for `repo`.
    pub fn fail_resolve(self, repo: &str, failure: MockFailure) -> Self {
        self.add_failure(Op::Resolve, repo, failure, None);
        self
    }

    /// Fail the next `resolve_head_sha` call for `repo` only.
    pub fn fail_resolve_once(self, repo: &str, failure: MockFailure) -> Self {
        self.add_failure(Op::Resolve, repo, failure, Some(1));
        self
    }

    /// Fail every `fetch_tree` call for `repo`.
    pub fn fail_tree(self, repo: &str, failure: MockFailure) -> Self {
        self.add_failure(Op::Tree, repo, failure, None);
        self
    }

    pub fn fail_tree_once(self, repo: &str, failure: MockFailure) -> Self {
        self.add_failure(Op::Tree, repo, failure, Some(1));
        self
    }

    /// Delay every call, for observing concurrency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set_head(&self, repo: &str, git_ref: Option<&str>, sha: &str) {
        self.state()
            .heads
            .insert(head_key(repo, git_ref), sha.to_string());
    }

    /// Add or replace one file under `repo:path`.
    pub fn set_file(&self, repo: &str, path: &str, file: &str, content: &str) {
        let mut state = self.state();
        let files = state.trees.entry(tree_key(repo, path)).or_default();
        files.retain(|f| f.path != file);
        files.push(RemoteFile::new(file, content));
    }

    /// Replace everything under `repo:path`.
    pub fn set_tree(&self, repo: &str, path: &str, files: Vec<RemoteFile>) {
        self.state().trees.insert(tree_key(repo, path), files);
    }

    /// Forget `repo:path` entirely; later fetches are `NotFound`.
    pub fn clear_tree(&self, repo: &str, path: &str) {
        self.state().trees.remove(&tree_key(repo, path));
    }

    fn add_failure(&self, op: Op, repo: &str, failure: MockFailure, remaining: Option<u32>) {
        self.state()
            .failures
            .insert((op, repo.to_string()), FailureRule { failure, remaining });
    }

    fn take_failure(state: &mut MockState, op: Op, repo: &str) -> Option<MockFailure> {
        let key = (op, repo.to_string());
        let rule = state.failures.get_mut(&key)?;
        let failure = rule.failure.clone();
        if let Some(n) = rule.remaining.as_mut() {
            *n = n.saturating_sub(1);
        }
        if rule.remaining == Some(0) {
            state.failures.remove(&key);
        }
        Some(failure)
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    pub fn resolve_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::ResolveHead { .. }))
            .count()
    }

    pub fn tree_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::FetchTree { .. }))
            .count()
    }

    /// Highest number of calls that were in progress at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteSource for MockRemote {
    fn name(&self) -> &str {
        "mock"
    }

    async fn resolve_head_sha(&self, repo: &str, git_ref: Option<&str>) -> Result<CommitSha> {
        self.enter().await;
        let result = {
            let mut state = self.state();
            state.calls.push(MockCall::ResolveHead {
                repo: repo.to_string(),
                git_ref: git_ref.map(str::to_string),
            });
            let what = head_key(repo, git_ref);
            match Self::take_failure(&mut state, Op::Resolve, repo) {
                Some(failure) => Err(failure.to_error(&what)),
                None => state
                    .heads
                    .get(&what)
                    .cloned()
                    .ok_or(SyncError::NotFound(what)),
            }
        };
        self.leave();
        result
    }

    async fn fetch_tree(&self, repo: &str, sha: &str, path: &str) -> Result<Vec<RemoteFile>> {
        self.enter().await;
        let result = {
            let mut state = self.state();
            state.calls.push(MockCall::FetchTree {
                repo: repo.to_string(),
                sha: sha.to_string(),
                path: path.to_string(),
            });
            let what = tree_key(repo, path);
            match Self::take_failure(&mut state, Op::Tree, repo) {
                Some(failure) => Err(failure.to_error(&what)),
                None => match state.trees.get(&what) {
                    Some(files) => {
                        let mut files = files.clone();
                        files.sort_by(|a, b| a.path.cmp(&b.path));
                        Ok(files)
                    }
                    None => Err(SyncError::NotFound(what)),
                },
            }
        };
        self.leave();
        result
    }
}
