use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderMap};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::ratelimit::{DEFAULT_RATE_LIMIT_WAIT, next_page, rate_limit_wait};
use crate::retry::RetryPolicy;
use crate::source::RemoteSource;
use skillsync_config::GithubConfig;
use skillsync_core::{CommitSha, RemoteFile, Result, SyncError};

const API_VERSION: &str = "2022-11-28";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";
const PER_PAGE: &str = "100";
/// The contents endpoint stops listing a directory at this many entries.
const CONTENTS_LISTING_CAP: usize = 1000;

/// GitHub REST API client for resolving refs and pulling directory trees.
///
/// Transient failures (timeouts, connection errors, 5xx) are retried with
/// exponential backoff. Rate-limit responses are never retried here; they
/// surface as [`SyncError::RateLimited`] carrying the wait GitHub asked for.
pub struct GitHubFetcher {
    client: Client,
    api_url: Url,
    token: Option<String>,
    retry: RetryPolicy,
}

/// A response that has been read to the end.
struct Fetched {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

/// The contents endpoint returns an array for directories and a single
/// object for files.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Dir(Vec<ContentItem>),
    File(ContentItem),
}

impl GitHubFetcher {
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::Config(format!("HTTP client error: {e}")))?;

        let api_url = Url::parse(config.api_url.trim()).map_err(|e| {
            SyncError::Config(format!("invalid github.api_url '{}': {e}", config.api_url))
        })?;
        if api_url.cannot_be_a_base() {
            return Err(SyncError::Config(format!(
                "invalid github.api_url '{}'",
                config.api_url
            )));
        }

        info!(
            api_url = %api_url,
            authenticated = config.token.is_some(),
            "github fetcher ready"
        );

        Ok(Self {
            client,
            api_url,
            token: config.token.clone(),
            retry: RetryPolicy::new(
                config.max_retries,
                Duration::from_millis(config.retry_base_delay_ms),
            ),
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// `api_url` with `segments` appended, each percent-encoded.
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.api_url.clone();
        // cannot_be_a_base was rejected in new()
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(segments.into_iter().filter(|s| !s.is_empty()));
        }
        url
    }

    async fn get_once(&self, url: &Url, accept: &str) -> Result<Fetched> {
        let mut req = self
            .client
            .get(url.clone())
            .header(ACCEPT, accept)
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(classify_transport)?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await.map_err(classify_transport)?.to_vec();
        Ok(Fetched {
            status,
            headers,
            body,
        })
    }

    /// GET with transient retries; non-success statuses become typed errors.
    async fn get(&self, url: &Url, accept: &str, what: &str) -> Result<Fetched> {
        debug!(%url, "github request");
        self.retry
            .run(what, || async move {
                let fetched = self.get_once(url, accept).await?;
                check_status(fetched, what)
            })
            .await
    }

    async fn default_branch(&self, repo: &str) -> Result<String> {
        let (owner, name) = split_repo(repo)?;
        let url = self.endpoint(["repos", owner, name]);
        let fetched = self.get(&url, JSON_MEDIA_TYPE, repo).await?;
        let info: RepoResponse = parse_json(&fetched, repo)?;
        debug!(repo, branch = %info.default_branch, "resolved default branch");
        Ok(info.default_branch)
    }

    /// List a directory, draining every page. Returns the single item when
    /// `path` is a file.
    async fn list_contents(&self, repo: &str, sha: &str, path: &str) -> Result<ContentsResponse> {
        let (owner, name) = split_repo(repo)?;
        let mut url = self.endpoint(
            ["repos", owner, name, "contents"]
                .into_iter()
                .chain(path.split('/')),
        );
        url.query_pairs_mut()
            .append_pair("ref", sha)
            .append_pair("per_page", PER_PAGE);
        let what = format!("{repo}:{path}@{sha}");

        let first = self.get(&url, JSON_MEDIA_TYPE, &what).await?;
        let mut items = match parse_json::<ContentsResponse>(&first, &what)? {
            ContentsResponse::Dir(items) => items,
            file => return Ok(file),
        };

        let mut next = next_page(&first.headers);
        while let Some(link) = next {
            let url = Url::parse(&link).map_err(|e| SyncError::Api {
                status: first.status.as_u16(),
                message: format!("bad pagination link '{link}': {e}"),
            })?;
            let page = self.get(&url, JSON_MEDIA_TYPE, &what).await?;
            items.extend(parse_json::<Vec<ContentItem>>(&page, &what)?);
            next = next_page(&page.headers);
        }

        // a capped listing may be truncated; replacing from it would drop files
        if items.len() >= CONTENTS_LISTING_CAP {
            warn!(repo, path, entries = items.len(), "directory listing hit the contents cap");
            return Err(SyncError::Api {
                status: first.status.as_u16(),
                message: format!(
                    "{what}: directory lists {} entries, at or over the {CONTENTS_LISTING_CAP}-entry contents cap; refusing a possibly truncated tree",
                    items.len()
                ),
            });
        }

        Ok(ContentsResponse::Dir(items))
    }

    async fn download(&self, repo: &str, sha: &str, path: &str) -> Result<Vec<u8>> {
        let (owner, name) = split_repo(repo)?;
        let mut url = self.endpoint(
            ["repos", owner, name, "contents"]
                .into_iter()
                .chain(path.split('/')),
        );
        url.query_pairs_mut().append_pair("ref", sha);
        let what = format!("{repo}:{path}@{sha}");
        Ok(self.get(&url, RAW_MEDIA_TYPE, &what).await?.body)
    }
}

#[async_trait]
impl RemoteSource for GitHubFetcher {
    fn name(&self) -> &str {
        "github"
    }

    async fn resolve_head_sha(&self, repo: &str, git_ref: Option<&str>) -> Result<CommitSha> {
        let (owner, name) = split_repo(repo)?;
        let git_ref = match git_ref {
            Some(r) => r.to_string(),
            None => self.default_branch(repo).await?,
        };

        let url = self.endpoint(
            ["repos", owner, name, "commits"]
                .into_iter()
                .chain(git_ref.split('/')),
        );
        let what = format!("{repo}@{git_ref}");
        let fetched = match self.get(&url, JSON_MEDIA_TYPE, &what).await {
            // "No commit found for SHA": the ref does not exist
            Err(SyncError::Api { status: 422, .. }) => return Err(SyncError::NotFound(what)),
            other => other?,
        };
        let commit: CommitResponse = parse_json(&fetched, &what)?;
        debug!(repo, git_ref = %git_ref, sha = %commit.sha, "resolved head");
        Ok(commit.sha)
    }

    async fn fetch_tree(&self, repo: &str, sha: &str, path: &str) -> Result<Vec<RemoteFile>> {
        let root = path.trim_matches('/');
        let mut files = Vec::new();
        let mut pending = vec![root.to_string()];

        while let Some(dir) = pending.pop() {
            match self.list_contents(repo, sha, &dir).await? {
                ContentsResponse::File(item) => {
                    let content = self.download(repo, sha, &item.path).await?;
                    files.push(RemoteFile::new(item.name, content));
                }
                ContentsResponse::Dir(items) => {
                    for item in items {
                        match item.kind.as_str() {
                            "file" => {
                                let content = self.download(repo, sha, &item.path).await?;
                                files.push(RemoteFile::new(relative_to(root, &item.path), content));
                            }
                            "dir" => pending.push(item.path),
                            other => {
                                warn!(repo, path = %item.path, kind = other, "skipping unsupported entry")
                            }
                        }
                    }
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        info!(repo, sha, path = root, files = files.len(), "fetched tree");
        Ok(files)
    }
}

fn split_repo(repo: &str) -> Result<(&str, &str)> {
    match repo.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((owner, name))
        }
        _ => Err(SyncError::NotFound(format!("invalid repository '{repo}'"))),
    }
}

fn relative_to(root: &str, path: &str) -> String {
    if root.is_empty() {
        return path.to_string();
    }
    path.strip_prefix(root)
        .and_then(|p| p.strip_prefix('/'))
        .unwrap_or(path)
        .to_string()
}

fn classify_transport(err: reqwest::Error) -> SyncError {
    if err.is_builder() {
        SyncError::Config(format!("invalid request: {err}"))
    } else {
        SyncError::TransientNetwork(err.to_string())
    }
}

fn check_status(fetched: Fetched, what: &str) -> Result<Fetched> {
    let status = fetched.status;
    if status.is_success() {
        return Ok(fetched);
    }

    if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
        let now = chrono::Utc::now().timestamp();
        let wait = rate_limit_wait(&fetched.headers, now).or_else(|| {
            (status == StatusCode::TOO_MANY_REQUESTS).then_some(DEFAULT_RATE_LIMIT_WAIT)
        });
        if let Some(wait) = wait {
            warn!(request = what, wait_secs = wait.as_secs(), "github rate limit hit");
            return Err(SyncError::RateLimited {
                retry_after_secs: wait.as_secs(),
            });
        }
    }

    if status == StatusCode::NOT_FOUND {
        return Err(SyncError::NotFound(what.to_string()));
    }

    if status.is_server_error() {
        return Err(SyncError::TransientNetwork(format!("HTTP {status} from {what}")));
    }

    Err(SyncError::Api {
        status: status.as_u16(),
        message: api_message(&fetched.body),
    })
}

/// GitHub error bodies look like `{"message": "...", "documentation_url": "..."}`.
fn api_message(body: &[u8]) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(err) => err.message,
        Err(_) => String::from_utf8_lossy(body).chars().take(200).collect(),
    }
}

fn parse_json<T: DeserializeOwned>(fetched: &Fetched, what: &str) -> Result<T> {
    serde_json::from_slice(&fetched.body).map_err(|e| SyncError::Api {
        status: fetched.status.as_u16(),
        message: format!("unexpected response for {what}: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_repo_forms() {
        assert_eq!(split_repo("org/repo").unwrap(), ("org", "repo"));
        assert!(split_repo("org").is_err());
        assert!(split_repo("/repo").is_err());
        assert!(split_repo("org/repo/x").is_err());
    }

    #[test]
    fn relative_paths() {
        assert_eq!(relative_to("skills/bun", "skills/bun/SKILL.md"), "SKILL.md");
        assert_eq!(relative_to("skills/bun", "skills/bun/ref/api.md"), "ref/api.md");
        assert_eq!(relative_to("", "README.md"), "README.md");
    }

    #[test]
    fn api_message_prefers_json() {
        assert_eq!(api_message(br#"{"message":"Bad credentials"}"#), "Bad credentials");
        assert_eq!(api_message(b"plain text"), "plain text");
    }

    #[test]
    fn endpoint_encodes_segments() {
        let mut config = GithubConfig::default();
        config.api_url = "https://github.example.com/api/v3".into();
        let fetcher = GitHubFetcher::new(&config).unwrap();
        let url = fetcher.endpoint(["repos", "org", "repo", "contents", "docs", "a b.md"]);
        assert_eq!(
            url.as_str(),
            "https://github.example.com/api/v3/repos/org/repo/contents/docs/a%20b.md"
        );
    }
}
