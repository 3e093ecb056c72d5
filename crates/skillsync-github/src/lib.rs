//! # skillsync-github
//!
//! Remote side of the synchronizer. Resolves the current commit SHA of a
//! tracked ref and pulls a directory tree from the GitHub REST API, with
//! transient-failure retries and typed rate-limit errors.

pub mod github;
pub mod mock;
pub mod ratelimit;
pub mod retry;
pub mod source;

pub use github::GitHubFetcher;
pub use mock::{MockCall, MockFailure, MockRemote};
pub use retry::RetryPolicy;
pub use source::RemoteSource;
