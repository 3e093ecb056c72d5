use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration, maps to `skillsync.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub github: GithubConfig,
    pub sync: SessionConfig,
    pub logging: LoggingConfig,
}

// ── GitHub ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    /// Base URL of the GitHub REST API.
    pub api_url: String,
    /// Name of the environment variable holding the bearer token.
    /// `GH_TOKEN` is consulted when this one is unset.
    pub token_env: String,
    /// Value of the `User-Agent` header GitHub requires on every request.
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Retries for timeouts, connection errors and 5xx responses.
    pub max_retries: u32,
    /// Base delay for exponential backoff (doubles each retry).
    pub retry_base_delay_ms: u64,
    /// Resolved bearer token. Never read from or written to the config file.
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".into(),
            token_env: "GITHUB_TOKEN".into(),
            user_agent: format!("skillsync/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 500,
            token: None,
        }
    }
}

// ── Session ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Path of the provenance manifest.
    pub manifest: PathBuf,
    /// Directory holding one subdirectory per skill.
    pub skills_dir: PathBuf,
    /// Entries processed at once. 1 = strictly sequential.
    pub concurrency: usize,
    /// Longest rate-limit wait the session sits out before retrying an entry
    /// in the same run. Longer waits defer the entry to the next run.
    pub max_rate_limit_wait_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from("upstream.json"),
            skills_dir: PathBuf::from("skills"),
            concurrency: 1,
            max_rate_limit_wait_secs: 60,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

/// Upper bound on `sync.concurrency`.
pub const MAX_CONCURRENCY: usize = 8;

/// Concurrency above this tends to trip GitHub's secondary rate limits.
pub const SAFE_CONCURRENCY: usize = 4;

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "note",
        };
        write!(f, "{}: {}: {}", label, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, " ({})", h)?;
        }
        Ok(())
    }
}

impl SyncConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── GitHub API ───
        let api_url = self.github.api_url.trim();
        if api_url.is_empty() {
            warnings.push(ConfigWarning {
                field: "github.api_url".into(),
                message: "api_url is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to 'https://api.github.com' or your GitHub Enterprise API URL".into()),
            });
        } else if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            warnings.push(ConfigWarning {
                field: "github.api_url".into(),
                message: format!("api_url '{}' is not an http(s) URL", api_url),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }

        if self.github.user_agent.trim().is_empty() {
            warnings.push(ConfigWarning {
                field: "github.user_agent".into(),
                message: "user_agent is empty; GitHub rejects requests without one".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 'skillsync'".into()),
            });
        }

        if self.github.timeout_secs == 0 {
            warnings.push(ConfigWarning {
                field: "github.timeout_secs".into(),
                message: "timeout is 0, every request would time out".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 30".into()),
            });
        }

        if self.github.max_retries > 10 {
            warnings.push(ConfigWarning {
                field: "github.max_retries".into(),
                message: format!("{} retries with exponential backoff can stall a run for a long time", self.github.max_retries),
                severity: WarningSeverity::Warning,
                hint: Some("3 is usually enough".into()),
            });
        }

        if self.github.token.is_none() {
            warnings.push(ConfigWarning {
                field: "github.token_env".into(),
                message: format!("${} is not set, requests are unauthenticated", self.github.token_env),
                severity: WarningSeverity::Info,
                hint: Some("Unauthenticated clients get 60 requests per hour".into()),
            });
        }

        // ── Concurrency ───
        if self.sync.concurrency == 0 || self.sync.concurrency > MAX_CONCURRENCY {
            warnings.push(ConfigWarning {
                field: "sync.concurrency".into(),
                message: format!("concurrency {} is out of range", self.sync.concurrency),
                severity: WarningSeverity::Error,
                hint: Some(format!("Must be between 1 and {}", MAX_CONCURRENCY)),
            });
        } else if self.sync.concurrency > SAFE_CONCURRENCY {
            warnings.push(ConfigWarning {
                field: "sync.concurrency".into(),
                message: format!("concurrency {} may trip GitHub's secondary rate limits", self.sync.concurrency),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Consider {} or less", SAFE_CONCURRENCY)),
            });
        }

        // ── Paths ───
        if self.sync.manifest.as_os_str().is_empty() {
            warnings.push(ConfigWarning {
                field: "sync.manifest".into(),
                message: "manifest path is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 'upstream.json'".into()),
            });
        }
        if self.sync.skills_dir.as_os_str().is_empty() {
            warnings.push(ConfigWarning {
                field: "sync.skills_dir".into(),
                message: "skills_dir is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 'skills'".into()),
            });
        }

        // ── Logging format ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        // ── Logging level ───
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        // Check for hard errors
        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
