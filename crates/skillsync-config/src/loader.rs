use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::schema::{SyncConfig, WarningSeverity};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "skillsync.toml";

/// Token variable consulted when the configured one is unset.
pub const FALLBACK_TOKEN_ENV: &str = "GH_TOKEN";

/// Loads the skillsync configuration.
pub struct ConfigLoader {
    config: SyncConfig,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > SKILLSYNC_CONFIG env > ./skillsync.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("SKILLSYNC_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from(CONFIG_FILE_NAME)
    }

    /// Load the config from disk, falling back to defaults when the default
    /// file is absent. An explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> skillsync_core::Result<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Same as [`ConfigLoader::load`] with a caller-supplied environment.
    pub fn load_with_env<F>(path: Option<&Path>, env: F) -> skillsync_core::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            Self::parse(&raw, &config_path)?
        } else if path.is_some() {
            return Err(skillsync_core::SyncError::Config(format!(
                "config file not found: {}",
                config_path.display()
            )));
        } else {
            debug!(?config_path, "config file not found, using defaults");
            SyncConfig::default()
        };

        let config = Self::apply_env_overrides(config, &env);

        // Validate: log warnings, fail on errors
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    match w.severity {
                        WarningSeverity::Info => debug!("{}", w),
                        _ => warn!("{}", w),
                    }
                }
            }
            Err(e) => {
                return Err(skillsync_core::SyncError::Config(e));
            }
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    fn parse(raw: &str, config_path: &Path) -> skillsync_core::Result<SyncConfig> {
        toml::from_str::<SyncConfig>(raw).map_err(|e| {
            skillsync_core::SyncError::Config(format!(
                "failed to parse {}: {}",
                config_path.display(),
                e
            ))
        })
    }

    /// Get a snapshot of the loaded config.
    pub fn get(&self) -> SyncConfig {
        self.config.clone()
    }

    /// Path the config was (or would have been) read from.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (SKILLSYNC_MANIFEST, SKILLSYNC_CONCURRENCY, etc.)
    /// and resolve the GitHub token.
    fn apply_env_overrides<F>(mut config: SyncConfig, env: &F) -> SyncConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = env("SKILLSYNC_MANIFEST") {
            config.sync.manifest = PathBuf::from(v);
        }
        if let Some(v) = env("SKILLSYNC_SKILLS_DIR") {
            config.sync.skills_dir = PathBuf::from(v);
        }
        if let Some(v) = env("SKILLSYNC_CONCURRENCY") {
            match v.parse::<usize>() {
                Ok(n) => config.sync.concurrency = n,
                Err(_) => warn!(value = %v, "ignoring non-numeric SKILLSYNC_CONCURRENCY"),
            }
        }
        if let Some(v) = env("SKILLSYNC_GITHUB_API_URL") {
            config.github.api_url = v;
        }
        if let Some(v) = env("SKILLSYNC_LOG_LEVEL") {
            config.logging.level = v;
        }

        // Configured variable first, GH_TOKEN as fallback. Blank values count as unset.
        let non_blank = |key: &str| {
            env(key)
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
        };
        config.github.token =
            non_blank(&config.github.token_env).or_else(|| non_blank(FALLBACK_TOKEN_ENV));

        config
    }
}
