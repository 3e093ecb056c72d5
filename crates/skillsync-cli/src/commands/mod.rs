use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use skillsync_config::schema::MAX_CONCURRENCY;
use skillsync_config::{ConfigLoader, ConfigWarning, SyncConfig, WarningSeverity};
use skillsync_core::SyncError;
use skillsync_engine::{SessionOptions, SyncEngine, SyncSession};
use skillsync_github::GitHubFetcher;

mod manifest;
mod sync;

/// Keep upstream-tracked skills in sync with their GitHub sources
#[derive(Parser)]
#[command(name = "skillsync", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to skillsync.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Path to the upstream manifest (default: upstream.json)
    #[arg(short, long, global = true)]
    manifest: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull upstream changes into local skill directories
    Sync {
        /// Only sync the named skill (repeatable)
        #[arg(short, long = "skill", value_name = "NAME")]
        skills: Vec<String>,

        /// Skills processed at once (1 = sequential)
        #[arg(long, value_parser = clap::value_parser!(u16).range(1..=MAX_CONCURRENCY as i64))]
        concurrency: Option<u16>,

        /// Directory holding one subdirectory per skill (default: skills)
        #[arg(long, value_name = "DIR")]
        skills_dir: Option<PathBuf>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Report which skills are behind upstream, without changing anything
    Check {
        /// Only check the named skill (repeatable)
        #[arg(short, long = "skill", value_name = "NAME")]
        skills: Vec<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the manifest without contacting GitHub
    Status,
    /// Register a new upstream-tracked skill
    Add {
        /// Skill name (local directory name)
        skill: String,
        /// Upstream repository as owner/repo
        repo: String,
        /// Path inside the repository that maps to the skill root
        path: String,
        /// Branch or tag to track (default: the repository's default branch)
        #[arg(long = "ref", value_name = "REF")]
        git_ref: Option<String>,
    },
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// How a command finished, mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// At least one entry failed.
    Failed,
    /// Stopped by Ctrl-C before every entry was visited.
    Interrupted,
}

impl Outcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::Failed => 1,
            Outcome::Interrupted => 130,
        }
    }
}

impl Cli {
    pub async fn run(self) -> skillsync_core::Result<Outcome> {
        // Load config first so we can use it for log format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let mut config = config_loader.get();

        // Resolve log level: --verbose > --quiet > --log-level > config
        let log_level = if self.verbose {
            "debug".to_string()
        } else if self.quiet {
            "error".to_string()
        } else {
            self.log_level
                .clone()
                .unwrap_or_else(|| config.logging.level.clone())
        };
        init_tracing(&log_level, &config.logging.format);

        self.apply_overrides(&mut config);
        // the loader validated before a subscriber existed, and before CLI overrides
        log_config_warnings(&config)?;

        match self.command {
            Commands::Sync { skills, json, .. } => sync::cmd_sync(&config, &skills, json).await,
            Commands::Check { skills, json } => sync::cmd_check(&config, &skills, json).await,
            Commands::Status => manifest::cmd_status(&config.sync.manifest),
            Commands::Add {
                skill,
                repo,
                path,
                git_ref,
            } => manifest::cmd_add(&config.sync.manifest, &skill, &repo, &path, git_ref.as_deref()),
            Commands::Completions { shell } => Self::cmd_completions(shell),
        }
    }

    fn apply_overrides(&self, config: &mut SyncConfig) {
        if let Some(ref manifest) = self.manifest {
            config.sync.manifest = manifest.clone();
        }
        if let Commands::Sync {
            concurrency,
            ref skills_dir,
            ..
        } = self.command
        {
            if let Some(n) = concurrency {
                config.sync.concurrency = usize::from(n);
            }
            if let Some(dir) = skills_dir {
                config.sync.skills_dir = dir.clone();
            }
        }
    }

    fn cmd_completions(shell: Shell) -> skillsync_core::Result<Outcome> {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "skillsync", &mut std::io::stdout());
        Ok(Outcome::Success)
    }
}

/// Logs go to stderr so `--json` output on stdout stays parseable.
/// `RUST_LOG` wins over every other level setting.
fn init_tracing(level: &str, format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let result = match format {
        "json" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .with_target(true)
            .try_init(),
        "compact" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .compact()
            .with_target(false)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init(),
    };
    // already installed (e.g. a second run in the same process)
    let _ = result;
}

/// Log validation findings for the effective config; errors abort the run.
fn log_config_warnings(config: &SyncConfig) -> skillsync_core::Result<Vec<ConfigWarning>> {
    let warnings = config.validate().map_err(SyncError::Config)?;
    for w in &warnings {
        match w.severity {
            WarningSeverity::Info => debug!("{}", w),
            _ => warn!("{}", w),
        }
    }
    Ok(warnings)
}

/// Wire the GitHub fetcher, engine, and session from config.
fn build_session(config: &SyncConfig) -> skillsync_core::Result<SyncSession> {
    let fetcher = GitHubFetcher::new(&config.github)?;
    let engine = SyncEngine::new(Arc::new(fetcher), &config.sync.skills_dir);
    Ok(SyncSession::new(
        Arc::new(engine),
        SessionOptions::from(&config.sync),
    ))
}
