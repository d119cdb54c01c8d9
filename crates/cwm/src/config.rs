//! Configuration: environment, CLI flags, and an optional TOML file.
//!
//! Mirrors `crates/healer/src/sensors/github_actions.rs`'s `SensorConfig`
//! (serde struct with per-field `#[serde(default = "fn")]`) combined with a
//! `clap::Parser` CLI the way `crates/healer/src/main.rs`'s `Cli` struct does.
//! Precedence: CLI flags > TOML file > built-in defaults.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Continuous Workflow Monitor: polls CI, classifies failures, applies
/// bounded auto-fixes, commits and pushes, repeats until stable or the
/// retry budget is exhausted.
#[derive(Parser, Debug, Clone)]
#[command(name = "cwm")]
#[command(version)]
pub struct Cli {
    /// Bearer token for the CI provider.
    #[arg(long, env = "CWM_CI_TOKEN")]
    pub ci_token: Option<String>,

    /// Repository owner (e.g. "5dlabs").
    #[arg(long, env = "CWM_REPO_OWNER")]
    pub repo_owner: Option<String>,

    /// Repository name (e.g. "cto").
    #[arg(long, env = "CWM_REPO_NAME")]
    pub repo_name: Option<String>,

    /// Branch to monitor.
    #[arg(long, env = "CWM_BRANCH")]
    pub branch: Option<String>,

    /// Seconds between ticks.
    #[arg(long, env = "CWM_CHECK_INTERVAL")]
    pub check_interval: Option<u64>,

    /// Per-fingerprint retry cap.
    #[arg(long, env = "CWM_MAX_RETRIES")]
    pub max_retries: Option<u32>,

    /// Global tick cap.
    #[arg(long, env = "CWM_MAX_ITERATIONS")]
    pub max_iterations: Option<u32>,

    /// Global runtime cap, in seconds.
    #[arg(long, env = "CWM_MAX_WALL_CLOCK")]
    pub max_wall_clock: Option<u64>,

    /// Consecutive all-pass ticks required to stop.
    #[arg(long, env = "CWM_REQUIRED_PASS_STREAK")]
    pub required_pass_streak: Option<u32>,

    /// Concurrent log fetches per tick.
    #[arg(long, env = "CWM_MAX_INFLIGHT_FETCHES")]
    pub max_inflight_fetches: Option<usize>,

    /// Per-job log cap, in bytes.
    #[arg(long, env = "CWM_MAX_LOG_BYTES")]
    pub max_log_bytes: Option<usize>,

    /// Git checkout path the fixers and VCS driver may mutate.
    #[arg(long, env = "CWM_WORKSPACE_ROOT")]
    pub workspace_root: Option<PathBuf>,

    /// Also write generated env vars to `.env`, not only `.env.example`.
    #[arg(long, env = "CWM_WRITE_DOTENV")]
    pub write_dotenv: bool,

    /// Classify and report only; apply no fixes, make no commits.
    #[arg(long, env = "CWM_DRY_RUN")]
    pub dry_run: bool,

    /// Optional TOML config file layered beneath CLI flags and env vars.
    #[arg(long, env = "CWM_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Output format for structured logs.
    #[arg(long, value_enum, default_value = "json", env = "CWM_LOG_FORMAT")]
    pub log_format: LogFormat,
}

/// Log line rendering.
#[derive(Clone, Copy, Debug, Default, clap::ValueEnum, Serialize, Deserialize)]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

/// Fully resolved configuration driving one orchestrator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub ci_token: String,
    pub repo_owner: String,
    pub repo_name: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_max_wall_clock")]
    pub max_wall_clock_secs: u64,
    #[serde(default = "default_required_pass_streak")]
    pub required_pass_streak: u32,
    #[serde(default = "default_max_inflight_fetches")]
    pub max_inflight_fetches: usize,
    #[serde(default = "default_max_log_bytes")]
    pub max_log_bytes: usize,
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    #[serde(default)]
    pub write_dotenv: bool,
    #[serde(default)]
    pub dry_run: bool,
}

fn default_branch() -> String {
    "main".to_string()
}
fn default_check_interval() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    5
}
fn default_max_iterations() -> u32 {
    50
}
fn default_max_wall_clock() -> u64 {
    7200
}
fn default_required_pass_streak() -> u32 {
    3
}
fn default_max_inflight_fetches() -> usize {
    4
}
fn default_max_log_bytes() -> usize {
    1_048_576
}
fn default_workspace_root() -> PathBuf {
    PathBuf::from(".")
}

/// A partial config loaded from a TOML file; every field optional so the
/// file may set as little or as much as the operator wants.
#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
    ci_token: Option<String>,
    repo_owner: Option<String>,
    repo_name: Option<String>,
    branch: Option<String>,
    check_interval_secs: Option<u64>,
    max_retries: Option<u32>,
    max_iterations: Option<u32>,
    max_wall_clock_secs: Option<u64>,
    required_pass_streak: Option<u32>,
    max_inflight_fetches: Option<usize>,
    max_log_bytes: Option<usize>,
    workspace_root: Option<PathBuf>,
    write_dotenv: Option<bool>,
    dry_run: Option<bool>,
}

impl Config {
    /// Resolve a [`Config`] from CLI flags (already carrying env fallbacks
    /// via `clap`'s `env` attribute), layered over an optional TOML file,
    /// layered over built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if `config_file` is set but unreadable/unparsable,
    /// or if `ci_token`/`repo_owner`/`repo_name` are missing from every layer.
    pub fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let file = match &cli.config_file {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| anyhow::anyhow!("reading config file {path:?}: {e}"))?;
                toml::from_str::<FileConfig>(&text)
                    .map_err(|e| anyhow::anyhow!("parsing config file {path:?}: {e}"))?
            }
            None => FileConfig::default(),
        };

        let ci_token = cli
            .ci_token
            .clone()
            .or(file.ci_token)
            .ok_or_else(|| anyhow::anyhow!("ciToken is required (--ci-token / CWM_CI_TOKEN)"))?;
        let repo_owner = cli.repo_owner.clone().or(file.repo_owner).ok_or_else(|| {
            anyhow::anyhow!("repoOwner is required (--repo-owner / CWM_REPO_OWNER)")
        })?;
        let repo_name = cli.repo_name.clone().or(file.repo_name).ok_or_else(|| {
            anyhow::anyhow!("repoName is required (--repo-name / CWM_REPO_NAME)")
        })?;

        Ok(Self {
            ci_token,
            repo_owner,
            repo_name,
            branch: cli.branch.clone().or(file.branch).unwrap_or_else(default_branch),
            check_interval_secs: cli
                .check_interval
                .or(file.check_interval_secs)
                .unwrap_or_else(default_check_interval),
            max_retries: cli
                .max_retries
                .or(file.max_retries)
                .unwrap_or_else(default_max_retries),
            max_iterations: cli
                .max_iterations
                .or(file.max_iterations)
                .unwrap_or_else(default_max_iterations),
            max_wall_clock_secs: cli
                .max_wall_clock
                .or(file.max_wall_clock_secs)
                .unwrap_or_else(default_max_wall_clock),
            required_pass_streak: cli
                .required_pass_streak
                .or(file.required_pass_streak)
                .unwrap_or_else(default_required_pass_streak),
            max_inflight_fetches: cli
                .max_inflight_fetches
                .or(file.max_inflight_fetches)
                .unwrap_or_else(default_max_inflight_fetches),
            max_log_bytes: cli
                .max_log_bytes
                .or(file.max_log_bytes)
                .unwrap_or_else(default_max_log_bytes),
            workspace_root: cli
                .workspace_root
                .clone()
                .or(file.workspace_root)
                .unwrap_or_else(default_workspace_root),
            write_dotenv: cli.write_dotenv || file.write_dotenv.unwrap_or(false),
            dry_run: cli.dry_run || file.dry_run.unwrap_or(false),
        })
    }

    /// Full repository slug, e.g. `5dlabs/cto`.
    #[must_use]
    pub fn repo_slug(&self) -> String {
        format!("{}/{}", self.repo_owner, self.repo_name)
    }
}
