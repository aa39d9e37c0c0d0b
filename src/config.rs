use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Runtime configuration for the atelier worker.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AtelierConfig {
    pub repo: RepoConfig,
    pub worker: WorkerConfig,
    pub observability: ObservabilityConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RepoConfig {
    /// `owner/name` GitHub slug; `None` disables PR publication.
    pub slug: Option<String>,
    pub root: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// `once`, `default`, or `watch`.
    pub loop_mode: String,
    pub watch_interval_seconds: u64,
    /// Open a PR as soon as a changeset's branch is pushed.
    pub branch_pr: bool,
    /// `manual`, `rebase`, or `squash`.
    pub branch_history: String,
    pub assume_yes: bool,
    pub gh_timeout_seconds: u64,
    pub gh_retry_max_attempts: u32,
    /// Argv template for the coding-agent subprocess, e.g. `["claude",
    /// "--print"]`. The first element is the program; the rest are fixed
    /// arguments passed on every invocation.
    pub agent_command: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub json_logs: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    pub project_data_dir: PathBuf,
    pub beads_root: PathBuf,
    pub git_path: String,
    pub bd_path: String,
    pub gh_path: String,
}

impl Default for AtelierConfig {
    fn default() -> Self {
        Self {
            repo: RepoConfig {
                slug: None,
                root: PathBuf::from("."),
            },
            worker: WorkerConfig {
                loop_mode: "default".to_string(),
                watch_interval_seconds: 30,
                branch_pr: true,
                branch_history: "sequential".to_string(),
                assume_yes: false,
                gh_timeout_seconds: 20,
                gh_retry_max_attempts: 3,
                agent_command: vec!["claude".to_string(), "--print".to_string()],
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: true,
            },
            paths: PathsConfig {
                project_data_dir: PathBuf::from(".atelier"),
                beads_root: PathBuf::from(".beads"),
                git_path: "git".to_string(),
                bd_path: "bd".to_string(),
                gh_path: "gh".to_string(),
            },
        }
    }
}

impl AtelierConfig {
    /// Load from, in ascending precedence: defaults, `atelier.toml`,
    /// `.atelier-rc`, then `ATELIER_`-prefixed environment variables.
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder();

        if Path::new("atelier.toml").exists() {
            builder = builder.add_source(File::with_name("atelier"));
        }
        if Path::new(".atelier-rc").exists() {
            builder = builder.add_source(File::with_name(".atelier-rc"));
        }

        builder = builder.add_source(
            Environment::with_prefix("ATELIER")
                .separator("_")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let atelier_config: AtelierConfig = config.try_deserialize()?;
        Ok(atelier_config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("loaded environment variables from .env file");
        }
        Ok(())
    }
}

static CONFIG: std::sync::LazyLock<Result<AtelierConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = AtelierConfig::load_env_file();
        AtelierConfig::load()
    });

pub fn config() -> Result<&'static AtelierConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("failed to load configuration: {}", e))
}

pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("configuration loaded successfully");
    Ok(())
}
