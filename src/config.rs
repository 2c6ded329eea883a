use anyhow::{anyhow, Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding `sync.max_parallel`
pub const MAX_PARALLEL_ENV: &str = "MAX_PARALLEL_JOBS";

/// Main configuration structure for orgsync
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Directory under which `<organization>/` is created
    #[serde(default = "default_base_directory")]
    pub base_directory: String,

    /// Repository names that are never synchronized (exact, case-sensitive)
    #[serde(default)]
    pub exclude: Vec<String>,

    /// GitHub API settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Synchronization behavior settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// GitHub configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitHubConfig {
    /// REST API root, override for GitHub Enterprise
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Environment variable holding the access token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Repositories requested per listing page
    #[serde(default = "default_per_page")]
    pub per_page: u8,
}

/// Synchronization configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Maximum parallel repository operations
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Timeout for a single repository sync in seconds, 0 disables it
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Branches tried, in order, before pulling an existing checkout
    #[serde(default = "default_branches")]
    pub branches: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level used when neither RUST_LOG nor --verbose is given
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_base_directory() -> String {
    ".".to_string()
}
fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_per_page() -> u8 {
    100
}
fn default_max_parallel() -> usize {
    5
}
fn default_timeout() -> u64 {
    600
}
fn default_branches() -> Vec<String> {
    vec!["main".to_string(), "master".to_string()]
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token_env: default_token_env(),
            per_page: default_per_page(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            timeout: default_timeout(),
            branches: default_branches(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, falling back to defaults
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            tracing::debug!("No configuration at {:?}, using defaults", config_path);
            let mut config = Self::default();
            config.expand_paths()?;
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_yaml(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Parse configuration from YAML text and expand its paths
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.expand_paths()?;
        Ok(config)
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("orgsync").join("config.yml"))
    }

    /// Expand environment variables and `~` in configuration paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.base_directory = shellexpand::full(&self.base_directory)
            .context("Failed to expand base_directory path")?
            .into_owned();

        Ok(())
    }

    /// Apply `MAX_PARALLEL_JOBS` from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var(MAX_PARALLEL_ENV) {
            self.sync.max_parallel = parse_max_parallel(&value)
                .with_context(|| format!("Invalid {} value: {:?}", MAX_PARALLEL_ENV, value))?;
        }
        Ok(())
    }

    /// Directory holding one working copy per repository of `organization`
    pub fn working_root(&self, organization: &str) -> PathBuf {
        path_clean::clean(Path::new(&self.base_directory).join(organization))
    }

    /// Per-repository timeout, `None` when disabled
    pub fn operation_timeout(&self) -> Option<Duration> {
        match self.sync.timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

fn parse_max_parallel(value: &str) -> Result<usize> {
    let parsed: usize = value.trim().parse()?;
    if parsed == 0 {
        return Err(anyhow!("must be at least 1"));
    }
    Ok(parsed)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_directory: default_base_directory(),
            exclude: Vec::new(),
            github: GitHubConfig::default(),
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
