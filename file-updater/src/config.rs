//! Configuration management for the updater.
//!
//! Loads configuration from TOML file with environment variable overrides.

use crate::utils::{Result, UpdaterError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub update: UpdateConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL for per-path metadata lookups
    #[serde(default = "default_metadata_url")]
    pub metadata_url: String,

    /// Base URL for raw file content
    #[serde(default = "default_raw_url")]
    pub raw_url: String,

    /// Branch or tag, sent as `?ref=` on metadata requests
    #[serde(default)]
    pub branch: Option<String>,

    /// API token
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Minimum spacing between two outbound requests
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    /// First backoff delay after a rate-limit rejection
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff cap
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Total attempts per request, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Upper bound of the random jitter added to each backoff
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    /// Metadata cache time-to-live
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

/// Staleness policy used by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparatorKind {
    Hash,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Manifest location, relative to the base directory
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,

    #[serde(default = "default_comparator")]
    pub comparator: ComparatorKind,

    /// Clock skew absorbed by the hybrid comparator
    #[serde(default = "default_timestamp_tolerance_secs")]
    pub timestamp_tolerance_secs: u64,

    /// Parent of the per-run backup directory (system temp dir when unset)
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,

    /// Walk the base directory when the remote manifest lists no files
    #[serde(default = "default_traversal_fallback")]
    pub traversal_fallback: bool,

    /// File names skipped by the traversal fallback
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_metadata_url() -> String {
    "https://api.github.com/repos/glue-platform/glue/contents".to_string()
}

fn default_raw_url() -> String {
    "https://raw.githubusercontent.com/glue-platform/glue/main".to_string()
}

fn default_user_agent() -> String {
    format!("file-updater/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_min_interval_ms() -> u64 {
    2000
}

fn default_initial_backoff_ms() -> u64 {
    2000
}

fn default_max_backoff_ms() -> u64 {
    32000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_jitter_ms() -> u64 {
    500
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_catalog_path() -> String {
    "catalog.json".to_string()
}

fn default_comparator() -> ComparatorKind {
    ComparatorKind::Hybrid
}

fn default_timestamp_tolerance_secs() -> u64 {
    300
}

fn default_traversal_fallback() -> bool {
    true
}

fn default_exclude() -> Vec<String> {
    vec![".git".to_string(), ".DS_Store".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            metadata_url: default_metadata_url(),
            raw_url: default_raw_url(),
            branch: None,
            token: None,
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_attempts: default_max_attempts(),
            jitter_ms: default_jitter_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            comparator: default_comparator(),
            timestamp_tolerance_secs: default_timestamp_tolerance_secs(),
            backup_dir: None,
            traversal_fallback: default_traversal_fallback(),
            exclude: default_exclude(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl RateLimitConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("UPDATER_TOKEN") {
            if !token.is_empty() {
                self.remote.token = Some(token);
            }
        }
        if let Ok(url) = std::env::var("UPDATER_METADATA_URL") {
            self.remote.metadata_url = url;
        }
        if let Ok(url) = std::env::var("UPDATER_RAW_URL") {
            self.remote.raw_url = url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.remote.metadata_url.trim().is_empty() {
            return Err(UpdaterError::Config("remote.metadata_url is empty".into()));
        }
        if self.remote.raw_url.trim().is_empty() {
            return Err(UpdaterError::Config("remote.raw_url is empty".into()));
        }
        if self.rate_limit.max_attempts == 0 {
            return Err(UpdaterError::Config("rate_limit.max_attempts must be at least 1".into()));
        }
        if self.rate_limit.max_backoff_ms < self.rate_limit.initial_backoff_ms {
            return Err(UpdaterError::Config(
                "rate_limit.max_backoff_ms is below rate_limit.initial_backoff_ms".into(),
            ));
        }
        if self.update.catalog_path.trim().is_empty() {
            return Err(UpdaterError::Config("update.catalog_path is empty".into()));
        }
        Ok(())
    }
}
