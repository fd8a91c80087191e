//! Custom error types for the updater.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpdaterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    ConfigFile(#[from] toml::de::Error),

    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Not found on remote: {0}")]
    RemoteNotFound(String),

    #[error("Remote returned HTTP {status} for {path}")]
    RemoteStatus { status: u16, path: String },

    #[error("Gave up on {path} after {attempts} attempts")]
    RetriesExhausted { path: String, attempts: u32 },

    #[error("Manifest unavailable: {0}")]
    ManifestUnavailable(String),

    #[error("An update is already running")]
    AlreadyRunning,

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("Verification failed: {0}")]
    Verification(String),
}

impl UpdaterError {
    /// True when the remote reported the path as intentionally absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, UpdaterError::RemoteNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, UpdaterError>;
