//! File Updater Library
//!
//! Catalog-driven self-update engine: discovers the files a deployment
//! should contain, compares them against a remote content store, and replaces
//! stale ones with backup, verification and rollback.

pub mod backup;
pub mod catalog;
pub mod compare;
pub mod config;
pub mod discovery;
pub mod hash;
pub mod orchestrator;
pub mod remote;
pub mod update;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::Config;
pub use orchestrator::{RunSummary, UpdateOutcome, Updater};
pub use utils::errors::UpdaterError;
pub type Result<T> = std::result::Result<T, UpdaterError>;
