//! Top-level update runs.
//!
//! A run fetches the remote catalog, builds a discovery strategy, and walks
//! the resulting entries in order: resolve remote state, compare, then either
//! count (check-only) or replace (apply). Per-file failures are counted and
//! never stop the loop. Only one run may be active per [`Updater`] at a time.

use crate::backup::BackupManager;
use crate::catalog::{normalize_path, Catalog};
use crate::compare::{self, Comparator, ComparisonContext};
use crate::config::{Config, UpdateConfig};
use crate::discovery::traversal::WalkOptions;
use crate::discovery::{CatalogDiscovery, DiscoveryStrategy, FileEntry, TraversalDiscovery};
use crate::remote::{RemoteFileInfo, RemoteMetadataClient};
use crate::update::FileUpdateOperation;
use crate::utils::{Result, UpdaterError};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Name prefix of per-run backup directories, never treated as payload
const BACKUP_DIR_PREFIX: &str = "updater-backup-";

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub files_checked: usize,
    pub files_updated: usize,
    pub files_would_update: usize,
    /// Intentionally absent on the remote (404)
    pub files_skipped: usize,
    pub errors: usize,
    pub duration: Duration,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "checked {} files: {} updated, {} would update, {} skipped, {} errors in {:.1}s",
            self.files_checked,
            self.files_updated,
            self.files_would_update,
            self.files_skipped,
            self.errors,
            self.duration.as_secs_f64()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Evaluate and report, never touch disk
    CheckOnly,
    Apply,
}

/// Result of the version gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    UpToDate { version: String },
    Updated {
        from: Option<String>,
        to: Option<String>,
        summary: RunSummary,
    },
}

/// Clears the working flag when dropped.
struct WorkingGuard<'a>(&'a AtomicBool);

impl<'a> WorkingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| UpdaterError::AlreadyRunning)?;
        Ok(Self(flag))
    }
}

impl Drop for WorkingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Updater {
    base_dir: PathBuf,
    config: UpdateConfig,
    client: Arc<RemoteMetadataClient>,
    comparator: Box<dyn Comparator>,
    working: AtomicBool,
}

impl Updater {
    /// Build an updater with its own client and the configured comparator.
    pub fn new(base_dir: impl Into<PathBuf>, config: &Config) -> Result<Self> {
        let client = Arc::new(RemoteMetadataClient::new(&config.remote, &config.rate_limit)?);
        let comparator = compare::from_config(&config.update);
        Ok(Self::with_parts(base_dir, config.update.clone(), client, comparator))
    }

    /// Build an updater around an existing client, e.g. to share its cache.
    pub fn with_parts(
        base_dir: impl Into<PathBuf>,
        config: UpdateConfig,
        client: Arc<RemoteMetadataClient>,
        comparator: Box<dyn Comparator>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            config,
            client,
            comparator,
            working: AtomicBool::new(false),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn client(&self) -> &RemoteMetadataClient {
        &self.client
    }

    pub fn is_working(&self) -> bool {
        self.working.load(Ordering::Acquire)
    }

    /// Location of the local catalog.
    pub fn local_catalog_path(&self) -> PathBuf {
        self.base_dir.join(&self.config.catalog_path)
    }

    /// Count stale files without touching disk.
    pub async fn check_files_only(&self) -> Result<usize> {
        Ok(self.dry_run().await?.files_would_update)
    }

    /// Check-only run with the full summary.
    pub async fn dry_run(&self) -> Result<RunSummary> {
        let _guard = WorkingGuard::acquire(&self.working)?;
        let catalog = self.fetch_remote_catalog().await?;
        self.run(catalog, RunMode::CheckOnly).await
    }

    /// Apply run, regardless of catalog versions.
    pub async fn check_and_update_files(&self) -> Result<RunSummary> {
        let _guard = WorkingGuard::acquire(&self.working)?;
        let catalog = self.fetch_remote_catalog().await?;
        self.run(catalog, RunMode::Apply).await
    }

    /// Apply run, but only if the remote catalog version differs from the
    /// local one. Matching versions cost a single catalog download.
    pub async fn update_if_needed(&self) -> Result<UpdateOutcome> {
        let _guard = WorkingGuard::acquire(&self.working)?;

        let local_version = Catalog::read_version(&self.local_catalog_path());
        let catalog = self.fetch_remote_catalog().await?;
        let remote_version = catalog.version.clone();

        if let (Some(local), Some(remote)) = (&local_version, &remote_version) {
            if local == remote {
                info!("Up to date (version {})", local);
                return Ok(UpdateOutcome::UpToDate {
                    version: local.clone(),
                });
            }
        }

        info!(
            "Version change: {} -> {}",
            local_version.as_deref().unwrap_or("unknown"),
            remote_version.as_deref().unwrap_or("unknown")
        );
        let summary = self.run(catalog, RunMode::Apply).await?;

        Ok(UpdateOutcome::Updated {
            from: local_version,
            to: remote_version,
            summary,
        })
    }

    /// Download and parse the remote catalog through a temp file.
    async fn fetch_remote_catalog(&self) -> Result<Catalog> {
        let path = &self.config.catalog_path;
        let tmp = tempfile::NamedTempFile::new()?;

        if let Err(e) = self.client.download(path, None, tmp.path()).await {
            error!("Cannot download catalog {}: {}", path, e);
            return Err(UpdaterError::ManifestUnavailable(format!("{}: {}", path, e)));
        }

        match Catalog::from_file(tmp.path()) {
            Ok(catalog) => {
                info!(
                    "Remote catalog version {} lists {} files",
                    catalog.version.as_deref().unwrap_or("unknown"),
                    catalog.entries.len()
                );
                Ok(catalog)
            }
            Err(e) => {
                error!("Cannot parse catalog {}: {}", path, e);
                Err(UpdaterError::ManifestUnavailable(format!("{}: {}", path, e)))
            }
        }
    }

    fn discovery_for(&self, catalog: Catalog) -> Result<Box<dyn DiscoveryStrategy>> {
        if !catalog.is_empty() {
            return Ok(Box::new(CatalogDiscovery::new(catalog, &self.config.catalog_path)?));
        }

        if !self.config.traversal_fallback {
            return Err(UpdaterError::ManifestUnavailable("catalog lists no files".into()));
        }

        warn!("Catalog lists no files, falling back to directory traversal");
        let mut exclude = self.config.exclude.clone();
        exclude.push(format!("{}*", BACKUP_DIR_PREFIX));
        let options = WalkOptions {
            exclude_patterns: exclude,
            ..WalkOptions::default()
        };
        let self_path = normalize_path(&self.config.catalog_path)?;
        Ok(Box::new(
            TraversalDiscovery::new(&self.base_dir, options).with_self_entry(self_path),
        ))
    }

    async fn run(&self, catalog: Catalog, mode: RunMode) -> Result<RunSummary> {
        let start = Instant::now();
        let strategy = self.discovery_for(catalog)?;
        let entries = strategy.discover()?;
        info!(
            "{} run over {} files ({} discovery, {} comparator)",
            match mode {
                RunMode::CheckOnly => "Check-only",
                RunMode::Apply => "Apply",
            },
            entries.len(),
            strategy.name(),
            self.comparator.name()
        );

        let self_path = normalize_path(&self.config.catalog_path)?;
        let mut backups = match mode {
            RunMode::CheckOnly => None,
            RunMode::Apply => {
                let parent = self
                    .config
                    .backup_dir
                    .clone()
                    .unwrap_or_else(std::env::temp_dir);
                Some(BackupManager::new(&parent)?)
            }
        };

        let mut summary = RunSummary::default();
        for entry in &entries {
            // A new catalog would hide the failures from the next version check
            if backups.is_some() && entry.path == self_path && summary.errors > 0 {
                warn!(
                    "{}: keeping the old catalog, {} file(s) failed this run",
                    entry.path, summary.errors
                );
                continue;
            }
            self.process_entry(entry, backups.as_mut(), &mut summary).await;
        }

        if let Some(backups) = backups {
            let dir = backups.dir().to_path_buf();
            if !backups.cleanup() {
                warn!("Backup directory {} was not fully removed", dir.display());
            }
        }

        summary.duration = start.elapsed();
        if summary.errors > 0 {
            warn!("Run finished with errors: {}", summary);
        } else {
            info!("Run finished: {}", summary);
        }
        Ok(summary)
    }

    /// Evaluate one entry. `backups` is `Some` in apply mode.
    async fn process_entry(
        &self,
        entry: &FileEntry,
        backups: Option<&mut BackupManager>,
        summary: &mut RunSummary,
    ) {
        summary.files_checked += 1;
        let path = entry.path.as_str();
        let local_path = self.base_dir.join(path);

        let remote = match self.resolve_remote(entry).await {
            Ok(remote) => remote,
            Err(e) if e.is_not_found() => {
                info!("{}: not on remote, skipping", path);
                summary.files_skipped += 1;
                return;
            }
            Err(e) => {
                warn!("{}: cannot fetch remote state: {}", path, e);
                summary.errors += 1;
                return;
            }
        };

        let ctx = ComparisonContext {
            relative_path: path,
            entry,
            local_path: &local_path,
            remote: &remote,
        };
        let result = self.comparator.compare(&ctx);

        if !result.needs_update {
            debug!("{}: up to date ({})", path, result.reason);
            return;
        }

        let Some(backups) = backups else {
            info!("{}: would update ({})", path, result.reason);
            summary.files_would_update += 1;
            return;
        };

        info!("{}: updating ({})", path, result.reason);
        match FileUpdateOperation::new(path, &local_path, &remote, &self.client, backups)
            .execute()
            .await
        {
            Ok(_) => summary.files_updated += 1,
            Err(e) if e.is_not_found() => {
                info!("{}: vanished from remote, skipping", path);
                summary.files_skipped += 1;
            }
            Err(e) => {
                warn!("{}: update failed: {}", path, e);
                summary.errors += 1;
            }
        }
    }

    /// Trusted catalog hash when present, otherwise a metadata lookup.
    async fn resolve_remote(&self, entry: &FileEntry) -> Result<RemoteFileInfo> {
        if entry.expected_hash.is_some() {
            return Ok(RemoteFileInfo::from_entry(entry));
        }
        self.client.get_metadata(&entry.path).await
    }
}
