//! Safety copies taken before a file is overwritten.
//!
//! Each run owns one private backup directory. Every file that is about to be
//! replaced is copied there first; if the replacement cannot be verified the
//! copy is written back. [`BackupManager::cleanup`] consumes the manager, so
//! the directory can only be torn down once, after every file is resolved.

use crate::utils::{Result, UpdaterError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// A single safety copy.
#[derive(Debug, Clone)]
pub struct BackupHandle {
    /// Where the copy lives
    pub backup_path: PathBuf,
    /// File the copy was taken from
    pub original_path: PathBuf,
    /// Size of the copy in bytes
    pub size: u64,
}

pub struct BackupManager {
    dir: PathBuf,
    created: Vec<PathBuf>,
    /// Copies that could not be written back; never deleted
    retained: Vec<PathBuf>,
}

impl BackupManager {
    /// Create a fresh, uniquely named backup directory under `parent`.
    pub fn new(parent: &Path) -> Result<Self> {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S%.3f");
        let unique = uuid::Uuid::new_v4().simple().to_string();
        let dir = parent.join(format!("updater-backup-{}-{}", stamp, &unique[..8]));

        fs::create_dir_all(&dir).map_err(|e| {
            UpdaterError::Backup(format!("cannot create {}: {}", dir.display(), e))
        })?;
        debug!("Backup directory: {}", dir.display());

        Ok(Self {
            dir,
            created: Vec::new(),
            retained: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of backups taken so far
    pub fn len(&self) -> usize {
        self.created.len()
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
    }

    /// Copy `file` into the backup directory.
    pub fn create_backup(&mut self, file: &Path) -> Result<BackupHandle> {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());
        let millis = chrono::Utc::now().timestamp_millis();
        // Sequence prefix keeps same-named files from different directories apart
        let backup_path = self
            .dir
            .join(format!("{:04}_{}.{}.bak", self.created.len(), name, millis));

        let size = fs::copy(file, &backup_path).map_err(|e| {
            UpdaterError::Backup(format!("cannot back up {}: {}", file.display(), e))
        })?;
        self.created.push(backup_path.clone());

        debug!("Backed up {} ({} bytes) to {}", file.display(), size, backup_path.display());

        Ok(BackupHandle {
            backup_path,
            original_path: file.to_path_buf(),
            size,
        })
    }

    /// Write the safety copy back over `original`.
    ///
    /// On failure the copy is retained: [`cleanup`](Self::cleanup) will leave
    /// it and the backup directory in place.
    pub fn restore(&mut self, handle: &BackupHandle, original: &Path) -> Result<()> {
        let copied = original
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| fs::copy(&handle.backup_path, original));

        if let Err(e) = copied {
            self.retained.push(handle.backup_path.clone());
            return Err(UpdaterError::Backup(format!(
                "cannot restore {} from {}: {}",
                original.display(),
                handle.backup_path.display(),
                e
            )));
        }
        info!("Restored {} from backup", original.display());
        Ok(())
    }

    /// Backups kept because their restore failed
    pub fn retained(&self) -> &[PathBuf] {
        &self.retained
    }

    /// Delete every backup and then the directory itself.
    ///
    /// Retained copies are kept. The directory is only removed if every
    /// other file deletion succeeded and nothing was retained. Returns
    /// whether nothing was left behind.
    pub fn cleanup(self) -> bool {
        let mut clean = true;
        for path in &self.retained {
            error!("Keeping backup {} for manual recovery", path.display());
            clean = false;
        }

        for path in self.created.iter().filter(|p| !self.retained.contains(*p)) {
            if let Err(e) = fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove backup {}: {}", path.display(), e);
                    clean = false;
                }
            }
        }

        if clean {
            if let Err(e) = fs::remove_dir(&self.dir) {
                warn!("Failed to remove backup directory {}: {}", self.dir.display(), e);
                clean = false;
            }
        }

        if clean {
            debug!("Removed {} backups and {}", self.created.len(), self.dir.display());
        }
        clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_backup_and_restore() -> Result<()> {
        let work = TempDir::new()?;
        let store = TempDir::new()?;
        let file = work.path().join("settings.json");
        fs::write(&file, b"original")?;

        let mut manager = BackupManager::new(store.path())?;
        let handle = manager.create_backup(&file)?;
        assert_eq!(handle.size, 8);
        assert_eq!(manager.len(), 1);

        fs::write(&file, b"garbage")?;
        manager.restore(&handle, &file)?;
        assert_eq!(fs::read(&file)?, b"original");

        let dir = manager.dir().to_path_buf();
        assert!(manager.cleanup());
        assert!(!dir.exists());
        Ok(())
    }

    #[test]
    fn test_restore_recreates_parent_dirs() -> Result<()> {
        let work = TempDir::new()?;
        let store = TempDir::new()?;
        let nested = work.path().join("lib/ext");
        fs::create_dir_all(&nested)?;
        let file = nested.join("driver.jar");
        fs::write(&file, b"jar bytes")?;

        let mut manager = BackupManager::new(store.path())?;
        let handle = manager.create_backup(&file)?;
        fs::remove_dir_all(work.path().join("lib"))?;

        manager.restore(&handle, &file)?;
        assert_eq!(fs::read(&file)?, b"jar bytes");
        assert!(manager.cleanup());
        Ok(())
    }

    #[test]
    fn test_failed_restore_keeps_backup_through_cleanup() -> Result<()> {
        let work = TempDir::new()?;
        let store = TempDir::new()?;
        let file = work.path().join("a.txt");
        let other = work.path().join("b.txt");
        fs::write(&file, b"only good copy")?;
        fs::write(&other, b"b")?;

        let mut manager = BackupManager::new(store.path())?;
        let handle = manager.create_backup(&file)?;
        let other_handle = manager.create_backup(&other)?;

        // A regular file where the parent directory should be
        fs::write(work.path().join("blocker"), b"")?;
        let result = manager.restore(&handle, &work.path().join("blocker/a.txt"));
        assert!(matches!(result, Err(UpdaterError::Backup(_))));
        assert_eq!(manager.retained(), &[handle.backup_path.clone()][..]);

        let dir = manager.dir().to_path_buf();
        assert!(!manager.cleanup());
        assert_eq!(fs::read(&handle.backup_path)?, b"only good copy");
        assert!(!other_handle.backup_path.exists());
        assert!(dir.exists());
        Ok(())
    }

    #[test]
    fn test_backup_missing_file_fails() -> Result<()> {
        let store = TempDir::new()?;
        let mut manager = BackupManager::new(store.path())?;

        let result = manager.create_backup(&store.path().join("absent.txt"));
        assert!(matches!(result, Err(UpdaterError::Backup(_))));
        assert!(manager.is_empty());
        assert!(manager.cleanup());
        Ok(())
    }

    #[test]
    fn test_same_name_in_different_dirs_does_not_collide() -> Result<()> {
        let work = TempDir::new()?;
        let store = TempDir::new()?;
        fs::create_dir_all(work.path().join("a"))?;
        fs::create_dir_all(work.path().join("b"))?;
        fs::write(work.path().join("a/run.sh"), b"aaa")?;
        fs::write(work.path().join("b/run.sh"), b"bbbb")?;

        let mut manager = BackupManager::new(store.path())?;
        let first = manager.create_backup(&work.path().join("a/run.sh"))?;
        let second = manager.create_backup(&work.path().join("b/run.sh"))?;

        assert_ne!(first.backup_path, second.backup_path);
        assert_eq!(fs::read(&first.backup_path)?, b"aaa");
        assert_eq!(fs::read(&second.backup_path)?, b"bbbb");
        assert!(manager.cleanup());
        Ok(())
    }

    #[test]
    fn test_two_managers_get_distinct_dirs() -> Result<()> {
        let store = TempDir::new()?;
        let first = BackupManager::new(store.path())?;
        let second = BackupManager::new(store.path())?;
        assert_ne!(first.dir(), second.dir());
        assert!(first.cleanup());
        assert!(second.cleanup());
        Ok(())
    }
}
