//! Transactional replacement of a single file.
//!
//! backup → download → verify → commit or roll back. When the operation
//! finishes the file either holds its original bytes or bytes whose hash
//! matches the remote's expected hash. A file that did not exist before is
//! removed again on failure.

use crate::backup::{BackupHandle, BackupManager};
use crate::hash::HashCalculator;
use crate::remote::{RemoteFileInfo, RemoteMetadataClient};
use crate::utils::{Result, UpdaterError};
use std::path::Path;
use tracing::{debug, error, info, warn};

pub struct FileUpdateOperation<'a> {
    relative_path: &'a str,
    local_path: &'a Path,
    remote: &'a RemoteFileInfo,
    client: &'a RemoteMetadataClient,
    backups: &'a mut BackupManager,
    calc: HashCalculator,
}

impl<'a> FileUpdateOperation<'a> {
    pub fn new(
        relative_path: &'a str,
        local_path: &'a Path,
        remote: &'a RemoteFileInfo,
        client: &'a RemoteMetadataClient,
        backups: &'a mut BackupManager,
    ) -> Self {
        Self {
            relative_path,
            local_path,
            remote,
            client,
            backups,
            calc: HashCalculator,
        }
    }

    /// Run the update. Returns the number of bytes written on success.
    pub async fn execute(mut self) -> Result<u64> {
        let remote = self.remote;
        let backup = if self.local_path.exists() {
            match self.backups.create_backup(self.local_path) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    error!("{}: no safety copy, leaving file untouched: {}", self.relative_path, e);
                    return Err(e);
                }
            }
        } else {
            None
        };

        let written = match self
            .client
            .download(self.relative_path, remote.download_url.as_deref(), self.local_path)
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("{}: download failed: {}", self.relative_path, e);
                self.roll_back(backup.as_ref());
                return Err(e);
            }
        };

        let Some(expected) = remote.hash.as_ref() else {
            warn!("{}: no expected hash to verify against", self.relative_path);
            self.roll_back(backup.as_ref());
            return Err(UpdaterError::Verification(format!(
                "{}: no expected hash",
                self.relative_path
            )));
        };

        if !self.calc.verify(self.local_path, expected) {
            let actual = self
                .calc
                .hash(self.local_path, expected)
                .unwrap_or_else(|| "unreadable".to_string());
            warn!(
                "{}: hash mismatch after download (expected {}, got {})",
                self.relative_path,
                expected.to_hex(),
                actual
            );
            self.roll_back(backup.as_ref());
            return Err(UpdaterError::Verification(format!(
                "{}: expected {}, got {}",
                self.relative_path, expected, actual
            )));
        }

        info!("Updated {} ({} bytes, {})", self.relative_path, written, expected);
        Ok(written)
    }

    fn roll_back(&mut self, backup: Option<&BackupHandle>) {
        match backup {
            Some(handle) => {
                if let Err(e) = self.backups.restore(handle, self.local_path) {
                    error!(
                        "{}: ROLLBACK FAILED, original kept at {}: {}",
                        self.relative_path,
                        handle.backup_path.display(),
                        e
                    );
                }
            }
            None => match std::fs::remove_file(self.local_path) {
                Ok(()) => debug!("{}: removed partial download", self.relative_path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => error!("{}: cannot remove partial download: {}", self.relative_path, e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ExpectedHash;
    use crate::test_support::{sha256_hex, MockRemote};
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        mock: MockRemote,
        client: RemoteMetadataClient,
        work: TempDir,
        store: TempDir,
    }

    async fn fixture() -> Fixture {
        let mock = MockRemote::start().await;
        let config = mock.config();
        let client = RemoteMetadataClient::new(&config.remote, &config.rate_limit).unwrap();
        Fixture {
            mock,
            client,
            work: TempDir::new().unwrap(),
            store: TempDir::new().unwrap(),
        }
    }

    fn remote(path: &str, content: &[u8]) -> RemoteFileInfo {
        RemoteFileInfo {
            path: path.to_string(),
            hash: ExpectedHash::parse(&sha256_hex(content)).ok(),
            download_url: None,
            size: Some(content.len() as u64),
            last_modified_millis: 0,
        }
    }

    #[tokio::test]
    async fn test_successful_update_verifies() -> Result<()> {
        let f = fixture().await;
        f.mock.put("etc/config.json", b"new config");
        let local = f.work.path().join("etc/config.json");
        fs::create_dir_all(local.parent().unwrap())?;
        fs::write(&local, b"old config")?;

        let info = remote("etc/config.json", b"new config");
        let mut backups = BackupManager::new(f.store.path())?;
        let written = FileUpdateOperation::new("etc/config.json", &local, &info, &f.client, &mut backups)
            .execute()
            .await?;

        assert_eq!(written, 10);
        assert_eq!(fs::read(&local)?, b"new config");
        assert_eq!(backups.len(), 1);
        assert!(backups.cleanup());
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_download_is_rolled_back() -> Result<()> {
        let f = fixture().await;
        f.mock.put("lib/glue.jar", b"genuine");
        f.mock.corrupt("lib/glue.jar", b"corrupted in transit");
        let local = f.work.path().join("lib/glue.jar");
        fs::create_dir_all(local.parent().unwrap())?;
        fs::write(&local, b"original")?;

        let info = remote("lib/glue.jar", b"genuine");
        let mut backups = BackupManager::new(f.store.path())?;
        let result = FileUpdateOperation::new("lib/glue.jar", &local, &info, &f.client, &mut backups)
            .execute()
            .await;

        assert!(matches!(result, Err(UpdaterError::Verification(_))));
        assert_eq!(fs::read(&local)?, b"original");
        assert!(backups.cleanup());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_download_restores_original() -> Result<()> {
        let f = fixture().await;
        let local = f.work.path().join("gone.txt");
        fs::write(&local, b"keep me")?;

        // Not on the remote: the raw endpoint answers 404
        let info = remote("gone.txt", b"whatever");
        let mut backups = BackupManager::new(f.store.path())?;
        let result = FileUpdateOperation::new("gone.txt", &local, &info, &f.client, &mut backups)
            .execute()
            .await;

        assert!(result.is_err());
        assert_eq!(fs::read(&local)?, b"keep me");
        assert!(backups.cleanup());
        Ok(())
    }

    #[tokio::test]
    async fn test_new_file_removed_when_verification_fails() -> Result<()> {
        let f = fixture().await;
        f.mock.put("new.txt", b"genuine");
        f.mock.corrupt("new.txt", b"bad");
        let local = f.work.path().join("new.txt");

        let info = remote("new.txt", b"genuine");
        let mut backups = BackupManager::new(f.store.path())?;
        let result = FileUpdateOperation::new("new.txt", &local, &info, &f.client, &mut backups)
            .execute()
            .await;

        assert!(result.is_err());
        assert!(!local.exists());
        assert!(backups.is_empty());
        assert!(backups.cleanup());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_expected_hash_rolls_back() -> Result<()> {
        let f = fixture().await;
        f.mock.put("a.txt", b"remote");
        let local = f.work.path().join("a.txt");
        fs::write(&local, b"local")?;

        let mut info = remote("a.txt", b"remote");
        info.hash = None;
        let mut backups = BackupManager::new(f.store.path())?;
        let result = FileUpdateOperation::new("a.txt", &local, &info, &f.client, &mut backups)
            .execute()
            .await;

        assert!(matches!(result, Err(UpdaterError::Verification(_))));
        assert_eq!(fs::read(&local)?, b"local");
        assert!(backups.cleanup());
        Ok(())
    }
}
