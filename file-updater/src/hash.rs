//! Content digests for local files.
//!
//! The remote side publishes either SHA-1 (40 hex chars) or SHA-256
//! (64 hex chars) digests. The algorithm is decided once, when the hash text
//! is parsed into an [`ExpectedHash`], and carried explicitly from there.

use crate::utils::{Result, UpdaterError};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;

/// Read buffer size for hashing (64KB)
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    /// Digest length in bytes
    pub fn digest_len(self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Sha1 => write!(f, "sha1"),
            HashAlgorithm::Sha256 => write!(f, "sha256"),
        }
    }
}

/// A digest the remote side claims for a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedHash {
    pub algorithm: HashAlgorithm,
    pub digest: Vec<u8>,
}

impl ExpectedHash {
    /// Parse hex text, picking the algorithm from its length.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let algorithm = match text.len() {
            40 => HashAlgorithm::Sha1,
            64 => HashAlgorithm::Sha256,
            n => {
                return Err(UpdaterError::InvalidHash(format!(
                    "expected 40 or 64 hex characters, got {}",
                    n
                )))
            }
        };
        let digest = hex::decode(text)
            .map_err(|e| UpdaterError::InvalidHash(format!("{}: {}", text, e)))?;
        Ok(Self { algorithm, digest })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.digest)
    }

    /// True if `digest` was produced by the same algorithm and is equal.
    pub fn matches(&self, digest: &[u8]) -> bool {
        digest.len() == self.algorithm.digest_len() && digest == self.digest.as_slice()
    }
}

impl fmt::Display for ExpectedHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

/// Digest of a byte stream, read in fixed-size chunks.
pub fn digest_reader<R: Read>(reader: R, algorithm: HashAlgorithm) -> io::Result<Vec<u8>> {
    match algorithm {
        HashAlgorithm::Sha1 => digest_with::<Sha1, R>(reader),
        HashAlgorithm::Sha256 => digest_with::<Sha256, R>(reader),
    }
}

fn digest_with<D: Digest, R: Read>(mut reader: R) -> io::Result<Vec<u8>> {
    let mut hasher = D::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(hasher.finalize().to_vec())
}

/// Digest of a file on disk.
pub fn digest_file(path: &Path, algorithm: HashAlgorithm) -> io::Result<Vec<u8>> {
    let file = File::open(path)?;
    digest_reader(file, algorithm)
}

/// Stateless hashing front-end used by comparators and the update verifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashCalculator;

impl HashCalculator {
    /// Hex digest of `path` using the algorithm of `reference`.
    ///
    /// `None` means the file could not be read. Callers must treat that as
    /// "cannot verify", never as a match.
    pub fn hash(&self, path: &Path, reference: &ExpectedHash) -> Option<String> {
        self.digest(path, reference.algorithm).map(hex::encode)
    }

    /// Raw digest of `path`, `None` on any I/O failure.
    pub fn digest(&self, path: &Path, algorithm: HashAlgorithm) -> Option<Vec<u8>> {
        match digest_file(path, algorithm) {
            Ok(digest) => Some(digest),
            Err(e) => {
                debug!("Cannot hash {}: {}", path.display(), e);
                None
            }
        }
    }

    /// True only if the file exists, is readable and matches `expected`.
    pub fn verify(&self, path: &Path, expected: &ExpectedHash) -> bool {
        self.digest(path, expected.algorithm)
            .map(|d| expected.matches(&d))
            .unwrap_or(false)
    }
}
