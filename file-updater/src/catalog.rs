//! Catalog (manifest) parsing.
//!
//! A catalog lists every file of a deployment with its expected content
//! hash, plus a version marker:
//!
//! ```json
//! {
//!   "version": "2.4.1",
//!   "files": [
//!     { "path": "etc/config.json", "hash": "9f86d08...0f00a08" },
//!     { "path": "catalog.json" }
//!   ]
//! }
//! ```

use crate::hash::ExpectedHash;
use crate::utils::{Result, UpdaterError};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Parsed catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    pub version: Option<String>,
    pub entries: Vec<CatalogEntry>,
}

/// One file listed in a catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    /// Normalised path relative to the base directory
    pub path: String,
    pub hash: Option<ExpectedHash>,
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    files: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    path: String,
    #[serde(default)]
    hash: Option<String>,
}

impl Catalog {
    /// Parse catalog text.
    ///
    /// Rejects unsafe paths, malformed hashes and duplicate paths.
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawCatalog = serde_json::from_str(text)
            .map_err(|e| UpdaterError::Catalog(format!("invalid catalog document: {}", e)))?;

        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(raw.files.len());

        for file in raw.files {
            let path = normalize_path(&file.path)?;
            if !seen.insert(path.clone()) {
                return Err(UpdaterError::Catalog(format!("duplicate path: {}", path)));
            }

            let hash = match file.hash.as_deref().map(str::trim) {
                None | Some("") => None,
                Some(text) => Some(ExpectedHash::parse(text).map_err(|e| {
                    UpdaterError::Catalog(format!("bad hash for {}: {}", path, e))
                })?),
            };

            entries.push(CatalogEntry { path, hash });
        }

        let version = raw
            .version
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Ok(Self { version, entries })
    }

    /// Read and parse a catalog file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Version of a local catalog, `None` if it is missing or unreadable.
    pub fn read_version(path: &Path) -> Option<String> {
        Self::from_file(path).ok().and_then(|c| c.version)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Normalise a catalog path to `a/b/c` form.
///
/// Absolute paths and `..` components are refused so a catalog can never
/// point outside the base directory.
pub fn normalize_path(raw: &str) -> Result<String> {
    let unified = raw.trim().replace('\\', "/");
    if unified.starts_with('/') || has_drive_prefix(&unified) {
        return Err(UpdaterError::Catalog(format!("absolute path not allowed: {}", raw)));
    }

    let mut parts = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                return Err(UpdaterError::Catalog(format!("path escapes base directory: {}", raw)))
            }
            p => parts.push(p),
        }
    }

    if parts.is_empty() {
        return Err(UpdaterError::Catalog("empty path".into()));
    }
    Ok(parts.join("/"))
}

/// `C:` style prefix
fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
