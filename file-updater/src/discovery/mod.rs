//! File discovery: which files does a run evaluate?
//!
//! Two strategies exist. [`CatalogDiscovery`] reads the remote catalog and is
//! preferred; [`TraversalDiscovery`] walks the base directory and is only
//! used when the catalog lists nothing.

pub mod catalog;
pub mod traversal;

pub use catalog::CatalogDiscovery;
pub use traversal::TraversalDiscovery;

use crate::hash::ExpectedHash;
use crate::utils::Result;
use tracing::debug;

/// A file to evaluate, relative to the base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    /// Hash taken from the catalog, trusted without a metadata lookup
    pub expected_hash: Option<ExpectedHash>,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, expected_hash: Option<ExpectedHash>) -> Self {
        Self {
            path: path.into(),
            expected_hash,
        }
    }
}

/// Move the entry for `self_path` to the end, keeping everything else in
/// order. The catalog is always the last file a run writes, so a run that
/// dies halfway leaves the old catalog behind and is detected again.
pub(crate) fn defer_self_entry(entries: &mut Vec<FileEntry>, self_path: &str) {
    if let Some(index) = entries.iter().position(|e| e.path == self_path) {
        let entry = entries.remove(index);
        debug!("Deferring {} to the end of the run", entry.path);
        entries.push(entry);
    }
}

/// Produces the ordered list of files for one run.
///
/// Order matters: the orchestrator processes entries exactly as returned.
pub trait DiscoveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn discover(&self) -> Result<Vec<FileEntry>>;
}
