//! Catalog-driven discovery.

use super::{defer_self_entry, DiscoveryStrategy, FileEntry};
use crate::catalog::{normalize_path, Catalog};
use crate::utils::Result;

pub struct CatalogDiscovery {
    catalog: Catalog,
    self_path: String,
}

impl CatalogDiscovery {
    /// `catalog_path` is where the catalog itself lives in the base directory.
    pub fn new(catalog: Catalog, catalog_path: &str) -> Result<Self> {
        Ok(Self {
            catalog,
            self_path: normalize_path(catalog_path)?,
        })
    }
}

impl DiscoveryStrategy for CatalogDiscovery {
    fn name(&self) -> &'static str {
        "catalog"
    }

    /// Entries in catalog order, except the catalog's own entry which always
    /// comes last.
    fn discover(&self) -> Result<Vec<FileEntry>> {
        let mut entries: Vec<FileEntry> = self
            .catalog
            .entries
            .iter()
            .map(|entry| FileEntry::new(entry.path.clone(), entry.hash.clone()))
            .collect();
        defer_self_entry(&mut entries, &self.self_path);
        Ok(entries)
    }
}
