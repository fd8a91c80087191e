//! Directory traversal fallback.
//!
//! Lists every regular file under the base directory. Entries carry no
//! expected hash, so each one costs a metadata lookup.

use super::{defer_self_entry, DiscoveryStrategy, FileEntry};
use crate::utils::Result;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Follow symbolic links
    pub follow_links: bool,

    /// Maximum depth (None = unlimited)
    pub max_depth: Option<usize>,

    /// Names to prune. A pattern matches a whole file or directory name;
    /// a trailing `*` turns it into a name prefix.
    pub exclude_patterns: Vec<String>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            follow_links: false,
            max_depth: None,
            exclude_patterns: vec![".git".to_string(), ".DS_Store".to_string()],
        }
    }
}

pub struct TraversalDiscovery {
    root: PathBuf,
    options: WalkOptions,
    self_path: Option<String>,
}

impl TraversalDiscovery {
    pub fn new(root: impl Into<PathBuf>, options: WalkOptions) -> Self {
        Self {
            root: root.into(),
            options,
            self_path: None,
        }
    }

    /// Relative path of the local catalog, listed last if found.
    pub fn with_self_entry(mut self, path: impl Into<String>) -> Self {
        self.self_path = Some(path.into());
        self
    }
}

impl DiscoveryStrategy for TraversalDiscovery {
    fn name(&self) -> &'static str {
        "traversal"
    }

    fn discover(&self) -> Result<Vec<FileEntry>> {
        let mut walker = WalkDir::new(&self.root)
            .follow_links(self.options.follow_links)
            .sort_by_file_name();

        if let Some(max_depth) = self.options.max_depth {
            walker = walker.max_depth(max_depth);
        }

        let patterns = &self.options.exclude_patterns;
        let mut files = Vec::new();

        // Excluded directories are pruned, not just skipped
        for entry in walker.into_iter().filter_entry(|e| !should_exclude(e, patterns)) {
            let entry = entry.map_err(std::io::Error::from)?;

            if !entry.file_type().is_file() {
                continue;
            }

            if let Some(relative) = relative_path(entry.path(), &self.root) {
                files.push(FileEntry::new(relative, None));
            }
        }

        if let Some(self_path) = &self.self_path {
            defer_self_entry(&mut files, self_path);
        }
        Ok(files)
    }
}

/// `path` relative to `root`, with `/` separators
fn relative_path(path: &Path, root: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Check if a directory entry should be excluded based on patterns
fn should_exclude(entry: &DirEntry, patterns: &[String]) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let file_name = entry.file_name().to_string_lossy();
    patterns.iter().any(|pattern| match pattern.strip_suffix('*') {
        Some(prefix) => file_name.starts_with(prefix),
        None => file_name == pattern.as_str(),
    })
}
