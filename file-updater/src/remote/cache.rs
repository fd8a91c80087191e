//! Short-lived metadata cache keyed by relative path.

use super::RemoteFileInfo;
use dashmap::DashMap;
use std::time::{Duration, Instant};

struct CachedEntry {
    info: RemoteFileInfo,
    fetched_at: Instant,
}

pub struct MetadataCache {
    entries: DashMap<String, CachedEntry>,
    ttl: Duration,
}

impl MetadataCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Fresh entry for `path`; expired entries are dropped on the way.
    pub fn get(&self, path: &str) -> Option<RemoteFileInfo> {
        if let Some(entry) = self.entries.get(path) {
            if entry.fetched_at.elapsed() < self.ttl {
                return Some(entry.info.clone());
            }
        }
        // Guard above is released before removing
        self.entries
            .remove_if(path, |_, entry| entry.fetched_at.elapsed() >= self.ttl);
        None
    }

    pub fn insert(&self, info: RemoteFileInfo) {
        self.entries.insert(
            info.path.clone(),
            CachedEntry {
                info,
                fetched_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
