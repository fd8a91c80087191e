//! Staleness decisions: does a local file differ from the remote copy?
//!
//! Every policy ends in a content hash comparison. Timestamps may colour the
//! reason reported for a decision but never decide it alone.

pub mod hash_only;
pub mod hybrid;

pub use hash_only::HashOnlyComparator;
pub use hybrid::HybridComparator;

use crate::config::{ComparatorKind, UpdateConfig};
use crate::discovery::FileEntry;
use crate::hash::HashCalculator;
use crate::remote::RemoteFileInfo;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Everything a comparator needs for one file.
#[derive(Debug, Clone, Copy)]
pub struct ComparisonContext<'a> {
    pub relative_path: &'a str,
    pub entry: &'a FileEntry,
    pub local_path: &'a Path,
    pub remote: &'a RemoteFileInfo,
}

/// How local and remote modification times relate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampVerdict {
    /// Policy does not look at timestamps
    NotConsulted,
    /// Remote or local timestamp unavailable
    Unknown,
    /// Within the tolerance window
    Similar,
    RemoteNewer,
    LocalNewer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonReason {
    MissingFile,
    RemoteHashUnavailable,
    UnreadableLocalFile,
    HashMatch(TimestampVerdict),
    HashMismatch(TimestampVerdict),
}

impl fmt::Display for ComparisonReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (ts, hash) = match self {
            ComparisonReason::MissingFile => return write!(f, "missing file"),
            ComparisonReason::RemoteHashUnavailable => return write!(f, "remote hash unavailable"),
            ComparisonReason::UnreadableLocalFile => return write!(f, "local file unreadable"),
            ComparisonReason::HashMatch(ts) => (ts, "hash match"),
            ComparisonReason::HashMismatch(ts) => (ts, "hash mismatch"),
        };
        match ts {
            TimestampVerdict::NotConsulted => write!(f, "{}", hash),
            TimestampVerdict::Unknown => write!(f, "no timestamp, {}", hash),
            TimestampVerdict::Similar => write!(f, "timestamps similar, {}", hash),
            TimestampVerdict::RemoteNewer => write!(f, "remote newer, {}", hash),
            TimestampVerdict::LocalNewer => write!(f, "local newer, {}", hash),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonResult {
    pub needs_update: bool,
    pub reason: ComparisonReason,
    pub local_hash: Option<String>,
    pub remote_hash: Option<String>,
}

impl ComparisonResult {
    fn stale(reason: ComparisonReason, local_hash: Option<String>, remote_hash: Option<String>) -> Self {
        Self {
            needs_update: true,
            reason,
            local_hash,
            remote_hash,
        }
    }
}

pub trait Comparator: Send + Sync {
    fn name(&self) -> &'static str;

    fn compare(&self, ctx: &ComparisonContext<'_>) -> ComparisonResult;
}

/// Build the comparator selected in config.
pub fn from_config(config: &UpdateConfig) -> Box<dyn Comparator> {
    match config.comparator {
        ComparatorKind::Hash => Box::new(HashOnlyComparator::new()),
        ComparatorKind::Hybrid => Box::new(HybridComparator::new(Duration::from_secs(
            config.timestamp_tolerance_secs,
        ))),
    }
}

/// Common tail of every policy: settle the decision by content hash.
fn decide_by_hash(
    calc: &HashCalculator,
    ctx: &ComparisonContext<'_>,
    timestamps: TimestampVerdict,
) -> ComparisonResult {
    if !ctx.local_path.is_file() {
        return ComparisonResult::stale(
            ComparisonReason::MissingFile,
            None,
            ctx.remote.hash.as_ref().map(|h| h.to_hex()),
        );
    }

    let Some(remote_hash) = ctx.remote.hash.as_ref() else {
        return ComparisonResult::stale(ComparisonReason::RemoteHashUnavailable, None, None);
    };
    let remote_hex = remote_hash.to_hex();

    let Some(local_digest) = calc.digest(ctx.local_path, remote_hash.algorithm) else {
        return ComparisonResult::stale(ComparisonReason::UnreadableLocalFile, None, Some(remote_hex));
    };
    let local_hex = hex::encode(&local_digest);

    if remote_hash.matches(&local_digest) {
        ComparisonResult {
            needs_update: false,
            reason: ComparisonReason::HashMatch(timestamps),
            local_hash: Some(local_hex),
            remote_hash: Some(remote_hex),
        }
    } else {
        ComparisonResult::stale(
            ComparisonReason::HashMismatch(timestamps),
            Some(local_hex),
            Some(remote_hex),
        )
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_tags() {
        assert_eq!(ComparisonReason::MissingFile.to_string(), "missing file");
        assert_eq!(
            ComparisonReason::HashMismatch(TimestampVerdict::NotConsulted).to_string(),
            "hash mismatch"
        );
        assert_eq!(
            ComparisonReason::HashMatch(TimestampVerdict::Similar).to_string(),
            "timestamps similar, hash match"
        );
        assert_eq!(
            ComparisonReason::HashMismatch(TimestampVerdict::Unknown).to_string(),
            "no timestamp, hash mismatch"
        );
    }

    #[test]
    fn test_from_config() {
        let mut config = UpdateConfig::default();
        assert_eq!(from_config(&config).name(), "hybrid");
        config.comparator = ComparatorKind::Hash;
        assert_eq!(from_config(&config).name(), "hash");
    }
}
