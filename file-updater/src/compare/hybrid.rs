//! Timestamp pre-classification followed by hash verification.
//!
//! Local and remote modification times are compared with a tolerance window
//! to absorb clock skew. The result only labels the decision; the decision
//! itself always comes from the content hash, so a file with a fresh mtime
//! but wrong bytes is still replaced.

use super::{decide_by_hash, Comparator, ComparisonContext, ComparisonResult, TimestampVerdict};
use crate::hash::HashCalculator;
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};
use tracing::trace;

#[derive(Debug)]
pub struct HybridComparator {
    tolerance: Duration,
    calc: HashCalculator,
}

impl HybridComparator {
    pub fn new(tolerance: Duration) -> Self {
        Self {
            tolerance,
            calc: HashCalculator,
        }
    }

    fn classify(&self, local_millis: Option<i64>, remote_millis: i64) -> TimestampVerdict {
        let Some(local) = local_millis.filter(|_| remote_millis > 0) else {
            return TimestampVerdict::Unknown;
        };
        let tolerance = self.tolerance.as_millis() as i64;
        let delta = remote_millis - local;
        if delta.abs() <= tolerance {
            TimestampVerdict::Similar
        } else if delta > 0 {
            TimestampVerdict::RemoteNewer
        } else {
            TimestampVerdict::LocalNewer
        }
    }
}

impl Default for HybridComparator {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

impl Comparator for HybridComparator {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    fn compare(&self, ctx: &ComparisonContext<'_>) -> ComparisonResult {
        let verdict = self.classify(modified_millis(ctx.local_path), ctx.remote.last_modified_millis);
        trace!("{}: timestamps {:?}", ctx.relative_path, verdict);
        decide_by_hash(&self.calc, ctx, verdict)
    }
}

/// Local modification time in epoch millis
fn modified_millis(path: &Path) -> Option<i64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let millis = modified.duration_since(UNIX_EPOCH).ok()?.as_millis();
    i64::try_from(millis).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::fixtures::remote_for;
    use crate::compare::ComparisonReason;
    use crate::discovery::FileEntry;
    use crate::remote::RemoteFileInfo;
    use std::fs;
    use tempfile::TempDir;

    const MINUTE: i64 = 60_000;

    fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn run(local: Option<&[u8]>, remote: &RemoteFileInfo) -> ComparisonResult {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file.txt");
        if let Some(bytes) = local {
            fs::write(&path, bytes).unwrap();
        }
        let entry = FileEntry::new("file.txt", None);
        let ctx = ComparisonContext {
            relative_path: "file.txt",
            entry: &entry,
            local_path: &path,
            remote,
        };
        HybridComparator::default().compare(&ctx)
    }

    #[test]
    fn test_classify_window() {
        let cmp = HybridComparator::new(Duration::from_secs(300));
        let base = 1_700_000_000_000;
        assert_eq!(cmp.classify(Some(base), base + 4 * MINUTE), TimestampVerdict::Similar);
        assert_eq!(cmp.classify(Some(base), base - 5 * MINUTE), TimestampVerdict::Similar);
        assert_eq!(cmp.classify(Some(base), base + 6 * MINUTE), TimestampVerdict::RemoteNewer);
        assert_eq!(cmp.classify(Some(base), base - 6 * MINUTE), TimestampVerdict::LocalNewer);
        assert_eq!(cmp.classify(Some(base), 0), TimestampVerdict::Unknown);
        assert_eq!(cmp.classify(None, base), TimestampVerdict::Unknown);
    }

    #[test]
    fn test_similar_timestamps_still_verify_hash() {
        // Fresh local mtime, remote "now": timestamps agree but content differs
        let result = run(Some(b"tampered"), &remote_for("file.txt", b"genuine", now_millis()));
        assert!(result.needs_update);
        assert_eq!(result.reason, ComparisonReason::HashMismatch(TimestampVerdict::Similar));
    }

    #[test]
    fn test_similar_timestamps_and_hash_match() {
        let result = run(Some(b"genuine"), &remote_for("file.txt", b"genuine", now_millis()));
        assert!(!result.needs_update);
        assert_eq!(result.reason, ComparisonReason::HashMatch(TimestampVerdict::Similar));
    }

    #[test]
    fn test_remote_newer_but_same_content_is_up_to_date() {
        let remote = remote_for("file.txt", b"same", now_millis() + 60 * MINUTE);
        let result = run(Some(b"same"), &remote);
        assert!(!result.needs_update);
        assert_eq!(result.reason, ComparisonReason::HashMatch(TimestampVerdict::RemoteNewer));
    }

    #[test]
    fn test_local_newer_with_different_content_is_stale() {
        let remote = remote_for("file.txt", b"remote", now_millis() - 60 * MINUTE);
        let result = run(Some(b"local edit"), &remote);
        assert!(result.needs_update);
        assert_eq!(result.reason, ComparisonReason::HashMismatch(TimestampVerdict::LocalNewer));
    }

    #[test]
    fn test_unknown_remote_timestamp_falls_back_to_hash() {
        let result = run(Some(b"same"), &remote_for("file.txt", b"same", 0));
        assert!(!result.needs_update);
        assert_eq!(result.reason, ComparisonReason::HashMatch(TimestampVerdict::Unknown));
    }

    #[test]
    fn test_missing_local_file() {
        let result = run(None, &remote_for("file.txt", b"x", now_millis()));
        assert!(result.needs_update);
        assert_eq!(result.reason, ComparisonReason::MissingFile);
    }
}
