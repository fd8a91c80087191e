//! Pure content comparison.

use super::{decide_by_hash, Comparator, ComparisonContext, ComparisonResult, TimestampVerdict};
use crate::hash::HashCalculator;

/// Stale iff the local hash differs from the remote one, cannot be computed,
/// or the remote published no hash.
#[derive(Debug, Default)]
pub struct HashOnlyComparator {
    calc: HashCalculator,
}

impl HashOnlyComparator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Comparator for HashOnlyComparator {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn compare(&self, ctx: &ComparisonContext<'_>) -> ComparisonResult {
        decide_by_hash(&self.calc, ctx, TimestampVerdict::NotConsulted)
    }
}
