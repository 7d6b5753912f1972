//! Run reporting: failure tallies and formatted terminal output.

use std::collections::BTreeMap;

use crate::app::pipeline::PassSummary;

pub mod format;

pub use format::*;

/// Skipped sweeps and failed resonances grouped by failure kind.
pub fn failure_counts(summary: &PassSummary) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for err in &summary.skipped_sweeps {
        *counts.entry(err.kind()).or_insert(0) += 1;
    }
    for failure in &summary.failed_resonances {
        *counts.entry(failure.error.kind()).or_insert(0) += 1;
    }
    counts
}
