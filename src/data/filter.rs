use crate::error::{AnalysisError, Result};

// ---------------------------------------------------------------------------
// Sample selection applied before fitting
// ---------------------------------------------------------------------------

/// Counts strictly below `upper_bound`, sorted ascending.
///
/// Windows with implausibly many events are measurement artifacts (a
/// saturated trace or a trigger glitch) and are dropped before binning.
pub fn below_upper_bound(counts: &[u32], upper_bound: u32) -> Vec<u32> {
    let mut kept: Vec<u32> = counts.iter().copied().filter(|&c| c < upper_bound).collect();
    kept.sort_unstable();
    kept
}

/// The index range left after dropping `head` leading and `tail` trailing
/// samples. Errors when nothing would be left.
pub fn interior_range(len: usize, head: usize, tail: usize) -> Result<std::ops::Range<usize>> {
    if head + tail >= len {
        return Err(AnalysisError::InsufficientData(format!(
            "{len} samples cannot drop {head} leading and {tail} trailing samples"
        )));
    }
    Ok(head..len - tail)
}

/// Indices of samples whose abscissa lies strictly inside `(lo, hi)`.
pub fn within_open_interval(x: &[f64], lo: f64, hi: f64) -> Vec<usize> {
    x.iter()
        .enumerate()
        .filter(|(_, &v)| v > lo && v < hi)
        .map(|(i, _)| i)
        .collect()
}
