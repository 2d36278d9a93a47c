use crate::data::filter::below_upper_bound;
use crate::error::{AnalysisError, Result};

// ---------------------------------------------------------------------------
// EmpiricalHistogram – relative frequency of each count value
// ---------------------------------------------------------------------------

/// Unit-width histogram of per-window counts.
///
/// Bin `j` holds the windows with exactly `j` events, for `j` in
/// `0 .. max(count)`. The span is half-open, so windows at the maximum count
/// fall outside it and are not part of the density.
#[derive(Debug, Clone, PartialEq)]
pub struct EmpiricalHistogram {
    /// Bin centres (the count value of each bin).
    pub bins: Vec<f64>,
    /// Relative frequency per bin; sums to 1.
    pub frequencies: Vec<f64>,
    /// Raw number of windows per bin.
    pub occupancy: Vec<u32>,
    /// Windows that landed in some bin.
    pub samples: usize,
}

impl EmpiricalHistogram {
    /// Bin `counts` after discarding every value `>= upper_bound`.
    pub fn from_counts(counts: &[u32], upper_bound: u32) -> Result<Self> {
        let kept = below_upper_bound(counts, upper_bound);
        let Some(&max) = kept.last() else {
            return Err(AnalysisError::DegenerateHistogram(format!(
                "no count below the upper bound {upper_bound} ({} windows discarded)",
                counts.len()
            )));
        };

        let n_bins = max as usize;
        if n_bins < 2 {
            return Err(AnalysisError::DegenerateHistogram(format!(
                "largest retained count is {max}, which spans {n_bins} bin(s); at least 2 are needed"
            )));
        }

        let mut occupancy = vec![0u32; n_bins];
        for &c in &kept {
            if let Some(slot) = occupancy.get_mut(c as usize) {
                *slot += 1;
            }
        }
        let samples: usize = occupancy.iter().map(|&o| o as usize).sum();
        if samples == 0 {
            return Err(AnalysisError::DegenerateHistogram(
                "every retained window sits at the maximum count".into(),
            ));
        }

        let frequencies = occupancy
            .iter()
            .map(|&o| o as f64 / samples as f64)
            .collect();
        let bins = (0..n_bins).map(|j| j as f64).collect();

        log::debug!(
            "histogram: {} of {} windows in {n_bins} bins",
            samples,
            counts.len()
        );
        Ok(Self {
            bins,
            frequencies,
            occupancy,
            samples,
        })
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Mean count over the binned windows.
    pub fn mean(&self) -> f64 {
        self.bins
            .iter()
            .zip(&self.frequencies)
            .map(|(j, f)| j * f)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequencies_sum_to_one() {
        let counts = [0, 1, 1, 2, 2, 2, 3, 3, 4, 7, 25, 30];
        let hist = EmpiricalHistogram::from_counts(&counts, 20).unwrap();
        let total: f64 = hist.frequencies.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert_eq!(hist.len(), 7);
        assert_eq!(hist.occupancy, vec![1, 2, 3, 2, 1, 0, 0]);
        assert_eq!(hist.samples, 9);
    }

    #[test]
    fn maximum_is_outside_the_span() {
        let hist = EmpiricalHistogram::from_counts(&[0, 1, 2, 3, 3], 20).unwrap();
        assert_eq!(hist.bins, vec![0.0, 1.0, 2.0]);
        assert_eq!(hist.samples, 3);
        assert!((hist.mean() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn all_counts_above_bound_is_degenerate() {
        let err = EmpiricalHistogram::from_counts(&[20, 21, 50], 20).unwrap_err();
        assert!(matches!(err, AnalysisError::DegenerateHistogram(_)));
    }

    #[test]
    fn empty_input_is_degenerate() {
        assert!(matches!(
            EmpiricalHistogram::from_counts(&[], 20),
            Err(AnalysisError::DegenerateHistogram(_))
        ));
    }

    #[test]
    fn single_bin_is_degenerate() {
        assert!(matches!(
            EmpiricalHistogram::from_counts(&[0, 0, 1, 1], 20),
            Err(AnalysisError::DegenerateHistogram(_))
        ));
    }
}
