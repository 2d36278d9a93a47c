use std::fmt;
use std::io::Write;
use std::path::Path;

use crate::config::{ChiSquareBasis, CountingConfig};
use crate::error::{AnalysisError, Result};

use super::histogram::EmpiricalHistogram;
use super::lsq::curve_fit;
use super::stats::{chi_square_test, ln_factorial};

// ---------------------------------------------------------------------------
// Candidate photon-number distributions
// ---------------------------------------------------------------------------

/// Poisson probability of `j` events at mean rate `lambda`.
pub fn poisson_pmf(j: f64, lambda: f64) -> f64 {
    if lambda == 0.0 {
        return if j == 0.0 { 1.0 } else { 0.0 };
    }
    lambda.powf(j) * (-lambda).exp() / ln_factorial(j).exp()
}

/// Bose-Einstein (geometric) probability of `j` events at mean `lambda`.
pub fn bose_einstein_pmf(j: f64, lambda: f64) -> f64 {
    lambda.powf(j) / (1.0 + lambda).powf(1.0 + j)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Poisson,
    BoseEinstein,
}

impl ModelKind {
    pub fn pmf(self, j: f64, lambda: f64) -> f64 {
        match self {
            ModelKind::Poisson => poisson_pmf(j, lambda),
            ModelKind::BoseEinstein => bose_einstein_pmf(j, lambda),
        }
    }

    /// Short label used in reports and plot legends.
    pub fn label(self) -> &'static str {
        match self {
            ModelKind::Poisson => "Poisson",
            ModelKind::BoseEinstein => "BE",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Fit results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct FittedModel {
    pub kind: ModelKind,
    /// Mean number of events per window.
    pub lambda: f64,
    /// Variance of `lambda` from the least-squares covariance.
    pub variance: f64,
    pub std_error: f64,
    pub chi_square: f64,
    pub degrees_of_freedom: usize,
    pub p_value: f64,
    pub iterations: usize,
}

impl FittedModel {
    /// Model probabilities at the given bin centres.
    pub fn predict(&self, bins: &[f64]) -> Vec<f64> {
        bins.iter().map(|&j| self.kind.pmf(j, self.lambda)).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistributionFit {
    pub histogram: EmpiricalHistogram,
    pub poisson: FittedModel,
    pub bose_einstein: FittedModel,
}

// ---------------------------------------------------------------------------
// Fitting
// ---------------------------------------------------------------------------

/// Histogram `counts` and fit both candidate distributions to it.
pub fn fit_distributions(counts: &[u32], config: &CountingConfig) -> Result<DistributionFit> {
    let histogram = EmpiricalHistogram::from_counts(counts, config.upper_bound)?;
    let poisson = fit_model(ModelKind::Poisson, &histogram, config)?;
    let bose_einstein = fit_model(ModelKind::BoseEinstein, &histogram, config)?;

    log::info!(
        "Poisson <n> = {:.3} (p = {:.3e}), BE <n> = {:.3} (p = {:.3e}) over {} windows",
        poisson.lambda,
        poisson.p_value,
        bose_einstein.lambda,
        bose_einstein.p_value,
        histogram.samples
    );
    Ok(DistributionFit {
        histogram,
        poisson,
        bose_einstein,
    })
}

/// Least-squares fit of one model to the histogram, plus its chi-square test.
pub fn fit_model(
    kind: ModelKind,
    histogram: &EmpiricalHistogram,
    config: &CountingConfig,
) -> Result<FittedModel> {
    let fit = curve_fit(
        |j, p| kind.pmf(j, p[0]),
        &histogram.bins,
        &histogram.frequencies,
        &[config.initial_lambda],
        &config.fit,
    )?;
    let lambda = fit.params[0];
    if lambda < 0.0 {
        return Err(AnalysisError::FitDivergence(format!(
            "{kind} fit converged to a negative mean ({lambda})"
        )));
    }

    let expected: Vec<f64> = histogram
        .bins
        .iter()
        .map(|&j| kind.pmf(j, lambda))
        .collect();
    let scale = match config.chi_square_basis {
        ChiSquareBasis::Counts => histogram.samples as f64,
        ChiSquareBasis::Frequencies => 1.0,
    };
    let observed: Vec<f64> = histogram.frequencies.iter().map(|f| f * scale).collect();
    let expected: Vec<f64> = expected.iter().map(|e| e * scale).collect();
    let test = chi_square_test(&observed, &expected, 1)?;

    let variance = fit.covariance[(0, 0)];
    Ok(FittedModel {
        kind,
        lambda,
        variance,
        std_error: variance.sqrt(),
        chi_square: test.statistic,
        degrees_of_freedom: test.degrees_of_freedom,
        p_value: test.p_value,
        iterations: fit.iterations,
    })
}

/// Two-line plain-text p-value report.
pub fn write_p_value_report(path: &Path, fit: &DistributionFit) -> Result<()> {
    let mut file = std::fs::File::create(path).map_err(|e| AnalysisError::io(path, e))?;
    write!(file, "{}", p_value_report(fit)).map_err(|e| AnalysisError::io(path, e))
}

pub fn p_value_report(fit: &DistributionFit) -> String {
    format!(
        "Poisson p-value: {}\nBE p-value: {}\n",
        fit.poisson.p_value, fit.bose_einstein.p_value
    )
}
