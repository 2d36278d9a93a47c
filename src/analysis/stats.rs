//! Special functions and the chi-square goodness-of-fit test.

use std::f64::consts::PI;

use crate::error::{AnalysisError, Result};

const EPS: f64 = 1e-15;
const TINY: f64 = 1e-300;
const MAX_TERMS: usize = 1000;

/// ln Γ(x) for x > 0 (Lanczos, g = 7, n = 9).
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // Reflection formula: Γ(x) = π / (sin(πx) · Γ(1-x))
        let reflected = ln_gamma(1.0 - x);
        (PI / (PI * x).sin()).ln() - reflected
    } else {
        let coefficients: [f64; 9] = [
            0.99999999999980993,
            676.5203681218851,
            -1259.1392167224028,
            771.32342877765313,
            -176.61502916214059,
            12.507343278686905,
            -0.13857109526572012,
            9.9843695780195716e-6,
            1.5056327351493116e-7,
        ];
        let g = 7.0_f64;
        let z = x - 1.0;
        let mut ag = coefficients[0];
        for (i, c) in coefficients.iter().enumerate().skip(1) {
            ag += c / (z + i as f64);
        }
        let t = z + g + 0.5;
        0.5 * (2.0 * PI).ln() + (z + 0.5) * t.ln() - t + ag.ln()
    }
}

/// ln(n!) evaluated through the gamma function so non-integer bin centres work.
pub fn ln_factorial(n: f64) -> f64 {
    ln_gamma(n + 1.0)
}

/// Upper regularized incomplete gamma function Q(a, x) = Γ(a, x) / Γ(a).
pub fn regularized_gamma_q(a: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 1.0;
    }
    if x.is_infinite() {
        return 0.0;
    }
    let log_prefactor = -x + a * x.ln() - ln_gamma(a);
    if x < a + 1.0 {
        // Series for P(a, x) converges quickly here.
        let mut ap = a;
        let mut term = 1.0 / a;
        let mut sum = term;
        for _ in 0..MAX_TERMS {
            ap += 1.0;
            term *= x / ap;
            sum += term;
            if term.abs() < sum.abs() * EPS {
                break;
            }
        }
        (1.0 - sum * log_prefactor.exp()).clamp(0.0, 1.0)
    } else {
        // Continued fraction for Q(a, x), modified Lentz.
        let mut b = x + 1.0 - a;
        let mut c = 1.0 / TINY;
        let mut d = 1.0 / b;
        let mut h = d;
        for i in 1..=MAX_TERMS {
            let an = -(i as f64) * (i as f64 - a);
            b += 2.0;
            d = an * d + b;
            if d.abs() < TINY {
                d = TINY;
            }
            c = b + an / c;
            if c.abs() < TINY {
                c = TINY;
            }
            d = 1.0 / d;
            let delta = d * c;
            h *= delta;
            if (delta - 1.0).abs() < EPS {
                break;
            }
        }
        (log_prefactor.exp() * h).clamp(0.0, 1.0)
    }
}

/// Survival function of the chi-square distribution with `dof` degrees of freedom.
pub fn chi_square_sf(statistic: f64, dof: usize) -> f64 {
    if statistic.is_nan() {
        return f64::NAN;
    }
    regularized_gamma_q(dof as f64 / 2.0, statistic / 2.0)
}

/// Result of a Pearson chi-square test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChiSquare {
    pub statistic: f64,
    pub degrees_of_freedom: usize,
    pub p_value: f64,
}

/// Pearson chi-square of `observed` against `expected`.
///
/// `ddof` extra degrees of freedom are removed on top of the usual one
/// (one per fitted parameter). A bin where both values are zero has no
/// defined contribution and is reported as an error; a zero expectation
/// with a non-zero observation drives the statistic to infinity (p = 0).
pub fn chi_square_test(observed: &[f64], expected: &[f64], ddof: usize) -> Result<ChiSquare> {
    if observed.len() != expected.len() {
        return Err(AnalysisError::malformed(format!(
            "{} observed bins but {} expected bins",
            observed.len(),
            expected.len()
        )));
    }
    let k = observed.len();
    if k < 2 + ddof {
        return Err(AnalysisError::InsufficientData(format!(
            "{k} bins leave no degrees of freedom after fitting {ddof} parameter(s)"
        )));
    }
    let degrees_of_freedom = k - 1 - ddof;

    let mut statistic = 0.0;
    for (bin, (&o, &e)) in observed.iter().zip(expected).enumerate() {
        if e == 0.0 {
            if o == 0.0 {
                return Err(AnalysisError::UndefinedChiSquareTerm { bin });
            }
            statistic = f64::INFINITY;
            continue;
        }
        statistic += (o - e).powi(2) / e;
    }

    Ok(ChiSquare {
        statistic,
        degrees_of_freedom,
        p_value: chi_square_sf(statistic, degrees_of_freedom),
    })
}
