//! Nonlinear least squares (Levenberg–Marquardt).
//!
//! The Jacobian is taken by forward differences and the normal equations are
//! solved in parameter space rescaled by `sqrt(diag(JᵀJ))`, so parameters of
//! very different magnitude (a slope of 1e-9 A/V next to a phase of 2 V) are
//! handled on an equal footing.

use nalgebra::{DMatrix, DVector};

use crate::config::FitOptions;
use crate::error::{AnalysisError, Result};

const INITIAL_DAMPING: f64 = 1e-3;
const MAX_DAMPING: f64 = 1e32;

/// Converged least-squares solution.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveFit {
    pub params: Vec<f64>,
    /// `inv(JᵀJ) · SSR / (n - p)`; infinite when `n == p`.
    pub covariance: DMatrix<f64>,
    pub residual_sum_of_squares: f64,
    /// Accepted steps.
    pub iterations: usize,
    /// Model evaluations over the whole data set.
    pub evaluations: usize,
}

impl CurveFit {
    /// One-sigma parameter uncertainties.
    pub fn std_errors(&self) -> Vec<f64> {
        (0..self.params.len())
            .map(|i| self.covariance[(i, i)].sqrt())
            .collect()
    }
}

/// Fit `model(x, params)` to `(x, y)` starting from `p0`.
pub fn curve_fit<F>(
    model: F,
    x: &[f64],
    y: &[f64],
    p0: &[f64],
    options: &FitOptions,
) -> Result<CurveFit>
where
    F: Fn(f64, &[f64]) -> f64,
{
    if x.len() != y.len() {
        return Err(AnalysisError::malformed(format!(
            "{} abscissae but {} ordinates",
            x.len(),
            y.len()
        )));
    }
    let n = x.len();
    let p = p0.len();
    if p == 0 {
        return Err(AnalysisError::malformed("no parameters to fit"));
    }
    if n < p {
        return Err(AnalysisError::InsufficientData(format!(
            "{n} points cannot constrain {p} parameters"
        )));
    }

    let budget = options.evaluation_budget(p);
    let problem = Problem { model: &model, x, y };

    let mut params = DVector::from_column_slice(p0);
    let mut residuals = problem.residuals(&params);
    let mut evaluations = 1;
    let mut ssr = residuals.norm_squared();
    if !ssr.is_finite() {
        return Err(AnalysisError::FitDivergence(
            "model is not finite at the initial guess".into(),
        ));
    }

    let mut damping = INITIAL_DAMPING;
    let mut iterations = 0;

    'outer: loop {
        if ssr == 0.0 {
            break;
        }
        let jac = problem.jacobian(&params, &residuals);
        evaluations += p;

        let jtj = jac.transpose() * &jac;
        let gradient = jac.transpose() * &residuals;
        let scale = column_scale(&jtj);
        let scaled = rescale(&jtj, &scale);
        let scaled_gradient = gradient.component_div(&scale);

        loop {
            if evaluations >= budget {
                return Err(AnalysisError::FitDivergence(format!(
                    "no convergence within {budget} model evaluations (SSR = {ssr:e})"
                )));
            }

            let mut system = scaled.clone();
            for i in 0..p {
                system[(i, i)] += damping;
            }
            let Some(chol) = system.cholesky() else {
                damping *= 10.0;
                if damping > MAX_DAMPING {
                    return Err(AnalysisError::FitDivergence(
                        "normal equations are not positive definite".into(),
                    ));
                }
                continue;
            };
            let step = chol.solve(&(-&scaled_gradient)).component_div(&scale);
            let trial = &params + &step;
            let trial_residuals = problem.residuals(&trial);
            evaluations += 1;
            let trial_ssr = trial_residuals.norm_squared();

            let small_step = step
                .iter()
                .zip(trial.iter())
                .all(|(d, t)| d.abs() <= options.xtol * (t.abs() + options.xtol));

            if trial_ssr.is_finite() && trial_ssr < ssr {
                let reduction = ssr - trial_ssr;
                params = trial;
                residuals = trial_residuals;
                iterations += 1;
                let small_reduction = reduction <= options.ftol * ssr;
                ssr = trial_ssr;
                damping = (damping / 10.0).max(f64::MIN_POSITIVE);
                if small_reduction || small_step {
                    break 'outer;
                }
                break;
            }

            // No improvement even for a step below the tolerance: the current
            // point is a minimum to working precision.
            if small_step {
                break 'outer;
            }
            damping *= 10.0;
            if damping > MAX_DAMPING {
                return Err(AnalysisError::FitDivergence(format!(
                    "step control failed to reduce SSR = {ssr:e}"
                )));
            }
        }
    }

    if params.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::FitDivergence("non-finite parameters".into()));
    }

    let covariance = covariance(&problem, &params, &residuals, ssr)?;
    log::debug!(
        "curve_fit converged: params = {:?}, SSR = {ssr:e}, {iterations} steps, {evaluations} evaluations",
        params.as_slice()
    );
    Ok(CurveFit {
        params: params.iter().copied().collect(),
        covariance,
        residual_sum_of_squares: ssr,
        iterations,
        evaluations,
    })
}

struct Problem<'a, F> {
    model: &'a F,
    x: &'a [f64],
    y: &'a [f64],
}

impl<F> Problem<'_, F>
where
    F: Fn(f64, &[f64]) -> f64,
{
    fn residuals(&self, params: &DVector<f64>) -> DVector<f64> {
        let p = params.as_slice();
        DVector::from_iterator(
            self.x.len(),
            self.x.iter().zip(self.y).map(|(&xi, &yi)| (self.model)(xi, p) - yi),
        )
    }

    fn jacobian(&self, params: &DVector<f64>, residuals: &DVector<f64>) -> DMatrix<f64> {
        let eps = f64::EPSILON.sqrt();
        let mut jac = DMatrix::zeros(self.x.len(), params.len());
        for j in 0..params.len() {
            let mut h = eps * params[j].abs();
            if h == 0.0 {
                h = eps;
            }
            let mut shifted = params.clone();
            shifted[j] += h;
            // Use the step actually representable in floating point.
            let h = shifted[j] - params[j];
            let r = self.residuals(&shifted);
            jac.set_column(j, &((r - residuals) / h));
        }
        jac
    }
}

fn column_scale(jtj: &DMatrix<f64>) -> DVector<f64> {
    DVector::from_iterator(
        jtj.nrows(),
        (0..jtj.nrows()).map(|i| {
            let s = jtj[(i, i)].sqrt();
            if s > 0.0 && s.is_finite() {
                s
            } else {
                1.0
            }
        }),
    )
}

fn rescale(m: &DMatrix<f64>, scale: &DVector<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(m.nrows(), m.ncols(), |i, j| m[(i, j)] / (scale[i] * scale[j]))
}

fn covariance<F>(
    problem: &Problem<'_, F>,
    params: &DVector<f64>,
    residuals: &DVector<f64>,
    ssr: f64,
) -> Result<DMatrix<f64>>
where
    F: Fn(f64, &[f64]) -> f64,
{
    let jac = problem.jacobian(params, residuals);
    let jtj = jac.transpose() * &jac;
    let p = jtj.nrows();
    if (0..p).any(|i| jtj[(i, i)] == 0.0) {
        return Err(AnalysisError::FitDivergence(
            "a parameter has no influence on the model; covariance is singular".into(),
        ));
    }
    let scale = column_scale(&jtj);
    let inverse = rescale(&jtj, &scale)
        .cholesky()
        .map(|c| c.inverse())
        .ok_or_else(|| AnalysisError::FitDivergence("covariance matrix is singular".into()))?;
    let inverse = rescale(&inverse, &scale);

    let n = problem.x.len();
    let factor = if n > p {
        ssr / (n - p) as f64
    } else {
        f64::INFINITY
    };
    Ok(inverse * factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear(x: f64, p: &[f64]) -> f64 {
        p[0] + p[1] * x
    }

    fn exponential(x: f64, p: &[f64]) -> f64 {
        p[0] * (-p[1] * x).exp()
    }

    #[test]
    fn recovers_exact_line() {
        let x: Vec<f64> = (0..20).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|&v| 1.5 - 0.25 * v).collect();
        let fit = curve_fit(linear, &x, &y, &[0.0, 1.0], &FitOptions::default()).unwrap();
        assert!((fit.params[0] - 1.5).abs() < 1e-9);
        assert!((fit.params[1] + 0.25).abs() < 1e-9);
        assert!(fit.residual_sum_of_squares < 1e-18);
    }

    #[test]
    fn recovers_exponential_decay() {
        let x: Vec<f64> = (0..40).map(|i| i as f64 * 0.25).collect();
        let y: Vec<f64> = x.iter().map(|&v| exponential(v, &[3.0, 0.7])).collect();
        let fit = curve_fit(exponential, &x, &y, &[1.0, 0.2], &FitOptions::default()).unwrap();
        assert!((fit.params[0] - 3.0).abs() < 1e-7, "{:?}", fit.params);
        assert!((fit.params[1] - 0.7).abs() < 1e-7, "{:?}", fit.params);
    }

    #[test]
    fn covariance_matches_ordinary_least_squares() {
        // y = a + b x with residuals ±1 alternating: the OLS covariance is
        // s² (XᵀX)⁻¹ with s² = SSR / (n - 2).
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 2.0, 1.0, 2.0];
        let fit = curve_fit(linear, &x, &y, &[0.0, 0.0], &FitOptions::default()).unwrap();
        // OLS: b = 0.2, a = 1.2, SSR = 0.8
        assert!((fit.params[0] - 1.2).abs() < 1e-8);
        assert!((fit.params[1] - 0.2).abs() < 1e-8);
        assert!((fit.residual_sum_of_squares - 0.8).abs() < 1e-10);
        // (XᵀX)⁻¹ = [[0.7, -0.3], [-0.3, 0.2]], s² = 0.4
        assert!((fit.covariance[(0, 0)] - 0.28).abs() < 1e-6);
        assert!((fit.covariance[(1, 1)] - 0.08).abs() < 1e-6);
        assert!((fit.covariance[(0, 1)] + 0.12).abs() < 1e-6);
    }

    #[test]
    fn evaluation_budget_is_enforced() {
        let x: Vec<f64> = (0..40).map(|i| i as f64 * 0.25).collect();
        let y: Vec<f64> = x.iter().map(|&v| exponential(v, &[3.0, 0.7])).collect();
        let options = FitOptions {
            max_evaluations: Some(4),
            ..FitOptions::default()
        };
        let err = curve_fit(exponential, &x, &y, &[1.0, 0.2], &options).unwrap_err();
        assert!(matches!(err, AnalysisError::FitDivergence(_)));
    }

    #[test]
    fn irrelevant_parameter_is_singular() {
        let x = [0.0, 1.0, 2.0];
        let y = [1.0, 3.0, 5.0];
        let model = |x: f64, p: &[f64]| p[0] + 2.0 * x;
        let err = curve_fit(model, &x, &y, &[0.0, 5.0], &FitOptions::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::FitDivergence(_)));
    }

    #[test]
    fn too_few_points() {
        let err =
            curve_fit(linear, &[1.0], &[2.0], &[0.0, 0.0], &FitOptions::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData(_)));
    }

    #[test]
    fn non_finite_start_is_rejected() {
        let model = |x: f64, p: &[f64]| (x - p[0]).ln();
        let err = curve_fit(model, &[0.0, 1.0], &[0.0, 0.0], &[5.0], &FitOptions::default())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::FitDivergence(_)));
    }
}
