use std::path::Path;

use crate::config::PhotocurrentConfig;
use crate::data::filter::{interior_range, within_open_interval};
use crate::data::loader::{label_from_file_name, list_files_with_suffix, read_curve};
use crate::data::model::{PhotocurrentCurve, Spectrum};
use crate::error::{AnalysisError, Result};

use super::lsq::curve_fit;

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// Free parameters of the photocurrent model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhotocurrentParams {
    /// Dark current / amplifier offset (A).
    pub offset: f64,
    /// Current per volt above the stopping voltage, per unit spectral weight (A/V).
    pub slope: f64,
    /// Work-function-like phase (V).
    pub phase: f64,
}

impl PhotocurrentParams {
    pub fn from_slice(p: &[f64]) -> Self {
        Self {
            offset: p[0],
            slope: p[1],
            phase: p[2],
        }
    }
}

/// Stopping voltage of light at `wavelength` (nm): `hc/eλ − φ`.
pub fn stopping_voltage(wavelength: f64, phase: f64, hc_over_e: f64) -> f64 {
    hc_over_e / wavelength - phase
}

/// Predicted current at voltage `v`.
///
/// Each spectral component `i` contributes `a_i · m · (v − v0_i)` once `v`
/// exceeds its stopping voltage `v0_i`. `spectrum` is expected to be
/// normalized already.
pub fn photocurrent_model(
    v: f64,
    params: PhotocurrentParams,
    spectrum: &Spectrum,
    hc_over_e: f64,
) -> f64 {
    let ramp: f64 = spectrum
        .wavelength
        .iter()
        .zip(&spectrum.intensity)
        .map(|(&lambda, &a)| {
            let dv = v - stopping_voltage(lambda, params.phase, hc_over_e);
            if dv > 0.0 {
                a * params.slope * dv
            } else {
                0.0
            }
        })
        .sum();
    ramp + params.offset
}

// ---------------------------------------------------------------------------
// Fit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct PhotocurrentFit {
    pub params: PhotocurrentParams,
    /// Covariance in (offset, slope, phase) order.
    pub covariance: [[f64; 3]; 3],
    pub residual_sum_of_squares: f64,
    pub iterations: usize,
    /// Voltage span actually used by the fit.
    pub fit_range: (f64, f64),
}

impl PhotocurrentFit {
    pub fn std_errors(&self) -> [f64; 3] {
        [
            self.covariance[0][0].sqrt(),
            self.covariance[1][1].sqrt(),
            self.covariance[2][2].sqrt(),
        ]
    }
}

/// Fit the spectrum-weighted ramp model to the interior of a sweep.
pub fn fit_photocurrent(
    curve: &PhotocurrentCurve,
    spectrum: &Spectrum,
    config: &PhotocurrentConfig,
) -> Result<PhotocurrentFit> {
    let spectrum = spectrum.normalized()?;
    let range = interior_range(curve.len(), config.trim_head, config.trim_tail)?;
    let v = &curve.voltage[range.clone()];
    let i = &curve.current[range];
    let hc = config.hc_over_e;

    let fit = curve_fit(
        |v, p| photocurrent_model(v, PhotocurrentParams::from_slice(p), &spectrum, hc),
        v,
        i,
        &config.initial_guess,
        &config.fit,
    )?;

    let mut covariance = [[0.0; 3]; 3];
    for (r, row) in covariance.iter_mut().enumerate() {
        for (c, cell) in row.iter_mut().enumerate() {
            *cell = fit.covariance[(r, c)];
        }
    }
    let params = PhotocurrentParams::from_slice(&fit.params);
    let lo = v.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = v.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    log::info!(
        "photocurrent fit: offset = {:.3e} A, slope = {:.3e} A/V, phase = {:.4} V ({} points)",
        params.offset,
        params.slope,
        params.phase,
        v.len()
    );
    Ok(PhotocurrentFit {
        params,
        covariance,
        residual_sum_of_squares: fit.residual_sum_of_squares,
        iterations: fit.iterations,
        fit_range: (lo, hi),
    })
}

/// Model evaluated on `n` evenly spaced voltages across `range`.
pub fn model_curve(
    params: PhotocurrentParams,
    spectrum: &Spectrum,
    hc_over_e: f64,
    range: (f64, f64),
    n: usize,
) -> Result<Vec<[f64; 2]>> {
    let spectrum = spectrum.normalized()?;
    Ok(linspace(range.0, range.1, n)
        .into_iter()
        .map(|v| [v, photocurrent_model(v, params, &spectrum, hc_over_e)])
        .collect())
}

// ---------------------------------------------------------------------------
// Sensitivity diagnostic
// ---------------------------------------------------------------------------

/// SSR of the model with slope and phase scaled away from the best fit.
#[derive(Debug, Clone, PartialEq)]
pub struct SensitivityGrid {
    pub slope_scales: Vec<f64>,
    pub phase_scales: Vec<f64>,
    /// `ssr[row][col]` for `phase_scales[row]`, `slope_scales[col]`.
    pub ssr: Vec<Vec<f64>>,
}

impl SensitivityGrid {
    pub fn min(&self) -> f64 {
        self.ssr
            .iter()
            .flatten()
            .cloned()
            .fold(f64::INFINITY, f64::min)
    }

    /// SSR relative to the grid minimum; `None` when the minimum is zero.
    pub fn normalized(&self) -> Option<Vec<Vec<f64>>> {
        let min = self.min();
        (min > 0.0 && min.is_finite()).then(|| {
            self.ssr
                .iter()
                .map(|row| row.iter().map(|s| s / min).collect())
                .collect()
        })
    }

    /// `(phase_scale, slope_scale)` of the smallest SSR.
    pub fn argmin(&self) -> (f64, f64) {
        let mut best = (f64::INFINITY, 0, 0);
        for (r, row) in self.ssr.iter().enumerate() {
            for (c, &s) in row.iter().enumerate() {
                if s < best.0 {
                    best = (s, r, c);
                }
            }
        }
        (self.phase_scales[best.1], self.slope_scales[best.2])
    }
}

/// Twenty scales from 0.5 to 1.5.
pub fn default_scales() -> Vec<f64> {
    linspace(0.5, 1.5, 20)
}

/// Recompute the SSR over the fitted sweep range for every combination of
/// scaled slope and phase. Offset stays at its fitted value.
pub fn sensitivity_grid(
    curve: &PhotocurrentCurve,
    spectrum: &Spectrum,
    fit: &PhotocurrentFit,
    config: &PhotocurrentConfig,
    scales: &[f64],
) -> Result<SensitivityGrid> {
    let spectrum = spectrum.normalized()?;
    let range = interior_range(curve.len(), config.trim_head, config.trim_tail)?;
    let v = &curve.voltage[range.clone()];
    let i = &curve.current[range];

    let ssr = scales
        .iter()
        .map(|&phase_scale| {
            scales
                .iter()
                .map(|&slope_scale| {
                    let params = PhotocurrentParams {
                        offset: fit.params.offset,
                        slope: fit.params.slope * slope_scale,
                        phase: fit.params.phase * phase_scale,
                    };
                    v.iter()
                        .zip(i)
                        .map(|(&vk, &ik)| {
                            (photocurrent_model(vk, params, &spectrum, config.hc_over_e) - ik)
                                .powi(2)
                        })
                        .sum::<f64>()
                })
                .collect()
        })
        .collect();

    Ok(SensitivityGrid {
        slope_scales: scales.to_vec(),
        phase_scales: scales.to_vec(),
        ssr,
    })
}

// ---------------------------------------------------------------------------
// Linear normalization
// ---------------------------------------------------------------------------

/// A curve rescaled by the straight line fitted to its linear part.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedCurve {
    pub curve: PhotocurrentCurve,
    pub intercept: f64,
    pub slope: f64,
}

/// Fit `current = a + b·v` on voltages strictly inside `window`, then map the
/// curve to `(v + a/b, current / b)`. Curves normalized this way share unit
/// slope and a common stopping voltage at zero.
pub fn normalize_curve(curve: &PhotocurrentCurve, window: (f64, f64)) -> Result<NormalizedCurve> {
    let idx = within_open_interval(&curve.voltage, window.0, window.1);
    if idx.len() < 3 {
        return Err(AnalysisError::InsufficientData(format!(
            "{} samples inside ({}, {}) V, need at least 3 for a line",
            idx.len(),
            window.0,
            window.1
        )));
    }
    let x: Vec<f64> = idx.iter().map(|&k| curve.voltage[k]).collect();
    let y: Vec<f64> = idx.iter().map(|&k| curve.current[k]).collect();
    let mean_y = y.iter().sum::<f64>() / y.len() as f64;

    let fit = curve_fit(
        |x, p| p[0] + p[1] * x,
        &x,
        &y,
        &[mean_y, 0.0],
        &Default::default(),
    )?;
    let (intercept, slope) = (fit.params[0], fit.params[1]);
    if slope == 0.0 || !slope.is_finite() {
        return Err(AnalysisError::FitDivergence(format!(
            "linear part has slope {slope}; cannot normalize"
        )));
    }

    let mut normalized = curve.clone();
    for v in &mut normalized.voltage {
        *v += intercept / slope;
    }
    for c in &mut normalized.current {
        *c /= slope;
    }
    Ok(NormalizedCurve {
        curve: normalized,
        intercept,
        slope,
    })
}

/// Suffix of the sweeps picked up by [`normalize_directory`].
pub const CURRENT_SUFFIX: &str = "_corriente.csv";

/// [`normalize_curve`] applied to every `*_corriente.csv` sweep of `dir`, in
/// name order, labelled by file name.
pub fn normalize_directory(
    dir: &Path,
    window: (f64, f64),
) -> Result<Vec<(String, NormalizedCurve)>> {
    let files = list_files_with_suffix(dir, CURRENT_SUFFIX)?;
    if files.is_empty() {
        return Err(AnalysisError::InsufficientData(format!(
            "no '*{CURRENT_SUFFIX}' sweep in {}",
            dir.display()
        )));
    }
    files
        .iter()
        .map(|path| {
            let normalized = normalize_curve(&read_curve(path)?, window)?;
            log::debug!(
                "{}: a = {:.3e}, b = {:.3e}",
                path.display(),
                normalized.intercept,
                normalized.slope
            );
            Ok((label_from_file_name(path, CURRENT_SUFFIX), normalized))
        })
        .collect()
}

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|k| start + step * k as f64).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HC: f64 = 1.238e3;

    fn sweep(spectrum: &Spectrum, params: PhotocurrentParams) -> PhotocurrentCurve {
        let spectrum = spectrum.normalized().unwrap();
        let voltage: Vec<f64> = (0..=200).map(|k| -1.0 + 0.01 * k as f64).collect();
        let current = voltage
            .iter()
            .map(|&v| photocurrent_model(v, params, &spectrum, HC))
            .collect();
        PhotocurrentCurve::new(voltage, current).unwrap()
    }

    fn rel_err(a: f64, b: f64) -> f64 {
        ((a - b) / b).abs()
    }

    #[test]
    fn model_is_zero_below_stopping_voltage() {
        let spectrum = Spectrum::new(vec![619.0], vec![1.0]).unwrap();
        let params = PhotocurrentParams {
            offset: 1e-12,
            slope: 1e-9,
            phase: 1.5,
        };
        // v0 = 1238/619 - 1.5 = 0.5
        assert_eq!(photocurrent_model(0.4, params, &spectrum, HC), 1e-12);
        assert_eq!(photocurrent_model(0.5, params, &spectrum, HC), 1e-12);
        let above = photocurrent_model(1.0, params, &spectrum, HC);
        assert!((above - (1e-12 + 0.5e-9)).abs() < 1e-21);
    }

    #[test]
    fn model_weights_components() {
        let spectrum = Spectrum::new(vec![619.0, 1238.0], vec![1.0, 0.5]).unwrap();
        let params = PhotocurrentParams {
            offset: 0.0,
            slope: 2.0,
            phase: 0.0,
        };
        // v0 = 2 V and 1 V
        assert_eq!(photocurrent_model(1.5, params, &spectrum, HC), 0.5 * 2.0 * 0.5);
        assert_eq!(photocurrent_model(3.0, params, &spectrum, HC), 2.0 * 1.0 + 0.5 * 2.0 * 2.0);
    }

    #[test]
    fn recovers_single_wavelength_parameters() {
        let spectrum = Spectrum::new(vec![600.0], vec![0.8]).unwrap();
        let truth = PhotocurrentParams {
            offset: 0.0,
            slope: 1e-9,
            phase: 2.0,
        };
        let curve = sweep(&spectrum, truth);
        let config = PhotocurrentConfig {
            initial_guess: [0.0, 1e-10, 1.9],
            ..PhotocurrentConfig::default()
        };
        let fit = fit_photocurrent(&curve, &spectrum, &config).unwrap();

        assert!(fit.params.offset.abs() < 1e-15, "{:?}", fit.params);
        assert!(rel_err(fit.params.slope, 1e-9) < 1e-6, "{:?}", fit.params);
        assert!(rel_err(fit.params.phase, 2.0) < 1e-6, "{:?}", fit.params);
        assert!((fit.fit_range.0 + 0.95).abs() < 1e-9);
        assert!((fit.fit_range.1 - 0.8).abs() < 1e-9);
    }

    #[test]
    fn recovers_two_component_spectrum() {
        let spectrum = Spectrum::new(vec![560.0, 600.0], vec![0.4, 1.0]).unwrap();
        let truth = PhotocurrentParams {
            offset: 2e-12,
            slope: 3e-9,
            phase: 2.0,
        };
        let curve = sweep(&spectrum, truth);
        let config = PhotocurrentConfig {
            initial_guess: [0.0, 1e-9, 1.95],
            ..PhotocurrentConfig::default()
        };
        let fit = fit_photocurrent(&curve, &spectrum, &config).unwrap();
        assert!(rel_err(fit.params.slope, 3e-9) < 1e-5, "{:?}", fit.params);
        assert!(rel_err(fit.params.phase, 2.0) < 1e-5, "{:?}", fit.params);
        assert!(rel_err(fit.params.offset, 2e-12) < 1e-3, "{:?}", fit.params);
    }

    #[test]
    fn short_sweep_is_insufficient() {
        let spectrum = Spectrum::new(vec![600.0], vec![1.0]).unwrap();
        let curve = PhotocurrentCurve::new(vec![0.0; 20], vec![0.0; 20]).unwrap();
        assert!(matches!(
            fit_photocurrent(&curve, &spectrum, &PhotocurrentConfig::default()),
            Err(AnalysisError::InsufficientData(_))
        ));
    }

    #[test]
    fn curve_without_photocurrent_diverges() {
        // Every voltage sits below the stopping voltage, so slope and phase
        // have no influence on the prediction.
        let spectrum = Spectrum::new(vec![300.0], vec![1.0]).unwrap();
        let voltage: Vec<f64> = (0..100).map(|k| -1.0 + 0.01 * k as f64).collect();
        let curve = PhotocurrentCurve::new(voltage, vec![0.0; 100]).unwrap();
        assert!(matches!(
            fit_photocurrent(&curve, &spectrum, &PhotocurrentConfig::default()),
            Err(AnalysisError::FitDivergence(_))
        ));
    }

    #[test]
    fn sensitivity_grid_is_minimal_at_fit() {
        let spectrum = Spectrum::new(vec![600.0], vec![1.0]).unwrap();
        let truth = PhotocurrentParams {
            offset: 0.0,
            slope: 1e-9,
            phase: 2.0,
        };
        let curve = sweep(&spectrum, truth);
        let config = PhotocurrentConfig::default();
        let fit = PhotocurrentFit {
            params: truth,
            covariance: [[0.0; 3]; 3],
            residual_sum_of_squares: 0.0,
            iterations: 0,
            fit_range: (-0.95, 0.8),
        };
        let grid = sensitivity_grid(&curve, &spectrum, &fit, &config, &[0.9, 1.0, 1.1]).unwrap();
        assert_eq!(grid.ssr.len(), 3);
        assert_eq!(grid.argmin(), (1.0, 1.0));
        assert_eq!(grid.min(), 0.0);
        assert!(grid.normalized().is_none());

        let default =
            sensitivity_grid(&curve, &spectrum, &fit, &config, &default_scales()).unwrap();
        assert_eq!(default.ssr.len(), 20);
        let norm = default.normalized().unwrap();
        let smallest = norm.iter().flatten().cloned().fold(f64::INFINITY, f64::min);
        assert!((smallest - 1.0).abs() < 1e-12);
    }

    #[test]
    fn normalization_gives_unit_slope_through_origin() {
        let voltage: Vec<f64> = (0..=60).map(|k| -0.3 + 0.01 * k as f64).collect();
        let current = voltage.iter().map(|&v| 2e-9 * (v - 0.1)).collect();
        let curve = PhotocurrentCurve::new(voltage, current).unwrap();

        let norm = normalize_curve(&curve, (-0.1, 0.5)).unwrap();
        assert!(rel_err(norm.slope, 2e-9) < 1e-6);
        for (v, c) in norm.curve.voltage.iter().zip(&norm.curve.current) {
            assert!((v - c).abs() < 1e-6, "v = {v}, c = {c}");
        }
    }

    #[test]
    fn normalization_needs_points_in_window() {
        let curve = PhotocurrentCurve::new(vec![1.0, 2.0, 3.0], vec![0.0, 1.0, 2.0]).unwrap();
        assert!(matches!(
            normalize_curve(&curve, (-0.1, 0.5)),
            Err(AnalysisError::InsufficientData(_))
        ));
    }

    #[test]
    fn directory_sweeps_are_normalized_in_name_order() {
        use crate::data::loader::write_curve;

        let dir = tempfile::TempDir::new().unwrap();
        let voltage: Vec<f64> = (0..=60).map(|k| -0.3 + 0.01 * k as f64).collect();
        let sweeps = [("led_verde_corriente.csv", 5e-10), ("led_azul_corriente.csv", 2e-9)];
        for (name, slope) in sweeps {
            let current = voltage.iter().map(|&v| slope * (v - 0.1)).collect();
            let curve = PhotocurrentCurve::new(voltage.clone(), current).unwrap();
            write_curve(&dir.path().join(name), &curve).unwrap();
        }
        std::fs::write(dir.path().join("espectro_spec.csv"), "500 1\n").unwrap();

        let curves = normalize_directory(dir.path(), (-0.1, 0.5)).unwrap();
        assert_eq!(curves.len(), 2);
        assert_eq!(curves[0].0, "led azul");
        assert!(rel_err(curves[0].1.slope, 2e-9) < 1e-6);
        assert_eq!(curves[1].0, "led verde");
        assert!(rel_err(curves[1].1.slope, 5e-10) < 1e-6);

        let empty = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            normalize_directory(empty.path(), (-0.1, 0.5)),
            Err(AnalysisError::InsufficientData(_))
        ));
    }

    #[test]
    fn model_curve_spans_range() {
        let spectrum = Spectrum::new(vec![600.0], vec![1.0]).unwrap();
        let params = PhotocurrentParams {
            offset: 0.0,
            slope: 1.0,
            phase: 2.0,
        };
        let pts = model_curve(params, &spectrum, HC, (-1.0, 1.0), 1000).unwrap();
        assert_eq!(pts.len(), 1000);
        assert_eq!(pts[0][0], -1.0);
        assert!((pts[999][0] - 1.0).abs() < 1e-12);
    }
}
