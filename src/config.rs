use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Every tunable of the two pipelines, loadable from a single JSON file.
///
/// ```json
/// {
///   "counting": { "threshold": -0.005, "upper_bound": 20 },
///   "photocurrent": { "trim_head": 5, "trim_tail": 20 }
/// }
/// ```
///
/// Missing sections and fields fall back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub counting: CountingConfig,
    pub acquisition: AcquisitionConfig,
    pub photocurrent: PhotocurrentConfig,
    pub sweep: SweepConfig,
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: AnalysisConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Optimizer
// ---------------------------------------------------------------------------

/// Levenberg–Marquardt stopping criteria.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    /// Budget of model evaluations. `None` means `200 * (parameters + 1)`.
    pub max_evaluations: Option<usize>,
    /// Relative reduction of the residual sum of squares considered converged.
    pub ftol: f64,
    /// Relative parameter step considered converged.
    pub xtol: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_evaluations: None,
            ftol: 1.49012e-8,
            xtol: 1.49012e-8,
        }
    }
}

impl FitOptions {
    pub fn evaluation_budget(&self, n_params: usize) -> usize {
        self.max_evaluations.unwrap_or(200 * (n_params + 1))
    }
}

// ---------------------------------------------------------------------------
// Photon counting
// ---------------------------------------------------------------------------

/// Chi-square input scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChiSquareBasis {
    /// Observed and expected frequencies multiplied by the number of windows.
    #[default]
    Counts,
    /// Relative frequencies compared directly.
    Frequencies,
}

/// What happens to the exported event list between windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAccumulation {
    /// Only the events of the most recent window are kept.
    ResetPerWindow,
    /// Events of every window in the run are kept, in acquisition order.
    #[default]
    AccumulateRun,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountingConfig {
    /// Minima at or above this voltage are baseline noise (PMT pulses are negative).
    pub threshold: f64,
    /// Counts at or above this value are discarded as bad windows.
    pub upper_bound: u32,
    /// Starting rate for both distribution fits.
    pub initial_lambda: f64,
    /// Only file names containing this marker are treated as windows.
    pub file_marker: String,
    /// Stop after this many window files.
    pub max_files: usize,
    pub chi_square_basis: ChiSquareBasis,
    pub fit: FitOptions,
}

impl Default for CountingConfig {
    fn default() -> Self {
        Self {
            threshold: -5e-3,
            upper_bound: 20,
            initial_lambda: 3.0,
            file_marker: "med".to_string(),
            max_files: 1000,
            chi_square_basis: ChiSquareBasis::default(),
            fit: FitOptions::default(),
        }
    }
}

/// Oscilloscope settings used while recording windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Seconds per division.
    pub time_scale: f64,
    /// Volts per division.
    pub voltage_scale: f64,
    pub channel: u8,
    /// Also count events and write `eventos.csv` / `cuentas.csv`.
    pub record_events: bool,
    pub threshold: f64,
    pub accumulation: EventAccumulation,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            time_scale: 100e-6,
            voltage_scale: 10e-3,
            channel: 1,
            record_events: false,
            threshold: -5e-3,
            accumulation: EventAccumulation::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Photoelectric effect
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotocurrentConfig {
    /// h·c/e in volt-nanometres; turns a wavelength in nm into an energy in V.
    pub hc_over_e: f64,
    /// Samples dropped at the start of the sweep.
    pub trim_head: usize,
    /// Samples dropped at the end of the sweep.
    pub trim_tail: usize,
    /// Initial (offset, slope, phase).
    pub initial_guess: [f64; 3],
    /// Voltage window used by the linear normalization.
    pub linear_window: (f64, f64),
    /// Leading spectrum samples averaged as the dark level in spectra overlays.
    pub dark_samples: usize,
    pub fit: FitOptions,
}

impl Default for PhotocurrentConfig {
    fn default() -> Self {
        Self {
            hc_over_e: 1.238e3,
            trim_head: 5,
            trim_tail: 20,
            initial_guess: [0.0, 1e-10, 2.0],
            linear_window: (-0.1, 0.5),
            dark_samples: 20,
            fit: FitOptions::default(),
        }
    }
}

/// Lock-in driven voltage sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub aux_output: u8,
    pub v_min: f64,
    pub v_max: f64,
    pub step: f64,
    /// Index into the lock-in time constant table (7 = 30 ms).
    pub time_constant_index: u8,
    /// Dwell per point as a multiple of the time constant.
    pub dwell_multiple: f64,
    /// Wait after configuring the lock-in, before the first point.
    pub settle_seconds: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            aux_output: 1,
            v_min: -3.0,
            v_max: 0.5,
            step: 0.01,
            time_constant_index: 7,
            dwell_multiple: 25.0,
            settle_seconds: 5.0,
        }
    }
}
