//! Instrument collaborators and the acquisition loops that drive them.
//!
//! The analysis code only ever sees materialized windows and curves; the
//! traits here are the seam where a VISA/GPIB driver or a simulator plugs in.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Poisson};

use crate::analysis::aggregate::{window_file_name, EventLog, COUNTS_FILE, EVENTS_FILE};
use crate::analysis::photocurrent::{photocurrent_model, PhotocurrentParams};
use crate::config::{AcquisitionConfig, SweepConfig};
use crate::data::loader::{write_counts, write_values, write_window};
use crate::data::model::{AcquisitionWindow, PhotocurrentCurve, Spectrum};

// ---------------------------------------------------------------------------
// Oscilloscope
// ---------------------------------------------------------------------------

/// Digital oscilloscope reading one channel at a time.
pub trait Oscilloscope {
    /// Seconds per division and horizontal position.
    fn configure_timebase(&mut self, scale: f64, zero: f64) -> Result<()>;
    /// Volts per division and vertical position of `channel`.
    fn configure_channel(&mut self, channel: u8, scale: f64, zero: f64) -> Result<()>;
    /// One full sweep of `channel` as `(time, voltage)`.
    fn read_window(&mut self, channel: u8) -> Result<(Vec<f64>, Vec<f64>)>;
}

/// Files and statistics produced by [`acquire_windows`].
#[derive(Debug, Clone, Default)]
pub struct AcquisitionRun {
    pub window_files: Vec<PathBuf>,
    /// Per-window counts; empty unless events were recorded.
    pub counts: Vec<u32>,
    /// Exported event amplitudes, per the accumulation policy.
    pub events: Vec<f64>,
}

/// Record `n` windows into `out_dir` as `medicion_{i}.csv`.
///
/// With `record_events`, each window is also counted and `eventos.csv` /
/// `cuentas.csv` are written once the run completes.
pub fn acquire_windows<S: Oscilloscope + ?Sized>(
    scope: &mut S,
    out_dir: &Path,
    n: usize,
    config: &AcquisitionConfig,
) -> Result<AcquisitionRun> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let mut run = AcquisitionRun::default();
    let mut log = EventLog::new(config.accumulation);

    for i in 0..n {
        // Re-applied every sweep; the time zero does not affect the count.
        scope.configure_timebase(config.time_scale, 0.0)?;
        scope.configure_channel(config.channel, config.voltage_scale, 0.0)?;
        let (time, voltage) = scope
            .read_window(config.channel)
            .with_context(|| format!("reading window {i}"))?;
        let window = AcquisitionWindow::new(time, voltage)?;

        let path = out_dir.join(window_file_name(i));
        write_window(&path, &window)?;
        run.window_files.push(path);

        if config.record_events {
            let count = log.record(&window, config.threshold);
            log::debug!("window {i}: {count} events");
            run.counts.push(count);
        }
    }

    if config.record_events {
        run.events = log.events().to_vec();
        write_values(&out_dir.join(EVENTS_FILE), &run.events)?;
        write_counts(&out_dir.join(COUNTS_FILE), &run.counts)?;
        log::info!(
            "Kept {} events over {} windows ({:?})",
            run.events.len(),
            log.windows(),
            log.policy()
        );
    }
    log::info!("Acquired {n} windows into {}", out_dir.display());
    Ok(run)
}

// ---------------------------------------------------------------------------
// Lock-in amplifier
// ---------------------------------------------------------------------------

/// Lock-in amplifier with a programmable auxiliary voltage output.
pub trait LockInAmplifier {
    fn set_time_constant(&mut self, index: u8) -> Result<()>;
    fn set_aux_output(&mut self, output: u8, volts: f64) -> Result<()>;
    /// In-phase and quadrature components.
    fn read_xy(&mut self) -> Result<(f64, f64)>;
}

/// Time constant for a front-panel index: 10 µs, 30 µs, 100 µs, … 30 ks.
pub fn time_constant_seconds(index: u8) -> Result<f64> {
    if index > 19 {
        bail!("time constant index {index} is out of range 0..=19");
    }
    let decade = 10f64.powi(i32::from(index / 2) - 5);
    Ok(if index % 2 == 0 { decade } else { 3.0 * decade })
}

/// Ramp the aux output from `v_min` (inclusive) to `v_max` (exclusive) and
/// record the lock-in reading at each step.
///
/// The returned curve holds `(voltage, X)` with `Y` as the extra column.
pub fn sweep_photocurrent<L: LockInAmplifier + ?Sized>(
    lockin: &mut L,
    config: &SweepConfig,
) -> Result<PhotocurrentCurve> {
    if config.step.is_nan() || config.step <= 0.0 || config.v_max <= config.v_min {
        bail!(
            "invalid sweep {}..{} V in steps of {} V",
            config.v_min,
            config.v_max,
            config.step
        );
    }
    let dwell = Duration::try_from_secs_f64(
        config.dwell_multiple * time_constant_seconds(config.time_constant_index)?,
    )
    .with_context(|| format!("invalid dwell multiple {}", config.dwell_multiple))?;
    let settle = Duration::try_from_secs_f64(config.settle_seconds)
        .with_context(|| format!("invalid settle time {} s", config.settle_seconds))?;

    lockin.set_time_constant(config.time_constant_index)?;
    lockin.set_aux_output(config.aux_output, config.v_min)?;
    std::thread::sleep(settle);

    let steps = ((config.v_max - config.v_min) / config.step).ceil() as usize;
    let mut voltage = Vec::with_capacity(steps);
    let mut x = Vec::with_capacity(steps);
    let mut y = Vec::with_capacity(steps);
    for k in 0..steps {
        let v = config.v_min + config.step * k as f64;
        lockin.set_aux_output(config.aux_output, v)?;
        std::thread::sleep(dwell);
        let (xi, yi) = lockin
            .read_xy()
            .with_context(|| format!("reading lock-in at {v} V"))?;
        voltage.push(v);
        x.push(xi);
        y.push(yi);
    }
    log::info!(
        "Swept {} points from {} V to {} V",
        voltage.len(),
        config.v_min,
        config.v_max
    );

    let mut curve = PhotocurrentCurve::new(voltage, x)?;
    curve.extra.push(y);
    Ok(curve)
}

// ---------------------------------------------------------------------------
// Simulators
// ---------------------------------------------------------------------------

/// PMT output on a scope: Gaussian baseline noise plus a Poisson-distributed
/// number of negative pulses per window.
pub struct SimulatedScope {
    rng: StdRng,
    pulses: Poisson<f64>,
    noise: Normal<f64>,
    pub samples: usize,
    pub pulse_amplitude: f64,
    time_scale: f64,
}

impl SimulatedScope {
    pub fn new(seed: u64, mean_pulses: f64, noise_volts: f64) -> Result<Self> {
        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
            pulses: Poisson::new(mean_pulses).context("invalid pulse rate")?,
            noise: Normal::new(0.0, noise_volts).context("invalid noise level")?,
            samples: 2500,
            pulse_amplitude: -0.02,
            time_scale: 100e-6,
        })
    }
}

/// Relative shape of one PMT pulse: fast fall, slower recovery.
const PULSE_SHAPE: [f64; 6] = [0.3, 1.0, 0.55, 0.3, 0.15, 0.05];

impl Oscilloscope for SimulatedScope {
    fn configure_timebase(&mut self, scale: f64, _zero: f64) -> Result<()> {
        self.time_scale = scale;
        Ok(())
    }

    fn configure_channel(&mut self, channel: u8, _scale: f64, _zero: f64) -> Result<()> {
        if channel == 0 || channel > 4 {
            bail!("no channel {channel}");
        }
        Ok(())
    }

    fn read_window(&mut self, _channel: u8) -> Result<(Vec<f64>, Vec<f64>)> {
        let n = self.samples;
        let dt = 10.0 * self.time_scale / n as f64;
        let time = (0..n).map(|k| k as f64 * dt).collect();
        let mut voltage: Vec<f64> = (0..n).map(|_| self.noise.sample(&mut self.rng)).collect();

        let pulses = self.pulses.sample(&mut self.rng) as usize;
        for _ in 0..pulses {
            let start = self.rng.gen_range(0..n.saturating_sub(PULSE_SHAPE.len()).max(1));
            for (k, shape) in PULSE_SHAPE.iter().enumerate() {
                if let Some(v) = voltage.get_mut(start + k) {
                    *v += self.pulse_amplitude * shape;
                }
            }
        }
        Ok((time, voltage))
    }
}

/// Lock-in reading the photocurrent model at its aux voltage.
pub struct SimulatedLockIn {
    spectrum: Spectrum,
    params: PhotocurrentParams,
    hc_over_e: f64,
    aux: f64,
    rng: StdRng,
    noise: Normal<f64>,
}

impl SimulatedLockIn {
    pub fn new(
        spectrum: &Spectrum,
        params: PhotocurrentParams,
        hc_over_e: f64,
        noise_amps: f64,
        seed: u64,
    ) -> Result<Self> {
        Ok(Self {
            spectrum: spectrum.normalized()?,
            params,
            hc_over_e,
            aux: 0.0,
            rng: StdRng::seed_from_u64(seed),
            noise: Normal::new(0.0, noise_amps).context("invalid noise level")?,
        })
    }
}

impl LockInAmplifier for SimulatedLockIn {
    fn set_time_constant(&mut self, index: u8) -> Result<()> {
        time_constant_seconds(index).map(|_| ())
    }

    fn set_aux_output(&mut self, _output: u8, volts: f64) -> Result<()> {
        self.aux = volts;
        Ok(())
    }

    fn read_xy(&mut self) -> Result<(f64, f64)> {
        let x = photocurrent_model(self.aux, self.params, &self.spectrum, self.hc_over_e)
            + self.noise.sample(&mut self.rng);
        let y = self.noise.sample(&mut self.rng);
        Ok((x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::events::extract_events;
    use crate::config::EventAccumulation;
    use crate::data::loader::{read_counts, read_window};
    use tempfile::TempDir;

    /// Scope replaying scripted windows.
    struct ScriptedScope {
        windows: Vec<Vec<f64>>,
        next: usize,
        timebase_calls: usize,
    }

    impl Oscilloscope for ScriptedScope {
        fn configure_timebase(&mut self, _scale: f64, _zero: f64) -> Result<()> {
            self.timebase_calls += 1;
            Ok(())
        }

        fn configure_channel(&mut self, _channel: u8, _scale: f64, _zero: f64) -> Result<()> {
            Ok(())
        }

        fn read_window(&mut self, _channel: u8) -> Result<(Vec<f64>, Vec<f64>)> {
            let Some(v) = self.windows.get(self.next).cloned() else {
                bail!("scope disconnected");
            };
            self.next += 1;
            Ok(((0..v.len()).map(|k| k as f64).collect(), v))
        }
    }

    fn scripted() -> ScriptedScope {
        ScriptedScope {
            windows: vec![
                vec![0.0, -0.02, 0.0, -0.03, 0.0],
                vec![0.0, -0.001, 0.0],
                vec![0.0, -0.02, 0.0],
            ],
            next: 0,
            timebase_calls: 0,
        }
    }

    #[test]
    fn raw_windows_only_by_default() {
        let dir = TempDir::new().unwrap();
        let mut scope = scripted();
        let run =
            acquire_windows(&mut scope, dir.path(), 3, &AcquisitionConfig::default()).unwrap();
        assert_eq!(run.window_files.len(), 3);
        assert!(run.counts.is_empty());
        assert_eq!(scope.timebase_calls, 3);
        assert!(!dir.path().join(COUNTS_FILE).exists());
        let w = read_window(&dir.path().join("medicion_0.csv")).unwrap();
        assert_eq!(w.voltage(), &[0.0, -0.02, 0.0, -0.03, 0.0]);
    }

    #[test]
    fn recorded_events_follow_policy() {
        let dir = TempDir::new().unwrap();
        let config = AcquisitionConfig {
            record_events: true,
            ..AcquisitionConfig::default()
        };
        let run = acquire_windows(&mut scripted(), dir.path(), 3, &config).unwrap();
        assert_eq!(run.counts, vec![2, 0, 1]);
        assert_eq!(run.events, vec![-0.02, -0.03, -0.02]);
        assert_eq!(read_counts(&dir.path().join(COUNTS_FILE)).unwrap(), run.counts);

        let dir = TempDir::new().unwrap();
        let config = AcquisitionConfig {
            record_events: true,
            accumulation: EventAccumulation::ResetPerWindow,
            ..AcquisitionConfig::default()
        };
        let run = acquire_windows(&mut scripted(), dir.path(), 3, &config).unwrap();
        assert_eq!(run.events, vec![-0.02]);
    }

    #[test]
    fn instrument_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let err = acquire_windows(&mut scripted(), dir.path(), 5, &AcquisitionConfig::default())
            .unwrap_err();
        assert!(format!("{err:#}").contains("reading window 3"));
    }

    #[test]
    fn time_constant_table() {
        assert_eq!(time_constant_seconds(0).unwrap(), 1e-5);
        assert!((time_constant_seconds(7).unwrap() - 0.03).abs() < 1e-15);
        assert!((time_constant_seconds(9).unwrap() - 0.3).abs() < 1e-15);
        assert_eq!(time_constant_seconds(10).unwrap(), 1.0);
        assert!((time_constant_seconds(19).unwrap() - 30_000.0).abs() < 1e-9);
        assert!(time_constant_seconds(20).is_err());
    }

    #[test]
    fn sweep_reads_each_voltage() {
        let spectrum = Spectrum::new(vec![600.0], vec![1.0]).unwrap();
        let params = PhotocurrentParams {
            offset: 0.0,
            slope: 1e-9,
            phase: 2.0,
        };
        let mut lockin = SimulatedLockIn::new(&spectrum, params, 1.238e3, 0.0, 1).unwrap();
        let config = SweepConfig {
            v_min: -0.5,
            v_max: 0.5,
            step: 0.1,
            time_constant_index: 0,
            dwell_multiple: 1.0,
            settle_seconds: 0.0,
            ..SweepConfig::default()
        };
        let curve = sweep_photocurrent(&mut lockin, &config).unwrap();
        assert_eq!(curve.len(), 10);
        assert_eq!(curve.voltage[0], -0.5);
        assert_eq!(curve.extra.len(), 1);
        assert_eq!(curve.current[0], 0.0);
        assert!(curve.current[9] > 0.0);
    }

    #[test]
    fn bad_timing_is_an_error() {
        let spectrum = Spectrum::new(vec![600.0], vec![1.0]).unwrap();
        let params = PhotocurrentParams {
            offset: 0.0,
            slope: 1e-9,
            phase: 2.0,
        };
        let mut lockin = SimulatedLockIn::new(&spectrum, params, 1.238e3, 0.0, 1).unwrap();
        let parsed: crate::config::AnalysisConfig =
            serde_json::from_str(r#"{ "sweep": { "settle_seconds": -1.0 } }"#).unwrap();
        let err = sweep_photocurrent(&mut lockin, &parsed.sweep).unwrap_err();
        assert!(format!("{err:#}").contains("settle"), "{err:#}");

        for dwell_multiple in [-2.0, f64::NAN, f64::INFINITY] {
            let config = SweepConfig {
                dwell_multiple,
                settle_seconds: 0.0,
                ..SweepConfig::default()
            };
            let err = sweep_photocurrent(&mut lockin, &config).unwrap_err();
            assert!(format!("{err:#}").contains("dwell"), "{err:#}");
        }
        let config = SweepConfig {
            settle_seconds: f64::NAN,
            ..SweepConfig::default()
        };
        assert!(sweep_photocurrent(&mut lockin, &config).is_err());
    }

    #[test]
    fn simulated_scope_produces_countable_pulses() {
        let mut scope = SimulatedScope::new(3, 4.0, 0.0005).unwrap();
        scope.configure_timebase(100e-6, 0.0).unwrap();
        let (time, voltage) = scope.read_window(1).unwrap();
        assert_eq!(time.len(), 2500);
        let window = AcquisitionWindow::new(time, voltage).unwrap();
        // Overlapping pulses may merge, but noise alone never crosses -5 mV.
        assert!(extract_events(&window, -5e-3) <= 20);
        let quiet = SimulatedScope::new(3, 0.0001, 0.0005).map(|mut s| {
            s.pulse_amplitude = 0.0;
            s.read_window(1).unwrap()
        });
        let (_, v) = quiet.unwrap();
        assert_eq!(extract_events(&AcquisitionWindow::from_voltage(v), -5e-3), 0);
    }
}
