//! Write a synthetic data set: raw PMT windows with their counts, a lamp
//! spectrum and a photocurrent sweep.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use photolab::analysis::photocurrent::PhotocurrentParams;
use photolab::config::{AcquisitionConfig, SweepConfig};
use photolab::data::loader::{write_curve, write_delimited, Delimiter};
use photolab::data::model::Spectrum;
use photolab::instrument::{acquire_windows, sweep_photocurrent, SimulatedLockIn, SimulatedScope};

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate synthetic photolab data")]
struct Args {
    /// Output directory
    #[arg(long, default_value = "sample_data")]
    out_dir: PathBuf,

    /// Number of oscilloscope windows
    #[arg(long, default_value_t = 500)]
    windows: usize,

    /// Mean pulses per window
    #[arg(long, default_value_t = 2.0)]
    mean_pulses: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Halogen-like lamp: broad continuum and a weak line on a flat dark level.
fn generate_spectrum(rng: &mut StdRng) -> Result<Spectrum> {
    let lines = [(720.0, 110.0, 1.0), (589.0, 2.0, 0.15)];
    let noise = Normal::new(0.0, 0.003)?;
    let wavelength: Vec<f64> = (0..1000).map(|i| 400.0 + i as f64 * 0.6).collect();
    let intensity = wavelength
        .iter()
        .map(|&wl| {
            let signal: f64 = lines
                .iter()
                .map(|&(mu, sigma, amp)| gaussian(wl, mu, sigma, amp))
                .sum();
            0.02 + signal + noise.sample(rng)
        })
        .collect();
    Ok(Spectrum::new(wavelength, intensity)?)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut rng = StdRng::seed_from_u64(args.seed);

    // ---- Photon counting ----
    let counting_dir = args.out_dir.join("conteo");
    let mut scope = SimulatedScope::new(args.seed, args.mean_pulses, 0.0005)?;
    let acquisition = AcquisitionConfig {
        record_events: true,
        ..AcquisitionConfig::default()
    };
    let run = acquire_windows(&mut scope, &counting_dir, args.windows, &acquisition)?;
    let total: u64 = run.counts.iter().map(|&c| u64::from(c)).sum();
    println!(
        "Wrote {} windows ({} events) to {}",
        run.window_files.len(),
        total,
        counting_dir.display()
    );

    // ---- Lamp spectrum ----
    let spectrum = generate_spectrum(&mut rng)?;
    let spectrum_path = args.out_dir.join("espectro.txt");
    let rows: Vec<Vec<f64>> = spectrum
        .wavelength
        .iter()
        .zip(&spectrum.intensity)
        .map(|(&w, &i)| vec![w, i])
        .collect();
    write_delimited(&spectrum_path, &rows, Delimiter::Whitespace)?;

    // ---- Photocurrent sweep ----
    let params = PhotocurrentParams {
        offset: 2e-12,
        slope: 8e-10,
        phase: 1.9,
    };
    let corrected = spectrum.baseline_corrected(20)?;
    let mut lockin = SimulatedLockIn::new(&corrected, params, 1.238e3, 5e-12, args.seed)?;
    let sweep = SweepConfig {
        time_constant_index: 0,
        dwell_multiple: 1.0,
        settle_seconds: 0.0,
        ..SweepConfig::default()
    };
    let curve = sweep_photocurrent(&mut lockin, &sweep)?;
    let curve_path = args.out_dir.join("barrido.txt");
    write_curve(&curve_path, &curve).context("writing sweep")?;

    println!(
        "Wrote spectrum to {} and a {}-point sweep to {}",
        spectrum_path.display(),
        curve.len(),
        curve_path.display()
    );
    Ok(())
}
