//! Batch front end: count events, fit count distributions, fit photocurrents.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use photolab::analysis::distribution::write_p_value_report;
use photolab::analysis::events::lagged_autocorrelation;
use photolab::analysis::photocurrent::{default_scales, normalize_directory, sensitivity_grid};
use photolab::data::loader::{
    read_counts, read_curve, read_spectrum, read_window, write_curve, write_delimited, Delimiter,
};
use photolab::{
    fit_distributions, fit_photocurrent, generate_counts, normalize_curve, AnalysisConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Photon counting and photocurrent analysis")]
struct Args {
    /// JSON configuration; missing fields take their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Count events in every stored window of a directory and write cuentas.csv
    Count {
        /// Directory holding the medicion_*.csv windows
        dir: PathBuf,
        /// Where cuentas.csv goes [default: <DIR>/histograma]
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Override the event threshold (V)
        #[arg(long, allow_hyphen_values = true)]
        threshold: Option<f64>,
    },
    /// Fit Poisson and Bose-Einstein distributions to a counts file
    Histogram {
        counts: PathBuf,
        /// P-value report file
        #[arg(long, default_value = "p-valor")]
        report: PathBuf,
        /// Discard counts at or above this value
        #[arg(long)]
        upper_bound: Option<u32>,
    },
    /// Fit the photocurrent model to a voltage sweep
    Photocurrent {
        curve: PathBuf,
        spectrum: PathBuf,
        /// Subtract the mean of this many leading spectrum samples first
        #[arg(long)]
        dark_samples: Option<usize>,
        /// Also print the slope/phase sensitivity grid
        #[arg(long, default_value_t = false)]
        sensitivity: bool,
    },
    /// Rescale a sweep by the line fitted to its linear part. Given a
    /// directory, every *_corriente.csv sweep in it is normalized.
    Normalize {
        curve: PathBuf,
        /// Output file, or output directory in directory mode
        #[arg(long)]
        output: PathBuf,
    },
    /// Autocorrelation of the voltage in one stored window
    Correlate {
        window: PathBuf,
        /// Write (lag, correlation) rows here instead of printing the peak
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn counts_dir(dir: &Path, out_dir: Option<PathBuf>) -> PathBuf {
    out_dir.unwrap_or_else(|| dir.join("histograma"))
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    match path {
        Some(p) => AnalysisConfig::load(p),
        None => Ok(AnalysisConfig::default()),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Count {
            dir,
            out_dir,
            threshold,
        } => {
            let mut counting = config.counting;
            if let Some(t) = threshold {
                counting.threshold = t;
            }
            let out_dir = counts_dir(&dir, out_dir);
            let counts = generate_counts(&dir, &out_dir, &counting)
                .with_context(|| format!("counting events in {}", dir.display()))?;
            let total: u64 = counts.iter().map(|&c| u64::from(c)).sum();
            println!(
                "{} windows, {} events, {:.3} per window",
                counts.len(),
                total,
                total as f64 / counts.len() as f64
            );
        }
        Command::Histogram {
            counts,
            report,
            upper_bound,
        } => {
            let mut counting = config.counting;
            if let Some(b) = upper_bound {
                counting.upper_bound = b;
            }
            let data = read_counts(&counts)?;
            let fit = fit_distributions(&data, &counting)
                .with_context(|| format!("fitting {}", counts.display()))?;
            println!(
                "{} windows, mean count {:.4}",
                fit.histogram.samples,
                fit.histogram.mean()
            );
            for model in [&fit.poisson, &fit.bose_einstein] {
                println!(
                    "{:<8} <n> = {:.4} ± {:.4}  chi2 = {:.3} (dof {})  p = {:.4e}",
                    model.kind.label(),
                    model.lambda,
                    model.std_error,
                    model.chi_square,
                    model.degrees_of_freedom,
                    model.p_value
                );
            }
            write_p_value_report(&report, &fit)?;
            log::info!("Wrote {}", report.display());
        }
        Command::Photocurrent {
            curve,
            spectrum,
            dark_samples,
            sensitivity,
        } => {
            let sweep = read_curve(&curve)?;
            let mut spec = read_spectrum(&spectrum)?;
            if let Some(n) = dark_samples {
                spec = spec.baseline_corrected(n)?;
            }
            let fit = fit_photocurrent(&sweep, &spec, &config.photocurrent)
                .with_context(|| format!("fitting {}", curve.display()))?;
            let err = fit.std_errors();
            println!("offset = {:.4e} ± {:.1e} A", fit.params.offset, err[0]);
            println!("slope  = {:.4e} ± {:.1e} A/V", fit.params.slope, err[1]);
            println!("phase  = {:.4} ± {:.1e} V", fit.params.phase, err[2]);
            println!("SSR    = {:.4e} over {:?} V", fit.residual_sum_of_squares, fit.fit_range);

            if sensitivity {
                let grid =
                    sensitivity_grid(&sweep, &spec, &fit, &config.photocurrent, &default_scales())?;
                let (phase_scale, slope_scale) = grid.argmin();
                println!(
                    "min SSR {:.4e} at phase x{phase_scale:.3}, slope x{slope_scale:.3}",
                    grid.min()
                );
                if let Some(rows) = grid.normalized() {
                    for row in rows {
                        let line: Vec<String> = row.iter().map(|r| format!("{r:8.2}")).collect();
                        println!("{}", line.join(" "));
                    }
                }
            }
        }
        Command::Normalize { curve, output } if curve.is_dir() => {
            let curves = normalize_directory(&curve, config.photocurrent.linear_window)
                .with_context(|| format!("normalizing sweeps in {}", curve.display()))?;
            std::fs::create_dir_all(&output)
                .with_context(|| format!("creating {}", output.display()))?;
            for (label, normalized) in &curves {
                let path = output.join(format!("{}_norm.txt", label.replace(' ', "_")));
                write_curve(&path, &normalized.curve)?;
                println!(
                    "{label}: a = {:.4e}, b = {:.4e}",
                    normalized.intercept, normalized.slope
                );
            }
            log::info!("Wrote {} curves to {}", curves.len(), output.display());
        }
        Command::Normalize { curve, output } => {
            let sweep = read_curve(&curve)?;
            let normalized = normalize_curve(&sweep, config.photocurrent.linear_window)
                .with_context(|| format!("normalizing {}", curve.display()))?;
            write_curve(&output, &normalized.curve)?;
            println!(
                "a = {:.4e}, b = {:.4e}; wrote {}",
                normalized.intercept,
                normalized.slope,
                output.display()
            );
        }
        Command::Correlate { window, output } => {
            let trace = read_window(&window)?;
            let correlation = lagged_autocorrelation(&trace);
            match output {
                Some(path) => {
                    let rows: Vec<Vec<f64>> = correlation.iter().map(|p| p.to_vec()).collect();
                    write_delimited(&path, &rows, Delimiter::Comma)?;
                    log::info!("Wrote {} lags to {}", rows.len(), path.display());
                }
                None => {
                    let side = correlation
                        .iter()
                        .filter(|p| p[0] > 0.0)
                        .max_by(|a, b| a[1].total_cmp(&b[1]));
                    match side {
                        Some(&[lag, value]) => {
                            println!("largest non-zero-lag correlation {value:.4e} at {lag:.4e}")
                        }
                        None => println!("window too short to correlate"),
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_default_next_to_the_windows() {
        let args = Args::try_parse_from(["photolab-cli", "count", "runs/a"]).unwrap();
        let Command::Count { dir, out_dir, .. } = args.command else {
            panic!("expected count");
        };
        assert_eq!(counts_dir(&dir, out_dir), PathBuf::from("runs/a/histograma"));

        let args =
            Args::try_parse_from(["photolab-cli", "count", "runs/a", "--out-dir", "elsewhere"])
                .unwrap();
        let Command::Count { dir, out_dir, .. } = args.command else {
            panic!("expected count");
        };
        assert_eq!(counts_dir(&dir, out_dir), PathBuf::from("elsewhere"));
    }

    #[test]
    fn correlate_takes_an_optional_output() {
        let args = Args::try_parse_from(["photolab-cli", "correlate", "w.csv"]).unwrap();
        assert!(matches!(args.command, Command::Correlate { output: None, .. }));
    }
}
