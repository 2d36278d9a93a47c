use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use photolab::analysis::distribution::{fit_distributions, DistributionFit};
use photolab::analysis::photocurrent::{fit_photocurrent, normalize_directory, PhotocurrentFit};
use photolab::config::AnalysisConfig;
use photolab::data::loader::{
    read_counts, read_curve, read_spectra_dir, read_spectrum, SPECTRUM_SUFFIX,
};
use photolab::data::model::{PhotocurrentCurve, Spectrum};
use photolab::report::{
    histogram_series, log_histogram_series, normalized_series, photocurrent_series,
    spectra_series, AxisLabels, RenderSink, Series,
};

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// Which analysis the central plot shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Histogram,
    LogHistogram,
    Photocurrent,
    /// Several sweeps or spectra from one directory.
    Overlay,
}

/// A sweep together with the spectrum of the lamp that produced it.
pub struct LoadedSweep {
    pub curve_path: PathBuf,
    pub curve: PhotocurrentCurve,
    pub spectrum: Spectrum,
}

/// The full UI state, independent of rendering.
pub struct AppState {
    /// Parameters edited in the side panel.
    pub config: AnalysisConfig,

    /// Counts file and its contents.
    pub counts: Option<(PathBuf, Vec<u32>)>,

    pub sweep: Option<LoadedSweep>,

    pub view: View,

    pub distribution: Option<DistributionFit>,
    pub photocurrent: Option<PhotocurrentFit>,

    /// Series of the last directory overlay.
    pub overlay: Option<(Vec<Series>, AxisLabels)>,

    /// What the central plot draws.
    pub series: Vec<Series>,
    pub labels: Option<AxisLabels>,

    /// Status / error message shown in the UI.
    pub status_message: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            config: AnalysisConfig::default(),
            counts: None,
            sweep: None,
            view: View::Histogram,
            distribution: None,
            photocurrent: None,
            overlay: None,
            series: Vec::new(),
            labels: None,
            status_message: None,
        }
    }
}

impl RenderSink for AppState {
    fn render(&mut self, series: Vec<Series>, labels: AxisLabels) {
        self.series = series;
        self.labels = Some(labels);
    }
}

impl AppState {
    pub fn load_counts(&mut self, path: &Path) -> Result<()> {
        let counts =
            read_counts(path).with_context(|| format!("loading counts {}", path.display()))?;
        log::info!("Loaded {} counts from {}", counts.len(), path.display());
        self.set_counts(path.to_path_buf(), counts);
        Ok(())
    }

    /// Ingest counts, fit them and switch to the histogram view.
    pub fn set_counts(&mut self, path: PathBuf, counts: Vec<u32>) {
        self.counts = Some((path, counts));
        if self.view == View::Photocurrent {
            self.view = View::Histogram;
        }
        self.refit();
    }

    pub fn load_sweep(&mut self, curve_path: &Path, spectrum_path: &Path) -> Result<()> {
        let curve = read_curve(curve_path)
            .with_context(|| format!("loading sweep {}", curve_path.display()))?;
        let spectrum = read_spectrum(spectrum_path)
            .with_context(|| format!("loading spectrum {}", spectrum_path.display()))?;
        log::info!(
            "Loaded sweep of {} points and spectrum of {} samples",
            curve.len(),
            spectrum.len()
        );
        self.sweep = Some(LoadedSweep {
            curve_path: curve_path.to_path_buf(),
            curve,
            spectrum,
        });
        self.view = View::Photocurrent;
        self.refit();
        Ok(())
    }

    /// Overlay every `*_corriente.csv` sweep of `dir` after linear normalization.
    pub fn load_sweep_overlay(&mut self, dir: &Path) -> Result<()> {
        let curves = normalize_directory(dir, self.config.photocurrent.linear_window)
            .with_context(|| format!("normalizing sweeps in {}", dir.display()))?;
        log::info!("Normalized {} sweeps from {}", curves.len(), dir.display());
        let curves: Vec<(String, PhotocurrentCurve)> = curves
            .into_iter()
            .map(|(label, normalized)| (label, normalized.curve))
            .collect();
        self.overlay = Some(normalized_series(&curves));
        self.set_view(View::Overlay);
        Ok(())
    }

    /// Overlay every `*_spec.csv` spectrum of `dir`, dark level removed.
    pub fn load_spectra_overlay(&mut self, dir: &Path) -> Result<()> {
        let spectra = read_spectra_dir(dir, SPECTRUM_SUFFIX, self.config.photocurrent.dark_samples)
            .with_context(|| format!("loading spectra in {}", dir.display()))?;
        log::info!("Loaded {} spectra from {}", spectra.len(), dir.display());
        self.overlay = Some(spectra_series(&spectra));
        self.set_view(View::Overlay);
        Ok(())
    }

    pub fn set_view(&mut self, view: View) {
        self.view = view;
        self.redraw();
    }

    /// Re-run every fit with the current configuration, then redraw.
    pub fn refit(&mut self) {
        self.status_message = None;
        self.distribution = None;
        self.photocurrent = None;

        let distribution = self.counts.as_ref().map(|(path, counts)| {
            fit_distributions(counts, &self.config.counting)
                .map_err(|e| format!("{}: {e}", path.display()))
        });
        match distribution {
            Some(Ok(fit)) => self.distribution = Some(fit),
            Some(Err(message)) => self.report_error(message),
            None => {}
        }

        let photocurrent = self.sweep.as_ref().map(|sweep| {
            fit_photocurrent(&sweep.curve, &sweep.spectrum, &self.config.photocurrent)
                .map_err(|e| format!("{}: {e}", sweep.curve_path.display()))
        });
        match photocurrent {
            Some(Ok(fit)) => self.photocurrent = Some(fit),
            Some(Err(message)) => self.report_error(message),
            None => {}
        }
        self.redraw();
    }

    /// Rebuild the plotted series for the current view.
    pub fn redraw(&mut self) {
        self.series.clear();
        self.labels = None;
        match self.view {
            View::Histogram | View::LogHistogram => {
                let Some(fit) = &self.distribution else {
                    return;
                };
                let (series, labels) = if self.view == View::Histogram {
                    histogram_series(fit)
                } else {
                    log_histogram_series(fit)
                };
                self.render(series, labels);
            }
            View::Photocurrent => {
                let (Some(sweep), Some(fit)) = (&self.sweep, &self.photocurrent) else {
                    return;
                };
                match photocurrent_series(
                    &sweep.curve,
                    &sweep.spectrum,
                    fit,
                    self.config.photocurrent.hc_over_e,
                ) {
                    Ok((series, labels)) => self.render(series, labels),
                    Err(e) => self.report_error(e.to_string()),
                }
            }
            View::Overlay => {
                if let Some((series, labels)) = self.overlay.clone() {
                    self.render(series, labels);
                }
            }
        }
    }

    pub fn report_error(&mut self, message: String) {
        log::error!("{message}");
        self.status_message = Some(format!("Error: {message}"));
    }
}
