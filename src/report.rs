//! Plot-ready series built from fit results, and the sink that draws them.
//!
//! Nothing here depends on a GUI toolkit; the viewer implements
//! [`RenderSink`] and decides colours and layout itself.

use crate::analysis::distribution::{DistributionFit, FittedModel};
use crate::analysis::photocurrent::{model_curve, PhotocurrentFit};
use crate::data::model::{PhotocurrentCurve, Spectrum};
use crate::error::Result;

/// Samples used to draw a fitted photocurrent model.
const MODEL_SAMPLES: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeriesStyle {
    /// Vertical bars of the given width, centred on x.
    Bars { width: f64 },
    Points,
    Line,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: SeriesStyle,
}

impl Series {
    pub fn new(name: impl Into<String>, points: Vec<[f64; 2]>, style: SeriesStyle) -> Self {
        Self {
            name: name.into(),
            points,
            style,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AxisLabels {
    pub title: String,
    pub x: String,
    pub y: String,
}

impl AxisLabels {
    pub fn new(title: &str, x: &str, y: &str) -> Self {
        Self {
            title: title.to_string(),
            x: x.to_string(),
            y: y.to_string(),
        }
    }
}

/// Anything that can display a set of series.
pub trait RenderSink {
    fn render(&mut self, series: Vec<Series>, labels: AxisLabels);
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

fn model_label(model: &FittedModel) -> String {
    format!("{} (<n> = {:.3}, p = {:.3})", model.kind, model.lambda, model.p_value)
}

/// Histogram bars with both fitted PMFs overlaid.
pub fn histogram_series(fit: &DistributionFit) -> (Vec<Series>, AxisLabels) {
    let bins = &fit.histogram.bins;
    let bars = bins
        .iter()
        .zip(&fit.histogram.frequencies)
        .map(|(&j, &f)| [j, f])
        .collect();

    let mut series = vec![Series::new("Data", bars, SeriesStyle::Bars { width: 0.8 })];
    for model in [&fit.poisson, &fit.bose_einstein] {
        let points = bins.iter().zip(model.predict(bins)).map(|(&j, p)| [j, p]).collect();
        series.push(Series::new(model_label(model), points, SeriesStyle::Line));
    }
    (series, AxisLabels::new("Counts per window", "Counts", "Frequency"))
}

/// Same as [`histogram_series`] in log10 frequency. Empty bins have no
/// logarithm and are left out of the data series.
pub fn log_histogram_series(fit: &DistributionFit) -> (Vec<Series>, AxisLabels) {
    let (series, _) = histogram_series(fit);
    let series = series
        .into_iter()
        .map(|s| {
            let points = s
                .points
                .iter()
                .filter(|p| p[1] > 0.0)
                .map(|p| [p[0], p[1].log10()])
                .collect();
            Series { points, ..s }
        })
        .collect();
    (
        series,
        AxisLabels::new("Counts per window (log)", "Counts", "log10 frequency"),
    )
}

/// Measured sweep with the fitted model drawn over the fit range.
pub fn photocurrent_series(
    curve: &PhotocurrentCurve,
    spectrum: &Spectrum,
    fit: &PhotocurrentFit,
    hc_over_e: f64,
) -> Result<(Vec<Series>, AxisLabels)> {
    let measured = curve
        .voltage
        .iter()
        .zip(&curve.current)
        .map(|(&v, &i)| [v, i])
        .collect();
    let model = model_curve(fit.params, spectrum, hc_over_e, fit.fit_range, MODEL_SAMPLES)?;
    let label = format!(
        "Fit (phi = {:.3} V, m = {:.3e} A/V)",
        fit.params.phase, fit.params.slope
    );
    Ok((
        vec![
            Series::new("Data", measured, SeriesStyle::Points),
            Series::new(label, model, SeriesStyle::Line),
        ],
        AxisLabels::new("Photocurrent", "Voltage (V)", "Current (A)"),
    ))
}

/// Several normalized curves on shared axes.
pub fn normalized_series(curves: &[(String, PhotocurrentCurve)]) -> (Vec<Series>, AxisLabels) {
    let series = curves
        .iter()
        .map(|(name, c)| {
            let points = c.voltage.iter().zip(&c.current).map(|(&v, &i)| [v, i]).collect();
            Series::new(name.clone(), points, SeriesStyle::Points)
        })
        .collect();
    (
        series,
        AxisLabels::new("Normalized photocurrent", "Voltage + a/b (V)", "Current / b (V)"),
    )
}

/// Several lamp spectra on shared axes.
pub fn spectra_series(spectra: &[(String, Spectrum)]) -> (Vec<Series>, AxisLabels) {
    let series = spectra
        .iter()
        .map(|(name, s)| {
            let points = s.wavelength.iter().zip(&s.intensity).map(|(&w, &i)| [w, i]).collect();
            Series::new(name.clone(), points, SeriesStyle::Line)
        })
        .collect();
    (
        series,
        AxisLabels::new("Spectra", "Wavelength (nm)", "Relative intensity"),
    )
}
