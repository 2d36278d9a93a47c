use crate::error::{AnalysisError, Result};

// ---------------------------------------------------------------------------
// AcquisitionWindow – one oscilloscope sweep
// ---------------------------------------------------------------------------

/// A single oscilloscope sweep: paired time and voltage samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionWindow {
    time: Vec<f64>,
    voltage: Vec<f64>,
}

impl AcquisitionWindow {
    pub fn new(time: Vec<f64>, voltage: Vec<f64>) -> Result<Self> {
        if time.len() != voltage.len() {
            return Err(AnalysisError::malformed(format!(
                "window has {} time samples but {} voltage samples",
                time.len(),
                voltage.len()
            )));
        }
        Ok(Self { time, voltage })
    }

    /// Voltage-only window with a unit sample index as time axis.
    pub fn from_voltage(voltage: Vec<f64>) -> Self {
        let time = (0..voltage.len()).map(|i| i as f64).collect();
        Self { time, voltage }
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn voltage(&self) -> &[f64] {
        &self.voltage
    }

    pub fn len(&self) -> usize {
        self.voltage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voltage.is_empty()
    }

    /// Rows as written to disk: `(time, voltage)`.
    pub fn rows(&self) -> Vec<Vec<f64>> {
        self.time
            .iter()
            .zip(&self.voltage)
            .map(|(&t, &v)| vec![t, v])
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Spectrum – illumination spectrum of the light source
// ---------------------------------------------------------------------------

/// Wavelength (nm) against relative intensity.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub wavelength: Vec<f64>,
    pub intensity: Vec<f64>,
}

impl Spectrum {
    pub fn new(wavelength: Vec<f64>, intensity: Vec<f64>) -> Result<Self> {
        if wavelength.len() != intensity.len() {
            return Err(AnalysisError::malformed(format!(
                "spectrum has {} wavelengths but {} intensities",
                wavelength.len(),
                intensity.len()
            )));
        }
        if wavelength.is_empty() {
            return Err(AnalysisError::InsufficientData(
                "spectrum has no components".into(),
            ));
        }
        if let Some(bad) = wavelength.iter().find(|w| !(**w > 0.0)) {
            return Err(AnalysisError::malformed(format!(
                "wavelength must be positive, found {bad}"
            )));
        }
        Ok(Self {
            wavelength,
            intensity,
        })
    }

    pub fn len(&self) -> usize {
        self.wavelength.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelength.is_empty()
    }

    /// Intensities divided by the peak intensity.
    pub fn normalized(&self) -> Result<Spectrum> {
        let peak = self
            .intensity
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        if !(peak > 0.0) || !peak.is_finite() {
            return Err(AnalysisError::malformed(format!(
                "spectrum peak intensity must be positive, found {peak}"
            )));
        }
        Ok(Spectrum {
            wavelength: self.wavelength.clone(),
            intensity: self.intensity.iter().map(|a| a / peak).collect(),
        })
    }

    /// Subtract the dark level (mean of the first `dark_samples` intensities)
    /// and normalize by the peak.
    pub fn baseline_corrected(&self, dark_samples: usize) -> Result<Spectrum> {
        let n = dark_samples.min(self.intensity.len());
        if n == 0 {
            return self.normalized();
        }
        let dark = self.intensity[..n].iter().sum::<f64>() / n as f64;
        Spectrum {
            wavelength: self.wavelength.clone(),
            intensity: self.intensity.iter().map(|a| a - dark).collect(),
        }
        .normalized()
    }
}

// ---------------------------------------------------------------------------
// PhotocurrentCurve – lock-in sweep
// ---------------------------------------------------------------------------

/// Retarding voltage against photocurrent. Any further columns of the source
/// file (quadrature, phase) are kept in `extra`, one vector per column.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotocurrentCurve {
    pub voltage: Vec<f64>,
    pub current: Vec<f64>,
    pub extra: Vec<Vec<f64>>,
}

impl PhotocurrentCurve {
    pub fn new(voltage: Vec<f64>, current: Vec<f64>) -> Result<Self> {
        if voltage.len() != current.len() {
            return Err(AnalysisError::malformed(format!(
                "curve has {} voltages but {} currents",
                voltage.len(),
                current.len()
            )));
        }
        Ok(Self {
            voltage,
            current,
            extra: Vec::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.voltage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voltage.is_empty()
    }

    pub fn rows(&self) -> Vec<Vec<f64>> {
        (0..self.len())
            .map(|i| {
                let mut row = vec![self.voltage[i], self.current[i]];
                row.extend(self.extra.iter().map(|col| col[i]));
                row
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_rejects_length_mismatch() {
        let err = AcquisitionWindow::new(vec![0.0, 1.0], vec![0.0]).unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedInput { .. }));
    }

    #[test]
    fn spectrum_normalized_peaks_at_one() {
        let sp = Spectrum::new(vec![400.0, 500.0, 600.0], vec![2.0, 4.0, 1.0]).unwrap();
        let norm = sp.normalized().unwrap();
        assert_eq!(norm.intensity, vec![0.5, 1.0, 0.25]);
    }

    #[test]
    fn spectrum_rejects_flat_zero() {
        let sp = Spectrum::new(vec![400.0], vec![0.0]).unwrap();
        assert!(sp.normalized().is_err());
    }

    #[test]
    fn baseline_correction_removes_dark_level() {
        let sp = Spectrum::new(
            vec![400.0, 410.0, 420.0, 430.0],
            vec![1.0, 1.0, 3.0, 2.0],
        )
        .unwrap();
        let corrected = sp.baseline_corrected(2).unwrap();
        assert_eq!(corrected.intensity, vec![0.0, 0.0, 1.0, 0.5]);
    }

    #[test]
    fn curve_rows_include_extra_columns() {
        let mut curve = PhotocurrentCurve::new(vec![0.0, 0.1], vec![1.0, 2.0]).unwrap();
        curve.extra.push(vec![10.0, 20.0]);
        assert_eq!(curve.rows(), vec![vec![0.0, 1.0, 10.0], vec![0.1, 2.0, 20.0]]);
    }
}
