use std::path::Path;

use crate::config::{CountingConfig, EventAccumulation};
use crate::data::loader::{list_measurement_files, read_window, write_counts};
use crate::data::model::AcquisitionWindow;
use crate::error::{AnalysisError, Result};

use super::events::{event_voltages, extract_events};

/// Counts file written next to (or below) the raw windows.
pub const COUNTS_FILE: &str = "cuentas.csv";
/// Exported event amplitudes.
pub const EVENTS_FILE: &str = "eventos.csv";

/// File name of the `index`-th raw window.
pub fn window_file_name(index: usize) -> String {
    format!("medicion_{index}.csv")
}

/// One count per window, in window order.
pub fn aggregate_counts(windows: &[AcquisitionWindow], threshold: f64) -> Vec<u32> {
    windows
        .iter()
        .map(|w| extract_events(w, threshold))
        .collect()
}

// ---------------------------------------------------------------------------
// EventLog – event amplitudes kept for export
// ---------------------------------------------------------------------------

/// Event amplitudes collected while windows are processed one by one.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    policy: EventAccumulation,
    events: Vec<f64>,
    windows: usize,
}

impl EventLog {
    pub fn new(policy: EventAccumulation) -> Self {
        Self {
            policy,
            events: Vec::new(),
            windows: 0,
        }
    }

    /// Extract the events of `window`, log them per the policy, return the count.
    pub fn record(&mut self, window: &AcquisitionWindow, threshold: f64) -> u32 {
        let found = event_voltages(window, threshold);
        let count = found.len() as u32;
        if self.policy == EventAccumulation::ResetPerWindow {
            self.events.clear();
        }
        self.events.extend(found);
        self.windows += 1;
        count
    }

    pub fn events(&self) -> &[f64] {
        &self.events
    }

    pub fn windows(&self) -> usize {
        self.windows
    }

    pub fn policy(&self) -> EventAccumulation {
        self.policy
    }
}

// ---------------------------------------------------------------------------
// Stored windows
// ---------------------------------------------------------------------------

/// Count events in every stored window of `dir`.
///
/// Files are picked by `config.file_marker`, in name order, up to
/// `config.max_files`.
pub fn count_directory(dir: &Path, config: &CountingConfig) -> Result<Vec<u32>> {
    let files = list_measurement_files(dir, &config.file_marker, config.max_files)?;
    if files.is_empty() {
        return Err(AnalysisError::InsufficientData(format!(
            "no file containing '{}' in {}",
            config.file_marker,
            dir.display()
        )));
    }
    log::info!("Counting events in {} windows from {}", files.len(), dir.display());

    files
        .iter()
        .map(|path| {
            let window = read_window(path)?;
            let count = extract_events(&window, config.threshold);
            log::debug!("{}: {count} events", path.display());
            Ok(count)
        })
        .collect()
}

/// [`count_directory`], then write the counts to `out_dir/cuentas.csv`.
pub fn generate_counts(dir: &Path, out_dir: &Path, config: &CountingConfig) -> Result<Vec<u32>> {
    let counts = count_directory(dir, config)?;
    std::fs::create_dir_all(out_dir).map_err(|e| AnalysisError::io(out_dir, e))?;
    let path = out_dir.join(COUNTS_FILE);
    write_counts(&path, &counts)?;
    log::info!("Wrote {} counts to {}", counts.len(), path.display());
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::{read_counts, write_window};
    use tempfile::TempDir;

    /// Baseline at 0 V with `pulses` dips of -20 mV.
    fn pulsed_window(pulses: usize) -> AcquisitionWindow {
        let mut voltage = vec![0.0; 4];
        for _ in 0..pulses {
            voltage.extend([-0.004, -0.020, -0.006, 0.0, 0.0]);
        }
        voltage.push(0.0);
        AcquisitionWindow::from_voltage(voltage)
    }

    #[test]
    fn one_count_per_window_in_order() {
        let windows: Vec<_> = [3, 0, 1, 5, 2].iter().map(|&n| pulsed_window(n)).collect();
        let counts = aggregate_counts(&windows, -5e-3);
        assert_eq!(counts, vec![3, 0, 1, 5, 2]);
    }

    #[test]
    fn empty_input_gives_empty_counts() {
        assert!(aggregate_counts(&[], -5e-3).is_empty());
    }

    #[test]
    fn event_log_accumulates_across_run() {
        let mut log = EventLog::new(EventAccumulation::AccumulateRun);
        assert_eq!(log.record(&pulsed_window(2), -5e-3), 2);
        assert_eq!(log.record(&pulsed_window(1), -5e-3), 1);
        assert_eq!(log.events().len(), 3);
        assert_eq!(log.windows(), 2);
    }

    #[test]
    fn event_log_resets_per_window() {
        let mut log = EventLog::new(EventAccumulation::ResetPerWindow);
        log.record(&pulsed_window(2), -5e-3);
        log.record(&pulsed_window(1), -5e-3);
        assert_eq!(log.events(), &[-0.020]);
        log.record(&pulsed_window(0), -5e-3);
        assert!(log.events().is_empty());
    }

    #[test]
    fn directory_counts_are_written() {
        let raw = TempDir::new().unwrap();
        for (i, n) in [1, 4, 2].iter().enumerate() {
            write_window(&raw.path().join(window_file_name(i)), &pulsed_window(*n)).unwrap();
        }
        std::fs::write(raw.path().join("notes.txt"), "not a window").unwrap();

        let out = raw.path().join("histograma");
        let counts = generate_counts(raw.path(), &out, &CountingConfig::default()).unwrap();
        assert_eq!(counts, vec![1, 4, 2]);
        assert_eq!(read_counts(&out.join(COUNTS_FILE)).unwrap(), counts);
    }

    #[test]
    fn directory_limit_is_respected() {
        let raw = TempDir::new().unwrap();
        for i in 0..4 {
            write_window(&raw.path().join(window_file_name(i)), &pulsed_window(i)).unwrap();
        }
        let config = CountingConfig {
            max_files: 2,
            ..CountingConfig::default()
        };
        assert_eq!(count_directory(raw.path(), &config).unwrap(), vec![0, 1]);
    }

    #[test]
    fn empty_directory_is_insufficient() {
        let raw = TempDir::new().unwrap();
        assert!(matches!(
            count_directory(raw.path(), &CountingConfig::default()),
            Err(AnalysisError::InsufficientData(_))
        ));
    }
}
