use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{AnalysisError, Result};

use super::model::{AcquisitionWindow, PhotocurrentCurve, Spectrum};

// ---------------------------------------------------------------------------
// Delimited text primitives
// ---------------------------------------------------------------------------

/// Column separator of a flat numeric text file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    /// `,` – acquisition windows and counts.
    Comma,
    /// Any run of spaces or tabs – spectra and photocurrent sweeps.
    Whitespace,
}

/// Read every numeric record of a delimited file.
///
/// Blank lines and lines starting with `#` are skipped. Rows may differ in
/// length; callers check the shape they need.
pub fn read_delimited(path: &Path, delimiter: Delimiter) -> Result<Vec<Vec<f64>>> {
    match delimiter {
        Delimiter::Comma => read_comma(path),
        Delimiter::Whitespace => read_whitespace(path),
    }
}

/// Write numeric records, one per line.
pub fn write_delimited(path: &Path, rows: &[Vec<f64>], delimiter: Delimiter) -> Result<()> {
    let sep = match delimiter {
        Delimiter::Comma => b',',
        Delimiter::Whitespace => b' ',
    };
    let mut writer = csv::WriterBuilder::new()
        .delimiter(sep)
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;
    for row in rows {
        writer
            .write_record(row.iter().map(|v| v.to_string()))
            .map_err(|e| csv_error(path, e))?;
    }
    writer.flush().map_err(|e| AnalysisError::io(path, e))?;
    Ok(())
}

fn read_comma(path: &Path) -> Result<Vec<Vec<f64>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| csv_error(path, e))?;
        let line = record.position().map(|p| p.line() as usize);
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        let row = record
            .iter()
            .map(|field| parse_number(field, path, line))
            .collect::<Result<Vec<f64>>>()?;
        rows.push(row);
    }
    Ok(rows)
}

fn read_whitespace(path: &Path) -> Result<Vec<Vec<f64>>> {
    let file = File::open(path).map_err(|e| AnalysisError::io(path, e))?;
    let mut rows = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| AnalysisError::io(path, e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let row = trimmed
            .split_whitespace()
            .map(|tok| parse_number(tok, path, Some(idx + 1)))
            .collect::<Result<Vec<f64>>>()?;
        rows.push(row);
    }
    Ok(rows)
}

fn parse_number(token: &str, path: &Path, line: Option<usize>) -> Result<f64> {
    token
        .parse::<f64>()
        .map_err(|_| AnalysisError::MalformedInput {
            path: Some(path.to_path_buf()),
            line,
            message: format!("'{token}' is not a number"),
        })
}

fn csv_error(path: &Path, err: csv::Error) -> AnalysisError {
    let line = err.position().map(|p| p.line() as usize);
    match err.into_kind() {
        csv::ErrorKind::Io(source) => AnalysisError::io(path, source),
        other => AnalysisError::MalformedInput {
            path: Some(path.to_path_buf()),
            line,
            message: format!("{other:?}"),
        },
    }
}

/// Split rows into columns, requiring at least `min_columns` per row.
fn columns(path: &Path, rows: Vec<Vec<f64>>, min_columns: usize) -> Result<Vec<Vec<f64>>> {
    let width = rows.first().map(|r| r.len()).unwrap_or(min_columns);
    let mut cols = vec![Vec::with_capacity(rows.len()); width.max(min_columns)];
    for (i, row) in rows.into_iter().enumerate() {
        if row.len() < min_columns || row.len() != width {
            return Err(AnalysisError::MalformedInput {
                path: Some(path.to_path_buf()),
                line: None,
                message: format!(
                    "record {i} has {} columns, expected {} (at least {min_columns})",
                    row.len(),
                    width
                ),
            });
        }
        for (col, value) in cols.iter_mut().zip(row) {
            col.push(value);
        }
    }
    Ok(cols)
}

// ---------------------------------------------------------------------------
// Acquisition windows
// ---------------------------------------------------------------------------

/// Comma-separated `(time, voltage)` file written once per oscilloscope sweep.
pub fn read_window(path: &Path) -> Result<AcquisitionWindow> {
    let rows = read_delimited(path, Delimiter::Comma)?;
    let mut cols = columns(path, rows, 2)?.into_iter();
    let time = cols.next().unwrap_or_default();
    let voltage = cols.next().unwrap_or_default();
    AcquisitionWindow::new(time, voltage)
}

pub fn write_window(path: &Path, window: &AcquisitionWindow) -> Result<()> {
    write_delimited(path, &window.rows(), Delimiter::Comma)
}

/// Files in `dir` whose name contains `marker`, sorted by name, at most `limit`.
pub fn list_measurement_files(dir: &Path, marker: &str, limit: usize) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| AnalysisError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| AnalysisError::io(dir, e))?;
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.contains(marker));
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    files.truncate(limit);
    Ok(files)
}

/// Suffix of the lamp spectra overlaid by [`read_spectra_dir`].
pub const SPECTRUM_SUFFIX: &str = "_spec.csv";

/// Files in `dir` whose name ends with `suffix`, sorted by name.
pub fn list_files_with_suffix(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| AnalysisError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| AnalysisError::io(dir, e))?;
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(suffix));
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Legend label of a file picked by suffix: `lampara_roja_corriente.csv`
/// becomes `lampara roja`.
pub fn label_from_file_name(path: &Path, suffix: &str) -> String {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    name.strip_suffix(suffix).unwrap_or(name).replace('_', " ")
}

/// Every `*{suffix}` spectrum of `dir`, dark-level corrected and normalized.
pub fn read_spectra_dir(
    dir: &Path,
    suffix: &str,
    dark_samples: usize,
) -> Result<Vec<(String, Spectrum)>> {
    let files = list_files_with_suffix(dir, suffix)?;
    if files.is_empty() {
        return Err(AnalysisError::InsufficientData(format!(
            "no '*{suffix}' spectrum in {}",
            dir.display()
        )));
    }
    files
        .iter()
        .map(|path| {
            let spectrum = read_spectrum(path)?.baseline_corrected(dark_samples)?;
            Ok((label_from_file_name(path, suffix), spectrum))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Counts and events
// ---------------------------------------------------------------------------

/// One non-negative integer per line. Values written as floats (`3.0e0`)
/// are accepted as long as they are integral.
pub fn read_counts(path: &Path) -> Result<Vec<u32>> {
    let rows = read_delimited(path, Delimiter::Comma)?;
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| {
            let value = match row.as_slice() {
                [v] => *v,
                _ => {
                    return Err(AnalysisError::MalformedInput {
                        path: Some(path.to_path_buf()),
                        line: None,
                        message: format!("record {i} has {} columns, expected 1", row.len()),
                    })
                }
            };
            if value < 0.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
                return Err(AnalysisError::MalformedInput {
                    path: Some(path.to_path_buf()),
                    line: None,
                    message: format!("record {i}: {value} is not a count"),
                });
            }
            Ok(value as u32)
        })
        .collect()
}

pub fn write_counts(path: &Path, counts: &[u32]) -> Result<()> {
    let file = File::create(path).map_err(|e| AnalysisError::io(path, e))?;
    let mut out = BufWriter::new(file);
    for c in counts {
        writeln!(out, "{c}").map_err(|e| AnalysisError::io(path, e))?;
    }
    out.flush().map_err(|e| AnalysisError::io(path, e))
}

/// One voltage per line (exported event amplitudes).
pub fn write_values(path: &Path, values: &[f64]) -> Result<()> {
    let rows: Vec<Vec<f64>> = values.iter().map(|&v| vec![v]).collect();
    write_delimited(path, &rows, Delimiter::Comma)
}

// ---------------------------------------------------------------------------
// Spectrum and photocurrent
// ---------------------------------------------------------------------------

/// Whitespace-separated `(wavelength, intensity)`.
pub fn read_spectrum(path: &Path) -> Result<Spectrum> {
    let rows = read_delimited(path, Delimiter::Whitespace)?;
    let mut cols = columns(path, rows, 2)?.into_iter();
    let wavelength = cols.next().unwrap_or_default();
    let intensity = cols.next().unwrap_or_default();
    Spectrum::new(wavelength, intensity)
}

/// Whitespace-separated `(voltage, current, [extra...])`.
pub fn read_curve(path: &Path) -> Result<PhotocurrentCurve> {
    let rows = read_delimited(path, Delimiter::Whitespace)?;
    let mut cols = columns(path, rows, 2)?.into_iter();
    let voltage = cols.next().unwrap_or_default();
    let current = cols.next().unwrap_or_default();
    let mut curve = PhotocurrentCurve::new(voltage, current)?;
    curve.extra = cols.collect();
    Ok(curve)
}

pub fn write_curve(path: &Path, curve: &PhotocurrentCurve) -> Result<()> {
    write_delimited(path, &curve.rows(), Delimiter::Whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn spectra_directory_is_sorted_and_corrected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("verde_spec.csv"), "500 1\n510 3\n520 5\n").unwrap();
        std::fs::write(dir.path().join("azul_spec.csv"), "400 2\n410 2\n420 6\n").unwrap();
        std::fs::write(dir.path().join("notas.txt"), "not a spectrum").unwrap();

        let spectra = read_spectra_dir(dir.path(), SPECTRUM_SUFFIX, 1).unwrap();
        assert_eq!(spectra.len(), 2);
        assert_eq!(spectra[0].0, "azul");
        assert_eq!(spectra[0].1.intensity, vec![0.0, 0.0, 1.0]);
        assert_eq!(spectra[1].0, "verde");
        assert_eq!(spectra[1].1.intensity, vec![0.0, 0.5, 1.0]);

        let err = read_spectra_dir(dir.path(), "_corriente.csv", 1).unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData(_)));
    }

    #[test]
    fn labels_drop_suffix_and_underscores() {
        let path = Path::new("/data/led_rojo_corriente.csv");
        let label = label_from_file_name(path, "_corriente.csv");
        assert_eq!(label, "led rojo");
    }

    #[test]
    fn counts_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cuentas.csv");
        let counts = vec![0, 3, 1, 7, 2, 2, 19, 0];
        write_counts(&path, &counts).unwrap();
        assert_eq!(read_counts(&path).unwrap(), counts);
    }

    #[test]
    fn counts_accept_integral_floats() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cuentas.csv");
        std::fs::write(&path, "3.000000000000000000e+00\n0.0\n12\n").unwrap();
        assert_eq!(read_counts(&path).unwrap(), vec![3, 0, 12]);
    }

    #[test]
    fn counts_reject_negative_and_fractional() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "1\n-2\n").unwrap();
        assert!(matches!(
            read_counts(&path),
            Err(AnalysisError::MalformedInput { .. })
        ));
        std::fs::write(&path, "1.5\n").unwrap();
        assert!(read_counts(&path).is_err());
    }

    #[test]
    fn window_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("medicion_0.csv");
        let window =
            AcquisitionWindow::new(vec![0.0, 1e-6, 2e-6], vec![-0.001, -0.012, 0.0004]).unwrap();
        write_window(&path, &window).unwrap();
        assert_eq!(read_window(&path).unwrap(), window);
    }

    #[test]
    fn window_with_missing_column_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("medicion_0.csv");
        std::fs::write(&path, "0.0,1.0\n1.0\n").unwrap();
        assert!(matches!(
            read_window(&path),
            Err(AnalysisError::MalformedInput { .. })
        ));
    }

    #[test]
    fn non_numeric_field_reports_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("spec.txt");
        std::fs::write(&path, "400 1.0\n410 abc\n").unwrap();
        match read_spectrum(&path) {
            Err(AnalysisError::MalformedInput { line, message, .. }) => {
                assert_eq!(line, Some(2));
                assert!(message.contains("abc"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn whitespace_files_skip_comments_and_mixed_spacing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corriente.txt");
        std::fs::write(&path, "# v i phase\n-1.0  2e-9\t45\n\n0.5 3e-9 46\n").unwrap();
        let curve = read_curve(&path).unwrap();
        assert_eq!(curve.voltage, vec![-1.0, 0.5]);
        assert_eq!(curve.current, vec![2e-9, 3e-9]);
        assert_eq!(curve.extra, vec![vec![45.0, 46.0]]);
    }

    #[test]
    fn curve_round_trip_keeps_extra_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("curve.txt");
        let mut curve = PhotocurrentCurve::new(vec![-0.5, 0.0], vec![1e-12, 4e-10]).unwrap();
        curve.extra.push(vec![1.0, 2.0]);
        write_curve(&path, &curve).unwrap();
        assert_eq!(read_curve(&path).unwrap(), curve);
    }

    #[test]
    fn measurement_files_are_filtered_sorted_and_limited() {
        let dir = TempDir::new().unwrap();
        for name in ["medicion_2.csv", "medicion_0.csv", "notes.txt", "medicion_1.csv"] {
            std::fs::write(dir.path().join(name), "0,0\n").unwrap();
        }
        std::fs::create_dir(dir.path().join("medicion_dir")).unwrap();
        let files = list_measurement_files(dir.path(), "med", 2).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["medicion_0.csv", "medicion_1.csv"]);
    }
}
