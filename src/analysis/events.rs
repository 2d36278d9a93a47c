use crate::data::model::AcquisitionWindow;

/// Default noise threshold in volts. PMT pulses are negative-going, so only
/// minima below this level are counted.
pub const DEFAULT_THRESHOLD: f64 = -5e-3;

/// Indices of local minima of `voltage`.
///
/// Index `i` is a candidate when the sign of the first difference increases
/// between `i - 1 → i` and `i → i + 1`. A sharp dip yields one candidate. On
/// a flat bottom, the sample where the fall stops and the sample where the
/// rise starts are both reported; a flat step in the middle of a descent is
/// reported once (where the fall pauses).
pub fn minima_indices(voltage: &[f64]) -> Vec<usize> {
    if voltage.len() < 3 {
        return Vec::new();
    }
    let signs: Vec<f64> = voltage
        .windows(2)
        .map(|w| sign(w[1] - w[0]))
        .collect();
    signs
        .windows(2)
        .enumerate()
        .filter(|(_, s)| s[1] - s[0] > 0.0)
        .map(|(i, _)| i + 1)
        .collect()
}

fn sign(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Voltages of the minima that dip strictly below `threshold`, in time order.
pub fn event_voltages(window: &AcquisitionWindow, threshold: f64) -> Vec<f64> {
    let voltage = window.voltage();
    minima_indices(voltage)
        .into_iter()
        .map(|i| voltage[i])
        .filter(|&v| v < threshold)
        .collect()
}

/// Number of detector pulses in one window. Windows shorter than three
/// samples have no second difference and always yield zero.
pub fn extract_events(window: &AcquisitionWindow, threshold: f64) -> u32 {
    event_voltages(window, threshold).len() as u32
}

/// Autocorrelation of a trace, "same" mode: `out[k]` is the correlation at
/// lag `k - n/2`, so the zero-lag peak sits at the centre.
pub fn autocorrelation(voltage: &[f64]) -> Vec<f64> {
    let n = voltage.len() as isize;
    let centre = n / 2;
    (0..n)
        .map(|k| {
            let lag = k - centre;
            (0..n)
                .filter_map(|i| {
                    let j = i + lag;
                    (0..n)
                        .contains(&j)
                        .then(|| voltage[i as usize] * voltage[j as usize])
                })
                .sum::<f64>()
        })
        .collect()
}

/// [`autocorrelation`] of a window's voltage as `[lag, value]` pairs, with
/// lags in the units of the window's time axis (mean sample spacing).
pub fn lagged_autocorrelation(window: &AcquisitionWindow) -> Vec<[f64; 2]> {
    let time = window.time();
    let n = time.len();
    let dt = match (time.first(), time.last()) {
        (Some(first), Some(last)) if n > 1 => (last - first) / (n - 1) as f64,
        _ => 0.0,
    };
    let centre = (n / 2) as f64;
    autocorrelation(window.voltage())
        .into_iter()
        .enumerate()
        .map(|(k, value)| [(k as f64 - centre) * dt, value])
        .collect()
}
