/// Analysis layer: event counting, distribution fits, photocurrent fits.
///
/// Architecture:
/// ```text
///   AcquisitionWindow ──► events ──► aggregate ──► counts
///                                                    │
///                                                    ▼
///                                  histogram ──► distribution ──► p-values
///
///   PhotocurrentCurve + Spectrum ──► photocurrent ──► (offset, slope, phase)
///
///   lsq / stats: Levenberg–Marquardt and chi-square shared by both fits
/// ```

pub mod aggregate;
pub mod distribution;
pub mod events;
pub mod histogram;
pub mod lsq;
pub mod photocurrent;
pub mod stats;
