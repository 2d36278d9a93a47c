//! Photon-counting statistics and photoelectric-effect analysis.
//!
//! Two offline pipelines share the data layer and the least-squares core:
//! counting PMT pulses in oscilloscope windows and testing the count
//! distribution against Poisson and Bose-Einstein statistics, and fitting
//! the spectrum-weighted photocurrent of a phototube to a voltage sweep.

pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod instrument;
pub mod report;

pub use analysis::aggregate::{aggregate_counts, count_directory, generate_counts};
pub use analysis::distribution::{fit_distributions, DistributionFit, FittedModel, ModelKind};
pub use analysis::events::extract_events;
pub use analysis::photocurrent::{fit_photocurrent, normalize_curve, PhotocurrentFit};
pub use config::AnalysisConfig;
pub use error::{AnalysisError, Result};
