/// Data layer: core types, delimited-file I/O, and sample selection.
///
/// Architecture:
/// ```text
///  medicion_*.csv / cuentas.csv / spectrum / sweep
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → AcquisitionWindow / counts / Spectrum / PhotocurrentCurve
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  drop artifact counts, trim sweep edges
///   └──────────┘
///        │
///        ▼
///     analysis
/// ```

pub mod filter;
pub mod loader;
pub mod model;
