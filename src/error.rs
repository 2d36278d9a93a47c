use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Analysis errors
// ---------------------------------------------------------------------------

/// Failures surfaced by the counting and fitting pipelines.
///
/// None of these are converted into a default result: a zero count or a NaN
/// parameter would quietly corrupt the statistics built on top of them.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Fewer samples than the algorithm needs.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// The optimizer did not converge, or produced an unusable solution.
    #[error("fit diverged: {0}")]
    FitDivergence(String),

    /// The histogram has no usable bins.
    #[error("degenerate histogram: {0}")]
    DegenerateHistogram(String),

    /// A bin where both the observed and the expected frequency are zero.
    #[error("chi-square term undefined at bin {bin}: observed and expected are both zero")]
    UndefinedChiSquareTerm { bin: usize },

    /// File or record shape mismatch.
    #[error("malformed input{}: {message}", location(.path, .line))]
    MalformedInput {
        path: Option<PathBuf>,
        line: Option<usize>,
        message: String,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn location(path: &Option<PathBuf>, line: &Option<usize>) -> String {
    match (path, line) {
        (Some(p), Some(l)) => format!(" in {}:{l}", p.display()),
        (Some(p), None) => format!(" in {}", p.display()),
        (None, Some(l)) => format!(" at line {l}"),
        (None, None) => String::new(),
    }
}

impl AnalysisError {
    /// Shape mismatch that is not tied to a file.
    pub fn malformed(message: impl Into<String>) -> Self {
        AnalysisError::MalformedInput {
            path: None,
            line: None,
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AnalysisError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
