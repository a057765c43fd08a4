//! Error types for landgrid

use thiserror::Error;

/// Fatal errors raised by landgrid operations.
///
/// Non-fatal conditions (skipped windows, unreachable cells) are never
/// reported through this type; analyses collect them as diagnostics and
/// return them alongside their output.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Dimension mismatch ({context}): expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        context: String,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Invalid window size {size}: window sizes must be odd and at least 1")]
    InvalidWindowSize { size: usize },

    #[error("Parse error in {source_name} at line {line}: {reason}")]
    Parse {
        source_name: String,
        line: usize,
        reason: String,
    },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Interrupted after {completed} of {total} positions")]
    Interrupted { completed: usize, total: usize },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a [`Error::Configuration`] error
    pub fn config(reason: impl Into<String>) -> Self {
        Error::Configuration(reason.into())
    }

    /// Whether the error rejects the configuration before any computation
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_) | Error::InvalidWindowSize { .. })
    }

    /// Shorthand for a [`Error::Parse`] error
    pub fn parse(source_name: impl Into<String>, line: usize, reason: impl Into<String>) -> Self {
        Error::Parse {
            source_name: source_name.into(),
            line,
            reason: reason.into(),
        }
    }
}

/// Result type alias for landgrid operations
pub type Result<T> = std::result::Result<T, Error>;
