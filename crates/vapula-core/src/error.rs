//! Error types for quantization operations.

use thiserror::Error;

/// Result type alias for quantization operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Quantization error types.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid static parameter (unknown codec kind, bad block size,
    /// hyperparameter out of domain). Raised before any work begins.
    #[error("invalid configuration: {message}")]
    Configuration { message: String },

    /// Buffer lengths inconsistent with declared element counts or block
    /// size. Raised before any buffer is mutated.
    #[error("shape mismatch for {buffer}: expected {expected} elements, got {actual}")]
    ShapeMismatch {
        buffer: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A non-finite value appeared where the domain guarantees finiteness.
    /// Surfaced rather than silently propagated to catch upstream
    /// corruption early.
    #[error("non-finite {what} in block {block}")]
    NumericOverflow { what: &'static str, block: usize },

    /// Persisted state is corrupted or invalid.
    #[error("corrupted state: {message}")]
    Corrupted { message: String },

    /// I/O error from an underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Create a shape mismatch error for a named buffer.
    pub fn shape_mismatch(buffer: &'static str, expected: usize, actual: usize) -> Self {
        Error::ShapeMismatch {
            buffer,
            expected,
            actual,
        }
    }

    /// Create a numeric overflow error for a named quantity.
    pub fn numeric_overflow(what: &'static str, block: usize) -> Self {
        Error::NumericOverflow { what, block }
    }

    /// Create a corrupted state error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Error::Corrupted {
            message: message.into(),
        }
    }

    /// Get error category for metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Error::Configuration { .. } => "configuration",
            Error::ShapeMismatch { .. } => "shape_mismatch",
            Error::NumericOverflow { .. } => "numeric_overflow",
            Error::Corrupted { .. } => "corrupted",
            Error::Io(_) => "io_error",
        }
    }
}
