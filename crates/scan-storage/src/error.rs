//! Storage error types.

use scan_core::ScanError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while writing or managing measurement files.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Filesystem operation failed on a known path.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// CSV encoding failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A spectrum did not match the run's axis length.
    #[error("Spectrum has {actual} values, expected {expected}")]
    LengthMismatch {
        /// Axis length fixed at the start of the run
        expected: usize,
        /// Length of the rejected spectrum
        actual: usize,
    },

    /// No free session name for the current second.
    #[error("No free session name left for '{0}'")]
    SessionExhausted(String),

    /// Requested measurement does not exist.
    #[error("Measurement '{0}' not found")]
    NotFound(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<StorageError> for ScanError {
    fn from(err: StorageError) -> Self {
        ScanError::Storage(err.to_string())
    }
}

/// Errors raised while loading a measurement cube.
#[derive(Error, Debug)]
pub enum CubeError {
    /// The file could not be opened or read.
    #[error("Cannot read '{}': {source}", path.display())]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The CSV stream itself was unreadable.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// No row carried coordinates plus at least one spectrum value.
    #[error("No spectrum data in file")]
    Empty,
}
