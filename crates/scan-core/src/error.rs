//! Error types for the scan engine.
//!
//! `ScanError` is the single error type surfaced by the sequencer and its
//! collaborators. Adapter implementations keep returning `anyhow::Result` at
//! the capability seam (see [`crate::capabilities`]); the sequencer folds
//! those into `ScanError::Acquisition` / `ScanError::Motion` when it decides
//! an error is fatal to the run.
//!
//! ## Error Categories
//!
//! 1. **Configuration** - `Configuration`, `SettingsLocked`
//!    - Raised while building or editing settings
//!    - Out-of-range numeric values are clamped rather than reported
//!
//! 2. **Hardware** - `HardwareUnavailable`, `Acquisition`, `Motion`, `Driver`
//!    - `HardwareUnavailable` refuses a start request
//!    - `Acquisition` errors fail the current run
//!    - `Motion` errors are logged, motion is best-effort
//!
//! 3. **Run control** - `AlreadyRunning`, `Storage`, `Io`, `Worker`

use thiserror::Error;

// =============================================================================
// Driver Errors
// =============================================================================

/// Broad classification of a driver-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Device could not be opened or initialized
    Initialization,
    /// Link to the device was lost or garbled
    Communication,
    /// Device reported a fault
    Hardware,
    /// Operation did not complete in time
    Timeout,
    /// Request was outside the device's accepted range
    InvalidParameter,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Initialization => "initialization",
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::Hardware => "hardware",
            DriverErrorKind::Timeout => "timeout",
            DriverErrorKind::InvalidParameter => "invalid_parameter",
        };
        write!(f, "{}", label)
    }
}

/// Error raised by a motion or acquisition driver.
#[derive(Error, Debug, Clone)]
#[error("Driver '{driver_type}' {kind} error: {message}")]
pub struct DriverError {
    /// Driver identifier, e.g. `mock_stage`
    pub driver_type: String,
    /// Failure classification
    pub kind: DriverErrorKind,
    /// Human-readable detail
    pub message: String,
}

impl DriverError {
    /// Create a new driver error.
    pub fn new(
        driver_type: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            driver_type: driver_type.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Convenience alias for results using the scan error type.
pub type ScanResult<T> = std::result::Result<T, ScanError>;

/// Primary error type of the scan engine.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Settings failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Settings edit rejected because a scan holds the settings lock.
    #[error("Settings are locked by a running scan")]
    SettingsLocked,

    /// A start request arrived while a sequence was active.
    #[error("A scan sequence is already active ({phase})")]
    AlreadyRunning {
        /// Phase of the active sequence
        phase: String,
    },

    /// Neither the motion stage nor the spectrometer is available.
    #[error("No hardware available: motion stage and spectrometer are both offline")]
    HardwareUnavailable,

    /// The acquisition adapter failed in a way that aborts the run.
    #[error("Acquisition error: {0}")]
    Acquisition(String),

    /// A motion command could not be issued.
    #[error("Motion error: {0}")]
    Motion(String),

    /// Driver-level failure.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Output file handling failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Standard I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The background sequencer task ended abnormally.
    #[error("Sequencer worker error: {0}")]
    Worker(String),
}

impl ScanError {
    /// Whether this error ends the current run (as opposed to being logged
    /// and tolerated).
    pub fn is_fatal_to_run(&self) -> bool {
        !matches!(self, ScanError::Motion(_))
    }
}
