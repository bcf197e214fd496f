//! `scan-experiment`
//!
//! Orchestration of raster scans: the [`ScanSequencer`] state machine, its
//! shared [`SequenceState`], and the confirmation channel used between the
//! perimeter preview and the scan proper.

pub mod confirmation;
pub mod report;
pub mod sequencer;
pub mod state;

pub use confirmation::{confirmation_channel, AutoConfirm, ConfirmationRequest, ConfirmationRequester};
pub use report::{ScanEvent, ScanOutcome, ScanReport};
pub use sequencer::{ScanHandle, ScanHardware, ScanSequencer, StorageOptions, DEFAULT_OUTPUT_DIR};
pub use state::{ScanProgress, SequencePhase, SequenceState};
