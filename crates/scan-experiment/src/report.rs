//! Events and end-of-run report.

use crate::state::{ScanProgress, SequencePhase};
use scan_core::{GridGeometry, PhysicalCell};
use scan_storage::SessionId;
use std::path::PathBuf;
use tokio::time::Duration;

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// All points recorded; the file is kept
    Completed {
        /// Main point-stream file
        path: PathBuf,
    },
    /// Stopped or rejected by the operator; output deleted
    Cancelled {
        /// Why the run stopped
        reason: String,
    },
    /// Acquisition or storage error; output deleted
    Failed {
        /// Error message
        error: String,
    },
}

impl ScanOutcome {
    /// Phase the sequencer passes through for this outcome.
    pub fn phase(&self) -> SequencePhase {
        match self {
            ScanOutcome::Completed { .. } => SequencePhase::Completed,
            ScanOutcome::Cancelled { .. } => SequencePhase::Cancelled,
            ScanOutcome::Failed { .. } => SequencePhase::Failed,
        }
    }

    /// Whether the run completed.
    pub fn is_completed(&self) -> bool {
        matches!(self, ScanOutcome::Completed { .. })
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    /// End state
    pub outcome: ScanOutcome,
    /// Session id, when the output file was opened
    pub session: Option<SessionId>,
    /// Grid that was scanned
    pub geometry: Option<GridGeometry>,
    /// Rows in the point stream when the run ended
    pub points_written: u64,
    /// Points recorded as zeros because no sample was available
    pub missing_samples: u64,
    /// Moves the motion adapter refused to queue
    pub motion_failures: u64,
    /// Wall time of the whole run
    pub elapsed: Duration,
}

/// Notifications broadcast while a run progresses.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// Phase transition
    Phase(SequencePhase),
    /// A point was appended to the stream
    PointRecorded {
        /// Recorded coordinates
        cell: PhysicalCell,
        /// Progress including this point
        progress: ScanProgress,
    },
    /// Run ended
    Finished(ScanReport),
}
