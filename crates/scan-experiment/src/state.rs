//! Shared sequencer state: phase, stop flag and progress.

use parking_lot::Mutex;
use scan_core::TraversalIndex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{watch, Notify};
use tokio::time::{Duration, Instant};

/// Sequencer phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequencePhase {
    /// No run; ready to start
    #[default]
    Idle,
    /// Settings snapshotted and locked, output being opened
    Preparing,
    /// Stage tracing the outline of the scan area
    PerimeterPreview,
    /// Waiting for the operator to accept the area
    AwaitingConfirmation,
    /// Visiting grid points
    Scanning,
    /// Every point recorded; output kept
    Completed,
    /// Stopped or rejected; output deleted
    Cancelled,
    /// Acquisition or I/O error; output deleted
    Failed,
}

impl SequencePhase {
    /// True for the three end-of-run phases.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SequencePhase::Completed | SequencePhase::Cancelled | SequencePhase::Failed
        )
    }
}

impl std::fmt::Display for SequencePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SequencePhase::Idle => write!(f, "idle"),
            SequencePhase::Preparing => write!(f, "preparing"),
            SequencePhase::PerimeterPreview => write!(f, "perimeter_preview"),
            SequencePhase::AwaitingConfirmation => write!(f, "awaiting_confirmation"),
            SequencePhase::Scanning => write!(f, "scanning"),
            SequencePhase::Completed => write!(f, "completed"),
            SequencePhase::Cancelled => write!(f, "cancelled"),
            SequencePhase::Failed => write!(f, "failed"),
        }
    }
}

/// Progress of the current run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanProgress {
    /// Points recorded so far (1-based index of the last one)
    pub point_index: u64,
    /// Points in the grid
    pub total_points: u64,
    /// Traversal position of the last recorded point
    pub current: Option<TraversalIndex>,
    /// Time since scanning began
    pub elapsed: Duration,
    /// Estimated time to finish
    pub eta: Option<Duration>,
    /// Points recorded as zeros because no sample was available
    pub missing_samples: u64,
}

impl ScanProgress {
    /// Fraction complete in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.total_points == 0 {
            return 0.0;
        }
        self.point_index as f64 / self.total_points as f64
    }

    /// Linear estimate of the remaining time.
    pub fn estimate_remaining(elapsed: Duration, done: u64, total: u64) -> Option<Duration> {
        if done == 0 {
            return None;
        }
        let per_point = elapsed.as_secs_f64() / done as f64;
        Some(Duration::from_secs_f64(
            per_point * total.saturating_sub(done) as f64,
        ))
    }
}

/// State shared between the sequencer handle and its run task.
///
/// The phase lives in a watch channel so callers can await transitions;
/// the Idle to Preparing step is a compare-and-set on that channel, which
/// makes it the single gate for "only one run at a time".
#[derive(Debug)]
pub struct SequenceState {
    phase: watch::Sender<SequencePhase>,
    stop_requested: AtomicBool,
    stop_notify: Notify,
    progress: Mutex<ScanProgress>,
    started_at: Mutex<Option<Instant>>,
}

impl Default for SequenceState {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceState {
    /// Idle state, no stop requested.
    pub fn new() -> Self {
        let (phase, _) = watch::channel(SequencePhase::Idle);
        Self {
            phase,
            stop_requested: AtomicBool::new(false),
            stop_notify: Notify::new(),
            progress: Mutex::new(ScanProgress::default()),
            started_at: Mutex::new(None),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> SequencePhase {
        *self.phase.borrow()
    }

    /// Receiver that observes every phase change.
    pub fn subscribe(&self) -> watch::Receiver<SequencePhase> {
        self.phase.subscribe()
    }

    /// Move Idle to Preparing. Returns the blocking phase when not Idle.
    pub fn try_begin(&self) -> Result<(), SequencePhase> {
        let mut blocking = None;
        self.phase.send_if_modified(|phase| {
            if *phase == SequencePhase::Idle {
                *phase = SequencePhase::Preparing;
                true
            } else {
                blocking = Some(*phase);
                false
            }
        });
        match blocking {
            Some(phase) => Err(phase),
            None => {
                self.stop_requested.store(false, Ordering::Release);
                *self.progress.lock() = ScanProgress::default();
                *self.started_at.lock() = None;
                Ok(())
            }
        }
    }

    /// Unconditional phase change.
    pub fn set_phase(&self, phase: SequencePhase) {
        self.phase.send_replace(phase);
    }

    /// Ask the running sequence to stop. Returns false when nothing runs.
    pub fn request_stop(&self) -> bool {
        if self.phase() == SequencePhase::Idle {
            return false;
        }
        self.stop_requested.store(true, Ordering::Release);
        self.stop_notify.notify_waiters();
        true
    }

    /// Whether a stop has been requested for this run.
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Resolves once a stop is requested.
    pub async fn stopped(&self) {
        loop {
            let notified = self.stop_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.stop_requested() {
                return;
            }
            notified.await;
        }
    }

    /// Mark the start of the scanning phase for elapsed/ETA.
    pub fn mark_started(&self, total_points: u64) {
        *self.started_at.lock() = Some(Instant::now());
        self.progress.lock().total_points = total_points;
    }

    /// Record one finished point and return the updated progress.
    pub fn record_point(&self, index: TraversalIndex, missing_samples: u64) -> ScanProgress {
        let elapsed = self
            .started_at
            .lock()
            .map(|t| t.elapsed())
            .unwrap_or_default();
        let mut progress = self.progress.lock();
        progress.point_index += 1;
        progress.current = Some(index);
        progress.elapsed = elapsed;
        progress.missing_samples = missing_samples;
        progress.eta =
            ScanProgress::estimate_remaining(elapsed, progress.point_index, progress.total_points);
        progress.clone()
    }

    /// Snapshot of the progress.
    pub fn progress(&self) -> ScanProgress {
        self.progress.lock().clone()
    }

    /// Wait up to `timeout` for the phase to reach Idle.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let mut rx = self.phase.subscribe();
        let idle = async move {
            rx.wait_for(|phase| *phase == SequencePhase::Idle)
                .await
                .is_ok()
        };
        tokio::time::timeout(timeout, idle).await.unwrap_or(false)
    }
}
