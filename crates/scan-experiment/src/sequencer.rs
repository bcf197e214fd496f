//! ScanSequencer - state machine driving one raster scan at a time.
//!
//! The sequencer snapshots and locks the settings, traces the scan area
//! outline, asks the operator to confirm it, then walks the snake path:
//! read a spectrum, append it to the point stream, dwell, move on.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐ start() ┌───────────┐   ┌──────────────────┐   ┌──────────────────────┐
//! │ Idle │────────▶│ Preparing │──▶│ PerimeterPreview │──▶│ AwaitingConfirmation │
//! └──────┘         └─────┬─────┘   └──────────────────┘   └──────────┬───────────┘
//!    ▲                   │  no motion / preview off                  │ yes
//!    │                   └─────────────────────┐                     ▼
//!    │                                         └──────────────▶┌──────────┐
//!    │                                                         │ Scanning │
//!    │                                                         └────┬─────┘
//!    │      ┌───────────┬───────────┬────────┐                      │
//!    └──────│ Completed │ Cancelled │ Failed │◀─────────────────────┘
//!           └───────────┴───────────┴────────┘
//! ```
//!
//! Cancelled and Failed delete whatever the run wrote and drive the stage
//! back by the inverse of its net displacement. Every terminal phase
//! releases the settings lock and falls back to Idle.
//!
//! # Usage
//!
//! ```rust,ignore
//! let sequencer = ScanSequencer::new(settings, hardware, StorageOptions::default());
//! let mut events = sequencer.subscribe();
//! let handle = sequencer.start()?;
//!
//! while let Ok(event) = events.recv().await {
//!     if let ScanEvent::Finished(report) = event {
//!         println!("{:?}", report.outcome);
//!         break;
//!     }
//! }
//! let report = handle.join().await?;
//! ```

use crate::report::{ScanEvent, ScanOutcome, ScanReport};
use crate::state::{ScanProgress, SequencePhase, SequenceState};
use scan_core::{
    AcquisitionAdapter, AreaSummary, ConfirmationAdapter, GridGeometry, MotionAdapter,
    MotionVector, ScanConfig, ScanError, ScanResult, SettingsStore, SnakeMapper, SpectralAxis,
    TraversalIndex,
};
use scan_storage::{PointFileLayout, PointStreamWriter, SessionId};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, error, info, warn};

/// Directory receiving measurement files when nothing else is configured.
pub const DEFAULT_OUTPUT_DIR: &str = "measurement_data";

/// Adapters the sequencer works with.
///
/// Either the motion or the acquisition adapter may be missing; a run needs
/// at least one of them connected.
#[derive(Clone)]
pub struct ScanHardware {
    /// Stage motion
    pub motion: Option<Arc<dyn MotionAdapter>>,
    /// Spectrum source
    pub acquisition: Option<Arc<dyn AcquisitionAdapter>>,
    /// Operator confirmation after the perimeter preview
    pub confirmation: Arc<dyn ConfirmationAdapter>,
}

impl ScanHardware {
    fn motion_ready(&self) -> Option<Arc<dyn MotionAdapter>> {
        self.motion.as_ref().filter(|m| m.is_connected()).cloned()
    }

    fn acquisition_ready(&self) -> Option<Arc<dyn AcquisitionAdapter>> {
        self.acquisition.as_ref().filter(|a| a.is_ready()).cloned()
    }
}

/// Where run output goes.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageOptions {
    /// Directory for point-stream files and points directories
    pub output_dir: PathBuf,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

struct Inner {
    settings: Arc<SettingsStore>,
    hardware: ScanHardware,
    storage: StorageOptions,
    state: SequenceState,
    events: broadcast::Sender<ScanEvent>,
}

impl Inner {
    fn set_phase(&self, phase: SequencePhase) {
        info!(phase = %phase, "Sequencer phase");
        self.state.set_phase(phase);
        let _ = self.events.send(ScanEvent::Phase(phase));
    }

    /// Sleep for `duration`, returning early when a stop is requested.
    async fn sleep_unless_stopped(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        tokio::select! {
            _ = sleep(duration) => {}
            _ = self.state.stopped() => {}
        }
    }
}

/// Runs raster scans one at a time.
pub struct ScanSequencer {
    inner: Arc<Inner>,
}

impl ScanSequencer {
    /// Create a sequencer over a settings store and a set of adapters.
    pub fn new(
        settings: Arc<SettingsStore>,
        hardware: ScanHardware,
        storage: StorageOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(Inner {
                settings,
                hardware,
                storage,
                state: SequenceState::new(),
                events,
            }),
        }
    }

    /// Settings store this sequencer snapshots at each start.
    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.inner.settings
    }

    /// Current phase.
    pub fn phase(&self) -> SequencePhase {
        self.inner.state.phase()
    }

    /// Watch receiver for phase changes.
    pub fn watch_phase(&self) -> watch::Receiver<SequencePhase> {
        self.inner.state.subscribe()
    }

    /// Progress of the current (or last) run.
    pub fn progress(&self) -> ScanProgress {
        self.inner.state.progress()
    }

    /// Subscribe to run events.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.inner.events.subscribe()
    }

    /// Start a run on a background task.
    ///
    /// Fails with [`ScanError::AlreadyRunning`] unless Idle and with
    /// [`ScanError::HardwareUnavailable`] when neither the stage nor the
    /// spectrometer is ready. Must be called inside a tokio runtime.
    pub fn start(&self) -> ScanResult<ScanHandle> {
        let phase = self.phase();
        if phase != SequencePhase::Idle {
            warn!(phase = %phase, "Start rejected: a sequence is already running");
            return Err(ScanError::AlreadyRunning {
                phase: phase.to_string(),
            });
        }
        let hardware = &self.inner.hardware;
        if hardware.motion_ready().is_none() && hardware.acquisition_ready().is_none() {
            error!("Start rejected: no hardware available, check connections");
            return Err(ScanError::HardwareUnavailable);
        }
        if let Err(phase) = self.inner.state.try_begin() {
            warn!(phase = %phase, "Start rejected: a sequence is already running");
            return Err(ScanError::AlreadyRunning {
                phase: phase.to_string(),
            });
        }
        let _ = self.inner.events.send(ScanEvent::Phase(SequencePhase::Preparing));
        info!("Sequence started");

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { execute(inner).await });
        Ok(ScanHandle { task })
    }

    /// Ask the running sequence to stop at the next check.
    pub fn request_stop(&self) -> bool {
        let requested = self.inner.state.request_stop();
        if requested {
            info!("Sequence stop requested - cleanup will follow");
        }
        requested
    }

    /// Wait up to `timeout` for the sequencer to be Idle.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        self.inner.state.wait_idle(timeout).await
    }

    /// Stop any run, give it `grace` to wind down, then shut both adapters
    /// down whatever state the run is in.
    pub async fn shutdown(&self, grace: Duration) -> anyhow::Result<()> {
        self.request_stop();
        if !self.wait_idle(grace).await {
            warn!(grace_ms = grace.as_millis() as u64, "Sequence did not stop in time");
        }
        let hardware = &self.inner.hardware;
        if let Some(motion) = &hardware.motion {
            if let Err(e) = motion.shutdown().await {
                warn!(error = %e, "Motion adapter shutdown failed");
            }
        }
        if let Some(acquisition) = &hardware.acquisition {
            if let Err(e) = acquisition.shutdown().await {
                warn!(error = %e, "Acquisition adapter shutdown failed");
            }
        }
        info!("Sequencer shut down");
        Ok(())
    }
}

/// Handle on a started run.
pub struct ScanHandle {
    task: JoinHandle<ScanReport>,
}

impl ScanHandle {
    /// Wait for the run to end.
    pub async fn join(self) -> ScanResult<ScanReport> {
        self.task
            .await
            .map_err(|e| ScanError::Worker(e.to_string()))
    }

    /// Whether the run task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// How the body of a run ended when no error occurred.
enum Termination {
    Completed,
    Cancelled(String),
}

/// Per-run working set.
struct Run {
    config: ScanConfig,
    geometry: GridGeometry,
    mapper: SnakeMapper,
    axis: SpectralAxis,
    motion: Option<Arc<dyn MotionAdapter>>,
    acquisition: Option<Arc<dyn AcquisitionAdapter>>,
    writer: Option<PointStreamWriter>,
    session: Option<SessionId>,
    net_motion: MotionVector,
    missing_samples: u64,
    motion_failures: u64,
}

async fn execute(inner: Arc<Inner>) -> ScanReport {
    let started = Instant::now();

    // The body runs on its own task so a panic inside an adapter still
    // ends the run as Failed and brings the sequencer back to Idle.
    let report = match tokio::spawn(run_body(Arc::clone(&inner), started)).await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Sequence task aborted");
            failed_report(e.to_string(), started)
        }
    };

    inner.set_phase(report.outcome.phase());
    let _ = inner.events.send(ScanEvent::Finished(report.clone()));
    inner.set_phase(SequencePhase::Idle);
    report
}

async fn run_body(inner: Arc<Inner>, started: Instant) -> ScanReport {
    match inner.settings.lease() {
        Ok((config, _lease)) => {
            let mut run = Run::new(&inner, config);
            let result = run.drive(&inner).await;
            run.finalize(&inner, result, started).await
        }
        Err(e) => {
            error!(error = %e, "Could not lock settings for the run");
            failed_report(e.to_string(), started)
        }
    }
}

fn failed_report(error: String, started: Instant) -> ScanReport {
    ScanReport {
        outcome: ScanOutcome::Failed { error },
        session: None,
        geometry: None,
        points_written: 0,
        missing_samples: 0,
        motion_failures: 0,
        elapsed: started.elapsed(),
    }
}

impl Run {
    fn new(inner: &Inner, config: ScanConfig) -> Self {
        let geometry = config.geometry();
        let mapper = SnakeMapper::new(
            config.starting_corner,
            &geometry,
            config.step_x_um,
            config.step_y_um,
        );
        let axis = config.spectral_axis();
        let motion = inner.hardware.motion_ready();
        let acquisition = inner.hardware.acquisition_ready();
        if motion.is_none() {
            info!("Motor controller not connected - running scan without moves");
        }
        if acquisition.is_none() {
            warn!("Spectrometer not ready - points will be recorded as zeros");
        }
        Self {
            config,
            geometry,
            mapper,
            axis,
            motion,
            acquisition,
            writer: None,
            session: None,
            net_motion: MotionVector::default(),
            missing_samples: 0,
            motion_failures: 0,
        }
    }

    async fn drive(&mut self, inner: &Inner) -> ScanResult<Termination> {
        info!(
            grid = %self.geometry,
            corner = %self.config.starting_corner,
            axis_len = self.axis.axis_len(),
            "Preparing scan"
        );
        self.open_output(inner)?;

        if let Some(motion) = self.motion.clone() {
            let (half_w, half_h) = self.geometry.half_extents();
            self.queue_move(motion.as_ref(), self.mapper.corner_offset(half_w, half_h));
            inner.sleep_unless_stopped(self.config.perimeter_settle()).await;

            if self.config.perimeter_preview {
                inner.set_phase(SequencePhase::PerimeterPreview);
                if self.perimeter_preview(inner, motion.as_ref()).await {
                    return Ok(Termination::Cancelled("stop requested during preview".into()));
                }

                inner.set_phase(SequencePhase::AwaitingConfirmation);
                if let Some(termination) = self.await_confirmation(inner).await {
                    return Ok(termination);
                }
            }
        }

        inner.set_phase(SequencePhase::Scanning);
        self.scan(inner).await
    }

    fn open_output(&mut self, inner: &Inner) -> ScanResult<()> {
        let layout = self.config.point_files.then(|| PointFileLayout {
            axis_values: self.axis.values().to_vec(),
            exposures_ms: self.config.sequence_exposures_ms.clone(),
        });
        let writer =
            PointStreamWriter::create_now(&inner.storage.output_dir, self.axis.axis_len(), layout)?;
        self.session = Some(writer.session().clone());
        self.writer = Some(writer);
        Ok(())
    }

    /// Drive the outline of the area. Returns true when stopped midway.
    async fn perimeter_preview(&mut self, inner: &Inner, motion: &dyn MotionAdapter) -> bool {
        info!("Driving around scan area perimeter");
        let width = f64::from(self.geometry.scan_width_um);
        let height = f64::from(self.geometry.scan_height_um);
        for edge in self.mapper.perimeter_moves(width, height) {
            if inner.state.stop_requested() {
                return true;
            }
            self.queue_move(motion, edge);
            inner.sleep_unless_stopped(self.config.perimeter_settle()).await;
        }
        inner.state.stop_requested()
    }

    async fn await_confirmation(&self, inner: &Inner) -> Option<Termination> {
        let summary = AreaSummary {
            corner: self.config.starting_corner,
            geometry: self.geometry,
            step_x_um: self.config.step_x_um,
            step_y_um: self.config.step_y_um,
        };
        info!(area = %summary, "Waiting for area confirmation");
        tokio::select! {
            accepted = inner.hardware.confirmation.confirm_area(summary) => {
                if accepted {
                    None
                } else {
                    info!("Area not confirmed by user - aborting sequence");
                    Some(Termination::Cancelled("area not confirmed".into()))
                }
            }
            _ = inner.state.stopped() => {
                Some(Termination::Cancelled("stop requested during confirmation".into()))
            }
        }
    }

    async fn scan(&mut self, inner: &Inner) -> ScanResult<Termination> {
        let total = self.geometry.total_points;
        info!(
            points_x = self.geometry.points_x,
            points_y = self.geometry.points_y,
            total_points = total,
            "Scan grid"
        );
        if let Some(acquisition) = &self.acquisition {
            acquisition
                .set_exposure_ms(self.config.primary_exposure_ms())
                .await
                .map_err(acquisition_error)?;
        }
        inner.state.mark_started(total);
        let dwell = self.config.dwell();

        for row in 0..self.geometry.points_y {
            if inner.state.stop_requested() {
                break;
            }
            for col in 0..self.geometry.points_x {
                if inner.state.stop_requested() {
                    break;
                }
                let index = TraversalIndex::new(row, col);
                self.record_point(inner, index).await?;
                inner.sleep_unless_stopped(dwell).await;
                self.advance(inner, index).await;
            }
        }

        if inner.state.stop_requested() {
            info!("Sequence stopped by user");
            return Ok(Termination::Cancelled("stop requested".into()));
        }
        let written = self.rows_written();
        if written != total {
            warn!(written, planned = total, "Scanned points differ from the plan");
        }
        Ok(Termination::Completed)
    }

    async fn record_point(&mut self, inner: &Inner, index: TraversalIndex) -> ScanResult<()> {
        let cell = self.mapper.cell(index);
        let mut spectra = vec![self.acquire(index).await?];
        self.acquire_extra_exposures(inner, index, &mut spectra).await?;

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| ScanError::Storage("point stream is not open".into()))?;
        writer.append(cell, &spectra[0])?;
        writer.write_point_file(cell, &spectra)?;

        let progress = inner.state.record_point(index, self.missing_samples);
        info!(
            point = progress.point_index,
            total = progress.total_points,
            progress = %format!("{:.1}%", progress.fraction() * 100.0),
            grid_x = cell.grid_x,
            grid_y = cell.grid_y,
            eta_s = progress.eta.map(|d| d.as_secs()).unwrap_or(0),
            "Point recorded"
        );
        let _ = inner.events.send(ScanEvent::PointRecorded { cell, progress });
        Ok(())
    }

    /// Read the latest sample and normalize it to the run's axis.
    async fn acquire(&mut self, index: TraversalIndex) -> ScanResult<Vec<f64>> {
        let zeros = vec![0.0; self.axis.axis_len()];
        let Some(acquisition) = &self.acquisition else {
            self.missing_samples += 1;
            return Ok(zeros);
        };
        match acquisition.current_sample().await {
            Ok(Some(sample)) if !sample.is_empty() => Ok(self.axis.normalize(&sample.values)),
            Ok(_) => {
                warn!(row = index.row, col = index.col, "No sample available - recording zeros");
                self.missing_samples += 1;
                Ok(zeros)
            }
            Err(e) => Err(acquisition_error(e)),
        }
    }

    /// Read one more spectrum per extra sequence exposure, then restore the
    /// primary exposure.
    async fn acquire_extra_exposures(
        &mut self,
        inner: &Inner,
        index: TraversalIndex,
        spectra: &mut Vec<Vec<f64>>,
    ) -> ScanResult<()> {
        let extra: Vec<f64> = self
            .config
            .sequence_exposures_ms
            .iter()
            .skip(1)
            .copied()
            .collect();
        if extra.is_empty() {
            return Ok(());
        }
        let Some(acquisition) = self.acquisition.clone() else {
            spectra.extend(extra.iter().map(|_| vec![0.0; self.axis.axis_len()]));
            return Ok(());
        };
        for exposure_ms in extra {
            acquisition
                .set_exposure_ms(exposure_ms)
                .await
                .map_err(acquisition_error)?;
            inner.sleep_unless_stopped(ScanConfig::exposure_wait(exposure_ms)).await;
            spectra.push(self.acquire(index).await?);
        }
        let primary = self.config.primary_exposure_ms();
        acquisition
            .set_exposure_ms(primary)
            .await
            .map_err(acquisition_error)?;
        inner.sleep_unless_stopped(ScanConfig::exposure_wait(primary)).await;
        Ok(())
    }

    /// Queue the move to the next cell, if any.
    async fn advance(&mut self, inner: &Inner, index: TraversalIndex) {
        let Some(motion) = self.motion.clone() else {
            return;
        };
        if let Some(step) = self.mapper.next_move(index) {
            self.queue_move(motion.as_ref(), step);
            inner.sleep_unless_stopped(self.config.motion_settle()).await;
        }
    }

    fn queue_move(&mut self, motion: &dyn MotionAdapter, step: MotionVector) {
        match motion.move_by(step.dx_um, step.dy_um) {
            Ok(()) => {
                self.net_motion += step;
                debug!(dx_um = step.dx_um, dy_um = step.dy_um, "Move queued");
            }
            Err(e) => {
                self.motion_failures += 1;
                warn!(error = %e, dx_um = step.dx_um, dy_um = step.dy_um, "Move not queued");
            }
        }
    }

    fn rows_written(&self) -> u64 {
        self.writer.as_ref().map_or(0, PointStreamWriter::rows_written)
    }

    async fn finalize(
        &mut self,
        inner: &Inner,
        result: ScanResult<Termination>,
        started: Instant,
    ) -> ScanReport {
        let points_written = self.rows_written();
        let outcome = match result {
            Ok(Termination::Completed) => match self.writer.take().map(PointStreamWriter::finish) {
                Some(Ok(path)) => {
                    info!(
                        points = points_written,
                        path = %path.display(),
                        scan_time_s = started.elapsed().as_secs_f64(),
                        "SCAN COMPLETED"
                    );
                    ScanOutcome::Completed { path }
                }
                Some(Err(e)) => {
                    error!(error = %e, "Closing the point stream failed");
                    self.remove_session_files(inner);
                    ScanOutcome::Failed {
                        error: e.to_string(),
                    }
                }
                None => ScanOutcome::Failed {
                    error: "point stream was never opened".into(),
                },
            },
            Ok(Termination::Cancelled(reason)) => {
                self.discard_output();
                self.return_stage();
                ScanOutcome::Cancelled { reason }
            }
            Err(e) => {
                error!(error = %e, "Sequence error");
                self.discard_output();
                self.return_stage();
                ScanOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        ScanReport {
            outcome,
            session: self.session.clone(),
            geometry: Some(self.geometry),
            points_written,
            missing_samples: self.missing_samples,
            motion_failures: self.motion_failures,
            elapsed: started.elapsed(),
        }
    }

    fn discard_output(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.discard() {
                warn!(error = %e, "Could not delete partial output");
            }
        }
    }

    fn remove_session_files(&self, inner: &Inner) {
        let Some(session) = &self.session else {
            return;
        };
        let dir = &inner.storage.output_dir;
        let _ = std::fs::remove_file(session.measurement_path(dir));
        let _ = std::fs::remove_dir_all(session.points_dir(dir));
    }

    /// Undo the net displacement of this run.
    fn return_stage(&mut self) {
        let Some(motion) = self.motion.clone() else {
            return;
        };
        if self.net_motion.is_zero() {
            return;
        }
        let back = self.net_motion.inverse();
        info!(dx_um = back.dx_um, dy_um = back.dy_um, "Returning stage to scan center");
        self.queue_move(motion.as_ref(), back);
    }
}

impl Drop for Run {
    /// A run that unwinds before finalizing still removes its output.
    fn drop(&mut self) {
        if self.writer.is_some() {
            warn!("Run ended without finalizing - deleting partial output");
            self.discard_output();
        }
    }
}

fn acquisition_error(e: anyhow::Error) -> ScanError {
    ScanError::Acquisition(format!("{e:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirmation::AutoConfirm;
    use scan_core::{MotionQueue, ScanOptions};
    use scan_driver_mock::{MockSpectrometer, MockStage, SpectrumSource};
    use tracing_test::traced_test;

    fn small_options() -> ScanOptions {
        ScanOptions {
            step_x: 20.0,
            step_y: 20.0,
            width: 40.0,
            height: 40.0,
            pixels: 10,
            sequence_sleep: 0.5,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_missing_samples_become_zero_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spectrometer = MockSpectrometer::builder()
            .source(SpectrumSource::Constant(vec![1.0; 10]))
            .missing_reads([2])
            .build();
        spectrometer.start().await.expect("start");

        let sequencer = ScanSequencer::new(
            Arc::new(SettingsStore::new(small_options())),
            ScanHardware {
                motion: None,
                acquisition: Some(Arc::new(spectrometer)),
                confirmation: Arc::new(AutoConfirm(true)),
            },
            StorageOptions {
                output_dir: dir.path().to_path_buf(),
            },
        );
        let report = sequencer
            .start()
            .expect("started")
            .join()
            .await
            .expect("joined");

        assert!(report.outcome.is_completed());
        assert_eq!(report.points_written, 9);
        assert_eq!(report.missing_samples, 1);
        assert!(logs_contain("No sample available"));

        let ScanOutcome::Completed { path } = report.outcome else {
            unreachable!("checked above");
        };
        let text = std::fs::read_to_string(path).expect("read");
        let second = text.lines().nth(1).expect("second row");
        assert_eq!(second, "1,0,0,0,0,0,0,0,0,0,0,0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_motion_only_run_without_spectrometer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stage = MockStage::new();
        let queue = Arc::new(MotionQueue::spawn(Arc::new(stage.clone())));
        let sequencer = ScanSequencer::new(
            Arc::new(SettingsStore::new(ScanOptions {
                perimeter_preview: false,
                ..small_options()
            })),
            ScanHardware {
                motion: Some(queue.clone()),
                acquisition: None,
                confirmation: Arc::new(AutoConfirm(false)),
            },
            StorageOptions {
                output_dir: dir.path().to_path_buf(),
            },
        );
        let report = sequencer
            .start()
            .expect("started")
            .join()
            .await
            .expect("joined");
        queue.sync().await.expect("synced");

        // Preview off: no confirmation asked, so the rejecting adapter is unused.
        assert!(report.outcome.is_completed());
        assert_eq!(report.missing_samples, 9);
        // Top-left start: corner offset, then the snake ends bottom-right.
        assert_eq!(stage.position(), (20.0, 20.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_extra_exposures_restore_primary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spectrometer = Arc::new(
            MockSpectrometer::builder()
                .source(SpectrumSource::Constant(vec![3.0; 10]))
                .build(),
        );
        spectrometer.start().await.expect("start");
        let sequencer = ScanSequencer::new(
            Arc::new(SettingsStore::new(ScanOptions {
                width: 20.0,
                height: 0.0,
                sequence_exposure_times: "20;50".into(),
                point_files: true,
                ..small_options()
            })),
            ScanHardware {
                motion: None,
                acquisition: Some(spectrometer.clone()),
                confirmation: Arc::new(AutoConfirm(true)),
            },
            StorageOptions {
                output_dir: dir.path().to_path_buf(),
            },
        );
        let report = sequencer
            .start()
            .expect("started")
            .join()
            .await
            .expect("joined");

        assert!(report.outcome.is_completed());
        assert_eq!(report.points_written, 2);
        assert_eq!(spectrometer.exposure_ms(), 20.0);

        let session = report.session.expect("session");
        let point = session.points_dir(dir.path()).join("point_x1_y0.csv");
        let text = std::fs::read_to_string(point).expect("point file");
        assert_eq!(text.lines().next(), Some("lambda,I_20.0ms,I_50.0ms"));
        assert_eq!(text.lines().nth(1), Some("0,3,3"));
    }
}
