//! End-to-end sequencer runs against the simulated stage and spectrometer.

use scan_core::{
    AcquisitionAdapter, ConfirmationAdapter, MotionAdapter, MotionQueue, ScanError, ScanOptions,
    SettingsStore,
};
use scan_driver_mock::{
    ErrorConfig, ErrorScenario, MockSpectrometer, MockStage, SpectrumSource,
};
use scan_experiment::{
    confirmation_channel, AutoConfirm, ScanEvent, ScanHardware, ScanOutcome, ScanSequencer,
    SequencePhase, StorageOptions,
};
use scan_storage::{MeasurementCube, SpectrumLengthPolicy};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Rig {
    dir: TempDir,
    stage: MockStage,
    queue: Arc<MotionQueue>,
    spectrometer: Arc<MockSpectrometer>,
    sequencer: ScanSequencer,
}

fn grid_options() -> ScanOptions {
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

async fn rig_with(
    spectrometer: MockSpectrometer,
    confirmation: Arc<dyn ConfirmationAdapter>,
) -> Rig {
    let dir = tempfile::tempdir().expect("tempdir");
    let stage = MockStage::new();
    let queue = Arc::new(MotionQueue::spawn(Arc::new(stage.clone())));
    spectrometer.start().await.expect("spectrometer start");
    let spectrometer = Arc::new(spectrometer);
    let sequencer = ScanSequencer::new(
        Arc::new(SettingsStore::new(grid_options())),
        ScanHardware {
            motion: Some(queue.clone()),
            acquisition: Some(spectrometer.clone()),
            confirmation,
        },
        StorageOptions {
            output_dir: dir.path().to_path_buf(),
        },
    );
    Rig {
        dir,
        stage,
        queue,
        spectrometer,
        sequencer,
    }
}

async fn rig(confirm: bool) -> Rig {
    let spectrometer = MockSpectrometer::builder()
        .source(SpectrumSource::Constant(vec![1.0; 10]))
        .build();
    rig_with(spectrometer, Arc::new(AutoConfirm(confirm))).await
}

fn files_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

async fn wait_for_phase(sequencer: &ScanSequencer, phase: SequencePhase) {
    let mut rx = sequencer.watch_phase();
    rx.wait_for(|p| *p == phase).await.expect("phase reached");
}

#[tokio::test(start_paused = true)]
async fn full_scan_records_every_point_once() {
    let rig = rig(true).await;
    let mut events = rig.sequencer.subscribe();

    let report = rig
        .sequencer
        .start()
        .expect("started")
        .join()
        .await
        .expect("joined");

    let ScanOutcome::Completed { path } = &report.outcome else {
        panic!("unexpected outcome {:?}", report.outcome);
    };
    assert_eq!(report.points_written, 9);
    assert_eq!(report.missing_samples, 0);

    // Rows in write order: three per recorded row, grid_x ascending in each.
    let text = std::fs::read_to_string(path).expect("read");
    let rows: Vec<(u32, u32)> = text
        .lines()
        .map(|line| {
            let mut fields = line.split(',');
            let x = fields.next().expect("x").parse().expect("x value");
            let y = fields.next().expect("y").parse().expect("y value");
            assert_eq!(fields.count(), 10);
            (x, y)
        })
        .collect();
    assert_eq!(rows.len(), 9);
    for chunk in rows.chunks(3) {
        let xs: Vec<u32> = chunk.iter().map(|(x, _)| *x).collect();
        assert_eq!(xs, vec![0, 1, 2]);
    }
    let distinct: HashSet<_> = rows.iter().collect();
    assert_eq!(distinct.len(), 9);

    let cube = MeasurementCube::load(path, SpectrumLengthPolicy::ZeroPad).expect("cube");
    assert_eq!(cube.shape(), (3, 3, 10));
    assert!(cube.data().iter().all(|v| *v == 1.0));
    assert_eq!(cube.value_range(), (1.0, 1.0));

    let mut phases = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ScanEvent::Phase(phase) = event {
            phases.push(phase);
        }
    }
    assert_eq!(
        phases,
        vec![
            SequencePhase::Preparing,
            SequencePhase::PerimeterPreview,
            SequencePhase::AwaitingConfirmation,
            SequencePhase::Scanning,
            SequencePhase::Completed,
            SequencePhase::Idle,
        ]
    );
    assert_eq!(rig.sequencer.phase(), SequencePhase::Idle);
    assert!(!rig.sequencer.settings().is_locked());

    // Corner offset, closed perimeter, then the snake ends bottom-right.
    rig.queue.sync().await.expect("synced");
    assert_eq!(rig.stage.position(), (20.0, 20.0));
}

#[tokio::test(start_paused = true)]
async fn cancel_after_four_points_leaves_nothing_behind() {
    let rig = rig(true).await;
    let mut events = rig.sequencer.subscribe();
    let handle = rig.sequencer.start().expect("started");

    loop {
        match events.recv().await.expect("event") {
            ScanEvent::PointRecorded { progress, .. } if progress.point_index == 4 => {
                assert!(rig.sequencer.request_stop());
                break;
            }
            _ => {}
        }
    }
    let report = handle.join().await.expect("joined");

    assert!(matches!(report.outcome, ScanOutcome::Cancelled { .. }));
    assert_eq!(report.points_written, 4);
    assert_eq!(files_in(rig.dir.path()), 0);
    assert_eq!(rig.sequencer.phase(), SequencePhase::Idle);
    assert!(!rig.sequencer.settings().is_locked());

    rig.queue.sync().await.expect("synced");
    assert_eq!(rig.stage.position(), (0.0, 0.0));

    // The sequencer is ready for another run.
    let report = rig
        .sequencer
        .start()
        .expect("restarted")
        .join()
        .await
        .expect("joined");
    assert!(report.outcome.is_completed());
    assert_eq!(files_in(rig.dir.path()), 1);
}

#[tokio::test(start_paused = true)]
async fn rejected_area_cancels_and_returns_stage() {
    let rig = rig(false).await;
    let report = rig
        .sequencer
        .start()
        .expect("started")
        .join()
        .await
        .expect("joined");

    assert_eq!(
        report.outcome,
        ScanOutcome::Cancelled {
            reason: "area not confirmed".into()
        }
    );
    assert_eq!(report.points_written, 0);
    assert_eq!(files_in(rig.dir.path()), 0);

    rig.queue.sync().await.expect("synced");
    assert_eq!(rig.stage.position(), (0.0, 0.0));
}

#[tokio::test(start_paused = true)]
async fn stop_resolves_pending_confirmation() {
    let (requester, mut requests) = confirmation_channel(1);
    let spectrometer = MockSpectrometer::builder()
        .source(SpectrumSource::Constant(vec![1.0; 10]))
        .build();
    let rig = rig_with(spectrometer, Arc::new(requester)).await;
    let handle = rig.sequencer.start().expect("started");

    let pending = requests.recv().await.expect("confirmation request");
    assert_eq!(pending.summary.geometry.total_points, 9);
    assert_eq!(rig.sequencer.phase(), SequencePhase::AwaitingConfirmation);
    rig.sequencer.request_stop();

    let report = handle.join().await.expect("joined");
    match report.outcome {
        ScanOutcome::Cancelled { reason } => assert!(reason.contains("confirmation")),
        other => panic!("unexpected outcome {other:?}"),
    }
    drop(pending);
    assert_eq!(files_in(rig.dir.path()), 0);
}

#[tokio::test(start_paused = true)]
async fn acquisition_error_fails_the_run() {
    let spectrometer = MockSpectrometer::builder()
        .source(SpectrumSource::Constant(vec![1.0; 10]))
        .error_config(ErrorConfig::scenario(ErrorScenario::FailOnCall {
            operation: "read",
            call: 3,
        }))
        .build();
    let rig = rig_with(spectrometer, Arc::new(AutoConfirm(true))).await;
    let report = rig
        .sequencer
        .start()
        .expect("started")
        .join()
        .await
        .expect("joined");

    match &report.outcome {
        ScanOutcome::Failed { error } => assert!(error.contains("Injected failure")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(report.points_written, 2);
    assert_eq!(files_in(rig.dir.path()), 0);
    assert_eq!(rig.sequencer.phase(), SequencePhase::Idle);

    rig.queue.sync().await.expect("synced");
    assert_eq!(rig.stage.position(), (0.0, 0.0));
}

#[tokio::test(start_paused = true)]
async fn second_start_and_settings_edits_rejected_while_running() {
    let rig = rig(true).await;
    let handle = rig.sequencer.start().expect("started");

    let err = rig.sequencer.start().err().expect("second start rejected");
    assert!(matches!(err, ScanError::AlreadyRunning { .. }));

    wait_for_phase(&rig.sequencer, SequencePhase::Scanning).await;
    let edit = rig.sequencer.settings().update(|o| o.step_x = 5.0);
    assert!(matches!(edit, Err(ScanError::SettingsLocked)));

    rig.sequencer.request_stop();
    let report = handle.join().await.expect("joined");
    assert!(matches!(report.outcome, ScanOutcome::Cancelled { .. }));
    rig.sequencer
        .settings()
        .update(|o| o.step_x = 5.0)
        .expect("editable again");
}

#[tokio::test]
async fn start_without_hardware_is_refused() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sequencer = ScanSequencer::new(
        Arc::new(SettingsStore::new(grid_options())),
        ScanHardware {
            motion: None,
            acquisition: None,
            confirmation: Arc::new(AutoConfirm(true)),
        },
        StorageOptions {
            output_dir: dir.path().to_path_buf(),
        },
    );
    assert!(matches!(
        sequencer.start().err(),
        Some(ScanError::HardwareUnavailable)
    ));

    // Present but unusable adapters count as missing too.
    let stage = MockStage::builder().disconnected().build();
    let sequencer = ScanSequencer::new(
        Arc::new(SettingsStore::new(grid_options())),
        ScanHardware {
            motion: Some(Arc::new(MotionQueue::spawn(Arc::new(stage)))),
            acquisition: Some(Arc::new(MockSpectrometer::builder().build())),
            confirmation: Arc::new(AutoConfirm(true)),
        },
        StorageOptions {
            output_dir: dir.path().to_path_buf(),
        },
    );
    assert!(matches!(
        sequencer.start().err(),
        Some(ScanError::HardwareUnavailable)
    ));
    assert_eq!(sequencer.phase(), SequencePhase::Idle);
    assert_eq!(files_in(dir.path()), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_run_and_releases_adapters() {
    let rig = rig(true).await;
    let handle = rig.sequencer.start().expect("started");
    wait_for_phase(&rig.sequencer, SequencePhase::Scanning).await;

    rig.sequencer
        .shutdown(Duration::from_secs(5))
        .await
        .expect("shutdown");

    assert_eq!(rig.sequencer.phase(), SequencePhase::Idle);
    assert!(!rig.queue.is_connected());
    assert!(!rig.spectrometer.is_ready());
    let report = handle.join().await.expect("joined");
    assert!(matches!(report.outcome, ScanOutcome::Cancelled { .. }));
    assert_eq!(files_in(rig.dir.path()), 0);
}

#[tokio::test(start_paused = true)]
async fn unwritable_output_fails_and_returns_to_idle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, b"occupied").expect("write");

    let spectrometer = MockSpectrometer::builder()
        .source(SpectrumSource::Constant(vec![1.0; 10]))
        .build();
    spectrometer.start().await.expect("spectrometer start");
    let sequencer = ScanSequencer::new(
        Arc::new(SettingsStore::new(grid_options())),
        ScanHardware {
            motion: None,
            acquisition: Some(Arc::new(spectrometer)),
            confirmation: Arc::new(AutoConfirm(true)),
        },
        StorageOptions {
            output_dir: blocker.clone(),
        },
    );

    let report = sequencer
        .start()
        .expect("started")
        .join()
        .await
        .expect("joined");
    assert!(matches!(report.outcome, ScanOutcome::Failed { .. }));
    assert_eq!(report.points_written, 0);
    assert_eq!(sequencer.phase(), SequencePhase::Idle);
    assert!(!sequencer.settings().is_locked());
    assert_eq!(std::fs::read(&blocker).expect("still a file"), b"occupied");

    let again = sequencer.start().expect("restart accepted");
    let report = again.join().await.expect("joined");
    assert!(matches!(report.outcome, ScanOutcome::Failed { .. }));
}

#[tokio::test(start_paused = true)]
async fn oversized_dwell_is_capped_and_run_completes() {
    let rig = rig(true).await;
    rig.sequencer
        .settings()
        .update(|o| o.sequence_sleep = 1e20)
        .expect("editable");

    let report = rig
        .sequencer
        .start()
        .expect("started")
        .join()
        .await
        .expect("joined");
    assert!(report.outcome.is_completed());
    assert_eq!(report.points_written, 9);
    assert_eq!(rig.sequencer.phase(), SequencePhase::Idle);
}

/// Sensor whose driver panics on every read.
struct PanickingSensor;

#[async_trait::async_trait]
impl AcquisitionAdapter for PanickingSensor {
    fn is_ready(&self) -> bool {
        true
    }

    async fn current_sample(&self) -> anyhow::Result<Option<scan_core::Sample>> {
        panic!("sensor driver crashed");
    }

    async fn set_exposure_ms(&self, _exposure_ms: f64) -> anyhow::Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn adapter_panic_fails_run_and_cleans_up() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sequencer = ScanSequencer::new(
        Arc::new(SettingsStore::new(grid_options())),
        ScanHardware {
            motion: None,
            acquisition: Some(Arc::new(PanickingSensor)),
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
    match &report.outcome {
        ScanOutcome::Failed { error } => assert!(error.contains("panicked")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(files_in(dir.path()), 0);
    assert_eq!(sequencer.phase(), SequencePhase::Idle);
    assert!(!sequencer.settings().is_locked());
    assert!(sequencer.start().is_ok());
}
