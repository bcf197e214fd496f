//! Scan on the simulated rig, then browse and delete the result.

use scan_core::SettingsStore;
use scan_driver_mock::{generate_sequence_like, GenerateOptions};
use scan_experiment::{AutoConfirm, ScanOutcome, ScanSequencer, StorageOptions};
use scan_storage::{delete_all, list_measurements, MeasurementCube, SpectrumLengthPolicy};
use spectroscan::{AppConfig, SimulatedRig};
use std::sync::Arc;
use std::time::Duration;

fn small_config(output_dir: &std::path::Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.output_dir = output_dir.to_path_buf();
    config.scan.width = 40.0;
    config.scan.height = 20.0;
    config.scan.step_x = 20.0;
    config.scan.step_y = 20.0;
    config.scan.pixels = 16;
    config.scan.starting_corner = "bottom-left".to_string();
    config.simulation.seed = Some(1);
    config
}

#[tokio::test(start_paused = true)]
async fn scan_on_simulated_rig_produces_a_loadable_cube() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = small_config(dir.path());
    let rig = SimulatedRig::start(&config).await.expect("rig");

    let sequencer = ScanSequencer::new(
        Arc::new(SettingsStore::new(config.scan.clone())),
        rig.hardware(Arc::new(AutoConfirm(true))),
        StorageOptions {
            output_dir: config.storage.output_dir.clone(),
        },
    );
    let report = sequencer
        .start()
        .expect("started")
        .join()
        .await
        .expect("joined");
    sequencer
        .shutdown(Duration::from_secs(1))
        .await
        .expect("shutdown");

    let ScanOutcome::Completed { path } = &report.outcome else {
        panic!("unexpected outcome {:?}", report.outcome);
    };
    assert_eq!(report.points_written, 6);

    let cube = MeasurementCube::load(path, SpectrumLengthPolicy::ZeroPad).expect("cube");
    assert_eq!(cube.shape(), (2, 3, 16));
    let (min, max) = cube.value_range();
    assert!(max > min);

    let entries = list_measurements(dir.path()).expect("list");
    assert_eq!(entries.len(), 1);
    assert_eq!(&entries[0].path, path);
    assert_eq!(entries[0].session, report.session);
}

#[test]
fn generated_measurements_can_be_listed_and_deleted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = small_config(dir.path());
    config.scan.sequence_exposure_times = "10;30".to_string();

    let generated = generate_sequence_like(
        &config.scan.normalize(),
        &GenerateOptions {
            output_dir: dir.path().to_path_buf(),
            count: 3,
            point_files: true,
        },
    )
    .expect("generated");
    assert_eq!(generated.len(), 3);

    let entries = list_measurements(dir.path()).expect("list");
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|e| e.points_dir.is_some()));

    let cube = MeasurementCube::load(&entries[1].path, SpectrumLengthPolicy::Truncate)
        .expect("cube");
    assert_eq!(cube.shape(), (2, 3, 16));

    assert_eq!(delete_all(dir.path()).expect("deleted"), 3);
    assert_eq!(std::fs::read_dir(dir.path()).expect("dir").count(), 0);
}
