//! Simulated devices driven through the core adapter contracts.

use scan_core::{
    AcquisitionAdapter, GridGeometry, MotionAdapter, MotionQueue, MotionVector, SnakeMapper,
    StartingCorner,
};
use scan_driver_mock::{
    ErrorConfig, ErrorScenario, MockMode, MockSpectrometer, MockStage, SpectrumSource,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[tokio::test]
async fn snake_path_through_motion_queue_returns_to_start() {
    let stage = MockStage::new();
    let queue = MotionQueue::spawn(Arc::new(stage.clone()));
    let geometry = GridGeometry::new(40, 20, 20, 20, 1.0);
    let mapper = SnakeMapper::new(StartingCorner::TopLeft, &geometry, 20, 20);

    let mut net = MotionVector::default();
    for index in mapper.traversal() {
        if let Some(step) = mapper.next_move(index) {
            queue.move_by(step.dx_um, step.dy_um).expect("queued");
            net += step;
        }
    }
    let back = net.inverse();
    queue.move_by(back.dx_um, back.dy_um).expect("queued");
    queue.sync().await.expect("synced");

    assert_eq!(stage.position(), (0.0, 0.0));
    // 3x2 grid: five moves plus the return
    assert_eq!(stage.moves().len(), 6);
    queue.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn failing_stage_does_not_stall_the_queue() {
    let stage = MockStage::builder()
        .error_config(ErrorConfig::scenario(ErrorScenario::FailOnCall {
            operation: "move",
            call: 1,
        }))
        .build();
    let queue = MotionQueue::spawn(Arc::new(stage.clone()));
    queue.move_by(10.0, 0.0).expect("queued");
    queue.move_by(0.0, 10.0).expect("queued");
    queue.sync().await.expect("synced");

    assert_eq!(stage.position(), (0.0, 10.0));
    assert_eq!(queue.stats().failed.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn disconnected_stage_reports_through_adapter() {
    let stage = MockStage::builder().disconnected().build();
    let queue = MotionQueue::spawn(Arc::new(stage.clone()));
    assert!(!queue.is_connected());
    stage.set_connected(true);
    assert!(queue.is_connected());
}

#[tokio::test(start_paused = true)]
async fn spectrometer_as_trait_object() {
    let spec = MockSpectrometer::builder()
        .source(SpectrumSource::Synthetic { pixels: 128 })
        .mode(MockMode::Realistic)
        .seed(11)
        .build();
    spec.start().await.expect("start");
    let adapter: Arc<dyn AcquisitionAdapter> = Arc::new(spec);

    adapter.set_exposure_ms(20.0).await.expect("exposure");
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let sample = adapter
        .current_sample()
        .await
        .expect("read")
        .expect("sample");
    assert_eq!(sample.len(), 128);

    adapter.shutdown().await.expect("shutdown");
    assert!(!adapter.is_ready());
}
