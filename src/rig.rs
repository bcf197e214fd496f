//! Simulated stage and spectrometer wired up from [`AppConfig`].

use crate::config::AppConfig;
use anyhow::{Context, Result};
use scan_core::{ConfirmationAdapter, MotionQueue};
use scan_driver_mock::{ErrorConfig, MockSpectrometer, MockStage, SpectrumSource};
use scan_experiment::ScanHardware;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// A running simulated rig.
pub struct SimulatedRig {
    /// Stage behind the motion queue, kept for position readout
    pub stage: MockStage,
    /// Motion adapter handed to the sequencer
    pub motion: Arc<MotionQueue>,
    /// Acquisition adapter handed to the sequencer
    pub spectrometer: Arc<MockSpectrometer>,
}

impl SimulatedRig {
    /// Build and start both devices. Must be called inside a tokio runtime.
    pub async fn start(config: &AppConfig) -> Result<Self> {
        let sim = &config.simulation;

        let stage = MockStage::builder()
            .mode(sim.mode)
            .velocity_um_per_s(sim.stage_velocity_um_per_s)
            .build();
        let motion = Arc::new(MotionQueue::spawn(Arc::new(stage.clone())));

        let pixels = config.scan.pixels.max(1);
        let source = match sim.source.as_str() {
            "frame" => SpectrumSource::Frame {
                width: u32::try_from(pixels).context("pixels does not fit a sensor width")?,
                height: sim.frame_height,
            },
            _ => SpectrumSource::Synthetic { pixels },
        };

        let mut rates = HashMap::new();
        if sim.read_failure_rate > 0.0 {
            rates.insert("read", sim.read_failure_rate);
        }
        let mut builder = MockSpectrometer::builder()
            .source(source)
            .mode(sim.mode)
            .error_config(ErrorConfig::with_rates(rates))
            .noise(sim.noise)
            .exposure_ms(config.scan.exposure_time)
            .missing_rate(sim.missing_sample_rate);
        if let Some(seed) = sim.seed {
            builder = builder.seed(seed);
        }
        let spectrometer = builder.build();
        spectrometer
            .start()
            .await
            .context("starting simulated spectrometer")?;

        info!(
            mode = %sim.mode,
            source = %sim.source,
            pixels,
            "Simulated rig ready"
        );
        Ok(Self {
            stage,
            motion,
            spectrometer: Arc::new(spectrometer),
        })
    }

    /// Adapters for a [`scan_experiment::ScanSequencer`].
    pub fn hardware(&self, confirmation: Arc<dyn ConfirmationAdapter>) -> ScanHardware {
        ScanHardware {
            motion: Some(self.motion.clone()),
            acquisition: Some(self.spectrometer.clone()),
            confirmation,
        }
    }
}
