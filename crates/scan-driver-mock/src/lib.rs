//! Simulated hardware for spectroscan.
//!
//! Lets the whole scan pipeline run without a stage or a spectrometer
//! attached. All delays use `tokio::time::sleep`, so tests can run them
//! under a paused clock.
//!
//! # Available Devices
//!
//! - [`MockStage`]: two-axis stepper stage, whole-pulse moves, records its path
//! - [`MockSpectrometer`]: constant, synthetic or frame-reduced spectra with fault injection
//!
//! # Performance Characteristics
//!
//! - MockStage: 10 mm/s travel, 50 ms settling, 5 ms command latency
//! - MockSpectrometer: 33 ms readout (~30 captures per second), ~1% noise
//!
//! [`synthetic::generate_sequence_like`] writes measurement files shaped
//! like a real scan, for exercising the viewer and the catalog offline.

pub mod common;
mod mock_spectrometer;
mod mock_stage;
pub mod synthetic;

// Re-export common types
pub use common::{ErrorConfig, ErrorScenario, MockMode, MockRng, TimingConfig};

// Re-export device types
pub use mock_spectrometer::{MockSpectrometer, MockSpectrometerBuilder, SpectrumSource};
pub use mock_stage::{MockStage, MockStageBuilder, UM_PER_PULSE};
pub use synthetic::{generate_sequence_like, GenerateOptions, GeneratedMeasurement};
