//! # spectroscan
//!
//! Application layer for the scanning spectrometer: configuration loading,
//! logging setup and the simulated rig the CLI scans with. The scan engine
//! itself lives in the workspace crates:
//!
//! - **`scan-core`**: grid geometry, snake corner mapping, settings, and the
//!   motion/acquisition/confirmation capability traits.
//! - **`scan-storage`**: point-stream writer, measurement catalog and the
//!   measurement cube loader.
//! - **`scan-experiment`**: the sequencer state machine.
//! - **`scan-driver-mock`**: simulated stage and spectrometer.

pub mod config;
pub mod logging;
pub mod rig;

pub use config::AppConfig;
pub use rig::SimulatedRig;
