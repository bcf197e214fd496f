//! Timing configuration for realistic mode.

use super::mode::MockMode;
use std::time::Duration;

/// Hardware-like delays, all in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimingConfig {
    /// Sensor readout time per capture (spectrometer)
    pub readout_ms: u64,
    /// Settling time after a move (stage)
    pub settling_time_ms: u64,
    /// Command round-trip to the controller
    pub communication_delay_ms: u64,
}

impl TimingConfig {
    /// Spectrometer at roughly 30 captures per second.
    pub fn spectrometer() -> Self {
        Self {
            readout_ms: 33,
            settling_time_ms: 0,
            communication_delay_ms: 2,
        }
    }

    /// Stepper-driven XY stage.
    pub fn stage() -> Self {
        Self {
            readout_ms: 0,
            settling_time_ms: 50,
            communication_delay_ms: 5,
        }
    }

    /// Command delay for `mode`; zero in instant mode.
    pub fn communication(&self, mode: MockMode) -> Duration {
        Self::gated(mode, self.communication_delay_ms)
    }

    /// Settling delay for `mode`; zero in instant mode.
    pub fn settling(&self, mode: MockMode) -> Duration {
        Self::gated(mode, self.settling_time_ms)
    }

    /// Readout delay for `mode`; zero in instant mode.
    pub fn readout(&self, mode: MockMode) -> Duration {
        Self::gated(mode, self.readout_ms)
    }

    fn gated(mode: MockMode, ms: u64) -> Duration {
        if mode.is_timed() {
            Duration::from_millis(ms)
        } else {
            Duration::ZERO
        }
    }
}
