//! Operational modes for simulated devices.
//!
//! - **Instant**: Zero delays, deterministic behavior for unit tests
//! - **Realistic**: Hardware-like timing for dry runs of a scan
//! - **Chaos**: Realistic timing plus injected faults

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Operational modes for simulated devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MockMode {
    /// Zero delays, deterministic
    #[default]
    Instant,
    /// Hardware-like timing
    Realistic,
    /// Hardware-like timing with configurable failures
    Chaos,
}

impl MockMode {
    /// Whether the device should sleep to imitate hardware timing.
    pub fn is_timed(self) -> bool {
        !matches!(self, MockMode::Instant)
    }
}

impl FromStr for MockMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "instant" => Ok(MockMode::Instant),
            "realistic" => Ok(MockMode::Realistic),
            "chaos" => Ok(MockMode::Chaos),
            other => anyhow::bail!("unknown simulation mode '{other}'"),
        }
    }
}

impl std::fmt::Display for MockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MockMode::Instant => "instant",
            MockMode::Realistic => "realistic",
            MockMode::Chaos => "chaos",
        };
        f.write_str(s)
    }
}
