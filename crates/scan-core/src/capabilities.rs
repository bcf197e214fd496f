//! Hardware capability traits used by the scan sequencer.
//!
//! The sequencer never talks to devices directly. It sees three narrow
//! contracts:
//!
//! - [`MotionAdapter`]: relative XY moves, enqueued fire-and-forget
//! - [`AcquisitionAdapter`]: the latest spectrum plus exposure control
//! - [`ConfirmationAdapter`]: asks the operator whether the previewed area is right
//!
//! A device-facing [`StageDriver`] sits below the motion adapter; the
//! [`MotionQueue`](crate::motion::MotionQueue) turns any driver into an adapter.
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is thread-safe (requires Send + Sync)
//! - Uses async (`#[async_trait]`) where the device may take time
//! - Uses anyhow::Result for device errors
//! - Focuses on ONE thing

use crate::corner::StartingCorner;
use crate::geometry::GridGeometry;
use crate::sample::Sample;
use anyhow::Result;
use async_trait::async_trait;

// =============================================================================
// Motion
// =============================================================================

/// Device-level XY stage.
///
/// Calls complete when the controller accepted the command; they do not
/// wait for the move to finish.
#[async_trait]
pub trait StageDriver: Send + Sync {
    /// Move by a relative displacement in µm (`+dx` right, `+dy` down).
    async fn move_relative(&self, dx_um: f64, dy_um: f64) -> Result<()>;

    /// Drive both axes to their home switches.
    async fn home(&self) -> Result<()>;

    /// Whether the controller link is up.
    fn is_connected(&self) -> bool;
}

/// Relative stage motion as seen by the sequencer.
///
/// Moves are queued and return immediately; a failure to queue is reported
/// but never waits on the hardware.
#[async_trait]
pub trait MotionAdapter: Send + Sync {
    /// Whether moves will reach a connected stage.
    fn is_connected(&self) -> bool;

    /// Queue a relative move in µm.
    fn move_by(&self, dx_um: f64, dy_um: f64) -> Result<()>;

    /// Queue a homing run.
    fn move_home(&self) -> Result<()>;

    /// Stop accepting moves, let queued ones finish, and release the device.
    async fn shutdown(&self) -> Result<()>;
}

// =============================================================================
// Acquisition
// =============================================================================

/// Source of spectrum samples.
#[async_trait]
pub trait AcquisitionAdapter: Send + Sync {
    /// Whether the sensor is open and producing samples.
    fn is_ready(&self) -> bool;

    /// Most recent raw spectral profile.
    ///
    /// `Ok(None)` means no sample is available right now; `Err` means the
    /// sensor failed.
    async fn current_sample(&self) -> Result<Option<Sample>>;

    /// Change the exposure time, in ms.
    async fn set_exposure_ms(&self, exposure_ms: f64) -> Result<()>;

    /// Stop acquiring and release the sensor.
    async fn shutdown(&self) -> Result<()>;
}

// =============================================================================
// Confirmation
// =============================================================================

/// What the operator is asked to confirm after the perimeter preview.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaSummary {
    /// Corner where scanning starts
    pub corner: StartingCorner,
    /// Grid about to be scanned
    pub geometry: GridGeometry,
    /// X step, µm
    pub step_x_um: u32,
    /// Y step, µm
    pub step_y_um: u32,
}

impl std::fmt::Display for AreaSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} from {} with {}x{} µm steps",
            self.geometry, self.corner, self.step_x_um, self.step_y_um
        )
    }
}

/// Operator confirmation of the previewed scan area.
#[async_trait]
pub trait ConfirmationAdapter: Send + Sync {
    /// `true` to proceed with the scan, `false` to abort it.
    async fn confirm_area(&self, summary: AreaSummary) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_summary_display() {
        let summary = AreaSummary {
            corner: StartingCorner::BottomLeft,
            geometry: GridGeometry::new(40, 40, 20, 20, 1.0),
            step_x_um: 20,
            step_y_um: 20,
        };
        assert_eq!(
            summary.to_string(),
            "3x3 points (9 total) over 40x40 µm from bottom-left with 20x20 µm steps"
        );
    }
}
