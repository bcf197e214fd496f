//! Grid geometry: how many raster points fit along each axis.
//!
//! Extents are given in the sample plane; the stage travels the magnified
//! extent. Every axis has at least one point, so a degenerate configuration
//! still produces a valid 1-point scan.

use crate::config::ScanConfig;
use serde::{Deserialize, Serialize};

/// Number of grid points along one axis.
///
/// `scan_extent = trunc(extent_um * magnification)`, `points = scan_extent / step + 1`.
/// `step_um` of zero is treated as 1. The count saturates at `u32::MAX`.
pub fn compute_points(extent_um: u32, step_um: u32, magnification: f64) -> u32 {
    let step = step_um.max(1);
    let scan_extent = magnified_extent(extent_um, magnification);
    (scan_extent / step).saturating_add(1)
}

/// Extent actually travelled by the stage, truncated to whole micrometres.
pub fn magnified_extent(extent_um: u32, magnification: f64) -> u32 {
    let scaled = f64::from(extent_um) * magnification;
    if !scaled.is_finite() || scaled <= 0.0 {
        return 0;
    }
    // saturating float->int cast
    scaled.trunc() as u32
}

/// Derived raster dimensions, fixed for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridGeometry {
    /// Points along X (columns)
    pub points_x: u32,
    /// Points along Y (rows)
    pub points_y: u32,
    /// `points_x * points_y`
    pub total_points: u64,
    /// Magnified X extent travelled by the perimeter preview, in µm
    pub scan_width_um: u32,
    /// Magnified Y extent travelled by the perimeter preview, in µm
    pub scan_height_um: u32,
}

impl GridGeometry {
    /// Build geometry from raw extents and steps.
    pub fn new(width_um: u32, height_um: u32, step_x_um: u32, step_y_um: u32, magnification: f64) -> Self {
        let points_x = compute_points(width_um, step_x_um, magnification);
        let points_y = compute_points(height_um, step_y_um, magnification);
        Self {
            points_x,
            points_y,
            total_points: u64::from(points_x) * u64::from(points_y),
            scan_width_um: magnified_extent(width_um, magnification),
            scan_height_um: magnified_extent(height_um, magnification),
        }
    }

    /// Geometry for a normalized scan configuration.
    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(
            config.scan_width_um,
            config.scan_height_um,
            config.step_x_um,
            config.step_y_um,
            config.lens_magnification,
        )
    }

    /// Half of the magnified extents in whole micrometres, the offset from
    /// scan center to a corner.
    pub fn half_extents(&self) -> (f64, f64) {
        (
            f64::from(self.scan_width_um / 2),
            f64::from(self.scan_height_um / 2),
        )
    }
}

impl std::fmt::Display for GridGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{} points ({} total) over {}x{} µm",
            self.points_x, self.points_y, self.total_points, self.scan_width_um, self.scan_height_um
        )
    }
}
