//! Scan settings: the editable option set and the per-run snapshot.
//!
//! [`ScanOptions`] mirrors the persisted option keys and accepts whatever the
//! user typed. [`ScanOptions::normalize`] clamps it into a [`ScanConfig`],
//! logging a warning for every corrected value, so a run never starts from
//! an invalid configuration.
//!
//! [`SettingsStore`] owns the live options. A running scan takes a
//! [`SettingsLease`]; while it is held every edit is rejected with
//! [`ScanError::SettingsLocked`].

use crate::corner::StartingCorner;
use crate::error::{ScanError, ScanResult};
use crate::geometry::GridGeometry;
use crate::spectrum::{SpectralAxis, SpectralAxisConfig, DEFAULT_PIXELS};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Shortest exposure the sensor accepts, in ms.
pub const MIN_EXPOSURE_MS: f64 = 0.1;
/// Longest exposure the sensor accepts, in ms.
pub const MAX_EXPOSURE_MS: f64 = 1000.0;
/// Extra wait added to every exposure before its frame is trusted, in s.
pub const EXPOSURE_MARGIN_S: f64 = 0.1;
/// Multiplier applied to `await` for perimeter settle delays.
pub const PERIMETER_SETTLE_FACTOR: f64 = 20.0;
/// Ceiling for any configured delay, s.
pub const MAX_DELAY_S: f64 = 3600.0;

/// Scan-related options as configured by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Grid step along X, µm
    pub step_x: f64,
    /// Grid step along Y, µm
    pub step_y: f64,
    /// Sample-plane width, µm
    pub width: f64,
    /// Sample-plane height, µm
    pub height: f64,
    /// Objective magnification applied to width/height
    pub lens_magnification: f64,
    /// `top-left`, `top-right`, `bottom-left` or `bottom-right`
    pub starting_corner: String,
    /// Primary exposure, ms
    pub exposure_time: f64,
    /// Extra per-point exposures, ms, separated by `,` or `;`
    pub sequence_exposure_times: String,
    /// Minimum dwell per point, s
    pub sequence_sleep: f64,
    /// Base settle delay, s; perimeter moves wait twenty times this
    #[serde(rename = "await")]
    pub await_s: f64,
    /// Extra settle after each scan move, s
    pub motion_settle: f64,
    /// Drive the scan perimeter and ask for confirmation before scanning
    pub perimeter_preview: bool,
    /// Also write one auxiliary file per point
    pub point_files: bool,
    /// Sensor axis length
    pub pixels: usize,
    /// Lower ROI bound
    pub spectrum_range_min: Option<f64>,
    /// Upper ROI bound
    pub spectrum_range_max: Option<f64>,
    /// Calibrated wavelength of the first pixel
    pub lambda_min: Option<f64>,
    /// Calibrated wavelength of the last pixel
    pub lambda_max: Option<f64>,
    /// Use `lambda_min..lambda_max` as the spectral axis
    pub lambda_calibration_enabled: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            step_x: 20.0,
            step_y: 20.0,
            width: 200.0,
            height: 200.0,
            lens_magnification: 1.0,
            starting_corner: StartingCorner::TopLeft.as_str().to_string(),
            exposure_time: 10.0,
            sequence_exposure_times: String::new(),
            sequence_sleep: 0.5,
            await_s: 0.01,
            motion_settle: 0.0,
            perimeter_preview: true,
            point_files: false,
            pixels: DEFAULT_PIXELS,
            spectrum_range_min: None,
            spectrum_range_max: None,
            lambda_min: None,
            lambda_max: None,
            lambda_calibration_enabled: false,
        }
    }
}

impl ScanOptions {
    /// Clamp every value into its valid range and build a run snapshot.
    pub fn normalize(&self) -> ScanConfig {
        let exposure_ms = clamp_exposure(self.exposure_time, "exposure_time");
        let sequence_exposures_ms = parse_exposure_list(&self.sequence_exposure_times)
            .unwrap_or_else(|| vec![exposure_ms]);

        let lens_magnification = if self.lens_magnification.is_finite() && self.lens_magnification > 0.0 {
            self.lens_magnification
        } else {
            warn!(value = self.lens_magnification, "lens_magnification must be positive, using 1.0");
            1.0
        };

        let calibration = match (self.lambda_calibration_enabled, self.lambda_min, self.lambda_max) {
            (true, Some(lo), Some(hi)) => Some((lo, hi)),
            (true, _, _) => {
                warn!("Wavelength calibration enabled without lambda_min/lambda_max, using pixel axis");
                None
            }
            _ => None,
        };

        let pixels = if self.pixels == 0 {
            warn!("pixels must be at least 1, using {}", DEFAULT_PIXELS);
            DEFAULT_PIXELS
        } else {
            self.pixels
        };

        ScanConfig {
            step_x_um: at_least_one(self.step_x, "step_x"),
            step_y_um: at_least_one(self.step_y, "step_y"),
            scan_width_um: at_least_one(self.width, "width"),
            scan_height_um: at_least_one(self.height, "height"),
            lens_magnification,
            starting_corner: StartingCorner::parse_or_default(&self.starting_corner),
            exposure_ms,
            sequence_exposures_ms,
            sequence_sleep_s: delay_seconds(self.sequence_sleep, "sequence_sleep"),
            await_s: delay_seconds(self.await_s, "await"),
            motion_settle_s: delay_seconds(self.motion_settle, "motion_settle"),
            perimeter_preview: self.perimeter_preview,
            point_files: self.point_files,
            spectral: SpectralAxisConfig {
                pixels,
                calibration,
                roi_min: self.spectrum_range_min,
                roi_max: self.spectrum_range_max,
            },
        }
    }
}

fn at_least_one(value: f64, field: &str) -> u32 {
    if value.is_finite() && value >= 1.0 {
        // saturating float->int cast
        value.trunc() as u32
    } else {
        warn!(field, value, "Value must be at least 1, clamped to 1");
        1
    }
}

fn delay_seconds(value: f64, field: &str) -> f64 {
    if !value.is_finite() || value < 0.0 {
        warn!(field, value, "Value must be non-negative, clamped to 0");
        0.0
    } else if value > MAX_DELAY_S {
        warn!(field, value, "Delay too long, clamped to {MAX_DELAY_S} s");
        MAX_DELAY_S
    } else {
        value
    }
}

/// Seconds to a `Duration`; out-of-range values saturate to `[0, MAX_DELAY_S]`.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.min(MAX_DELAY_S)).unwrap_or(Duration::ZERO)
}

/// Clamp an exposure to `[MIN_EXPOSURE_MS, MAX_EXPOSURE_MS]`.
pub fn clamp_exposure(value_ms: f64, field: &str) -> f64 {
    if !value_ms.is_finite() || value_ms < MIN_EXPOSURE_MS {
        warn!(field, value_ms, "Exposure below sensor minimum, clamped to {MIN_EXPOSURE_MS:.1} ms");
        MIN_EXPOSURE_MS
    } else if value_ms > MAX_EXPOSURE_MS {
        warn!(field, value_ms, "Exposure exceeds sensor limit, clamped to {MAX_EXPOSURE_MS:.1} ms");
        MAX_EXPOSURE_MS
    } else {
        value_ms
    }
}

/// Parse a `,`/`;` separated exposure list. Invalid entries are skipped;
/// `None` when nothing valid remains.
pub fn parse_exposure_list(text: &str) -> Option<Vec<f64>> {
    let values: Vec<f64> = text
        .split([',', ';'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| match part.parse::<f64>() {
            Ok(v) if v.is_finite() => Some(clamp_exposure(v, "sequence_exposure_times")),
            _ => {
                warn!(entry = part, "Invalid sequence exposure value ignored");
                None
            }
        })
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

/// Immutable, validated settings for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Grid step along X, µm
    pub step_x_um: u32,
    /// Grid step along Y, µm
    pub step_y_um: u32,
    /// Sample-plane width before magnification, µm
    pub scan_width_um: u32,
    /// Sample-plane height before magnification, µm
    pub scan_height_um: u32,
    /// Objective magnification
    pub lens_magnification: f64,
    /// Where the traversal starts
    pub starting_corner: StartingCorner,
    /// Primary exposure, ms
    pub exposure_ms: f64,
    /// Exposures taken at every point; the first one feeds the main file
    pub sequence_exposures_ms: Vec<f64>,
    /// Dwell floor per point, s
    pub sequence_sleep_s: f64,
    /// Base settle delay, s
    pub await_s: f64,
    /// Settle after each scan move, s
    pub motion_settle_s: f64,
    /// Whether to run the perimeter preview
    pub perimeter_preview: bool,
    /// Whether to write auxiliary per-point files
    pub point_files: bool,
    /// Spectral axis and ROI
    pub spectral: SpectralAxisConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanOptions::default().normalize()
    }
}

impl ScanConfig {
    /// Grid dimensions for this configuration.
    pub fn geometry(&self) -> GridGeometry {
        GridGeometry::from_config(self)
    }

    /// Resolved spectral axis.
    pub fn spectral_axis(&self) -> SpectralAxis {
        SpectralAxis::from_config(&self.spectral)
    }

    /// Exposure that feeds the main point stream.
    pub fn primary_exposure_ms(&self) -> f64 {
        self.sequence_exposures_ms
            .first()
            .copied()
            .unwrap_or(self.exposure_ms)
    }

    /// Time to wait at a point: `max(sequence_sleep, exposure + 0.1 s)`.
    pub fn dwell(&self) -> Duration {
        let exposure_s = self.primary_exposure_ms() / 1000.0;
        seconds(self.sequence_sleep_s.max(exposure_s + EXPOSURE_MARGIN_S))
    }

    /// Time for an exposure change to take effect before reading a sample.
    pub fn exposure_wait(exposure_ms: f64) -> Duration {
        seconds(exposure_ms.max(0.0) / 1000.0 + EXPOSURE_MARGIN_S)
    }

    /// Settle after each perimeter move.
    pub fn perimeter_settle(&self) -> Duration {
        seconds(self.await_s * PERIMETER_SETTLE_FACTOR)
    }

    /// Settle after each scan move.
    pub fn motion_settle(&self) -> Duration {
        seconds(self.motion_settle_s)
    }
}

/// Shared, lockable store of the live scan options.
#[derive(Debug, Default)]
pub struct SettingsStore {
    options: RwLock<ScanOptions>,
    locked: Arc<AtomicBool>,
}

impl SettingsStore {
    /// Store seeded with the given options.
    pub fn new(options: ScanOptions) -> Self {
        Self {
            options: RwLock::new(options),
            locked: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current options.
    pub fn options(&self) -> ScanOptions {
        self.options.read().clone()
    }

    /// Normalized snapshot of the current options.
    pub fn snapshot(&self) -> ScanConfig {
        self.options.read().normalize()
    }

    /// Edit the options. Rejected while a scan holds the lease.
    pub fn update<F>(&self, edit: F) -> ScanResult<()>
    where
        F: FnOnce(&mut ScanOptions),
    {
        let mut guard = self.options.write();
        if self.locked.load(Ordering::Acquire) {
            warn!("Settings edit rejected while a scan is running");
            return Err(ScanError::SettingsLocked);
        }
        edit(&mut guard);
        Ok(())
    }

    /// Whether a scan currently holds the lease.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Snapshot the options and lock them for the duration of a run.
    pub fn lease(&self) -> ScanResult<(ScanConfig, SettingsLease)> {
        // Hold the write lock so no edit lands between snapshot and lock.
        let guard = self.options.write();
        if self
            .locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ScanError::SettingsLocked);
        }
        let config = guard.normalize();
        Ok((
            config,
            SettingsLease {
                locked: Arc::clone(&self.locked),
            },
        ))
    }
}

/// Lock on the settings store; released on drop.
#[derive(Debug)]
pub struct SettingsLease {
    locked: Arc<AtomicBool>,
}

impl Drop for SettingsLease {
    fn drop(&mut self) {
        self.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults_normalize_to_reference_grid() {
        let config = ScanConfig::default();
        assert_eq!(config.step_x_um, 20);
        assert_eq!(config.starting_corner, StartingCorner::TopLeft);
        assert_eq!(config.sequence_exposures_ms, vec![10.0]);
        assert_eq!(config.geometry().points_x, 11);
        assert_eq!(config.spectral_axis().axis_len(), DEFAULT_PIXELS);
    }

    #[test]
    fn test_normalize_clamps_invalid_values() {
        let options = ScanOptions {
            step_x: 0.0,
            step_y: -5.0,
            width: f64::NAN,
            lens_magnification: 0.0,
            starting_corner: "center".into(),
            exposure_time: 5000.0,
            sequence_sleep: -1.0,
            pixels: 0,
            ..Default::default()
        };
        let config = options.normalize();
        assert_eq!(config.step_x_um, 1);
        assert_eq!(config.step_y_um, 1);
        assert_eq!(config.scan_width_um, 1);
        assert_eq!(config.lens_magnification, 1.0);
        assert_eq!(config.starting_corner, StartingCorner::TopLeft);
        assert_eq!(config.exposure_ms, MAX_EXPOSURE_MS);
        assert_eq!(config.sequence_sleep_s, 0.0);
        assert_eq!(config.spectral.pixels, DEFAULT_PIXELS);
    }

    #[test]
    fn test_parse_exposure_list() {
        assert_eq!(
            parse_exposure_list("10; 20,abc, 0.01 ,2000"),
            Some(vec![10.0, 20.0, MIN_EXPOSURE_MS, MAX_EXPOSURE_MS])
        );
        assert_eq!(parse_exposure_list(""), None);
        assert_eq!(parse_exposure_list(" ; x ,"), None);
    }

    #[test]
    fn test_dwell_uses_larger_of_sleep_and_exposure() {
        let mut config = ScanConfig::default();
        config.sequence_sleep_s = 0.1;
        config.sequence_exposures_ms = vec![500.0];
        assert_relative_eq!(config.dwell().as_secs_f64(), 0.6, epsilon = 1e-9);

        config.sequence_sleep_s = 2.0;
        assert_relative_eq!(config.dwell().as_secs_f64(), 2.0, epsilon = 1e-9);
        assert_relative_eq!(config.perimeter_settle().as_secs_f64(), 0.2, epsilon = 1e-9);
    }

    #[test]
    fn test_huge_delays_are_capped() {
        let config = ScanOptions {
            sequence_sleep: 1e20,
            await_s: f64::MAX,
            motion_settle: 1e300,
            ..Default::default()
        }
        .normalize();
        assert_eq!(config.sequence_sleep_s, MAX_DELAY_S);
        assert_eq!(config.dwell(), Duration::from_secs(3600));
        assert_eq!(config.perimeter_settle(), Duration::from_secs(3600));
        assert_eq!(config.motion_settle(), Duration::from_secs(3600));

        // Snapshots built by hand saturate too.
        let mut raw = ScanConfig::default();
        raw.sequence_sleep_s = 1e20;
        raw.motion_settle_s = f64::NAN;
        assert_eq!(raw.dwell(), Duration::from_secs(3600));
        assert_eq!(raw.motion_settle(), Duration::from_secs(3600));
    }

    #[test]
    fn test_calibration_requires_both_bounds() {
        let options = ScanOptions {
            lambda_calibration_enabled: true,
            lambda_min: Some(400.0),
            ..Default::default()
        };
        assert_eq!(options.normalize().spectral.calibration, None);

        let options = ScanOptions {
            lambda_calibration_enabled: true,
            lambda_min: Some(400.0),
            lambda_max: Some(700.0),
            ..Default::default()
        };
        assert_eq!(options.normalize().spectral.calibration, Some((400.0, 700.0)));
    }

    #[test]
    fn test_options_from_toml() {
        let options: ScanOptions = toml::from_str(
            r#"
            step_x = 10
            width = 50
            starting_corner = "bottom-right"
            await = 0.02
            sequence_exposure_times = "5;15"
            "#,
        )
        .expect("valid toml");
        let config = options.normalize();
        assert_eq!(config.step_x_um, 10);
        assert_eq!(config.scan_width_um, 50);
        assert_eq!(config.starting_corner, StartingCorner::BottomRight);
        assert_eq!(config.sequence_exposures_ms, vec![5.0, 15.0]);
        assert_relative_eq!(config.await_s, 0.02);
    }

    #[test]
    fn test_lease_blocks_edits_until_dropped() {
        let store = SettingsStore::new(ScanOptions::default());
        let (config, lease) = store.lease().expect("first lease");
        assert_eq!(config.step_x_um, 20);
        assert!(store.is_locked());
        assert!(matches!(
            store.update(|o| o.step_x = 5.0),
            Err(ScanError::SettingsLocked)
        ));
        assert!(matches!(store.lease(), Err(ScanError::SettingsLocked)));

        drop(lease);
        store.update(|o| o.step_x = 5.0).expect("unlocked");
        assert_eq!(store.snapshot().step_x_um, 5);
    }
}
