//! Spectral axis, resampling and region-of-interest selection.
//!
//! Raw sensor profiles are linearly resampled to the base pixel count, then
//! cut down to the ROI. The ROI is applied on the base axis, which is either
//! calibrated wavelengths (`lambda_min..=lambda_max`) or pixel positions
//! (`0..=pixels`).

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Default number of samples on the base spectral axis.
pub const DEFAULT_PIXELS: usize = 2048;

/// Spectral axis settings taken from the scan options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralAxisConfig {
    /// Base axis length
    pub pixels: usize,
    /// `(lambda_min, lambda_max)` when wavelength calibration is enabled
    pub calibration: Option<(f64, f64)>,
    /// Lower ROI bound in axis units
    pub roi_min: Option<f64>,
    /// Upper ROI bound in axis units
    pub roi_max: Option<f64>,
}

impl Default for SpectralAxisConfig {
    fn default() -> Self {
        Self {
            pixels: DEFAULT_PIXELS,
            calibration: None,
            roi_min: None,
            roi_max: None,
        }
    }
}

/// Resolved spectral axis for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralAxis {
    base_len: usize,
    values: Vec<f64>,
    roi: Range<usize>,
}

impl SpectralAxis {
    /// Resolve the base axis and ROI.
    ///
    /// An inverted ROI falls back to the full axis, and so does an ROI that
    /// selects no samples.
    pub fn from_config(config: &SpectralAxisConfig) -> Self {
        let base_len = config.pixels.max(1);
        let (base_min, base_max) = match config.calibration {
            Some((lo, hi)) => (lo, hi),
            None => (0.0, base_len as f64),
        };
        let values = linspace(base_min, base_max, base_len);

        let mut roi_min = config.roi_min.unwrap_or(base_min);
        let mut roi_max = config.roi_max.unwrap_or(base_max);
        if roi_min >= roi_max {
            tracing::warn!(roi_min, roi_max, "Spectrum range is empty or inverted, using full axis");
            roi_min = base_min;
            roi_max = base_max;
        }

        let mut selected = values
            .iter()
            .enumerate()
            .filter(|(_, v)| **v >= roi_min && **v <= roi_max)
            .map(|(i, _)| i);
        let roi = match selected.next() {
            Some(first) => {
                let last = selected.last().unwrap_or(first);
                first..last + 1
            }
            None => 0..base_len,
        };

        Self {
            base_len,
            values,
            roi,
        }
    }

    /// Length every raw profile is resampled to.
    pub fn base_len(&self) -> usize {
        self.base_len
    }

    /// Number of samples in a stored spectrum.
    pub fn axis_len(&self) -> usize {
        self.roi.len()
    }

    /// Base-axis indices kept by the ROI.
    pub fn roi(&self) -> Range<usize> {
        self.roi.clone()
    }

    /// Axis values (wavelengths or pixel positions) of a stored spectrum.
    pub fn values(&self) -> &[f64] {
        &self.values[self.roi.clone()]
    }

    /// Resample a raw profile to the base axis and cut it to the ROI.
    pub fn normalize(&self, raw: &[f64]) -> Vec<f64> {
        let base = resample_linear(raw, self.base_len);
        base[self.roi.clone()].to_vec()
    }
}

/// `n` evenly spaced values from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let span = end - start;
            let last = (n - 1) as f64;
            (0..n).map(|i| start + span * (i as f64 / last)).collect()
        }
    }
}

/// Linear interpolation of `data` onto `target_len` evenly spaced points
/// spanning the same range.
pub fn resample_linear(data: &[f64], target_len: usize) -> Vec<f64> {
    if data.len() == target_len {
        return data.to_vec();
    }
    match data.len() {
        0 => vec![0.0; target_len],
        1 => vec![data[0]; target_len],
        len => {
            if target_len == 1 {
                return vec![data[0]];
            }
            let scale = (len - 1) as f64 / (target_len - 1) as f64;
            (0..target_len)
                .map(|i| {
                    let pos = i as f64 * scale;
                    let lo = (pos.floor() as usize).min(len - 2);
                    let frac = pos - lo as f64;
                    data[lo] + (data[lo + 1] - data[lo]) * frac
                })
                .collect()
        }
    }
}
