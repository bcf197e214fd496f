//! Synthetic spectra and offline generation of scan-like measurement files.
//!
//! [`generate_sequence_like`] walks the same snake traversal as a live scan
//! and writes through the same [`PointStreamWriter`], so its output can be
//! loaded by the cube viewer exactly like a real measurement.

use anyhow::{Context, Result};
use scan_core::{ScanConfig, SnakeMapper};
use scan_storage::{PointFileLayout, PointStreamWriter, SessionId};
use std::path::{Path, PathBuf};
use tracing::info;

/// Gaussian width of the synthetic emission band, as a fraction of the axis.
const BAND_WIDTH: f64 = 0.08;
/// Peak height of the band at unit scale.
const BAND_HEIGHT: f64 = 1000.0;
/// Height added by the per-point marker peak.
const MARKER_HEIGHT: f64 = 500.0;

/// Smooth band at `center_norm` (0..1 along the axis), scaled by `scale`,
/// plus a narrow marker whose position encodes `point_index`.
pub fn synthetic_profile(
    axis_len: usize,
    center_norm: f64,
    scale: f64,
    point_index: u64,
    total_points: u64,
) -> Vec<f64> {
    let denom = axis_len.saturating_sub(1).max(1) as f64;
    let mut spectrum: Vec<f64> = (0..axis_len)
        .map(|i| {
            let wl = i as f64 / denom;
            let d = wl - center_norm;
            (-(d * d) / (2.0 * BAND_WIDTH * BAND_WIDTH)).exp() * BAND_HEIGHT * scale
        })
        .collect();

    if total_points == 0 || axis_len == 0 {
        return spectrum;
    }
    let span = total_points.saturating_sub(1).max(1) as f64;
    let peak = ((point_index as f64 / span) * (axis_len - 1) as f64) as usize;
    let half_width = (axis_len / 200).max(3);
    let lo = peak.saturating_sub(half_width);
    let hi = (peak + half_width).min(axis_len);
    for value in &mut spectrum[lo..hi] {
        *value += MARKER_HEIGHT;
    }
    spectrum
}

/// Options for [`generate_sequence_like`].
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Directory receiving the files
    pub output_dir: PathBuf,
    /// Number of measurement sessions to create
    pub count: usize,
    /// Also write the per-point files
    pub point_files: bool,
}

/// One generated session.
#[derive(Debug, Clone)]
pub struct GeneratedMeasurement {
    /// Session id
    pub session: SessionId,
    /// Main point-stream file
    pub path: PathBuf,
    /// Per-point directory, when written
    pub points_dir: Option<PathBuf>,
    /// Points in the file
    pub total_points: u64,
}

/// Write `count` synthetic measurements shaped like a scan with `config`.
///
/// The emission band moves across the axis from one session to the next;
/// amplitude grows toward the far corner of the grid and with exposure.
pub fn generate_sequence_like(
    config: &ScanConfig,
    options: &GenerateOptions,
) -> Result<Vec<GeneratedMeasurement>> {
    let geometry = config.geometry();
    let mapper = SnakeMapper::new(
        config.starting_corner,
        &geometry,
        config.step_x_um,
        config.step_y_um,
    );
    let axis = config.spectral_axis();
    let axis_len = axis.axis_len();
    let exposures = config.sequence_exposures_ms.clone();
    let max_exposure = exposures.iter().copied().fold(0.0_f64, f64::max);
    let total_points = geometry.total_points;
    let diagonal = f64::from((geometry.points_x + geometry.points_y).saturating_sub(2).max(1));

    std::fs::create_dir_all(&options.output_dir)
        .with_context(|| format!("creating {}", options.output_dir.display()))?;
    let now = chrono::Local::now();
    let mut generated = Vec::with_capacity(options.count);

    for i in 0..options.count {
        let center = if options.count > 1 {
            0.15 + 0.7 * (i as f64 / (options.count - 1) as f64)
        } else {
            0.5
        };
        let layout = options.point_files.then(|| PointFileLayout {
            axis_values: axis.values().to_vec(),
            exposures_ms: exposures.clone(),
        });
        let mut writer = if options.count == 1 {
            PointStreamWriter::create_at(&options.output_dir, &now, axis_len, layout)?
        } else {
            let session = SessionId::indexed(&now, (i + 1) as u32);
            PointStreamWriter::create(&options.output_dir, session, axis_len, layout)?
        };
        let session = writer.session().clone();

        for (n, index) in mapper.traversal().enumerate() {
            let cell = mapper.cell(index);
            let norm_xy = f64::from(cell.grid_x + cell.grid_y) / diagonal;
            let base_scale = 0.5 + 0.5 * norm_xy;
            let spectra: Vec<Vec<f64>> = exposures
                .iter()
                .map(|exp| {
                    let rel = if max_exposure > 0.0 { exp / max_exposure } else { 1.0 };
                    let scale = base_scale * (0.7 + 0.6 * rel);
                    synthetic_profile(axis_len, center, scale, n as u64, total_points)
                })
                .collect();
            if let Some(primary) = spectra.first() {
                writer.append(cell, primary)?;
            }
            writer.write_point_file(cell, &spectra)?;
        }

        let points_dir = writer.points_dir().map(Path::to_path_buf);
        let path = writer.finish()?;
        info!(
            session = %session,
            points = total_points,
            grid = %format!("{}x{}", geometry.points_x, geometry.points_y),
            "Generated sequence-like measurement"
        );
        generated.push(GeneratedMeasurement {
            session,
            path,
            points_dir,
            total_points,
        });
    }
    Ok(generated)
}
