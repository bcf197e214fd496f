//! Measurement cube: a point-stream file reshaped into `[y, x, wavelength]`.
//!
//! Loading is tolerant. Rows with fewer than three fields or any non-numeric
//! field are skipped and counted. Grid axes are the sorted distinct X and Y
//! values found in the file; when a coordinate pair appears twice the later
//! row wins. Cells with no row stay zero.
//!
//! Ragged spectra are handled by [`SpectrumLengthPolicy`].

use crate::error::CubeError;
use ndarray::{s, Array1, Array3, ArrayView1, ArrayView2, Axis};
use std::cmp::Ordering;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// How spectra of different lengths share one wavelength axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpectrumLengthPolicy {
    /// Use the longest spectrum; shorter ones are zero padded.
    #[default]
    ZeroPad,
    /// Use the shortest spectrum; longer ones are truncated.
    Truncate,
}

#[derive(Debug)]
struct ParsedRow {
    x: f64,
    y: f64,
    spectrum: Vec<f64>,
}

/// Dense spectral cube loaded from a point-stream file.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementCube {
    xs: Vec<f64>,
    ys: Vec<f64>,
    data: Array3<f64>,
    mean_spectrum: Array1<f64>,
    min_value: f64,
    max_value: f64,
    skipped_rows: usize,
}

impl MeasurementCube {
    /// Load a point-stream file.
    pub fn load(path: &Path, policy: SpectrumLengthPolicy) -> Result<Self, CubeError> {
        let file = std::fs::File::open(path).map_err(|source| CubeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cube = Self::from_reader(file, policy)?;
        debug!(
            path = %path.display(),
            nx = cube.xs.len(),
            ny = cube.ys.len(),
            len = cube.spectrum_len(),
            skipped = cube.skipped_rows,
            "Measurement cube loaded"
        );
        Ok(cube)
    }

    /// Parse point-stream CSV from any reader.
    pub fn from_reader<R: Read>(reader: R, policy: SpectrumLengthPolicy) -> Result<Self, CubeError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut rows = Vec::new();
        let mut skipped_rows = 0usize;
        let mut record = csv::ByteRecord::new();
        loop {
            match csv_reader.read_byte_record(&mut record) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => return Err(e.into()),
                Err(e) => {
                    debug!(error = %e, "Unreadable row");
                    skipped_rows += 1;
                    continue;
                }
            }
            match parse_row(&record) {
                Some(row) => rows.push(row),
                None => skipped_rows += 1,
            }
        }
        if skipped_rows > 0 {
            warn!(skipped_rows, "Skipped malformed rows while loading measurement");
        }
        if rows.is_empty() {
            return Err(CubeError::Empty);
        }

        let xs = distinct_sorted(rows.iter().map(|r| r.x));
        let ys = distinct_sorted(rows.iter().map(|r| r.y));
        let lengths = rows.iter().map(|r| r.spectrum.len());
        let len = match policy {
            SpectrumLengthPolicy::ZeroPad => lengths.max(),
            SpectrumLengthPolicy::Truncate => lengths.min(),
        }
        .unwrap_or(0);

        let mut data = Array3::<f64>::zeros((ys.len(), xs.len(), len));
        for row in &rows {
            let (Some(xi), Some(yi)) = (index_of(&xs, row.x), index_of(&ys, row.y)) else {
                continue;
            };
            let mut target = data.slice_mut(s![yi, xi, ..]);
            target.fill(0.0);
            let n = row.spectrum.len().min(len);
            target
                .slice_mut(s![..n])
                .assign(&ArrayView1::from(&row.spectrum[..n]));
        }

        let mean_spectrum = data
            .view()
            .into_shape_with_order((ys.len() * xs.len(), len))
            .ok()
            .and_then(|flat| flat.mean_axis(Axis(0)))
            .unwrap_or_else(|| Array1::zeros(len));
        let (min_value, max_value) = data.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
        let (min_value, max_value) = if data.is_empty() {
            (0.0, 0.0)
        } else {
            (min_value, max_value)
        };

        Ok(Self {
            xs,
            ys,
            data,
            mean_spectrum,
            min_value,
            max_value,
            skipped_rows,
        })
    }

    /// Sorted distinct X coordinates.
    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    /// Sorted distinct Y coordinates.
    pub fn ys(&self) -> &[f64] {
        &self.ys
    }

    /// Samples per spectrum.
    pub fn spectrum_len(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// `(ny, nx, spectrum_len)`
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// The full cube.
    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    /// 2D map at one wavelength index, `[y, x]`. Index is clamped to the axis.
    pub fn slice(&self, index: usize) -> Option<ArrayView2<'_, f64>> {
        let len = self.spectrum_len();
        if len == 0 {
            return None;
        }
        Some(self.data.index_axis(Axis(2), index.min(len - 1)))
    }

    /// Spectrum of the cell at grid indices.
    pub fn spectrum_at(&self, x_index: usize, y_index: usize) -> Option<ArrayView1<'_, f64>> {
        if x_index >= self.xs.len() || y_index >= self.ys.len() {
            return None;
        }
        Some(self.data.slice(s![y_index, x_index, ..]))
    }

    /// Mean spectrum over every (x, y) cell, empty cells included.
    pub fn mean_spectrum(&self) -> &Array1<f64> {
        &self.mean_spectrum
    }

    /// Global `(min, max)` over the cube.
    pub fn value_range(&self) -> (f64, f64) {
        (self.min_value, self.max_value)
    }

    /// Rows ignored while parsing.
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    /// Axis values for the wavelength slider.
    ///
    /// Linear over `range` when given, otherwise sample indices `0..len`.
    pub fn wavelength_axis(&self, range: Option<(f64, f64)>) -> Array1<f64> {
        let len = self.spectrum_len();
        let (lo, hi) = range.unwrap_or((0.0, len.saturating_sub(1) as f64));
        Array1::from(scan_core::spectrum::linspace(lo, hi, len))
    }
}

fn parse_row(record: &csv::ByteRecord) -> Option<ParsedRow> {
    if record.len() <= 2 {
        return None;
    }
    let mut fields = record
        .iter()
        .map(|f| std::str::from_utf8(f).ok()?.trim().parse::<f64>().ok());
    let x = fields.next()??;
    let y = fields.next()??;
    let spectrum = fields.collect::<Option<Vec<f64>>>()?;
    Some(ParsedRow { x, y, spectrum })
}

fn distinct_sorted(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut out: Vec<f64> = values.collect();
    out.sort_by(f64::total_cmp);
    out.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);
    out
}

fn index_of(axis: &[f64], value: f64) -> Option<usize> {
    axis.binary_search_by(|v| v.total_cmp(&value)).ok()
}
