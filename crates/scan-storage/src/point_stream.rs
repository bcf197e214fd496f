//! Append-only point-stream writer.
//!
//! One row per visited point, in visit order:
//!
//! ```text
//! grid_x,grid_y,i_0,i_1,...,i_{N-1}
//! ```
//!
//! No header, no sorting, flushed after every row so a crash loses at most
//! the point in flight. When per-point files are enabled, each point also
//! gets `points_<session>/point_x<X>_y<Y>.csv` with one row per axis value
//! and one intensity column per exposure.

use crate::error::StorageError;
use crate::naming::{point_file_name, SessionId};
use scan_core::PhysicalCell;
use chrono::{DateTime, TimeZone};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Column layout of the auxiliary per-point files.
#[derive(Debug, Clone, PartialEq)]
pub struct PointFileLayout {
    /// First column: wavelength or pixel position per spectrum sample
    pub axis_values: Vec<f64>,
    /// Exposure of each intensity column, ms
    pub exposures_ms: Vec<f64>,
}

impl PointFileLayout {
    /// Header row: `lambda,I_<exp>ms,...`
    pub fn header(&self) -> Vec<String> {
        std::iter::once("lambda".to_string())
            .chain(self.exposures_ms.iter().map(|e| format!("I_{e:.1}ms")))
            .collect()
    }
}

/// Writer for one run's output files.
#[derive(Debug)]
pub struct PointStreamWriter {
    session: SessionId,
    path: PathBuf,
    points_dir: Option<PathBuf>,
    layout: Option<PointFileLayout>,
    writer: Option<csv::Writer<File>>,
    axis_len: usize,
    rows: u64,
}

impl PointStreamWriter {
    /// Create the output directory if needed, claim a free session id for
    /// the current local time and open the main file.
    pub fn create_now(
        dir: &Path,
        axis_len: usize,
        layout: Option<PointFileLayout>,
    ) -> Result<Self, StorageError> {
        Self::create_at(dir, &chrono::Local::now(), axis_len, layout)
    }

    /// Claim the first free session id for `time` and open its main file.
    ///
    /// The main file is created exclusively, so a name taken between the
    /// existence check and the open moves on to the next `_NNN` suffix
    /// instead of truncating the other run's file.
    pub fn create_at<Tz: TimeZone>(
        dir: &Path,
        time: &DateTime<Tz>,
        axis_len: usize,
        layout: Option<PointFileLayout>,
    ) -> Result<Self, StorageError>
    where
        Tz::Offset: fmt::Display,
    {
        fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;
        for session in SessionId::candidates(time) {
            if session.is_taken(dir) {
                continue;
            }
            let path = session.measurement_path(dir);
            match open_exclusive(&path) {
                Ok(file) => return Self::with_file(dir, session, path, file, axis_len, layout),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(path = %path.display(), "Session taken concurrently, trying next");
                }
                Err(e) => return Err(StorageError::io(&path, e)),
            }
        }
        Err(StorageError::SessionExhausted(
            SessionId::from_time(time).to_string(),
        ))
    }

    /// Open the main file for `session` inside `dir`.
    ///
    /// Fails if the file already exists. With a `layout`, the points
    /// directory is created as well.
    pub fn create(
        dir: &Path,
        session: SessionId,
        axis_len: usize,
        layout: Option<PointFileLayout>,
    ) -> Result<Self, StorageError> {
        fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;
        let path = session.measurement_path(dir);
        let file = open_exclusive(&path).map_err(|e| StorageError::io(&path, e))?;
        Self::with_file(dir, session, path, file, axis_len, layout)
    }

    fn with_file(
        dir: &Path,
        session: SessionId,
        path: PathBuf,
        file: File,
        axis_len: usize,
        layout: Option<PointFileLayout>,
    ) -> Result<Self, StorageError> {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(file);

        let points_dir = match &layout {
            Some(_) => {
                let points = session.points_dir(dir);
                if let Err(e) = fs::create_dir_all(&points) {
                    drop(writer);
                    let _ = fs::remove_file(&path);
                    return Err(StorageError::io(&points, e));
                }
                Some(points)
            }
            None => None,
        };

        info!(path = %path.display(), axis_len, "Point stream opened");
        Ok(Self {
            session,
            path,
            points_dir,
            layout,
            writer: Some(writer),
            axis_len,
            rows: 0,
        })
    }

    /// Session id of this run.
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Main file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Points directory, when per-point files are enabled.
    pub fn points_dir(&self) -> Option<&Path> {
        self.points_dir.as_deref()
    }

    /// Spectrum length every row must have.
    pub fn axis_len(&self) -> usize {
        self.axis_len
    }

    /// Rows appended so far.
    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    /// Append one point and flush it to disk.
    pub fn append(&mut self, cell: PhysicalCell, spectrum: &[f64]) -> Result<(), StorageError> {
        if spectrum.len() != self.axis_len {
            return Err(StorageError::LengthMismatch {
                expected: self.axis_len,
                actual: spectrum.len(),
            });
        }
        let writer = self.writer.as_mut().ok_or_else(|| {
            StorageError::io(
                &self.path,
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, "point stream closed"),
            )
        })?;

        writer.write_field(cell.grid_x.to_string())?;
        writer.write_field(cell.grid_y.to_string())?;
        for value in spectrum {
            writer.write_field(value.to_string())?;
        }
        writer.write_record(None::<&[u8]>)?;
        writer.flush().map_err(|e| StorageError::io(&self.path, e))?;

        self.rows += 1;
        Ok(())
    }

    /// Write the auxiliary file for one point: one spectrum per exposure.
    ///
    /// No-op when per-point files are disabled.
    pub fn write_point_file(&self, cell: PhysicalCell, spectra: &[Vec<f64>]) -> Result<(), StorageError> {
        let (Some(dir), Some(layout)) = (&self.points_dir, &self.layout) else {
            return Ok(());
        };
        let path = dir.join(point_file_name(cell.grid_x, cell.grid_y));
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(&path)?;
        writer.write_record(layout.header())?;
        for (idx, axis_value) in layout.axis_values.iter().enumerate() {
            let mut row = Vec::with_capacity(spectra.len() + 1);
            row.push(axis_value.to_string());
            row.extend(
                spectra
                    .iter()
                    .map(|s| s.get(idx).copied().unwrap_or(0.0).to_string()),
            );
            writer.write_record(&row)?;
        }
        writer.flush().map_err(|e| StorageError::io(&path, e))?;
        debug!(path = %path.display(), "Point file written");
        Ok(())
    }

    /// Flush and close; the files stay on disk.
    pub fn finish(mut self) -> Result<PathBuf, StorageError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|e| StorageError::io(&self.path, e))?;
        }
        info!(path = %self.path.display(), rows = self.rows, "Point stream finished");
        Ok(self.path.clone())
    }

    /// Close and delete everything this run created.
    pub fn discard(mut self) -> Result<(), StorageError> {
        drop(self.writer.take());
        remove_if_present(&self.path)?;
        if let Some(dir) = self.points_dir.take() {
            if dir.exists() {
                fs::remove_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;
            }
        }
        info!(path = %self.path.display(), rows = self.rows, "Partial point stream discarded");
        Ok(())
    }
}

impl Drop for PointStreamWriter {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                warn!(path = %self.path.display(), error = %e, "Flush on drop failed");
            }
        }
    }
}

fn remove_if_present(path: &Path) -> Result<(), StorageError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

fn open_exclusive(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session() -> SessionId {
        let time = chrono::Utc
            .with_ymd_and_hms(2024, 1, 2, 3, 4, 5)
            .single()
            .expect("valid time");
        SessionId::from_time(&time)
    }

    fn cell(grid_x: u32, grid_y: u32) -> PhysicalCell {
        PhysicalCell { grid_x, grid_y }
    }

    #[test]
    fn test_rows_are_written_in_append_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut writer = PointStreamWriter::create(dir.path(), session(), 2, None).expect("open");
        writer.append(cell(1, 0), &[1.5, 2.0]).expect("row");
        writer.append(cell(0, 0), &[0.0, -3.25]).expect("row");
        let path = writer.finish().expect("finish");

        let text = fs::read_to_string(path).expect("read");
        assert_eq!(text, "1,0,1.5,2\n0,0,0,-3.25\n");
    }

    #[test]
    fn test_rows_visible_before_finish() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut writer = PointStreamWriter::create(dir.path(), session(), 1, None).expect("open");
        writer.append(cell(0, 0), &[7.0]).expect("row");
        let text = fs::read_to_string(writer.path()).expect("read");
        assert_eq!(text, "0,0,7\n");
        assert_eq!(writer.rows_written(), 1);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut writer = PointStreamWriter::create(dir.path(), session(), 3, None).expect("open");
        let err = writer.append(cell(0, 0), &[1.0]).expect_err("short row");
        assert!(matches!(err, StorageError::LengthMismatch { expected: 3, actual: 1 }));
        assert_eq!(writer.rows_written(), 0);
    }

    #[test]
    fn test_point_files_have_header_and_axis_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = PointFileLayout {
            axis_values: vec![400.0, 500.0],
            exposures_ms: vec![10.0, 25.5],
        };
        let mut writer =
            PointStreamWriter::create(dir.path(), session(), 2, Some(layout)).expect("open");
        writer.append(cell(2, 1), &[1.0, 2.0]).expect("row");
        writer
            .write_point_file(cell(2, 1), &[vec![1.0, 2.0], vec![3.0, 4.0]])
            .expect("point file");

        let points = writer.points_dir().expect("points dir").to_path_buf();
        let text = fs::read_to_string(points.join("point_x2_y1.csv")).expect("read");
        assert_eq!(text, "lambda,I_10.0ms,I_25.5ms\n400,1,3\n500,2,4\n");
    }

    #[test]
    fn test_discard_removes_everything() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = PointFileLayout {
            axis_values: vec![0.0],
            exposures_ms: vec![1.0],
        };
        let mut writer =
            PointStreamWriter::create(dir.path(), session(), 1, Some(layout)).expect("open");
        writer.append(cell(0, 0), &[1.0]).expect("row");
        writer.write_point_file(cell(0, 0), &[vec![1.0]]).expect("point file");
        let main = writer.path().to_path_buf();
        let points = writer.points_dir().map(Path::to_path_buf).expect("points dir");

        writer.discard().expect("discard");
        assert!(!main.exists());
        assert!(!points.exists());
    }

    #[test]
    fn test_existing_session_file_is_never_truncated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let taken = session().measurement_path(dir.path());
        fs::write(&taken, "0,0,42\n").expect("seed");

        let err = PointStreamWriter::create(dir.path(), session(), 1, None).expect_err("exists");
        assert!(matches!(err, StorageError::Io { .. }));
        assert_eq!(fs::read_to_string(&taken).expect("read"), "0,0,42\n");
    }

    #[test]
    fn test_create_at_moves_past_claimed_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let time = chrono::Utc
            .with_ymd_and_hms(2024, 1, 2, 3, 4, 5)
            .single()
            .expect("valid time");
        fs::write(session().measurement_path(dir.path()), "0,0,42\n").expect("seed");

        let mut writer = PointStreamWriter::create_at(dir.path(), &time, 1, None).expect("open");
        assert_eq!(writer.session().as_str(), "20240102_030405_001");
        writer.append(cell(0, 0), &[1.0]).expect("row");
        writer.finish().expect("finish");

        let second = PointStreamWriter::create_at(dir.path(), &time, 1, None).expect("open");
        assert_eq!(second.session().as_str(), "20240102_030405_002");
        let original = fs::read_to_string(session().measurement_path(dir.path())).expect("read");
        assert_eq!(original, "0,0,42\n");
    }
}
