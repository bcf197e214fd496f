//! Listing and deleting stored measurements.

use crate::error::StorageError;
use crate::naming::{SessionId, MEASUREMENT_SUFFIX};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// One stored measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementEntry {
    /// Main point-stream file
    pub path: PathBuf,
    /// File name of `path`
    pub file_name: String,
    /// Session id parsed from the file name, when it follows the naming scheme
    pub session: Option<SessionId>,
    /// Size of the main file in bytes
    pub size_bytes: u64,
    /// Matching per-point directory, if present
    pub points_dir: Option<PathBuf>,
}

/// All `*_spectra.csv` files in `dir`, sorted by file name.
///
/// A missing directory is an empty catalog.
pub fn list_measurements(dir: &Path) -> Result<Vec<MeasurementEntry>, StorageError> {
    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::io(dir, e)),
    };

    let mut entries = Vec::new();
    for item in read_dir {
        let item = item.map_err(|e| StorageError::io(dir, e))?;
        let file_name = item.file_name().to_string_lossy().into_owned();
        if !file_name.ends_with(MEASUREMENT_SUFFIX) {
            continue;
        }
        let metadata = item.metadata().map_err(|e| StorageError::io(item.path(), e))?;
        if !metadata.is_file() {
            continue;
        }
        let session = SessionId::from_file_name(&file_name);
        let points_dir = session
            .as_ref()
            .map(|s| s.points_dir(dir))
            .filter(|p| p.is_dir());
        entries.push(MeasurementEntry {
            path: item.path(),
            file_name,
            session,
            size_bytes: metadata.len(),
            points_dir,
        });
    }
    entries.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(entries)
}

/// Look a measurement up by file name or session id.
pub fn find_measurement(dir: &Path, name: &str) -> Result<MeasurementEntry, StorageError> {
    list_measurements(dir)?
        .into_iter()
        .find(|e| e.file_name == name || e.session.as_ref().is_some_and(|s| s.as_str() == name))
        .ok_or_else(|| StorageError::NotFound(name.to_string()))
}

/// Delete one measurement and its per-point directory.
pub fn delete_measurement(entry: &MeasurementEntry) -> Result<(), StorageError> {
    fs::remove_file(&entry.path).map_err(|e| StorageError::io(&entry.path, e))?;
    if let Some(points) = &entry.points_dir {
        fs::remove_dir_all(points).map_err(|e| StorageError::io(points, e))?;
    }
    info!(file = %entry.file_name, "Measurement deleted");
    Ok(())
}

/// Delete every measurement in `dir`; returns how many were removed.
pub fn delete_all(dir: &Path) -> Result<usize, StorageError> {
    let entries = list_measurements(dir)?;
    for entry in &entries {
        delete_measurement(entry)?;
    }
    info!(count = entries.len(), dir = %dir.display(), "All measurements deleted");
    Ok(entries.len())
}
