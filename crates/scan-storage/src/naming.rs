//! Session ids and measurement file names.
//!
//! A session id is the local start time `YYYYMMDD_HHMMSS`, optionally
//! followed by `_NNN` when several sessions start within the same second.

use crate::error::StorageError;
use chrono::{DateTime, TimeZone};
use std::fmt;
use std::path::{Path, PathBuf};

/// Prefix of every point-stream file.
pub const MEASUREMENT_PREFIX: &str = "measurement_";
/// Suffix of every point-stream file.
pub const MEASUREMENT_SUFFIX: &str = "_spectra.csv";
/// Prefix of the auxiliary per-point directory.
pub const POINTS_DIR_PREFIX: &str = "points_";

const MAX_DISAMBIGUATION: u32 = 999;

/// Identifier shared by a run's main file and its points directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Session id for a start time, without a disambiguating suffix.
    pub fn from_time<Tz: TimeZone>(time: &DateTime<Tz>) -> Self
    where
        Tz::Offset: fmt::Display,
    {
        SessionId(time.format("%Y%m%d_%H%M%S").to_string())
    }

    /// Session id with an explicit `_NNN` suffix.
    pub fn indexed<Tz: TimeZone>(time: &DateTime<Tz>, index: u32) -> Self
    where
        Tz::Offset: fmt::Display,
    {
        SessionId(format!("{}_{index:03}", time.format("%Y%m%d_%H%M%S")))
    }

    /// Session ids for `time` in the order they are tried: the bare
    /// timestamp, then `_001` up to `_999`.
    pub fn candidates<Tz: TimeZone>(time: &DateTime<Tz>) -> impl Iterator<Item = Self> + '_
    where
        Tz::Offset: fmt::Display,
    {
        std::iter::once(Self::from_time(time))
            .chain((1..=MAX_DISAMBIGUATION).map(move |n| Self::indexed(time, n)))
    }

    /// First session id for `time` whose files do not exist yet in `dir`.
    ///
    /// Only a hint: another writer may claim the name before it is opened.
    /// [`PointStreamWriter::create_at`](crate::PointStreamWriter::create_at)
    /// claims a name atomically.
    pub fn allocate<Tz: TimeZone>(dir: &Path, time: &DateTime<Tz>) -> Result<Self, StorageError>
    where
        Tz::Offset: fmt::Display,
    {
        Self::candidates(time)
            .find(|candidate| !candidate.is_taken(dir))
            .ok_or_else(|| StorageError::SessionExhausted(Self::from_time(time).0))
    }

    /// Recover the session id from a point-stream file name.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let inner = name
            .strip_prefix(MEASUREMENT_PREFIX)?
            .strip_suffix(MEASUREMENT_SUFFIX)?;
        if inner.is_empty() {
            None
        } else {
            Some(SessionId(inner.to_string()))
        }
    }

    /// The id as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `measurement_<id>_spectra.csv`
    pub fn measurement_file_name(&self) -> String {
        format!("{MEASUREMENT_PREFIX}{}{MEASUREMENT_SUFFIX}", self.0)
    }

    /// `points_<id>`
    pub fn points_dir_name(&self) -> String {
        format!("{POINTS_DIR_PREFIX}{}", self.0)
    }

    /// Main file path inside `dir`.
    pub fn measurement_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.measurement_file_name())
    }

    /// Points directory path inside `dir`.
    pub fn points_dir(&self, dir: &Path) -> PathBuf {
        dir.join(self.points_dir_name())
    }

    pub(crate) fn is_taken(&self, dir: &Path) -> bool {
        self.measurement_path(dir).exists() || self.points_dir(dir).exists()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `point_x<X>_y<Y>.csv`
pub fn point_file_name(grid_x: u32, grid_y: u32) -> String {
    format!("point_x{grid_x}_y{grid_y}.csv")
}
