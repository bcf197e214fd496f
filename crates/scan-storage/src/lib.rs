//! `scan-storage`
//!
//! Measurement files for spectroscan.
//!
//! - [`point_stream`]: append-only per-run CSV output, flushed per point
//! - [`cube`]: loads a point-stream file into a dense `[y, x, λ]` cube
//! - [`catalog`]: lists and deletes stored measurements
//! - [`naming`]: session ids and file names shared by all of the above

pub mod catalog;
pub mod cube;
pub mod error;
pub mod naming;
pub mod point_stream;

pub use catalog::{delete_all, delete_measurement, find_measurement, list_measurements, MeasurementEntry};
pub use cube::{MeasurementCube, SpectrumLengthPolicy};
pub use error::{CubeError, StorageError};
pub use naming::SessionId;
pub use point_stream::{PointFileLayout, PointStreamWriter};
