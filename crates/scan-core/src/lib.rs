//! `scan-core`
//!
//! Core types and traits for spectroscan raster scanning.
//!
//! This crate holds everything the sequencer, the storage layer and the
//! simulated hardware agree on: grid sizing, the snake traversal, the
//! per-run settings snapshot, the spectral axis and the adapter contracts.
//!
//! ## Key Types
//!
//! - [`GridGeometry`]: point counts and magnified extents
//! - [`SnakeMapper`]: traversal position to recorded cell and stage move
//! - [`ScanConfig`] / [`SettingsStore`]: validated run snapshot and lockable live options
//! - [`MotionAdapter`], [`AcquisitionAdapter`], [`ConfirmationAdapter`]: hardware seams
//! - [`ScanError`]: error type shared across the workspace

pub mod capabilities;
pub mod config;
pub mod corner;
pub mod error;
pub mod geometry;
pub mod motion;
pub mod sample;
pub mod spectrum;

pub use capabilities::{
    AcquisitionAdapter, AreaSummary, ConfirmationAdapter, MotionAdapter, StageDriver,
};
pub use config::{ScanConfig, ScanOptions, SettingsLease, SettingsStore};
pub use corner::{
    HorizontalDirection, MotionVector, PhysicalCell, SnakeMapper, StartingCorner, TraversalIndex,
    VerticalDirection,
};
pub use error::{DriverError, DriverErrorKind, ScanError, ScanResult};
pub use geometry::{compute_points, GridGeometry};
pub use motion::MotionQueue;
pub use sample::{Frame, Sample, SampleCell};
pub use spectrum::{SpectralAxis, SpectralAxisConfig};
