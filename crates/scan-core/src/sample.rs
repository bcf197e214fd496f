//! Spectrum samples, sensor frames and the latest-sample snapshot cell.

use std::sync::Arc;
use tokio::sync::watch;

/// One spectrum reading: intensity per axis position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sample {
    /// Intensities in axis order
    pub values: Vec<f64>,
}

impl Sample {
    /// Wrap a vector of intensities.
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Number of axis positions.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the sample carries no data.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<f64>> for Sample {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

/// A single sensor image.
///
/// # Storage
/// Data is stored as a raw byte vector (`Vec<u8>`).
/// - 8-bit images: 1 byte per pixel.
/// - 12/16-bit images: 2 bytes per pixel, Little Endian.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Bits per pixel (e.g., 8, 12, 16)
    pub bit_depth: u32,

    /// Raw pixel data
    pub data: Vec<u8>,
}

impl Frame {
    /// Create a new frame from 16-bit pixel data.
    pub fn from_u16(width: u32, height: u32, pixels: &[u16]) -> Self {
        let mut data = Vec::with_capacity(pixels.len() * 2);
        for pixel in pixels {
            data.extend_from_slice(&pixel.to_le_bytes());
        }

        Self {
            width,
            height,
            bit_depth: 16,
            data,
        }
    }

    /// Create a new frame from 8-bit pixel data.
    pub fn from_u8(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            bit_depth: 8,
            data,
        }
    }

    /// Get pixel value at (x, y) as u32 (handling bit depth conversion).
    pub fn get(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }

        let idx = (y as usize) * (self.width as usize) + x as usize;

        match self.bit_depth {
            8 => self.data.get(idx).map(|&v| u32::from(v)),
            12 | 16 => {
                let start = idx * 2;
                match (self.data.get(start), self.data.get(start + 1)) {
                    (Some(&lo), Some(&hi)) => Some(u32::from(u16::from_le_bytes([lo, hi]))),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Mean of every column: the spectral profile of a dispersed image.
    ///
    /// Missing pixels (short buffer) count as zero.
    pub fn column_means(&self) -> Vec<f64> {
        if self.height == 0 {
            return vec![0.0; self.width as usize];
        }
        let rows = f64::from(self.height);
        (0..self.width)
            .map(|x| {
                let sum: u64 = (0..self.height)
                    .map(|y| u64::from(self.get(x, y).unwrap_or(0)))
                    .sum();
                sum as f64 / rows
            })
            .collect()
    }
}

/// Single-writer / multi-reader cell holding the most recent sample.
///
/// The acquisition loop publishes with [`SampleCell::publish`]; readers take a
/// cheap `Arc` snapshot and never block the writer.
#[derive(Debug, Clone)]
pub struct SampleCell {
    tx: Arc<watch::Sender<Option<Arc<Sample>>>>,
}

impl Default for SampleCell {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleCell {
    /// Empty cell.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Replace the current sample.
    pub fn publish(&self, sample: Sample) {
        self.tx.send_replace(Some(Arc::new(sample)));
    }

    /// Forget the current sample, e.g. when the sensor goes away.
    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    /// Latest published sample, if any.
    pub fn latest(&self) -> Option<Arc<Sample>> {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every publish.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Sample>>> {
        self.tx.subscribe()
    }
}
