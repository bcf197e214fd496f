//! Simulated spectrometer camera.
//!
//! Captures land in a [`SampleCell`]; `current_sample` hands out the latest
//! one. In instant mode every read captures a fresh sample on the spot. In
//! realistic and chaos modes a background capture loop refreshes the cell
//! once per exposure (or readout, whichever is longer), like a streaming
//! sensor would.

use crate::common::{ErrorConfig, MockMode, MockRng, TimingConfig};
use crate::synthetic::synthetic_profile;
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use scan_core::{AcquisitionAdapter, Frame, Sample, SampleCell};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// What the simulated sensor sees.
#[derive(Debug, Clone, PartialEq)]
pub enum SpectrumSource {
    /// The same vector on every capture
    Constant(Vec<f64>),
    /// A noisy emission band, amplitude proportional to exposure
    Synthetic {
        /// Profile length
        pixels: usize,
    },
    /// A dispersed 2D image reduced to a profile by column means
    Frame {
        /// Image width, the profile length
        width: u32,
        /// Image height
        height: u32,
    },
}

struct Inner {
    source: SpectrumSource,
    mode: MockMode,
    timing: TimingConfig,
    error_config: ErrorConfig,
    rng: MockRng,
    noise: f64,
    cell: SampleCell,
    exposure_ms_bits: AtomicU64,
    ready: AtomicBool,
    running: AtomicBool,
    captures: AtomicU64,
    reads: AtomicU64,
    missing_reads: HashSet<u64>,
    missing_rate: f64,
}

impl Inner {
    fn exposure_ms(&self) -> f64 {
        f64::from_bits(self.exposure_ms_bits.load(Ordering::SeqCst))
    }

    fn capture(&self) -> Sample {
        let n = self.captures.fetch_add(1, Ordering::SeqCst);
        match &self.source {
            SpectrumSource::Constant(values) => Sample::new(values.clone()),
            SpectrumSource::Synthetic { pixels } => {
                let scale = self.exposure_ms() / 10.0;
                let center = 0.5 + 0.05 * (n as f64 * 0.1).sin();
                let values = synthetic_profile(*pixels, center, scale, n % 100, 100)
                    .into_iter()
                    .map(|v| (v * (1.0 + self.rng.jitter(self.noise))).max(0.0))
                    .collect();
                Sample::new(values)
            }
            SpectrumSource::Frame { width, height } => {
                let frame = self.render_frame(*width, *height, n);
                Sample::new(frame.column_means())
            }
        }
    }

    fn render_frame(&self, width: u32, height: u32, n: u64) -> Frame {
        let scale = (self.exposure_ms() / 10.0).min(60.0);
        let profile = synthetic_profile(width as usize, 0.5, scale, n % 100, 100);
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for _row in 0..height {
            for value in &profile {
                let noisy = value * (1.0 + self.rng.jitter(self.noise));
                pixels.push(noisy.clamp(0.0, f64::from(u16::MAX)) as u16);
            }
        }
        Frame::from_u16(width, height, &pixels)
    }

    fn capture_interval(&self) -> Duration {
        let exposure = Duration::from_secs_f64(self.exposure_ms().max(0.0) / 1000.0);
        exposure.max(self.timing.readout(self.mode)).max(Duration::from_millis(1))
    }
}

/// Simulated spectrometer implementing [`AcquisitionAdapter`].
///
/// # Example
///
/// ```rust,ignore
/// let spec = MockSpectrometer::builder()
///     .source(SpectrumSource::Constant(vec![1.0; 10]))
///     .build();
/// spec.start().await?;
/// let sample = spec.current_sample().await?;
/// ```
pub struct MockSpectrometer {
    inner: Arc<Inner>,
    capture_task: Mutex<Option<JoinHandle<()>>>,
}

impl MockSpectrometer {
    /// Builder for source, timing and fault injection.
    pub fn builder() -> MockSpectrometerBuilder {
        MockSpectrometerBuilder::new()
    }

    /// Shared cell holding the latest capture.
    pub fn sample_cell(&self) -> SampleCell {
        self.inner.cell.clone()
    }

    /// Current exposure in ms.
    pub fn exposure_ms(&self) -> f64 {
        self.inner.exposure_ms()
    }

    /// Captures taken so far.
    pub fn captures(&self) -> u64 {
        self.inner.captures.load(Ordering::SeqCst)
    }

    /// Open the sensor and begin capturing.
    pub async fn start(&self) -> Result<()> {
        self.inner.error_config.check_operation("mock_spectrometer", "open")?;
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.cell.publish(self.inner.capture());
        self.inner.ready.store(true, Ordering::SeqCst);

        if self.inner.mode.is_timed() {
            let inner = Arc::clone(&self.inner);
            let handle = tokio::spawn(async move {
                while inner.running.load(Ordering::SeqCst) {
                    tokio::time::sleep(inner.capture_interval()).await;
                    if let Err(e) = inner.error_config.check_operation("mock_spectrometer", "capture") {
                        tracing::warn!(error = %e, "MockSpectrometer: capture failed");
                        continue;
                    }
                    inner.cell.publish(inner.capture());
                }
                tracing::debug!("MockSpectrometer: capture loop stopped");
            });
            *self.capture_task.lock() = Some(handle);
        }
        tracing::info!(mode = %self.inner.mode, "MockSpectrometer started");
        Ok(())
    }
}

#[async_trait]
impl AcquisitionAdapter for MockSpectrometer {
    fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst)
    }

    async fn current_sample(&self) -> Result<Option<Sample>> {
        if !self.is_ready() {
            anyhow::bail!("mock spectrometer is not started");
        }
        self.inner.error_config.check_operation("mock_spectrometer", "read")?;

        let read = self.inner.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if self.inner.missing_reads.contains(&read) || self.inner.rng.chance(self.inner.missing_rate) {
            tracing::debug!(read, "MockSpectrometer: no sample available");
            return Ok(None);
        }
        if !self.inner.mode.is_timed() {
            self.inner.cell.publish(self.inner.capture());
        }
        Ok(self.inner.cell.latest().map(|s| Sample::clone(&s)))
    }

    async fn set_exposure_ms(&self, exposure_ms: f64) -> Result<()> {
        self.inner.error_config.check_operation("mock_spectrometer", "exposure")?;
        self.inner
            .exposure_ms_bits
            .store(exposure_ms.to_bits(), Ordering::SeqCst);
        tracing::debug!(exposure_ms, "MockSpectrometer exposure set");
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.ready.store(false, Ordering::SeqCst);
        let task = self.capture_task.lock().take();
        if let Some(handle) = task {
            handle.abort();
            let _ = handle.await;
        }
        self.inner.cell.clear();
        tracing::info!("MockSpectrometer shut down");
        Ok(())
    }
}

/// Builder for [`MockSpectrometer`].
pub struct MockSpectrometerBuilder {
    source: SpectrumSource,
    mode: MockMode,
    timing: TimingConfig,
    error_config: ErrorConfig,
    seed: Option<u64>,
    noise: f64,
    exposure_ms: f64,
    missing_reads: HashSet<u64>,
    missing_rate: f64,
}

impl Default for MockSpectrometerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSpectrometerBuilder {
    /// Defaults: synthetic 2048-pixel source, instant mode, 1% noise, 10 ms exposure.
    pub fn new() -> Self {
        Self {
            source: SpectrumSource::Synthetic {
                pixels: scan_core::spectrum::DEFAULT_PIXELS,
            },
            mode: MockMode::Instant,
            timing: TimingConfig::spectrometer(),
            error_config: ErrorConfig::none(),
            seed: None,
            noise: 0.01,
            exposure_ms: 10.0,
            missing_reads: HashSet::new(),
            missing_rate: 0.0,
        }
    }

    /// What the sensor produces.
    pub fn source(mut self, source: SpectrumSource) -> Self {
        self.source = source;
        self
    }

    /// Operational mode.
    pub fn mode(mut self, mode: MockMode) -> Self {
        self.mode = mode;
        self
    }

    /// Delay preset.
    pub fn timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Error injection; operations are `open`, `read`, `capture` and `exposure`.
    pub fn error_config(mut self, config: ErrorConfig) -> Self {
        self.error_config = config;
        self
    }

    /// Seed for noise and missing-sample decisions.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Relative noise amplitude.
    pub fn noise(mut self, noise: f64) -> Self {
        self.noise = noise.max(0.0);
        self
    }

    /// Initial exposure in ms.
    pub fn exposure_ms(mut self, exposure_ms: f64) -> Self {
        self.exposure_ms = exposure_ms;
        self
    }

    /// Reads (1-based) that return no sample.
    pub fn missing_reads(mut self, reads: impl IntoIterator<Item = u64>) -> Self {
        self.missing_reads = reads.into_iter().collect();
        self
    }

    /// Probability that a read returns no sample.
    pub fn missing_rate(mut self, rate: f64) -> Self {
        self.missing_rate = rate;
        self
    }

    /// Build the spectrometer (not started).
    pub fn build(self) -> MockSpectrometer {
        MockSpectrometer {
            inner: Arc::new(Inner {
                source: self.source,
                mode: self.mode,
                timing: self.timing,
                error_config: self.error_config,
                rng: MockRng::new(self.seed),
                noise: self.noise,
                cell: SampleCell::new(),
                exposure_ms_bits: AtomicU64::new(self.exposure_ms.to_bits()),
                ready: AtomicBool::new(false),
                running: AtomicBool::new(false),
                captures: AtomicU64::new(0),
                reads: AtomicU64::new(0),
                missing_reads: self.missing_reads,
                missing_rate: self.missing_rate,
            }),
            capture_task: Mutex::new(None),
        }
    }
}
