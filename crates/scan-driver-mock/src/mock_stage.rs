//! Simulated XY motion stage.

use crate::common::{ErrorConfig, MockMode, TimingConfig};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use scan_core::{MotionVector, StageDriver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// Micrometres per motor pulse on both axes.
pub const UM_PER_PULSE: f64 = 2.0;

#[derive(Debug, Default)]
struct StageState {
    /// Position relative to power-up, µm
    x_um: f64,
    y_um: f64,
    /// Every accepted relative move, in order
    history: Vec<MotionVector>,
    homes: u32,
}

/// Simulated two-axis stepper stage.
///
/// Records every accepted move so tests can replay the path. In realistic
/// mode each move takes `communication + distance / velocity + settling`.
///
/// # Example
///
/// ```rust,ignore
/// let stage = MockStage::builder().mode(MockMode::Realistic).build();
/// stage.move_relative(20.0, 0.0).await?;
/// assert_eq!(stage.position(), (20.0, 0.0));
/// ```
#[derive(Clone)]
pub struct MockStage {
    state: Arc<Mutex<StageState>>,
    connected: Arc<AtomicBool>,
    velocity_um_per_s: f64,
    mode: MockMode,
    timing: TimingConfig,
    error_config: ErrorConfig,
}

impl Default for MockStage {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStage {
    /// Connected stage in instant mode.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Builder for custom timing and error injection.
    pub fn builder() -> MockStageBuilder {
        MockStageBuilder::new()
    }

    /// Current position `(x, y)` in µm.
    pub fn position(&self) -> (f64, f64) {
        let state = self.state.lock();
        (state.x_um, state.y_um)
    }

    /// All accepted moves.
    pub fn moves(&self) -> Vec<MotionVector> {
        self.state.lock().history.clone()
    }

    /// Number of completed homing runs.
    pub fn homes(&self) -> u32 {
        self.state.lock().homes
    }

    /// Simulate plugging or unplugging the controller.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Whole motor pulses for a distance; the controller cannot do fractions.
    pub fn pulses(distance_um: f64) -> i64 {
        (distance_um / UM_PER_PULSE).round() as i64
    }

    fn travel_time(&self, distance_um: f64) -> Duration {
        if !self.mode.is_timed() || self.velocity_um_per_s <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(distance_um.abs() / self.velocity_um_per_s)
    }
}

#[async_trait]
impl StageDriver for MockStage {
    async fn move_relative(&self, dx_um: f64, dy_um: f64) -> Result<()> {
        if !self.is_connected() {
            anyhow::bail!("mock stage is not connected");
        }
        self.error_config.check_operation("mock_stage", "move")?;

        let dx = Self::pulses(dx_um) as f64 * UM_PER_PULSE;
        let dy = Self::pulses(dy_um) as f64 * UM_PER_PULSE;
        let delay = self.timing.communication(self.mode)
            + self.travel_time(dx.abs().max(dy.abs()))
            + self.timing.settling(self.mode);
        if !delay.is_zero() {
            sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.x_um += dx;
        state.y_um += dy;
        state.history.push(MotionVector::new(dx, dy));
        tracing::trace!(x_um = state.x_um, y_um = state.y_um, "MockStage moved");
        Ok(())
    }

    async fn home(&self) -> Result<()> {
        if !self.is_connected() {
            anyhow::bail!("mock stage is not connected");
        }
        self.error_config.check_operation("mock_stage", "home")?;
        if self.mode.is_timed() {
            sleep(Duration::from_millis(100)).await;
        }
        let mut state = self.state.lock();
        state.x_um = 0.0;
        state.y_um = 0.0;
        state.homes += 1;
        tracing::debug!("MockStage: homing complete");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Builder for [`MockStage`].
#[derive(Debug, Clone)]
pub struct MockStageBuilder {
    velocity_um_per_s: f64,
    mode: MockMode,
    timing: TimingConfig,
    error_config: ErrorConfig,
    connected: bool,
}

impl Default for MockStageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStageBuilder {
    /// Defaults: 10 mm/s, instant mode, stage timing preset, no errors.
    pub fn new() -> Self {
        Self {
            velocity_um_per_s: 10_000.0,
            mode: MockMode::Instant,
            timing: TimingConfig::stage(),
            error_config: ErrorConfig::none(),
            connected: true,
        }
    }

    /// Operational mode.
    pub fn mode(mut self, mode: MockMode) -> Self {
        self.mode = mode;
        self
    }

    /// Travel speed in µm/s.
    pub fn velocity_um_per_s(mut self, velocity: f64) -> Self {
        self.velocity_um_per_s = velocity;
        self
    }

    /// Delay preset.
    pub fn timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Error injection.
    pub fn error_config(mut self, config: ErrorConfig) -> Self {
        self.error_config = config;
        self
    }

    /// Start disconnected.
    pub fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }

    /// Build the stage.
    pub fn build(self) -> MockStage {
        MockStage {
            state: Arc::new(Mutex::new(StageState::default())),
            connected: Arc::new(AtomicBool::new(self.connected)),
            velocity_um_per_s: self.velocity_um_per_s,
            mode: self.mode,
            timing: self.timing,
            error_config: self.error_config,
        }
    }
}
