//! Motion command queue.
//!
//! [`MotionQueue`] wraps a [`StageDriver`] behind a bounded channel and a
//! worker task so that the sequencer can issue moves without waiting on the
//! controller. Commands run strictly in the order they were queued; a
//! failing command is logged and the worker moves on to the next one.

use crate::capabilities::{MotionAdapter, StageDriver};
use crate::corner::MotionVector;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Work item for the motion worker.
#[derive(Debug)]
pub enum MotionCommand {
    /// Relative move
    MoveBy(MotionVector),
    /// Homing run
    Home,
    /// Completes once every earlier command has been handled
    Barrier(oneshot::Sender<()>),
}

/// Counters kept by the motion worker.
#[derive(Debug, Default)]
pub struct MotionStats {
    /// Commands the driver accepted
    pub completed: AtomicU64,
    /// Commands the driver rejected
    pub failed: AtomicU64,
}

/// Fire-and-forget motion adapter over a [`StageDriver`].
pub struct MotionQueue {
    driver: Arc<dyn StageDriver>,
    tx: Mutex<Option<mpsc::Sender<MotionCommand>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<MotionStats>,
}

impl MotionQueue {
    /// Spawn the worker for `driver`. Must be called inside a tokio runtime.
    pub fn spawn(driver: Arc<dyn StageDriver>) -> Self {
        Self::with_capacity(driver, DEFAULT_QUEUE_CAPACITY)
    }

    /// Spawn the worker with a custom queue depth.
    pub fn with_capacity(driver: Arc<dyn StageDriver>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stats = Arc::new(MotionStats::default());
        let worker = tokio::spawn(run_worker(Arc::clone(&driver), rx, Arc::clone(&stats)));
        Self {
            driver,
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            stats,
        }
    }

    /// Worker counters.
    pub fn stats(&self) -> &MotionStats {
        &self.stats
    }

    /// Wait until every command queued so far has been handed to the driver.
    pub async fn sync(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        let sender = self.sender()?;
        sender
            .send(MotionCommand::Barrier(done_tx))
            .await
            .map_err(|_| anyhow!("motion worker stopped"))?;
        done_rx.await.map_err(|_| anyhow!("motion worker stopped"))
    }

    fn sender(&self) -> Result<mpsc::Sender<MotionCommand>> {
        self.tx
            .lock()
            .clone()
            .ok_or_else(|| anyhow!("motion queue is shut down"))
    }

    fn enqueue(&self, command: MotionCommand) -> Result<()> {
        self.sender()?.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => anyhow!("motion queue is full"),
            mpsc::error::TrySendError::Closed(_) => anyhow!("motion worker stopped"),
        })
    }
}

async fn run_worker(
    driver: Arc<dyn StageDriver>,
    mut rx: mpsc::Receiver<MotionCommand>,
    stats: Arc<MotionStats>,
) {
    while let Some(command) = rx.recv().await {
        let result = match command {
            MotionCommand::MoveBy(v) => {
                debug!(dx_um = v.dx_um, dy_um = v.dy_um, "Stage move");
                driver.move_relative(v.dx_um, v.dy_um).await
            }
            MotionCommand::Home => {
                debug!("Stage home");
                driver.home().await
            }
            MotionCommand::Barrier(done) => {
                let _ = done.send(());
                continue;
            }
        };
        match result {
            Ok(()) => {
                stats.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Stage command failed");
            }
        }
    }
    debug!("Motion worker drained");
}

#[async_trait]
impl MotionAdapter for MotionQueue {
    fn is_connected(&self) -> bool {
        self.tx.lock().is_some() && self.driver.is_connected()
    }

    fn move_by(&self, dx_um: f64, dy_um: f64) -> Result<()> {
        self.enqueue(MotionCommand::MoveBy(MotionVector::new(dx_um, dy_um)))
    }

    fn move_home(&self) -> Result<()> {
        self.enqueue(MotionCommand::Home)
    }

    async fn shutdown(&self) -> Result<()> {
        // Dropping the sender lets the worker drain and exit.
        drop(self.tx.lock().take());
        let worker = self.worker.lock().take();
        if let Some(handle) = worker {
            handle
                .await
                .map_err(|e| anyhow!("motion worker panicked: {e}"))?;
        }
        Ok(())
    }
}
