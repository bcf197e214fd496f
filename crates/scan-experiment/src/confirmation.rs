//! Operator confirmation of the previewed scan area.
//!
//! The sequencer posts an [`ConfirmationRequest`] on an mpsc channel and
//! suspends on the request's oneshot responder. Whatever owns the receiving
//! end (a terminal prompt, a UI, a test) answers with [`ConfirmationRequest::respond`].
//! A request that is dropped unanswered counts as "no".

use async_trait::async_trait;
use scan_core::{AreaSummary, ConfirmationAdapter};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

/// One pending question to the operator.
#[derive(Debug)]
pub struct ConfirmationRequest {
    /// Area about to be scanned
    pub summary: AreaSummary,
    responder: oneshot::Sender<bool>,
}

impl ConfirmationRequest {
    /// Answer the request; `true` proceeds with the scan.
    pub fn respond(self, accepted: bool) {
        if self.responder.send(accepted).is_err() {
            warn!("Confirmation answered after the sequencer stopped waiting");
        }
    }
}

/// Sequencer side of the confirmation channel.
#[derive(Debug, Clone)]
pub struct ConfirmationRequester {
    tx: mpsc::Sender<ConfirmationRequest>,
}

/// Create a confirmation channel.
pub fn confirmation_channel(
    capacity: usize,
) -> (ConfirmationRequester, mpsc::Receiver<ConfirmationRequest>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ConfirmationRequester { tx }, rx)
}

#[async_trait]
impl ConfirmationAdapter for ConfirmationRequester {
    async fn confirm_area(&self, summary: AreaSummary) -> bool {
        let (responder, answer) = oneshot::channel();
        if self
            .tx
            .send(ConfirmationRequest { summary, responder })
            .await
            .is_err()
        {
            warn!("No one is listening for confirmations; treating as rejected");
            return false;
        }
        answer.await.unwrap_or(false)
    }
}

/// Answers every request with a fixed value.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

#[async_trait]
impl ConfirmationAdapter for AutoConfirm {
    async fn confirm_area(&self, _summary: AreaSummary) -> bool {
        self.0
    }
}
