//! Bounded byte links between stages
//!
//! A link is a bounded mpsc channel of `Bytes` chunks. Dropping the
//! [`StageOutput`] closes the link, which the next stage sees as
//! end-of-stream (`recv` returns `Ok(None)`). Cancelling the run token is a
//! separate signal: both ends return [`StageError::Cancelled`], even while
//! blocked on a full or empty link.

use crate::error::StageError;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Receiving end handed to a pipe or drain
#[derive(Debug)]
pub struct StageInput {
    rx: mpsc::Receiver<Bytes>,
    cancel: CancellationToken,
}

impl StageInput {
    /// Next chunk, `Ok(None)` once upstream closed the link
    pub async fn recv(&mut self) -> Result<Option<Bytes>, StageError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StageError::Cancelled),
            chunk = self.rx.recv() => Ok(chunk),
        }
    }

    /// Token cancelled when the run is torn down
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Sending end handed to the feeder or a pipe
#[derive(Debug)]
pub struct StageOutput {
    tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
}

impl StageOutput {
    /// Send one chunk, waiting while the link is full
    ///
    /// Empty chunks are skipped so they never read as a stall downstream.
    pub async fn send(&self, chunk: Bytes) -> Result<(), StageError> {
        if chunk.is_empty() {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StageError::Cancelled),
            sent = self.tx.send(chunk) => sent.map_err(|_| StageError::Closed),
        }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// One entry of the orchestrator's channel array
///
/// Holds both ends until a run takes them; a consumed link keeps its slot so
/// the array length stays pipes + 1.
#[derive(Debug)]
pub struct StageLink {
    tx: Option<mpsc::Sender<Bytes>>,
    rx: Option<mpsc::Receiver<Bytes>>,
    capacity: usize,
}

impl StageLink {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx: Some(tx),
            rx: Some(rx),
            capacity: capacity.max(1),
        }
    }

    /// Take the sending end, bound to the run's cancellation token
    pub fn take_output(&mut self, cancel: &CancellationToken) -> Option<StageOutput> {
        self.tx.take().map(|tx| StageOutput {
            tx,
            cancel: cancel.clone(),
        })
    }

    /// Take the receiving end, bound to the run's cancellation token
    pub fn take_input(&mut self, cancel: &CancellationToken) -> Option<StageInput> {
        self.rx.take().map(|rx| StageInput {
            rx,
            cancel: cancel.clone(),
        })
    }

    /// Both ends still available (not yet handed to a run)
    pub fn is_wired(&self) -> bool {
        self.tx.is_some() && self.rx.is_some()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Build a fresh channel array of `count` links
pub fn wire_links(count: usize, capacity: usize) -> Vec<StageLink> {
    (0..count).map(|_| StageLink::new(capacity)).collect()
}

/// Free-standing link for a stage outside the channel array
pub fn stage_link(capacity: usize, cancel: &CancellationToken) -> (StageOutput, StageInput) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        StageOutput {
            tx,
            cancel: cancel.clone(),
        },
        StageInput {
            rx,
            cancel: cancel.clone(),
        },
    )
}
