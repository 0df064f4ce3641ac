//! Bounded FIFO of admitted audio
//!
//! Admission never blocks: a full buffer rejects with `QueueError::Full` and
//! leaves existing entries untouched. The feeder takes entries from the
//! front through the shared receiver; nothing else reads it.

use crate::audio::Audio;
use crate::error::QueueError;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// One admitted entry
#[derive(Debug)]
pub(crate) struct WorkItem {
    /// Query label the audio was resolved from
    pub(crate) query: String,
    pub(crate) source_id: String,
    pub(crate) audio: Audio,
    /// `audio.samples` already passed through the codec's decode
    pub(crate) prepared: bool,
}

pub(crate) type WorkReceiver = Arc<Mutex<mpsc::Receiver<WorkItem>>>;

pub(crate) struct WorkBuffer {
    tx: mpsc::Sender<WorkItem>,
    rx: WorkReceiver,
    capacity: usize,
}

impl WorkBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            capacity,
        }
    }

    /// Append at the back; returns the length after admission
    pub(crate) fn try_admit(&self, item: WorkItem) -> Result<usize, QueueError> {
        self.tx
            .try_send(item)
            .map_err(|_| QueueError::Full {
                capacity: self.capacity,
            })?;
        Ok(self.len())
    }

    pub(crate) fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.tx.capacity() == 0
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Receiver handle for the feeder of a run
    pub(crate) fn receiver(&self) -> WorkReceiver {
        Arc::clone(&self.rx)
    }

    /// Drop every waiting entry; returns how many were discarded
    ///
    /// Must only be called once no feeder holds the receiver.
    pub(crate) async fn clear(&self) -> usize {
        let mut rx = self.rx.lock().await;
        let mut discarded = 0;
        while rx.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }
}
