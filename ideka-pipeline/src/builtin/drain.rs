//! Terminal sinks

use crate::error::StageError;
use crate::stage::{AudioDrain, StageInput};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Collects every byte it receives in memory
#[derive(Debug, Default)]
pub struct CollectDrain {
    buffer: Mutex<Vec<u8>>,
}

impl CollectDrain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything drained since the last purge
    pub fn contents(&self) -> Vec<u8> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AudioDrain for CollectDrain {
    async fn drain(&self, mut input: StageInput) -> Result<(), StageError> {
        while let Some(chunk) = input.recv().await? {
            self.buffer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(&chunk);
        }
        Ok(())
    }

    async fn purge(&self) -> Result<(), StageError> {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        debug!("Collect drain discarding {} bytes", buffer.len());
        buffer.clear();
        Ok(())
    }
}

/// Counts and discards
#[derive(Debug, Default)]
pub struct NullDrain {
    drained: AtomicU64,
}

impl NullDrain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes_drained(&self) -> u64 {
        self.drained.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AudioDrain for NullDrain {
    async fn drain(&self, mut input: StageInput) -> Result<(), StageError> {
        while let Some(chunk) = input.recv().await? {
            self.drained.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn purge(&self) -> Result<(), StageError> {
        self.drained.store(0, Ordering::Relaxed);
        Ok(())
    }
}
