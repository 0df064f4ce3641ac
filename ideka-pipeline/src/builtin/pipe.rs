//! Transform stages

use crate::error::StageError;
use crate::stage::{AudioPipe, StageInput, StageOutput};
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::{Mutex, PoisonError};

/// Forwards every chunk unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughPipe;

#[async_trait]
impl AudioPipe for PassthroughPipe {
    async fn pipe(&self, mut input: StageInput, output: StageOutput) -> Result<(), StageError> {
        while let Some(chunk) = input.recv().await? {
            output.send(chunk).await?;
        }
        Ok(())
    }

    async fn purge(&self) -> Result<(), StageError> {
        Ok(())
    }
}

/// Scales signed 16-bit little-endian samples by a constant factor
///
/// Chunks may split a sample; the odd trailing byte is carried into the next
/// chunk. Results saturate at the i16 range.
pub struct GainPipe {
    gain: f32,
    carry: Mutex<Option<u8>>,
}

impl GainPipe {
    pub fn new(gain: f32) -> Self {
        Self {
            gain,
            carry: Mutex::new(None),
        }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Byte held back from the last chunk, if any
    pub fn pending_byte(&self) -> Option<u8> {
        *self.carry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn scale(&self, chunk: &[u8]) -> Bytes {
        let mut carry = self.carry.lock().unwrap_or_else(PoisonError::into_inner);

        let mut joined = Vec::with_capacity(chunk.len() + 1);
        joined.extend(carry.take());
        joined.extend_from_slice(chunk);

        let mut pairs = joined.chunks_exact(2);
        let mut out = BytesMut::with_capacity(joined.len());
        for pair in &mut pairs {
            let sample = f32::from(i16::from_le_bytes([pair[0], pair[1]])) * self.gain;
            out.put_i16_le(sample.clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16);
        }
        *carry = pairs.remainder().first().copied();
        out.freeze()
    }

    fn take_carry(&self) -> Option<u8> {
        self.carry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[async_trait]
impl AudioPipe for GainPipe {
    async fn pipe(&self, mut input: StageInput, output: StageOutput) -> Result<(), StageError> {
        while let Some(chunk) = input.recv().await? {
            let scaled = self.scale(&chunk);
            output.send(scaled).await?;
        }
        // Half a sample at end of stream passes through untouched
        if let Some(byte) = self.take_carry() {
            output.send(Bytes::copy_from_slice(&[byte])).await?;
        }
        Ok(())
    }

    async fn purge(&self) -> Result<(), StageError> {
        self.take_carry();
        Ok(())
    }
}
