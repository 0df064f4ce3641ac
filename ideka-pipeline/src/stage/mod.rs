//! Collaborator contracts
//!
//! The orchestrator only knows these four traits. Implementations are
//! registered behind `Arc<dyn _>` and referenced by id (sources, codecs,
//! drains) or by position (pipes). Methods take `&self`: a pipe or drain is
//! shared between the orchestrator, which calls `init`/`purge`, and the task
//! running it, so any per-run state needs interior mutability.

pub mod link;

pub use link::{stage_link, wire_links, StageInput, StageLink, StageOutput};

use crate::audio::{Audio, AudioQuery, AudioStream};
use crate::error::StageError;
use async_trait::async_trait;

/// Origin of audio streams
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Backend setup; must be idempotent
    async fn init(&self) -> Result<(), StageError> {
        Ok(())
    }

    /// Resolve a query into an audio stream descriptor
    ///
    /// Return [`StageError::NotFound`] when nothing matches and
    /// [`StageError::Unavailable`] when the backend cannot be reached.
    async fn get(&self, query: &AudioQuery) -> Result<Audio, StageError>;
}

/// Paired stream transform between an encoding and raw samples
///
/// Both directions are stream-to-stream: the returned stream pulls from
/// `input` as it is polled, so the codec runs interleaved with its producer
/// and consumer instead of buffering whole tracks.
pub trait AudioCodec: Send + Sync {
    fn encode(&self, input: AudioStream) -> Result<AudioStream, StageError>;

    fn decode(&self, input: AudioStream) -> Result<AudioStream, StageError>;
}

/// One ordered transform stage
#[async_trait]
pub trait AudioPipe: Send + Sync {
    async fn init(&self) -> Result<(), StageError> {
        Ok(())
    }

    /// Long-lived transform loop for one run
    ///
    /// Consume `input` until it yields `Ok(None)`, writing results to
    /// `output`. Returning drops `output`, which closes the next link.
    /// Cancellation surfaces as [`StageError::Cancelled`] from the link
    /// calls; propagate it with `?`.
    async fn pipe(&self, input: StageInput, output: StageOutput) -> Result<(), StageError>;

    /// Discard buffered state so the stage can serve a new run
    async fn purge(&self) -> Result<(), StageError>;
}

/// Terminal sink
#[async_trait]
pub trait AudioDrain: Send + Sync {
    async fn init(&self) -> Result<(), StageError> {
        Ok(())
    }

    /// Consume `input` until it yields `Ok(None)`
    async fn drain(&self, input: StageInput) -> Result<(), StageError>;

    /// Reset internal state
    async fn purge(&self) -> Result<(), StageError>;
}
