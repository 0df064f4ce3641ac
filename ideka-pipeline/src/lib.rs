//! # Ideka Audio Pipeline Library (ideka-pipeline)
//!
//! Streaming audio pipeline orchestrator.
//!
//! **Purpose:** Resolve queries into audio streams, decode them, push the bytes
//! through an ordered chain of transform stages and hand the result to one or
//! more terminal drains.
//!
//! **Architecture:** One tokio task per stage, linked by bounded channels of
//! `Bytes` with a per-run cancellation token. A supervisor joins the stages
//! and reports the first failure.
//!
//! ```text
//! query → Source.get → Codec.decode → feeder → link0 → pipe0 → link1 → … → drain(s)
//! ```

pub mod audio;
pub mod builtin;
pub mod error;
pub mod pipeline;
pub mod stage;

pub use audio::{Audio, AudioQuery, AudioStream};
pub use error::{Collaborator, ConfigError, PipelineError, QueueError, Result, StageError};
pub use pipeline::{Pipeline, PipelineBuilder, STAGE_SHUTDOWN_TIMEOUT};
pub use stage::{AudioCodec, AudioDrain, AudioPipe, AudioSource, StageInput, StageOutput};

pub use ideka_common::{PipelineConfig, PipelineEvent, PipelineState};
