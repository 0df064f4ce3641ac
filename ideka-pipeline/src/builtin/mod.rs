//! Reference collaborators
//!
//! Small in-process implementations of the four collaborator traits. They
//! back the demo binary and the tests; real deployments register their own.

mod codec;
mod drain;
mod pipe;
mod source;

pub use codec::PcmCodec;
pub use drain::{CollectDrain, NullDrain};
pub use pipe::{GainPipe, PassthroughPipe};
pub use source::{MemorySource, MemoryTrack, SineSource};
