//! Error types for ideka-pipeline
//!
//! Two layers: [`StageError`] is what collaborators (sources, codecs, pipes,
//! drains) report; [`PipelineError`] is what the orchestrator reports, always
//! naming the failing collaborator alongside the underlying cause.

use ideka_common::PipelineState;
use std::fmt;
use thiserror::Error;

/// Identity of a collaborator or internal stage task, used to localize faults
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Collaborator {
    /// Source registered under the given id
    Source(String),
    /// Codec registered under the given id
    Codec(String),
    /// Pipe at the given position in the transform order
    Pipe(usize),
    /// Drain registered under the given id
    Drain(String),
    /// Task moving admitted audio into the first link
    Feeder,
    /// Task copying the last link to every drain
    FanOut,
    /// Task joining the stage tasks of a run
    Supervisor,
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collaborator::Source(id) => write!(f, "source \"{}\"", id),
            Collaborator::Codec(id) => write!(f, "codec \"{}\"", id),
            Collaborator::Pipe(index) => write!(f, "pipe at index {}", index),
            Collaborator::Drain(id) => write!(f, "drain \"{}\"", id),
            Collaborator::Feeder => write!(f, "feeder"),
            Collaborator::FanOut => write!(f, "drain fan-out"),
            Collaborator::Supervisor => write!(f, "supervisor"),
        }
    }
}

/// Errors reported by collaborators and stage links
#[derive(Error, Debug)]
pub enum StageError {
    /// Source could not resolve the query
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend cannot serve requests right now
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Codec rejected or failed to transform a stream
    #[error("Codec error: {0}")]
    Codec(String),

    /// The run was cancelled (purge or teardown), distinct from end-of-stream
    #[error("Cancelled")]
    Cancelled,

    /// Downstream link has no receiver any more
    #[error("Downstream link closed")]
    Closed,

    /// I/O error inside a collaborator
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other collaborator failure
    #[error("{0}")]
    Other(String),
}

impl StageError {
    /// True for the cancellation signal, which is not a stage failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StageError::Cancelled)
    }
}

/// Registry or configuration problems detected by `Pipeline::init`
#[derive(Error, Debug)]
pub enum ConfigError {
    /// One or more registries absent or empty
    #[error("incomplete pipeline: missing {}", .missing.join(", "))]
    Incomplete { missing: Vec<&'static str> },

    /// Configuration values out of range
    #[error("invalid configuration: {0}")]
    Invalid(#[from] ideka_common::Error),
}

/// Admission failures reported by `Pipeline::queue`
#[derive(Error, Debug)]
pub enum QueueError {
    /// Work buffer at PreLoad capacity; nothing was admitted or dropped
    #[error("work buffer full (capacity {capacity})")]
    Full { capacity: usize },

    /// Candidate list names a source that is not registered
    #[error("unknown source \"{0}\"")]
    UnknownSource(String),

    /// No source was eligible to resolve the query
    #[error("no candidate source for query \"{query}\"")]
    NoCandidates { query: String },

    /// Every candidate source failed; carries the first failure
    #[error("query \"{query}\" unresolved by {collaborator}: {source}")]
    Unresolved {
        query: String,
        collaborator: Collaborator,
        #[source]
        source: StageError,
    },

    /// Resolved audio uses an encoding with no registered codec
    #[error("no codec registered for encoding \"{encoding}\" (from source \"{source_id}\")")]
    UnknownCodec { encoding: String, source_id: String },

    /// Codec refused the stream while preparing it at admission
    #[error("{collaborator} rejected query \"{query}\": {source}")]
    Codec {
        query: String,
        collaborator: Collaborator,
        #[source]
        source: StageError,
    },
}

/// Orchestrator error type
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Missing registries or invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A collaborator's init failed
    #[error("Error initializing {collaborator}: {source}")]
    Init {
        collaborator: Collaborator,
        #[source]
        source: StageError,
    },

    /// A stage failed while the pipeline was running
    #[error("Stage failure in {collaborator}: {source}")]
    Runtime {
        collaborator: Collaborator,
        #[source]
        source: StageError,
    },

    /// Query could not be admitted
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// A collaborator's purge failed (first failure of the sweep)
    #[error("Error purging {collaborator}: {source}")]
    Purge {
        collaborator: Collaborator,
        #[source]
        source: StageError,
    },

    /// Operation not permitted in the current lifecycle state
    #[error("Invalid state: cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: PipelineState,
    },
}

impl PipelineError {
    /// Collaborator the error is attributed to, if any
    pub fn collaborator(&self) -> Option<&Collaborator> {
        match self {
            PipelineError::Init { collaborator, .. }
            | PipelineError::Runtime { collaborator, .. }
            | PipelineError::Purge { collaborator, .. } => Some(collaborator),
            PipelineError::Queue(QueueError::Unresolved { collaborator, .. })
            | PipelineError::Queue(QueueError::Codec { collaborator, .. }) => Some(collaborator),
            _ => None,
        }
    }
}

/// Convenience Result type using PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;
