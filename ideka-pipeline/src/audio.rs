//! Audio stream descriptors and source queries

use crate::error::StageError;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lazy byte stream of encoded or raw audio
///
/// Chunks are produced on demand; errors flow in-band so a codec or source
/// can fail mid-stream without a side channel.
pub type AudioStream = BoxStream<'static, Result<Bytes, StageError>>;

/// Audio stream descriptor produced by a source
pub struct Audio {
    /// Encoding identifier; selects the codec used to decode `samples`
    pub encoding: String,
    pub channels: u16,
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub samples: AudioStream,
}

impl Audio {
    pub fn new(
        encoding: impl Into<String>,
        channels: u16,
        sample_rate: u32,
        bit_depth: u16,
        samples: AudioStream,
    ) -> Self {
        Self {
            encoding: encoding.into(),
            channels,
            sample_rate,
            bit_depth,
            samples,
        }
    }

    /// Replace the sample stream, keeping the format fields
    pub fn map_samples<F>(self, f: F) -> Result<Self, StageError>
    where
        F: FnOnce(AudioStream) -> Result<AudioStream, StageError>,
    {
        let samples = f(self.samples)?;
        Ok(Self { samples, ..self })
    }
}

impl fmt::Debug for Audio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Audio")
            .field("encoding", &self.encoding)
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .field("bit_depth", &self.bit_depth)
            .finish_non_exhaustive()
    }
}

/// Stream an in-memory buffer in `chunk_size` slices without copying
pub fn chunked_stream(data: Bytes, chunk_size: usize) -> AudioStream {
    let chunk_size = chunk_size.max(1);
    stream::unfold(data, move |mut rest| async move {
        if rest.is_empty() {
            return None;
        }
        let take = chunk_size.min(rest.len());
        let chunk = rest.split_to(take);
        Some((Ok(chunk), rest))
    })
    .boxed()
}

/// Query handed to sources
///
/// Which field wins (id, search term, candidate list) is up to each source;
/// the orchestrator only uses `sources` to pick which sources to ask.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioQuery {
    pub id: Option<String>,
    pub search_term: Option<String>,
    pub sources: Option<Vec<String>>,
}

impl AudioQuery {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn by_search(term: impl Into<String>) -> Self {
        Self {
            search_term: Some(term.into()),
            ..Self::default()
        }
    }

    /// Restrict resolution to the given source ids, tried in order
    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = Some(sources.into_iter().map(Into::into).collect());
        self
    }

    /// Short human-readable label for logs and errors
    pub fn label(&self) -> String {
        match (&self.id, &self.search_term) {
            (Some(id), _) => id.clone(),
            (None, Some(term)) => format!("search:{}", term),
            (None, None) => "<empty>".to_string(),
        }
    }
}
