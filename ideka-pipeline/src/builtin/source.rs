//! In-memory and generated audio sources

use super::codec::PcmCodec;
use crate::audio::{chunked_stream, Audio, AudioQuery, AudioStream};
use crate::error::StageError;
use crate::stage::AudioSource;
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// One catalogue entry of a [`MemorySource`]
#[derive(Debug, Clone)]
pub struct MemoryTrack {
    pub title: String,
    pub encoding: String,
    pub channels: u16,
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub data: Bytes,
}

impl MemoryTrack {
    /// Raw signed 16-bit little-endian PCM track
    pub fn pcm_s16le(
        title: impl Into<String>,
        sample_rate: u32,
        channels: u16,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            title: title.into(),
            encoding: PcmCodec::ENCODING.to_string(),
            channels,
            sample_rate,
            bit_depth: 16,
            data: data.into(),
        }
    }
}

/// Id-keyed catalogue of tracks held in memory
///
/// Resolves by id first, then by case-insensitive title match on the search
/// term. Must be initialized before `get`.
pub struct MemorySource {
    chunk_size: usize,
    tracks: BTreeMap<String, MemoryTrack>,
    ready: AtomicBool,
}

impl MemorySource {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            tracks: BTreeMap::new(),
            ready: AtomicBool::new(false),
        }
    }

    pub fn with_track(mut self, id: impl Into<String>, track: MemoryTrack) -> Self {
        self.tracks.insert(id.into(), track);
        self
    }

    fn lookup(&self, query: &AudioQuery) -> Option<&MemoryTrack> {
        if let Some(track) = query.id.as_deref().and_then(|id| self.tracks.get(id)) {
            return Some(track);
        }
        let term = query.search_term.as_deref()?.to_lowercase();
        self.tracks
            .values()
            .find(|track| track.title.to_lowercase() == term)
    }
}

#[async_trait]
impl AudioSource for MemorySource {
    async fn init(&self) -> Result<(), StageError> {
        self.ready.store(true, Ordering::Release);
        debug!("Memory source ready with {} tracks", self.tracks.len());
        Ok(())
    }

    async fn get(&self, query: &AudioQuery) -> Result<Audio, StageError> {
        if !self.ready.load(Ordering::Acquire) {
            return Err(StageError::Unavailable(
                "memory source not initialized".to_string(),
            ));
        }

        let track = self
            .lookup(query)
            .ok_or_else(|| StageError::NotFound(query.label()))?;

        Ok(Audio::new(
            track.encoding.clone(),
            track.channels,
            track.sample_rate,
            track.bit_depth,
            chunked_stream(track.data.clone(), self.chunk_size),
        ))
    }
}

/// Sine tone generator
///
/// Every query resolves to the same tone: mono s16le at 44.1 kHz, generated
/// lazily in blocks of [`SineSource::BLOCK_SAMPLES`].
pub struct SineSource {
    frequency: f32,
    amplitude: f32,
    duration_ms: u64,
}

impl SineSource {
    pub const SAMPLE_RATE: u32 = 44100;
    pub const BLOCK_SAMPLES: usize = 1024;

    /// `amplitude` is clamped to 0.0..=1.0 of full scale
    pub fn new(frequency: f32, amplitude: f32, duration_ms: u64) -> Self {
        Self {
            frequency,
            amplitude: amplitude.clamp(0.0, 1.0),
            duration_ms,
        }
    }

    /// Total samples the tone spans
    pub fn total_samples(&self) -> usize {
        (self.duration_ms * u64::from(Self::SAMPLE_RATE) / 1000) as usize
    }

    fn tone(&self) -> AudioStream {
        let total = self.total_samples();
        let step = 2.0 * std::f32::consts::PI * self.frequency / Self::SAMPLE_RATE as f32;
        let scale = self.amplitude * f32::from(i16::MAX);
        let block_samples = Self::BLOCK_SAMPLES;

        async_stream::stream! {
            let mut produced = 0usize;
            while produced < total {
                let count = block_samples.min(total - produced);
                let mut block = BytesMut::with_capacity(count * 2);
                for n in produced..produced + count {
                    let sample = ((n as f32 * step).sin() * scale) as i16;
                    block.put_i16_le(sample);
                }
                produced += count;
                yield Ok::<_, StageError>(block.freeze());
            }
        }
        .boxed()
    }
}

#[async_trait]
impl AudioSource for SineSource {
    async fn get(&self, _query: &AudioQuery) -> Result<Audio, StageError> {
        Ok(Audio::new(
            PcmCodec::ENCODING,
            1,
            Self::SAMPLE_RATE,
            16,
            self.tone(),
        ))
    }
}
