//! Test helpers for ideka-pipeline integration tests
//!
//! Instrumented collaborators that count lifecycle calls and can be told to
//! fail or stall, plus small builders for common pipeline shapes.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use ideka_pipeline::audio::chunked_stream;
use ideka_pipeline::builtin::PcmCodec;
use ideka_pipeline::{
    Audio, AudioCodec, AudioDrain, AudioPipe, AudioQuery, AudioSource, AudioStream, Pipeline,
    PipelineBuilder, PipelineConfig, PipelineEvent, StageError, StageInput, StageOutput,
};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Upper bound for any single await in a test
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Await `fut`, failing the test if it does not finish within [`TEST_TIMEOUT`]
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(TEST_TIMEOUT, fut)
        .await
        .expect("operation timed out")
}

/// Source serving fixed PCM payloads by id
pub struct ProbeSource {
    tracks: BTreeMap<String, Bytes>,
    encoding: String,
    chunk_size: usize,
    pub inits: AtomicUsize,
    pub gets: AtomicUsize,
    pub fail_init: AtomicBool,
    pub unavailable: AtomicBool,
}

impl ProbeSource {
    pub fn new() -> Self {
        Self {
            tracks: BTreeMap::new(),
            encoding: PcmCodec::ENCODING.to_string(),
            chunk_size: 4,
            inits: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            fail_init: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn track(mut self, id: &str, data: &'static [u8]) -> Self {
        self.tracks.insert(id.to_string(), Bytes::from_static(data));
        self
    }

    /// Report a different encoding for every track
    pub fn encoding(mut self, encoding: &str) -> Self {
        self.encoding = encoding.to_string();
        self
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSource for ProbeSource {
    async fn init(&self) -> Result<(), StageError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(StageError::Unavailable("probe backend offline".to_string()));
        }
        Ok(())
    }

    async fn get(&self, query: &AudioQuery) -> Result<Audio, StageError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StageError::Unavailable("probe backend offline".to_string()));
        }
        let data = query
            .id
            .as_deref()
            .and_then(|id| self.tracks.get(id))
            .ok_or_else(|| StageError::NotFound(query.label()))?;
        Ok(Audio::new(
            self.encoding.clone(),
            1,
            44100,
            16,
            chunked_stream(data.clone(), self.chunk_size),
        ))
    }
}

/// Codec whose decode is refused
pub struct RejectingCodec;

impl AudioCodec for RejectingCodec {
    fn encode(&self, input: AudioStream) -> Result<AudioStream, StageError> {
        Ok(input)
    }

    fn decode(&self, _input: AudioStream) -> Result<AudioStream, StageError> {
        Err(StageError::Codec("unsupported bitstream".to_string()))
    }
}

/// Pass-through pipe with call counters and injectable faults
#[derive(Default)]
pub struct ProbePipe {
    /// Byte prefixed to every chunk, to make stage order visible
    tag: Option<u8>,
    pub inits: AtomicUsize,
    pub purges: AtomicUsize,
    pub fail_init: AtomicBool,
    pub fail_purge: AtomicBool,
    /// Fail on the first chunk received
    pub fail_on_data: AtomicBool,
    /// Never read input; wait for cancellation instead
    pub stall: AtomicBool,
}

impl ProbePipe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tagged(tag: u8) -> Self {
        Self {
            tag: Some(tag),
            ..Self::default()
        }
    }

    pub fn stalled() -> Self {
        let pipe = Self::default();
        pipe.stall.store(true, Ordering::SeqCst);
        pipe
    }

    pub fn failing_on_data() -> Self {
        let pipe = Self::default();
        pipe.fail_on_data.store(true, Ordering::SeqCst);
        pipe
    }

    pub fn failing_purge() -> Self {
        let pipe = Self::default();
        pipe.fail_purge.store(true, Ordering::SeqCst);
        pipe
    }

    pub fn purges(&self) -> usize {
        self.purges.load(Ordering::SeqCst)
    }

    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioPipe for ProbePipe {
    async fn init(&self) -> Result<(), StageError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(StageError::Other("probe pipe init refused".to_string()));
        }
        Ok(())
    }

    async fn pipe(&self, mut input: StageInput, output: StageOutput) -> Result<(), StageError> {
        if self.stall.load(Ordering::SeqCst) {
            input.cancellation().cancelled().await;
            return Err(StageError::Cancelled);
        }
        while let Some(chunk) = input.recv().await? {
            if self.fail_on_data.load(Ordering::SeqCst) {
                return Err(StageError::Other("corrupt frame".to_string()));
            }
            let chunk = match self.tag {
                Some(tag) => {
                    let mut tagged = Vec::with_capacity(chunk.len() + 1);
                    tagged.push(tag);
                    tagged.extend_from_slice(&chunk);
                    Bytes::from(tagged)
                }
                None => chunk,
            };
            output.send(chunk).await?;
        }
        Ok(())
    }

    async fn purge(&self) -> Result<(), StageError> {
        self.purges.fetch_add(1, Ordering::SeqCst);
        if self.fail_purge.load(Ordering::SeqCst) {
            return Err(StageError::Other("probe pipe purge refused".to_string()));
        }
        Ok(())
    }
}

/// Drain recording bytes and lifecycle calls
#[derive(Default)]
pub struct ProbeDrain {
    bytes: Mutex<Vec<u8>>,
    chunks: AtomicUsize,
    pub inits: AtomicUsize,
    pub purges: AtomicUsize,
    pub fail_purge: AtomicBool,
}

impl ProbeDrain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_purge() -> Self {
        let drain = Self::default();
        drain.fail_purge.store(true, Ordering::SeqCst);
        drain
    }

    pub fn contents(&self) -> Vec<u8> {
        self.bytes.lock().unwrap().clone()
    }

    pub fn chunks(&self) -> usize {
        self.chunks.load(Ordering::SeqCst)
    }

    pub fn purges(&self) -> usize {
        self.purges.load(Ordering::SeqCst)
    }

    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioDrain for ProbeDrain {
    async fn init(&self) -> Result<(), StageError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn drain(&self, mut input: StageInput) -> Result<(), StageError> {
        while let Some(chunk) = input.recv().await? {
            self.chunks.fetch_add(1, Ordering::SeqCst);
            self.bytes.lock().unwrap().extend_from_slice(&chunk);
        }
        Ok(())
    }

    async fn purge(&self) -> Result<(), StageError> {
        self.purges.fetch_add(1, Ordering::SeqCst);
        self.bytes.lock().unwrap().clear();
        if self.fail_purge.load(Ordering::SeqCst) {
            return Err(StageError::Other("probe drain purge refused".to_string()));
        }
        Ok(())
    }
}

/// Builder pre-loaded with a PCM codec and the given config
pub fn pcm_builder(config: PipelineConfig) -> PipelineBuilder {
    Pipeline::builder()
        .config(config)
        .codec(PcmCodec::ENCODING, Arc::new(PcmCodec))
}

/// source → pcm → pipes → one drain, with default config
pub fn simple_pipeline(
    source: Arc<ProbeSource>,
    pipes: &[Arc<ProbePipe>],
    drain: Arc<ProbeDrain>,
) -> Pipeline {
    let mut builder = pcm_builder(PipelineConfig::default()).source("probe", source);
    for pipe in pipes {
        builder = builder.pipe(pipe.clone());
    }
    builder.drain("probe", drain).build()
}

/// Drain every event currently buffered on `rx`
pub fn drain_events(rx: &mut broadcast::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
