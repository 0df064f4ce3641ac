//! Collaborator registries and the pipeline builder

use super::Pipeline;
use crate::stage::{AudioCodec, AudioDrain, AudioPipe, AudioSource};
use ideka_common::PipelineConfig;
use std::collections::BTreeMap;
use std::sync::Arc;

pub(crate) type SourceMap = BTreeMap<String, Arc<dyn AudioSource>>;
pub(crate) type CodecMap = BTreeMap<String, Arc<dyn AudioCodec>>;
pub(crate) type DrainMap = BTreeMap<String, Arc<dyn AudioDrain>>;

/// Id-keyed collaborators plus the ordered pipe chain
///
/// Each registry is optional so an incomplete pipeline can be built and
/// rejected by `init`. Maps iterate in id order, which fixes the order of
/// init and purge sweeps.
#[derive(Default)]
pub(crate) struct Registries {
    pub(crate) sources: Option<SourceMap>,
    pub(crate) codecs: Option<CodecMap>,
    pub(crate) pipes: Option<Vec<Arc<dyn AudioPipe>>>,
    pub(crate) drains: Option<DrainMap>,
}

impl Registries {
    /// Names of registries that are absent or empty
    pub(crate) fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.sources.as_ref().map_or(true, BTreeMap::is_empty) {
            missing.push("sources");
        }
        if self.codecs.as_ref().map_or(true, BTreeMap::is_empty) {
            missing.push("codecs");
        }
        if self.pipes.as_ref().map_or(true, Vec::is_empty) {
            missing.push("pipes");
        }
        if self.drains.as_ref().map_or(true, BTreeMap::is_empty) {
            missing.push("drains");
        }
        missing
    }

    pub(crate) fn sources(&self) -> impl Iterator<Item = (&String, &Arc<dyn AudioSource>)> {
        self.sources.iter().flatten()
    }

    pub(crate) fn source_entry(&self, id: &str) -> Option<(&String, &Arc<dyn AudioSource>)> {
        self.sources
            .as_ref()
            .and_then(|sources| sources.get_key_value(id))
    }

    pub(crate) fn codec(&self, id: &str) -> Option<&Arc<dyn AudioCodec>> {
        self.codecs.as_ref().and_then(|codecs| codecs.get(id))
    }

    pub(crate) fn codec_map(&self) -> CodecMap {
        self.codecs.clone().unwrap_or_default()
    }

    pub(crate) fn pipes(&self) -> impl Iterator<Item = &Arc<dyn AudioPipe>> {
        self.pipes.iter().flatten()
    }

    pub(crate) fn pipe_count(&self) -> usize {
        self.pipes.as_ref().map_or(0, Vec::len)
    }

    pub(crate) fn drains(&self) -> impl Iterator<Item = (&String, &Arc<dyn AudioDrain>)> {
        self.drains.iter().flatten()
    }
}

/// Builder for [`Pipeline`]
///
/// # Examples
///
/// ```
/// use ideka_pipeline::builtin::{CollectDrain, MemorySource, PassthroughPipe, PcmCodec};
/// use ideka_pipeline::{Pipeline, PipelineConfig};
/// use std::sync::Arc;
///
/// let pipeline = Pipeline::builder()
///     .config(PipelineConfig::new(4, 1))
///     .source("memory", Arc::new(MemorySource::new(4096)))
///     .codec(PcmCodec::ENCODING, Arc::new(PcmCodec))
///     .pipe(Arc::new(PassthroughPipe))
///     .drain("collect", Arc::new(CollectDrain::new()))
///     .build();
///
/// assert_eq!(pipeline.pipe_count(), 1);
/// ```
#[derive(Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
    registries: Registries,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a source under `id` (replaces an existing one)
    pub fn source(mut self, id: impl Into<String>, source: Arc<dyn AudioSource>) -> Self {
        self.registries
            .sources
            .get_or_insert_with(BTreeMap::new)
            .insert(id.into(), source);
        self
    }

    /// Register a codec for the encoding identifier `id`
    pub fn codec(mut self, id: impl Into<String>, codec: Arc<dyn AudioCodec>) -> Self {
        self.registries
            .codecs
            .get_or_insert_with(BTreeMap::new)
            .insert(id.into(), codec);
        self
    }

    /// Append a pipe to the transform chain
    pub fn pipe(mut self, pipe: Arc<dyn AudioPipe>) -> Self {
        self.registries
            .pipes
            .get_or_insert_with(Vec::new)
            .push(pipe);
        self
    }

    pub fn drain(mut self, id: impl Into<String>, drain: Arc<dyn AudioDrain>) -> Self {
        self.registries
            .drains
            .get_or_insert_with(BTreeMap::new)
            .insert(id.into(), drain);
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline::new(self.config, self.registries)
    }
}
