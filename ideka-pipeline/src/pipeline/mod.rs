//! Pipeline orchestrator
//!
//! Owns the collaborator registries, the channel array (one link per stage
//! boundary, pipes + 1 in total), the pending-query queue and the bounded
//! work buffer.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized --init--> Initialized --run--> Running --purge--> Purged
//!                              ^                  |                  |
//!                              +------wait--------+                  |
//!                              +------------------init---------------+
//!                                                 ^------run---------+
//! ```
//!
//! `init`, `run`, `queue` and `purge` all hold the state lock for their whole
//! duration, so they never interleave. Stage tasks only see their own links.
//!
//! # Admission
//!
//! `queue` rejects with `QueueError::Full` once PreLoad entries are waiting;
//! it never blocks for space. Entries admitted while fewer than PreProcess
//! entries are waiting are decoded at admission, the rest when the feeder
//! reaches them.

mod registry;
mod supervisor;
mod tasks;
mod work_buffer;

pub use registry::PipelineBuilder;
pub use supervisor::STAGE_SHUTDOWN_TIMEOUT;

use crate::audio::{Audio, AudioQuery};
use crate::error::{Collaborator, ConfigError, PipelineError, QueueError, Result, StageError};
use crate::stage::{stage_link, wire_links, AudioDrain, StageInput, StageLink, StageOutput};
use ideka_common::{EventBus, PipelineConfig, PipelineEvent, PipelineState};
use registry::Registries;
use std::collections::VecDeque;
use std::sync::Arc;
use supervisor::{ActiveRun, StageSet};
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;
use work_buffer::{WorkBuffer, WorkItem};

/// Orchestrator-owned mutable state
struct Inner {
    state: PipelineState,
    query_queue: VecDeque<AudioQuery>,
    work: Option<WorkBuffer>,
    channels: Vec<StageLink>,
    active: Option<ActiveRun>,
}

/// Audio pipeline orchestrator
///
/// Share it behind an `Arc` to queue from several tasks; every operation
/// takes `&self`.
pub struct Pipeline {
    config: PipelineConfig,
    registries: Registries,
    events: EventBus,
    inner: Mutex<Inner>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub(crate) fn new(config: PipelineConfig, registries: Registries) -> Self {
        let events = EventBus::new(config.event_capacity.max(1));
        Self {
            config,
            registries,
            events,
            inner: Mutex::new(Inner {
                state: PipelineState::Uninitialized,
                query_queue: VecDeque::new(),
                work: None,
                channels: Vec::new(),
                active: None,
            }),
        }
    }

    /// Validate registries, allocate buffers and links, init collaborators
    ///
    /// Sources, then pipes, then drains are initialized in order; the first
    /// failure aborts with the collaborator's id or index and leaves the
    /// pipeline `Uninitialized`. Already-initialized collaborators are not
    /// rolled back. Calling `init` again is safe: an active run is cancelled
    /// and joined, and the previous buffer and links are dropped.
    pub async fn init(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if let Some(run) = inner.active.take() {
            self.teardown(run, "re-init").await;
        }

        match self.init_locked(inner).await {
            Ok(()) => {
                self.transition(inner, PipelineState::Initialized);
                info!(
                    "Pipeline initialized: {} pipes, {} links, pre_load={}, pre_process={}",
                    self.registries.pipe_count(),
                    inner.channels.len(),
                    self.config.pre_load,
                    self.config.pre_process
                );
                Ok(())
            }
            Err(e) => {
                warn!("Pipeline init failed: {}", e);
                self.transition(inner, PipelineState::Uninitialized);
                Err(e)
            }
        }
    }

    async fn init_locked(&self, inner: &mut Inner) -> Result<()> {
        let missing = self.registries.missing();
        if !missing.is_empty() {
            return Err(ConfigError::Incomplete { missing }.into());
        }
        self.config.validate().map_err(ConfigError::from)?;

        inner.query_queue = VecDeque::new();
        inner.work = Some(WorkBuffer::new(self.config.pre_load as usize));
        inner.channels = self.fresh_links();

        for (id, source) in self.registries.sources() {
            source.init().await.map_err(|e| PipelineError::Init {
                collaborator: Collaborator::Source(id.clone()),
                source: e,
            })?;
            debug!("Initialized source \"{}\"", id);
        }

        for (index, pipe) in self.registries.pipes().enumerate() {
            pipe.init().await.map_err(|e| PipelineError::Init {
                collaborator: Collaborator::Pipe(index),
                source: e,
            })?;
            debug!("Initialized pipe at index {}", index);
        }

        for (id, drain) in self.registries.drains() {
            drain.init().await.map_err(|e| PipelineError::Init {
                collaborator: Collaborator::Drain(id.clone()),
                source: e,
            })?;
            debug!("Initialized drain \"{}\"", id);
        }

        Ok(())
    }

    /// Launch every stage of the chain and return without waiting
    ///
    /// Feeder → pipe 0 → … → pipe n-1 → drain(s), each its own task bound to
    /// adjacent links. Failures are captured by a supervisor: they are
    /// published as `PipelineEvent::StageFailed` and returned by [`wait`].
    ///
    /// [`wait`]: Pipeline::wait
    pub async fn run(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        match inner.state {
            PipelineState::Initialized | PipelineState::Purged => {}
            state => {
                return Err(PipelineError::InvalidState {
                    operation: "run",
                    state,
                })
            }
        }
        let Some((work, queued)) = inner.work.as_ref().map(|w| (w.receiver(), w.len())) else {
            return Err(PipelineError::InvalidState {
                operation: "run",
                state: inner.state,
            });
        };

        if !inner.channels.iter().all(StageLink::is_wired) {
            inner.channels = self.fresh_links();
        }

        let cancel = CancellationToken::new();
        let run_id = Uuid::new_v4();
        let (head, pairs, tail) =
            take_wiring(&mut inner.channels, &cancel).ok_or(PipelineError::InvalidState {
                operation: "run",
                state: inner.state,
            })?;

        let mut stages = StageSet::new();
        stages.spawn(
            Collaborator::Feeder,
            tasks::feed(work, self.registries.codec_map(), head),
        );

        let chain = pairs.into_iter().zip(self.registries.pipes());
        for (index, ((input, output), pipe)) in chain.enumerate() {
            let pipe = Arc::clone(pipe);
            stages.spawn(Collaborator::Pipe(index), async move {
                pipe.pipe(input, output).await
            });
        }

        let mut drains: Vec<(String, Arc<dyn AudioDrain>)> = self
            .registries
            .drains()
            .map(|(id, drain)| (id.clone(), Arc::clone(drain)))
            .collect();

        if drains.len() == 1 {
            if let Some((id, drain)) = drains.pop() {
                stages.spawn(Collaborator::Drain(id), async move { drain.drain(tail).await });
            }
        } else {
            let mut outputs = Vec::with_capacity(drains.len());
            for (id, drain) in drains {
                let (output, input) = stage_link(self.config.channel_capacity, &cancel);
                outputs.push(output);
                stages.spawn(Collaborator::Drain(id), async move { drain.drain(input).await });
            }
            stages.spawn(Collaborator::FanOut, tasks::fan_out(tail, outputs));
        }

        let stage_count = stages.len();
        self.transition(inner, PipelineState::Running);
        info!(
            "Run {} started: {} stage tasks, {} entries queued",
            run_id, stage_count, queued
        );
        self.events.emit_lossy(PipelineEvent::RunStarted {
            run_id,
            stages: stage_count,
            timestamp: chrono::Utc::now(),
        });

        inner.active = Some(ActiveRun::supervise(
            run_id,
            stages,
            cancel,
            self.events.clone(),
        ));

        Ok(())
    }

    /// Wait for the active run to finish on its own
    ///
    /// Returns the first stage failure as `PipelineError::Runtime`. On return
    /// the pipeline is `Initialized` again with fresh links. If the run is
    /// purged or re-initialized meanwhile, or no run is active, returns
    /// `Ok(())`.
    pub async fn wait(&self) -> Result<()> {
        let (run_id, mut done) = {
            let inner = self.inner.lock().await;
            match &inner.active {
                Some(run) => (run.run_id, run.done.clone()),
                None => return Ok(()),
            }
        };

        // Sender dropped means the supervisor is gone; join below either way
        let _ = done.wait_for(|finished| *finished).await;

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if inner.active.as_ref().map(|run| run.run_id) != Some(run_id) {
            return Ok(());
        }
        let Some(run) = inner.active.take() else {
            return Ok(());
        };

        let outcome = run.join().await;
        inner.channels = self.fresh_links();
        self.transition(inner, PipelineState::Initialized);

        match outcome {
            Some((collaborator, source)) => Err(PipelineError::Runtime {
                collaborator,
                source,
            }),
            None => Ok(()),
        }
    }

    /// Resolve `id` against the sources and admit the audio
    pub async fn queue(&self, id: &str) -> Result<()> {
        self.queue_query(AudioQuery::by_id(id)).await
    }

    /// Resolve a query and admit the audio at the back of the work buffer
    ///
    /// Candidate sources are `query.sources` in order when given, otherwise
    /// every source in id order; the first success wins. The lifecycle state
    /// is never changed.
    pub async fn queue_query(&self, query: AudioQuery) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if inner.state == PipelineState::Uninitialized {
            return Err(PipelineError::InvalidState {
                operation: "queue",
                state: inner.state,
            });
        }
        let Some(work) = inner.work.as_ref() else {
            return Err(PipelineError::InvalidState {
                operation: "queue",
                state: inner.state,
            });
        };

        if work.is_full() {
            debug!("Rejecting \"{}\": work buffer full", query.label());
            return Err(QueueError::Full {
                capacity: work.capacity(),
            }
            .into());
        }

        let label = query.label();
        inner.query_queue.push_back(query.clone());
        let resolved = self.resolve(&query).await;
        inner.query_queue.pop_back();
        let (source_id, audio) = resolved?;

        let encoding = audio.encoding.clone();
        let Some(codec) = self.registries.codec(&encoding) else {
            return Err(QueueError::UnknownCodec {
                encoding,
                source_id,
            }
            .into());
        };

        let prepared = work.len() < self.config.pre_process as usize;
        let audio = if prepared {
            audio
                .map_samples(|samples| codec.decode(samples))
                .map_err(|e| QueueError::Codec {
                    query: label.clone(),
                    collaborator: Collaborator::Codec(encoding.clone()),
                    source: e,
                })?
        } else {
            audio
        };

        let queued = work.try_admit(WorkItem {
            query: label.clone(),
            source_id: source_id.clone(),
            audio,
            prepared,
        })?;

        debug!(
            "Admitted \"{}\" from source \"{}\" ({} queued, prepared={})",
            label, source_id, queued, prepared
        );
        self.events.emit_lossy(PipelineEvent::AudioAdmitted {
            query: label,
            source_id,
            encoding,
            queued,
            timestamp: chrono::Utc::now(),
        });

        Ok(())
    }

    async fn resolve(&self, query: &AudioQuery) -> std::result::Result<(String, Audio), QueueError> {
        let label = query.label();
        let candidates = match query.sources.as_deref() {
            Some(ids) if !ids.is_empty() => ids
                .iter()
                .map(|id| {
                    self.registries
                        .source_entry(id)
                        .ok_or_else(|| QueueError::UnknownSource(id.clone()))
                })
                .collect::<std::result::Result<Vec<_>, _>>()?,
            _ => self.registries.sources().collect(),
        };

        let mut first_failure: Option<(String, StageError)> = None;
        for (id, source) in candidates {
            match source.get(query).await {
                Ok(audio) => {
                    debug!("Query \"{}\" resolved by source \"{}\": {:?}", label, id, audio);
                    return Ok((id.clone(), audio));
                }
                Err(e) => {
                    debug!("Source \"{}\" could not resolve \"{}\": {}", id, label, e);
                    if first_failure.is_none() {
                        first_failure = Some((id.clone(), e));
                    }
                }
            }
        }

        Err(match first_failure {
            Some((id, source)) => QueueError::Unresolved {
                query: label,
                collaborator: Collaborator::Source(id),
                source,
            },
            None => QueueError::NoCandidates { query: label },
        })
    }

    /// Cancel any active run, clear queued work and purge every pipe and drain
    ///
    /// The sweep visits all pipes (in order) and then all drains even when
    /// one fails; the first failure is returned and later ones are logged.
    /// Afterwards the links are rebuilt and the pipeline is `Purged`, ready
    /// for `run`. From `Uninitialized` only the collaborator sweep happens.
    pub async fn purge(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if let Some(run) = inner.active.take() {
            self.teardown(run, "purge").await;
        }

        let pending = inner.query_queue.len();
        inner.query_queue.clear();
        let discarded = match inner.work.as_ref() {
            Some(work) => work.clear().await,
            None => 0,
        };

        let mut first_error: Option<PipelineError> = None;
        for (index, pipe) in self.registries.pipes().enumerate() {
            if let Err(e) = pipe.purge().await {
                record_purge_failure(&mut first_error, Collaborator::Pipe(index), e);
            }
        }
        for (id, drain) in self.registries.drains() {
            if let Err(e) = drain.purge().await {
                record_purge_failure(&mut first_error, Collaborator::Drain(id.clone()), e);
            }
        }

        if inner.state != PipelineState::Uninitialized {
            inner.channels = self.fresh_links();
            self.transition(inner, PipelineState::Purged);
        }

        info!(
            "Purge complete: {} pending queries and {} queued entries discarded",
            pending, discarded
        );
        self.events.emit_lossy(PipelineEvent::Purged {
            first_error: first_error.as_ref().map(ToString::to_string),
            timestamp: chrono::Utc::now(),
        });

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Current lifecycle state
    pub async fn state(&self) -> PipelineState {
        self.inner.lock().await.state
    }

    /// Length of the channel array (pipes + 1 once initialized)
    pub async fn channel_count(&self) -> usize {
        self.inner.lock().await.channels.len()
    }

    /// Entries waiting in the work buffer
    pub async fn queued_len(&self) -> usize {
        self.inner
            .lock()
            .await
            .work
            .as_ref()
            .map_or(0, WorkBuffer::len)
    }

    /// Queries admitted for resolution but not yet resolved
    ///
    /// Non-zero only when a `queue` call was abandoned mid-resolution.
    pub async fn pending_queries(&self) -> usize {
        self.inner.lock().await.query_queue.len()
    }

    /// Subscribe to lifecycle, admission and stage events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn pipe_count(&self) -> usize {
        self.registries.pipe_count()
    }

    fn fresh_links(&self) -> Vec<StageLink> {
        wire_links(self.registries.pipe_count() + 1, self.config.channel_capacity)
    }

    async fn teardown(&self, run: ActiveRun, reason: &str) {
        let run_id = run.run_id;
        match run.shutdown().await {
            Some((stage, e)) => warn!(
                "Run {} torn down for {} after {} failed: {}",
                run_id, reason, stage, e
            ),
            None => info!("Run {} torn down for {}", run_id, reason),
        }
    }

    fn transition(&self, inner: &mut Inner, new_state: PipelineState) {
        let old_state = inner.state;
        if old_state == new_state {
            return;
        }
        inner.state = new_state;
        info!("Pipeline state: {} -> {}", old_state, new_state);
        self.events.emit_lossy(PipelineEvent::StateChanged {
            old_state,
            new_state,
            timestamp: chrono::Utc::now(),
        });
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Some(run) = self.inner.get_mut().active.take() {
            run.cancel.cancel();
        }
    }
}

/// Take every link end for one run
///
/// Returns the feeder's output, one (input, output) pair per pipe and the
/// input the drains read from.
fn take_wiring(
    channels: &mut [StageLink],
    cancel: &CancellationToken,
) -> Option<(StageOutput, Vec<(StageInput, StageOutput)>, StageInput)> {
    let (first, rest) = channels.split_first_mut()?;
    let head = first.take_output(cancel)?;
    let mut upstream = first.take_input(cancel)?;
    let mut pairs = Vec::with_capacity(rest.len());
    for link in rest {
        let output = link.take_output(cancel)?;
        pairs.push((upstream, output));
        upstream = link.take_input(cancel)?;
    }
    Some((head, pairs, upstream))
}

fn record_purge_failure(
    first_error: &mut Option<PipelineError>,
    collaborator: Collaborator,
    source: StageError,
) {
    if first_error.is_none() {
        warn!("Error purging {}: {}", collaborator, source);
        *first_error = Some(PipelineError::Purge {
            collaborator,
            source,
        });
    } else {
        warn!("Error purging {} (after earlier failure): {}", collaborator, source);
    }
}
