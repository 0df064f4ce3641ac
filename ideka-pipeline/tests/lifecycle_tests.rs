//! Pipeline lifecycle integration tests
//!
//! Registry validation, init idempotence, init failure localization and the
//! state guards on run/queue.

mod helpers;

use helpers::*;
use ideka_pipeline::builtin::{CollectDrain, PassthroughPipe, PcmCodec};
use ideka_pipeline::{
    Collaborator, ConfigError, Pipeline, PipelineConfig, PipelineError, PipelineEvent,
    PipelineState,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn full_builder() -> ideka_pipeline::PipelineBuilder {
    Pipeline::builder()
        .source("probe", Arc::new(ProbeSource::new().track("a", b"abcd")))
        .codec(PcmCodec::ENCODING, Arc::new(PcmCodec))
        .pipe(Arc::new(PassthroughPipe))
        .drain("collect", Arc::new(CollectDrain::new()))
}

fn missing_of(result: ideka_pipeline::Result<()>) -> Vec<&'static str> {
    match result {
        Err(PipelineError::Config(ConfigError::Incomplete { missing })) => missing,
        other => panic!("expected incomplete config, got {:?}", other),
    }
}

#[tokio::test]
async fn test_init_rejects_each_missing_registry() {
    let no_sources = Pipeline::builder()
        .codec(PcmCodec::ENCODING, Arc::new(PcmCodec))
        .pipe(Arc::new(PassthroughPipe))
        .drain("collect", Arc::new(CollectDrain::new()))
        .build();
    assert_eq!(missing_of(no_sources.init().await), vec!["sources"]);

    let no_codecs = Pipeline::builder()
        .source("probe", Arc::new(ProbeSource::new()))
        .pipe(Arc::new(PassthroughPipe))
        .drain("collect", Arc::new(CollectDrain::new()))
        .build();
    assert_eq!(missing_of(no_codecs.init().await), vec!["codecs"]);

    let no_pipes = Pipeline::builder()
        .source("probe", Arc::new(ProbeSource::new()))
        .codec(PcmCodec::ENCODING, Arc::new(PcmCodec))
        .drain("collect", Arc::new(CollectDrain::new()))
        .build();
    assert_eq!(missing_of(no_pipes.init().await), vec!["pipes"]);

    let no_drains = Pipeline::builder()
        .source("probe", Arc::new(ProbeSource::new()))
        .codec(PcmCodec::ENCODING, Arc::new(PcmCodec))
        .pipe(Arc::new(PassthroughPipe))
        .build();
    assert_eq!(missing_of(no_drains.init().await), vec!["drains"]);
    assert_eq!(no_drains.state().await, PipelineState::Uninitialized);
}

#[tokio::test]
async fn test_init_reports_all_missing_registries() {
    let empty = Pipeline::builder().build();
    assert_eq!(
        missing_of(empty.init().await),
        vec!["sources", "codecs", "pipes", "drains"]
    );
}

#[tokio::test]
async fn test_init_sizes_channel_array_to_pipes_plus_one() {
    let pipeline = full_builder()
        .pipe(Arc::new(PassthroughPipe))
        .pipe(Arc::new(PassthroughPipe))
        .build();
    assert_eq!(pipeline.channel_count().await, 0);

    pipeline.init().await.unwrap();
    assert_eq!(pipeline.state().await, PipelineState::Initialized);
    assert_eq!(pipeline.pipe_count(), 3);
    assert_eq!(pipeline.channel_count().await, 4);
    assert_eq!(pipeline.queued_len().await, 0);
}

#[tokio::test]
async fn test_init_twice_reallocates_buffers() {
    let source = Arc::new(ProbeSource::new().track("a", b"abcd"));
    let pipe = Arc::new(ProbePipe::new());
    let drain = Arc::new(ProbeDrain::new());
    let pipeline = simple_pipeline(source.clone(), &[pipe.clone()], drain.clone());

    pipeline.init().await.unwrap();
    pipeline.queue("a").await.unwrap();
    assert_eq!(pipeline.queued_len().await, 1);

    pipeline.init().await.unwrap();
    assert_eq!(pipeline.state().await, PipelineState::Initialized);
    assert_eq!(pipeline.queued_len().await, 0);
    assert_eq!(pipeline.pending_queries().await, 0);
    assert_eq!(pipeline.channel_count().await, 2);

    assert_eq!(source.inits(), 2);
    assert_eq!(pipe.inits(), 2);
    assert_eq!(drain.inits(), 2);
}

#[tokio::test]
async fn test_init_rejects_invalid_config() {
    let pipeline = full_builder().config(PipelineConfig::new(2, 3)).build();
    let result = pipeline.init().await;
    assert!(matches!(
        result,
        Err(PipelineError::Config(ConfigError::Invalid(_)))
    ));
    assert_eq!(pipeline.state().await, PipelineState::Uninitialized);
}

#[tokio::test]
async fn test_init_failure_names_the_pipe_and_stops() {
    let first = Arc::new(ProbePipe::new());
    let second = Arc::new(ProbePipe::new());
    second.fail_init.store(true, Ordering::SeqCst);
    let drain = Arc::new(ProbeDrain::new());

    let pipeline = simple_pipeline(
        Arc::new(ProbeSource::new()),
        &[first.clone(), second.clone()],
        drain.clone(),
    );

    let err = pipeline.init().await.unwrap_err();
    assert_eq!(err.collaborator(), Some(&Collaborator::Pipe(1)));
    assert!(matches!(err, PipelineError::Init { .. }));
    assert_eq!(first.inits(), 1);
    assert_eq!(drain.inits(), 0);
    assert_eq!(pipeline.state().await, PipelineState::Uninitialized);
}

#[tokio::test]
async fn test_init_failure_names_the_source() {
    let source = Arc::new(ProbeSource::new());
    source.fail_init.store(true, Ordering::SeqCst);
    let pipe = Arc::new(ProbePipe::new());
    let pipeline = simple_pipeline(source, &[pipe.clone()], Arc::new(ProbeDrain::new()));

    let err = pipeline.init().await.unwrap_err();
    assert_eq!(
        err.collaborator(),
        Some(&Collaborator::Source("probe".to_string()))
    );
    assert_eq!(pipe.inits(), 0);
}

#[tokio::test]
async fn test_operations_before_init_are_rejected() {
    let pipeline = full_builder().build();

    assert!(matches!(
        pipeline.run().await,
        Err(PipelineError::InvalidState {
            operation: "run",
            state: PipelineState::Uninitialized
        })
    ));
    assert!(matches!(
        pipeline.queue("a").await,
        Err(PipelineError::InvalidState {
            operation: "queue",
            ..
        })
    ));
}

#[tokio::test]
async fn test_run_twice_is_rejected_while_running() {
    let pipe = Arc::new(ProbePipe::stalled());
    let pipeline = simple_pipeline(
        Arc::new(ProbeSource::new().track("a", b"abcd")),
        &[pipe],
        Arc::new(ProbeDrain::new()),
    );
    pipeline.init().await.unwrap();
    pipeline.run().await.unwrap();

    assert!(matches!(
        pipeline.run().await,
        Err(PipelineError::InvalidState {
            operation: "run",
            state: PipelineState::Running
        })
    ));
    within(pipeline.purge()).await.unwrap();
}

#[tokio::test]
async fn test_state_changes_are_published() {
    let pipeline = full_builder().build();
    let mut rx = pipeline.subscribe();

    pipeline.init().await.unwrap();
    pipeline.run().await.unwrap();
    within(pipeline.wait()).await.unwrap();

    let transitions: Vec<(PipelineState, PipelineState)> = drain_events(&mut rx)
        .into_iter()
        .filter_map(|event| match event {
            PipelineEvent::StateChanged {
                old_state,
                new_state,
                ..
            } => Some((old_state, new_state)),
            _ => None,
        })
        .collect();

    assert_eq!(
        transitions,
        vec![
            (PipelineState::Uninitialized, PipelineState::Initialized),
            (PipelineState::Initialized, PipelineState::Running),
            (PipelineState::Running, PipelineState::Initialized),
        ]
    );
}

#[tokio::test]
async fn test_wait_without_run_returns_immediately() {
    let pipeline = full_builder().build();
    pipeline.init().await.unwrap();
    within(pipeline.wait()).await.unwrap();
    assert_eq!(pipeline.state().await, PipelineState::Initialized);
}
