//! Pipeline demo - sine tone through a gain stage into a null drain
//!
//! Builds sine source → PCM codec → gain pipe → null drain, queues one tone,
//! runs the pipeline to completion and reports how many bytes were drained.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ideka_common::logging::init_tracing;
use ideka_pipeline::builtin::{GainPipe, NullDrain, PcmCodec, SineSource};
use ideka_pipeline::{Pipeline, PipelineConfig, PipelineEvent};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Command-line arguments for pipeline_demo
#[derive(Parser, Debug)]
#[command(name = "pipeline_demo")]
#[command(about = "Run a generated tone through the Ideka audio pipeline")]
#[command(version)]
struct Args {
    /// Pipeline configuration file (TOML)
    #[arg(short, long, env = "IDEKA_PIPELINE_CONFIG")]
    config: Option<PathBuf>,

    /// Tone frequency in Hz
    #[arg(short, long, default_value = "440")]
    frequency: f32,

    /// Tone length in milliseconds
    #[arg(short, long, default_value = "2000")]
    duration_ms: u64,

    /// Gain applied to every sample
    #[arg(short, long, default_value = "0.5")]
    gain: f32,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("ideka_pipeline=debug,pipeline_demo=info");

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    info!(
        "Starting pipeline demo: {} Hz for {} ms at gain {}",
        args.frequency, args.duration_ms, args.gain
    );

    let drain = Arc::new(NullDrain::new());
    let pipeline = Pipeline::builder()
        .config(config)
        .source(
            "sine",
            Arc::new(SineSource::new(args.frequency, 0.8, args.duration_ms)),
        )
        .codec(PcmCodec::ENCODING, Arc::new(PcmCodec))
        .pipe(Arc::new(GainPipe::new(args.gain)))
        .drain("null", drain.clone())
        .build();

    let mut events = pipeline.subscribe();
    let event_logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(PipelineEvent::StageFailed { stage, error, .. }) => {
                    warn!("Stage {} failed: {}", stage, error)
                }
                Ok(event) => debug!("Event: {:?}", event),
                Err(RecvError::Lagged(skipped)) => warn!("Event logger lagged by {}", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    pipeline.init().await.context("Failed to initialize pipeline")?;
    pipeline.queue("tone").await.context("Failed to queue tone")?;
    pipeline.run().await.context("Failed to start pipeline")?;
    pipeline.wait().await.context("Pipeline run failed")?;

    info!("Drained {} bytes", drain.bytes_drained());

    pipeline.purge().await.context("Failed to purge pipeline")?;
    event_logger.abort();

    info!("Pipeline demo finished");
    Ok(())
}
