//! Orchestrator-owned stage tasks: the feeder at the head of the chain and
//! the fan-out in front of multiple drains

use super::registry::CodecMap;
use super::work_buffer::WorkReceiver;
use crate::audio::AudioStream;
use crate::error::StageError;
use crate::stage::{StageInput, StageOutput};
use futures::StreamExt;
use tracing::debug;

/// Move admitted audio into the first link, FIFO, one entry after another
///
/// Unprepared entries are decoded here. The feeder stops once the work
/// buffer is empty; returning drops `output`, closing `channels[0]`.
pub(crate) async fn feed(
    work: WorkReceiver,
    codecs: CodecMap,
    output: StageOutput,
) -> Result<(), StageError> {
    let mut work = work.lock().await;
    let mut fed = 0usize;

    while let Ok(item) = work.try_recv() {
        let stream = if item.prepared {
            item.audio.samples
        } else {
            let codec = codecs.get(&item.audio.encoding).ok_or_else(|| {
                StageError::Codec(format!(
                    "no codec registered for encoding \"{}\"",
                    item.audio.encoding
                ))
            })?;
            codec.decode(item.audio.samples)?
        };

        debug!(
            "Feeding \"{}\" from source \"{}\" ({})",
            item.query,
            item.source_id,
            if item.prepared { "prepared" } else { "decoded on demand" }
        );
        let bytes = forward(stream, &output).await?;
        debug!("Fed {} bytes for \"{}\"", bytes, item.query);
        fed += 1;
    }

    debug!("Work buffer exhausted after {} entries, closing head link", fed);
    Ok(())
}

/// Pull a decoded stream into a link until it ends
async fn forward(mut stream: AudioStream, output: &StageOutput) -> Result<usize, StageError> {
    let mut total = 0;
    loop {
        let next = tokio::select! {
            biased;
            _ = output.cancellation().cancelled() => return Err(StageError::Cancelled),
            next = stream.next() => next,
        };
        match next {
            Some(chunk) => {
                let chunk = chunk?;
                total += chunk.len();
                output.send(chunk).await?;
            }
            None => return Ok(total),
        }
    }
}

/// Copy every chunk of the last link to each drain's own link
pub(crate) async fn fan_out(
    mut input: StageInput,
    outputs: Vec<StageOutput>,
) -> Result<(), StageError> {
    while let Some(chunk) = input.recv().await? {
        for output in &outputs {
            output.send(chunk.clone()).await?;
        }
    }
    Ok(())
}
