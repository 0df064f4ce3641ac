//! Run supervision
//!
//! Every stage of a run is a task in one `JoinSet`. The supervisor joins
//! them in completion order and treats the first non-cancellation error as
//! the run's failure; a later root cause replaces a `Closed` link error. The
//! first failure cancels the run so no neighbour stays blocked. Stages that ignore cancellation are aborted after
//! [`STAGE_SHUTDOWN_TIMEOUT`].

use crate::error::{Collaborator, StageError};
use futures::FutureExt;
use ideka_common::{EventBus, PipelineEvent};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Grace period for stages to observe cancellation before being aborted
pub const STAGE_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

type StageResult = (Collaborator, Result<(), StageError>);

/// First failure of a run, if any
pub(crate) type RunOutcome = Option<(Collaborator, StageError)>;

/// Stage tasks of a run awaiting supervision
pub(crate) struct StageSet {
    tasks: JoinSet<StageResult>,
}

impl StageSet {
    pub(crate) fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
        }
    }

    /// Spawn one stage; panics are converted into a stage error
    pub(crate) fn spawn<F>(&mut self, stage: Collaborator, fut: F)
    where
        F: Future<Output = Result<(), StageError>> + Send + 'static,
    {
        self.tasks.spawn(async move {
            debug!("Stage {} started", stage);
            let result = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(StageError::Other("stage task panicked".to_string())),
            };
            (stage, result)
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }
}

/// Handle on a launched run, held by the orchestrator
pub(crate) struct ActiveRun {
    pub(crate) run_id: Uuid,
    pub(crate) cancel: CancellationToken,
    pub(crate) done: watch::Receiver<bool>,
    pub(crate) handle: JoinHandle<RunOutcome>,
}

impl ActiveRun {
    /// Start supervising `stages`
    pub(crate) fn supervise(
        run_id: Uuid,
        stages: StageSet,
        cancel: CancellationToken,
        events: EventBus,
    ) -> Self {
        let (done_tx, done) = watch::channel(false);
        let handle = tokio::spawn(supervise(run_id, stages.tasks, cancel.clone(), events, done_tx));
        Self {
            run_id,
            cancel,
            done,
            handle,
        }
    }

    /// Cancel the run and wait for the supervisor to join every stage
    pub(crate) async fn shutdown(self) -> RunOutcome {
        self.cancel.cancel();
        self.join().await
    }

    /// Wait for the supervisor without cancelling the run
    pub(crate) async fn join(self) -> RunOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => Some((
                Collaborator::Supervisor,
                StageError::Other(format!("supervisor task failed: {}", e)),
            )),
        }
    }
}

async fn supervise(
    run_id: Uuid,
    mut tasks: JoinSet<StageResult>,
    cancel: CancellationToken,
    events: EventBus,
    done: watch::Sender<bool>,
) -> RunOutcome {
    let mut failure: RunOutcome = None;
    let mut deadline: Option<Instant> = None;

    loop {
        let joined = match deadline {
            None => {
                tokio::select! {
                    joined = tasks.join_next() => joined,
                    _ = cancel.cancelled() => {
                        deadline = Some(Instant::now() + STAGE_SHUTDOWN_TIMEOUT);
                        continue;
                    }
                }
            }
            Some(at) => match tokio::time::timeout_at(at, tasks.join_next()).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(
                        "Run {}: {} stages ignored cancellation, aborting",
                        run_id,
                        tasks.len()
                    );
                    tasks.abort_all();
                    deadline = Some(Instant::now() + STAGE_SHUTDOWN_TIMEOUT);
                    continue;
                }
            },
        };

        let Some(joined) = joined else { break };

        match joined {
            Ok((stage, Ok(()))) => {
                debug!("Run {}: {} finished", run_id, stage);
                events.emit_lossy(PipelineEvent::StageFinished {
                    run_id,
                    stage: stage.to_string(),
                    timestamp: chrono::Utc::now(),
                });
            }
            Ok((stage, Err(e))) if e.is_cancelled() => {
                debug!("Run {}: {} interrupted by cancellation", run_id, stage);
            }
            Ok((stage, Err(e))) => {
                // A closed link only echoes a neighbour that already stopped
                let supersedes = match &failure {
                    None => true,
                    Some((_, first)) => {
                        matches!(first, StageError::Closed) && !matches!(e, StageError::Closed)
                    }
                };
                if supersedes {
                    error!("Run {}: {} failed: {}", run_id, stage, e);
                    events.emit_lossy(PipelineEvent::StageFailed {
                        run_id,
                        stage: stage.to_string(),
                        error: e.to_string(),
                        timestamp: chrono::Utc::now(),
                    });
                    cancel.cancel();
                    failure = Some((stage, e));
                } else {
                    debug!("Run {}: {} failed after teardown began: {}", run_id, stage, e);
                }
            }
            Err(e) if e.is_cancelled() => {
                debug!("Run {}: aborted stage joined", run_id);
            }
            Err(e) => {
                warn!("Run {}: stage task join error: {}", run_id, e);
            }
        }
    }

    let success = failure.is_none() && !cancel.is_cancelled();
    info!("Run {} completed (success={})", run_id, success);
    events.emit_lossy(PipelineEvent::RunCompleted {
        run_id,
        success,
        timestamp: chrono::Utc::now(),
    });
    let _ = done.send(true);
    failure
}
