//! Stage sequencer
//!
//! Walks a run through extraction → pii_detection → mapping → quality_filter
//! → export. Each stage goes PENDING → PROCESSING → COMPLETED before the next
//! one starts. Store writes are conditional on the run still being
//! PROCESSING; a write that matches nothing means the run was cancelled
//! underneath us, and the sequencer winds down without touching the run.
//!
//! Interruption outcomes:
//! - user cancel (run already CANCELLED): in-flight stage → CANCELLED
//! - shutdown (run still PROCESSING): in-flight stage and run → FAILED
//! - stage error or timeout: in-flight stage and run → FAILED with the message

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::executor::{StageContext, StageExecutor};
use crate::state::{now_utc, ProcessingRun, StageName, StageStatus};
use crate::store::{self, RunStore, StoreError};

/// Error message recorded on runs interrupted by a graceful shutdown.
pub const SHUTDOWN_MESSAGE: &str = "Processing interrupted by shutdown";

/// How a sequencer task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequencerOutcome {
    Completed,
    /// The run was cancelled by a user
    Cancelled,
    /// The process is shutting down; the run was marked failed
    Interrupted,
    Failed(String),
}

enum StageInterrupt {
    Cancelled,
    Failed(String),
}

/// Drives the stages of a single run.
pub struct StageSequencer {
    store: Arc<dyn RunStore>,
    executor: Arc<dyn StageExecutor>,
    stage_timeout: Duration,
}

impl StageSequencer {
    pub fn new(
        store: Arc<dyn RunStore>,
        executor: Arc<dyn StageExecutor>,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            store,
            executor,
            stage_timeout,
        }
    }

    /// Advance `run` through every stage, stopping early when `token` fires.
    pub async fn run(&self, run: ProcessingRun, token: CancellationToken) -> SequencerOutcome {
        let run_id = run.id;
        let total = run.total_records;

        for stage in StageName::SEQUENCE {
            if token.is_cancelled() {
                return self.wind_down(run_id, None).await;
            }

            let started =
                store::blocking(&self.store, move |s| s.start_stage(run_id, stage, total, now_utc()))
                    .await;
            match started {
                Ok(true) => {
                    tracing::debug!(run_id, stage = %stage, input_count = total, "stage started")
                }
                Ok(false) => return self.wind_down(run_id, None).await,
                Err(err) => return self.fail(run_id, None, store_failure(&err)).await,
            }

            let ctx = StageContext {
                run_id,
                stage,
                input_count: total,
                snapshot: run.config_snapshot.clone(),
            };

            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(StageInterrupt::Cancelled),
                outcome = tokio::time::timeout(self.stage_timeout, self.executor.execute(&ctx)) => {
                    match outcome {
                        Ok(Ok(output)) => Ok(output),
                        Ok(Err(err)) => Err(StageInterrupt::Failed(err.to_string())),
                        Err(_) => Err(StageInterrupt::Failed(format!(
                            "Stage {} timed out after {}s",
                            stage,
                            self.stage_timeout.as_secs()
                        ))),
                    }
                }
            };

            let output = match result {
                Ok(output) => output,
                Err(StageInterrupt::Cancelled) => return self.wind_down(run_id, Some(stage)).await,
                Err(StageInterrupt::Failed(message)) => {
                    return self.fail(run_id, Some(stage), message).await
                }
            };

            let output_count = output.output_count;
            let completed = store::blocking(&self.store, move |s| {
                s.complete_stage(run_id, stage, output_count, now_utc())
            })
            .await;
            match completed {
                Ok(true) => tracing::debug!(
                    run_id,
                    stage = %stage,
                    output_count,
                    "stage completed"
                ),
                Ok(false) => return self.wind_down(run_id, Some(stage)).await,
                Err(err) => return self.fail(run_id, Some(stage), store_failure(&err)).await,
            }
        }

        let completed =
            store::blocking(&self.store, move |s| s.complete_run(run_id, total, now_utc())).await;
        match completed {
            Ok(true) => {
                tracing::info!(run_id, processed_records = total, "processing run completed");
                SequencerOutcome::Completed
            }
            Ok(false) => self.wind_down(run_id, None).await,
            Err(err) => self.fail(run_id, None, store_failure(&err)).await,
        }
    }

    /// Stop after the token fired or a guarded write matched nothing.
    ///
    /// If the run is still PROCESSING nobody cancelled it, so the stop comes
    /// from shutdown and the run is failed. Otherwise a user cancelled it and
    /// only the in-flight stage needs closing.
    async fn wind_down(&self, run_id: i64, stage: Option<StageName>) -> SequencerOutcome {
        let failed =
            store::blocking(&self.store, move |s| s.fail_run(run_id, SHUTDOWN_MESSAGE, now_utc()))
                .await;
        match failed {
            Ok(true) => {
                self.close_stage(run_id, stage, StageStatus::Failed, Some(SHUTDOWN_MESSAGE.to_string()))
                    .await;
                tracing::warn!(run_id, "processing run interrupted by shutdown");
                SequencerOutcome::Interrupted
            }
            Ok(false) => {
                self.close_stage(run_id, stage, StageStatus::Cancelled, None).await;
                tracing::info!(run_id, "processing run cancelled");
                SequencerOutcome::Cancelled
            }
            Err(err) => {
                tracing::error!(run_id, error = %err, "failed to record run interruption");
                SequencerOutcome::Failed(store_failure(&err))
            }
        }
    }

    async fn fail(&self, run_id: i64, stage: Option<StageName>, message: String) -> SequencerOutcome {
        tracing::error!(
            run_id,
            stage = stage.map(|s| s.as_str()),
            error = %message,
            "processing run failed"
        );
        self.close_stage(run_id, stage, StageStatus::Failed, Some(message.clone()))
            .await;
        let recorded = message.clone();
        if let Err(err) =
            store::blocking(&self.store, move |s| s.fail_run(run_id, &recorded, now_utc())).await
        {
            tracing::error!(run_id, error = %err, "failed to mark run failed");
        }
        SequencerOutcome::Failed(message)
    }

    async fn close_stage(
        &self,
        run_id: i64,
        stage: Option<StageName>,
        status: StageStatus,
        message: Option<String>,
    ) {
        let Some(stage) = stage else { return };
        let closed = store::blocking(&self.store, move |s| {
            s.interrupt_stage(run_id, stage, status, message.as_deref(), now_utc())
        })
        .await;
        if let Err(err) = closed {
            tracing::error!(run_id, stage = %stage, error = %err, "failed to close stage");
        }
    }
}

fn store_failure(err: &StoreError) -> String {
    format!("Store error: {}", err)
}
