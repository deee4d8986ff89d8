//! Stage work seam.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::state::{ConfigSnapshot, StageName};

/// What a stage is asked to process.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub run_id: i64,
    pub stage: StageName,
    pub input_count: i64,
    pub snapshot: ConfigSnapshot,
}

/// What a stage produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageOutput {
    pub output_count: i64,
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error("{0}")]
    Failed(String),
}

/// Performs the work of a single stage.
///
/// Implementations must be cancel-safe: the sequencer drops the future when
/// the run is cancelled or the stage times out.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError>;
}

/// Waits a fixed duration and passes every record through.
#[derive(Debug, Clone)]
pub struct SimulatedStageExecutor {
    delay: Duration,
}

impl SimulatedStageExecutor {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl StageExecutor for SimulatedStageExecutor {
    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        tokio::time::sleep(self.delay).await;
        Ok(StageOutput {
            output_count: ctx.input_count,
        })
    }
}
