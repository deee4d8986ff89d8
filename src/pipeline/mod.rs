//! Processing pipeline
//!
//! - Orchestrator: checks start preconditions, creates the run with its
//!   five pending stages, and hands it to the supervisor
//! - Sequencer: walks the stages in fixed order on a supervised task
//! - Supervisor: owns the cancellation token and join handle of each run
//! - Query: read and cancel operations scoped to an organisation
//! - Recovery: fails runs a previous process left PROCESSING

mod executor;
mod orchestrator;
mod query;
mod recovery;
mod sequencer;
mod supervisor;

pub use executor::{SimulatedStageExecutor, StageContext, StageError, StageExecutor, StageOutput};
pub use orchestrator::RunOrchestrator;
pub use query::{RunPage, RunQuery};
pub use recovery::{recover_interrupted_runs, RESTART_MESSAGE};
pub use sequencer::{SequencerOutcome, StageSequencer, SHUTDOWN_MESSAGE};
pub use supervisor::RunSupervisor;

use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by pipeline operations.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Resource missing or owned by another organisation
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Processing already in progress")]
    ProcessingInProgress,

    #[error("{0}")]
    BadRequest(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for pipeline operations
pub type ProcessingResult<T> = Result<T, ProcessingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ProcessingError::NotFound("Processing Run").to_string(),
            "Processing Run not found"
        );
        assert_eq!(
            ProcessingError::ProcessingInProgress.to_string(),
            "Processing already in progress"
        );
        assert_eq!(
            ProcessingError::BadRequest("Can only cancel processing runs".to_string()).to_string(),
            "Can only cancel processing runs"
        );
    }
}
