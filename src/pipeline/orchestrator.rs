//! Run orchestrator: start a processing run.

use std::sync::Arc;
use std::time::Duration;

use dataprep_protocol::QualitySettings;

use super::sequencer::{SequencerOutcome, StageSequencer};
use super::supervisor::RunSupervisor;
use super::{ProcessingError, ProcessingResult};
use crate::state::ProcessingRun;
use crate::store::{self, RunCreation, RunRequest, RunStore};

pub struct RunOrchestrator {
    store: Arc<dyn RunStore>,
    supervisor: Arc<RunSupervisor>,
    sequencer: Arc<StageSequencer>,
    dispatch_delay: Duration,
}

impl RunOrchestrator {
    pub fn new(
        store: Arc<dyn RunStore>,
        supervisor: Arc<RunSupervisor>,
        sequencer: Arc<StageSequencer>,
        dispatch_delay: Duration,
    ) -> Self {
        Self {
            store,
            supervisor,
            sequencer,
            dispatch_delay,
        }
    }

    /// Create a PROCESSING run for the project and schedule its stages.
    ///
    /// Returns as soon as the rows are written; the stages advance on a
    /// supervised background task.
    pub async fn start_processing(
        &self,
        project_id: i64,
        organisation_id: i64,
        user_id: i64,
        quality_settings: Option<QualitySettings>,
    ) -> ProcessingResult<ProcessingRun> {
        let request = RunRequest {
            project_id,
            organisation_id,
            created_by_id: user_id,
            quality_settings: quality_settings.unwrap_or_default(),
        };

        let creation = store::blocking(&self.store, move |s| s.create_run(&request)).await?;
        let run = match creation {
            RunCreation::Created { run, .. } => run,
            RunCreation::ProjectNotFound => return Err(ProcessingError::NotFound("Project")),
            RunCreation::AlreadyProcessing => return Err(ProcessingError::ProcessingInProgress),
            RunCreation::NoReadySources => {
                return Err(ProcessingError::BadRequest(
                    "No ready sources available for processing".to_string(),
                ))
            }
        };

        tracing::info!(
            run_id = run.id,
            project_id,
            user_id,
            total_records = run.total_records,
            sources = run.config_snapshot.source_ids.len(),
            "processing run started"
        );

        self.dispatch(run.clone());
        Ok(run)
    }

    fn dispatch(&self, run: ProcessingRun) {
        let sequencer = Arc::clone(&self.sequencer);
        let delay = self.dispatch_delay;
        let run_id = run.id;

        self.supervisor.spawn(run_id, move |token| async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
            if let SequencerOutcome::Failed(message) = sequencer.run(run, token).await {
                tracing::debug!(run_id, error = %message, "sequencer finished with failure");
            }
        });
    }
}
