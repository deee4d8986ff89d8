//! Read and cancel operations on runs, scoped to an organisation.

use std::sync::Arc;

use super::supervisor::RunSupervisor;
use super::{ProcessingError, ProcessingResult};
use crate::state::{now_utc, ProcessingRun, ProcessingStage, RunStatus};
use crate::store::{self, RunStore};

/// One page of a project's runs.
#[derive(Debug, Clone)]
pub struct RunPage {
    pub runs: Vec<ProcessingRun>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

pub struct RunQuery {
    store: Arc<dyn RunStore>,
    supervisor: Arc<RunSupervisor>,
}

impl RunQuery {
    pub fn new(store: Arc<dyn RunStore>, supervisor: Arc<RunSupervisor>) -> Self {
        Self { store, supervisor }
    }

    /// Runs of a project, newest first. `page` is 1-based.
    pub async fn list_runs(
        &self,
        project_id: i64,
        organisation_id: i64,
        page: u32,
        limit: u32,
    ) -> ProcessingResult<RunPage> {
        let page = page.max(1);
        let limit = limit.max(1);
        let offset = u64::from(page - 1) * u64::from(limit);

        let listed = store::blocking(&self.store, move |s| {
            if s.find_project(project_id, organisation_id)?.is_none() {
                return Ok(None);
            }
            let runs = s.list_runs(project_id, offset, limit)?;
            let total = s.count_runs(project_id)?;
            Ok(Some((runs, total)))
        })
        .await?;

        let (runs, total) = listed.ok_or(ProcessingError::NotFound("Project"))?;
        Ok(RunPage {
            runs,
            page,
            limit,
            total,
        })
    }

    pub async fn get_run(
        &self,
        run_id: i64,
        organisation_id: i64,
    ) -> ProcessingResult<ProcessingRun> {
        store::blocking(&self.store, move |s| s.find_run(run_id, organisation_id))
            .await?
            .ok_or(ProcessingError::NotFound("Processing Run"))
    }

    /// Stage rows in sequence order, after the same visibility check as [`Self::get_run`].
    pub async fn get_run_stages(
        &self,
        run_id: i64,
        organisation_id: i64,
    ) -> ProcessingResult<Vec<ProcessingStage>> {
        self.get_run(run_id, organisation_id).await?;
        Ok(store::blocking(&self.store, move |s| s.list_stages(run_id)).await?)
    }

    /// PROCESSING → CANCELLED, then stop the run's background task.
    pub async fn cancel_run(
        &self,
        run_id: i64,
        organisation_id: i64,
    ) -> ProcessingResult<ProcessingRun> {
        let run = self.get_run(run_id, organisation_id).await?;
        run.check_transition(RunStatus::Cancelled).map_err(|err| {
            tracing::debug!(run_id, error = %err, "cancel rejected");
            cannot_cancel()
        })?;

        // The row can reach a terminal state between the read and the write
        let cancelled = store::blocking(&self.store, move |s| s.cancel_run(run_id, now_utc()))
            .await?
            .ok_or_else(cannot_cancel)?;

        self.supervisor.cancel(run_id);
        tracing::info!(run_id, project_id = cancelled.project_id, "processing run cancelled by user");
        Ok(cancelled)
    }
}

fn cannot_cancel() -> ProcessingError {
    ProcessingError::BadRequest("Can only cancel processing runs".to_string())
}
