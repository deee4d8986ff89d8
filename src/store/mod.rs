//! Run record store
//!
//! Persistence seam for processing runs and their stages, plus read access to
//! the project and source rows the orchestrator consults. Every mutation the
//! sequencer performs is conditional on the run still being PROCESSING, so a
//! late writer can never resurrect a cancelled or failed run.
//!
//! Store calls block. Async callers go through [`blocking`], which moves the
//! call onto tokio's blocking pool.

mod models;
mod sqlite;

pub use models::{
    NewProject, NewSource, Project, RunCreation, RunRequest, SeededRows, Source, SourceStatus,
};
pub use sqlite::{SqliteRunStore, SCHEMA_VERSION};

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::state::{ProcessingRun, ProcessingStage, StageName, StageStatus};

/// Errors raised by a [`RunStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("stored row is corrupt: {0}")]
    Corrupt(String),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("unsupported schema version {found}; expected {expected}")]
    SchemaVersion { found: i64, expected: i64 },

    #[error("database {0} is in use by another process")]
    InUse(PathBuf),

    #[error("stage cannot move from {from} to {to}")]
    StageTransition { from: StageStatus, to: StageStatus },

    #[error("store task did not complete: {0}")]
    Blocking(#[from] tokio::task::JoinError),
}

/// Run a store call on the blocking thread pool.
pub async fn blocking<T, F>(store: &Arc<dyn RunStore>, call: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&dyn RunStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || call(store.as_ref())).await?
}

/// Storage operations required by the processing pipeline.
pub trait RunStore: Send + Sync {
    /// Look up a project visible to the organisation.
    fn find_project(
        &self,
        project_id: i64,
        organisation_id: i64,
    ) -> Result<Option<Project>, StoreError>;

    /// Atomically check the start preconditions and create a run with its
    /// five pending stages.
    ///
    /// Preconditions are evaluated in order (project visible, no processing
    /// run, at least one ready source) inside a single write transaction; the
    /// first failing one is reported and nothing is written.
    fn create_run(&self, request: &RunRequest) -> Result<RunCreation, StoreError>;

    /// Runs of a project, newest first.
    fn list_runs(
        &self,
        project_id: i64,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<ProcessingRun>, StoreError>;

    /// Number of runs a project has.
    fn count_runs(&self, project_id: i64) -> Result<u64, StoreError>;

    /// A run, only if its project belongs to the organisation.
    fn find_run(
        &self,
        run_id: i64,
        organisation_id: i64,
    ) -> Result<Option<ProcessingRun>, StoreError>;

    /// A run by id, without organisation scoping.
    fn get_run(&self, run_id: i64) -> Result<Option<ProcessingRun>, StoreError>;

    /// Stage rows of a run in sequence order.
    fn list_stages(&self, run_id: i64) -> Result<Vec<ProcessingStage>, StoreError>;

    /// PROCESSING → CANCELLED. Returns the updated run, or `None` when the
    /// run was not processing (nothing is written in that case).
    fn cancel_run(
        &self,
        run_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<ProcessingRun>, StoreError>;

    /// PENDING → PROCESSING for one stage while the run is processing.
    fn start_stage(
        &self,
        run_id: i64,
        stage: StageName,
        input_count: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// PROCESSING → COMPLETED for one stage while the run is processing.
    fn complete_stage(
        &self,
        run_id: i64,
        stage: StageName,
        output_count: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// PROCESSING → FAILED or CANCELLED for one stage. Any other target
    /// status is rejected with [`StoreError::StageTransition`].
    fn interrupt_stage(
        &self,
        run_id: i64,
        stage: StageName,
        status: StageStatus,
        message: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// PROCESSING → COMPLETED for a run.
    fn complete_run(
        &self,
        run_id: i64,
        processed_records: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// PROCESSING → FAILED for a run.
    fn fail_run(&self, run_id: i64, message: &str, at: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Ids of every run currently PROCESSING, across all projects.
    fn processing_run_ids(&self) -> Result<Vec<i64>, StoreError>;

    /// Insert projects then sources in one transaction (administrative
    /// seeding). Either every row is written or none is.
    fn insert_seed(
        &self,
        projects: &[NewProject],
        sources: &[NewSource],
    ) -> Result<SeededRows, StoreError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// In-memory store holding one project of organisation 1 with the given
    /// sources. Returns the store and the project id.
    pub(crate) fn store_with_project(
        target_schema: Option<&str>,
        sources: &[(SourceStatus, Option<i64>)],
    ) -> (Arc<SqliteRunStore>, i64) {
        let store = SqliteRunStore::open_in_memory().unwrap();
        let project = NewProject {
            id: None,
            organisation_id: 1,
            name: "p".to_string(),
            target_schema: target_schema.map(str::to_string),
        };
        let project_id = store.insert_seed(&[project], &[]).unwrap().projects[0].id;

        let sources: Vec<NewSource> = sources
            .iter()
            .map(|(status, record_count)| NewSource {
                id: None,
                project_id,
                name: "s".to_string(),
                status: *status,
                record_count: *record_count,
            })
            .collect();
        store.insert_seed(&[], &sources).unwrap();
        (Arc::new(store), project_id)
    }

    /// Create a PROCESSING run directly in the store.
    pub(crate) fn create_run(store: &dyn RunStore, project_id: i64) -> ProcessingRun {
        let request = RunRequest {
            project_id,
            organisation_id: 1,
            created_by_id: 1,
            quality_settings: Default::default(),
        };
        match store.create_run(&request).unwrap() {
            RunCreation::Created { run, .. } => run,
            other => panic!("unexpected {other:?}"),
        }
    }
}
