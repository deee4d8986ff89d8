//! SQLite-backed [`RunStore`].
//!
//! A single connection guarded by a mutex. A database file has exactly one
//! owning process: the connection runs in exclusive locking mode and takes
//! the write lock at open, so a second process fails with
//! [`StoreError::InUse`] instead of sharing the file. Startup recovery relies
//! on this; every PROCESSING run it finds belongs to a dead process.
//!
//! Run creation uses an IMMEDIATE transaction so the precondition reads and
//! the inserts are one atomic unit, and the schema carries a partial unique
//! index that rejects a second PROCESSING run for the same project.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::models::{
    NewProject, NewSource, Project, RunCreation, RunRequest, SeededRows, Source,
};
use super::{RunStore, StoreError};
use crate::state::{
    now_utc, ConfigSnapshot, ProcessingRun, ProcessingStage, RunStatus, StageName, StageStatus,
};

/// Schema version written to `store_meta`.
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    organisation_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    target_schema TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX projects_org_idx ON projects(organisation_id);

CREATE TABLE sources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    record_count INTEGER,
    created_at TEXT NOT NULL
);
CREATE INDEX sources_project_idx ON sources(project_id);

CREATE TABLE processing_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    status TEXT NOT NULL DEFAULT 'pending',
    config_snapshot TEXT NOT NULL,
    total_records INTEGER NOT NULL DEFAULT 0,
    processed_records INTEGER NOT NULL DEFAULT 0,
    filtered_records INTEGER NOT NULL DEFAULT 0,
    error_records INTEGER NOT NULL DEFAULT 0,
    started_at TEXT,
    completed_at TEXT,
    error_message TEXT,
    created_by_id INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX processing_runs_project_idx ON processing_runs(project_id);
CREATE INDEX processing_runs_status_idx ON processing_runs(status);
CREATE UNIQUE INDEX processing_runs_one_active_idx
    ON processing_runs(project_id) WHERE status = 'processing';

CREATE TRIGGER processing_runs_snapshot_write_once
BEFORE UPDATE OF config_snapshot, total_records ON processing_runs
BEGIN
    SELECT RAISE(ABORT, 'config_snapshot and total_records are write-once');
END;

CREATE TABLE processing_stages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES processing_runs(id) ON DELETE CASCADE,
    stage TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    input_count INTEGER NOT NULL DEFAULT 0,
    output_count INTEGER NOT NULL DEFAULT 0,
    started_at TEXT,
    completed_at TEXT,
    error_message TEXT,
    UNIQUE (run_id, stage)
);
CREATE INDEX processing_stages_run_idx ON processing_stages(run_id);
";

const RUN_COLUMNS: &str = "r.id, r.project_id, r.status, r.config_snapshot, r.total_records, \
     r.processed_records, r.filtered_records, r.error_records, r.started_at, r.completed_at, \
     r.error_message, r.created_by_id, r.created_at";

const STAGE_COLUMNS: &str =
    "id, run_id, stage, status, input_count, output_count, started_at, completed_at, error_message";

/// SQLite implementation of [`RunStore`].
pub struct SqliteRunStore {
    connection: Mutex<Connection>,
}

impl SqliteRunStore {
    /// Open (creating if needed) a database file, take ownership of it and
    /// bring its schema up to date.
    ///
    /// Waits up to `busy_timeout` for another owner to let go.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, StoreError> {
        let connection = Connection::open(path)?;
        connection.busy_timeout(busy_timeout)?;
        connection
            .execute_batch(
                "PRAGMA locking_mode = EXCLUSIVE;
                 PRAGMA journal_mode = WAL;
                 BEGIN EXCLUSIVE; COMMIT;",
            )
            .map_err(|err| {
                if is_busy(&err) {
                    StoreError::InUse(path.to_path_buf())
                } else {
                    StoreError::Db(err)
                }
            })?;
        Self::from_connection(connection)
    }

    /// Private in-memory database, used by tests and `database.path = ":memory:"`.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut connection: Connection) -> Result<Self, StoreError> {
        connection.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrate(&mut connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.connection.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn migrate(connection: &mut Connection) -> Result<(), StoreError> {
    let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()?;

    match version {
        None => {
            tx.execute_batch(SCHEMA)?;
            tx.execute(
                "INSERT INTO store_meta (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
        }
        Some(found) if found == SCHEMA_VERSION => {}
        Some(found) => {
            return Err(StoreError::SchemaVersion {
                found,
                expected: SCHEMA_VERSION,
            })
        }
    }

    tx.commit()?;
    Ok(())
}

fn fmt_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

fn required_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    ts_column(row, idx)?.ok_or(rusqlite::Error::InvalidColumnType(
        idx,
        "timestamp".to_string(),
        Type::Null,
    ))
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<ProcessingRun> {
    let status: String = row.get(2)?;
    let snapshot: String = row.get(3)?;
    Ok(ProcessingRun {
        id: row.get(0)?,
        project_id: row.get(1)?,
        status: status.parse().map_err(|e| conversion_error(2, e))?,
        config_snapshot: serde_json::from_str::<ConfigSnapshot>(&snapshot)
            .map_err(|e| conversion_error(3, e))?,
        total_records: row.get(4)?,
        processed_records: row.get(5)?,
        filtered_records: row.get(6)?,
        error_records: row.get(7)?,
        started_at: ts_column(row, 8)?,
        completed_at: ts_column(row, 9)?,
        error_message: row.get(10)?,
        created_by_id: row.get(11)?,
        created_at: required_ts(row, 12)?,
    })
}

fn stage_from_row(row: &Row<'_>) -> rusqlite::Result<ProcessingStage> {
    let stage: String = row.get(2)?;
    let status: String = row.get(3)?;
    Ok(ProcessingStage {
        id: row.get(0)?,
        run_id: row.get(1)?,
        stage: stage.parse().map_err(|e| conversion_error(2, e))?,
        status: status.parse().map_err(|e| conversion_error(3, e))?,
        input_count: row.get(4)?,
        output_count: row.get(5)?,
        started_at: ts_column(row, 6)?,
        completed_at: ts_column(row, 7)?,
        error_message: row.get(8)?,
    })
}

fn source_from_row(row: &Row<'_>) -> rusqlite::Result<Source> {
    let status: String = row.get(3)?;
    Ok(Source {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        status: status.parse().map_err(|e| conversion_error(3, e))?,
        record_count: row.get(4)?,
    })
}

fn query_project(
    conn: &Connection,
    project_id: i64,
    organisation_id: i64,
) -> rusqlite::Result<Option<Project>> {
    conn.query_row(
        "SELECT id, organisation_id, name, target_schema FROM projects
         WHERE id = ?1 AND organisation_id = ?2",
        params![project_id, organisation_id],
        |row| {
            Ok(Project {
                id: row.get(0)?,
                organisation_id: row.get(1)?,
                name: row.get(2)?,
                target_schema: row.get(3)?,
            })
        },
    )
    .optional()
}

fn query_run(conn: &Connection, run_id: i64) -> rusqlite::Result<Option<ProcessingRun>> {
    conn.query_row(
        &format!("SELECT {RUN_COLUMNS} FROM processing_runs r WHERE r.id = ?1"),
        params![run_id],
        run_from_row,
    )
    .optional()
}

fn query_stages(conn: &Connection, run_id: i64) -> rusqlite::Result<Vec<ProcessingStage>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STAGE_COLUMNS} FROM processing_stages WHERE run_id = ?1 ORDER BY id"
    ))?;
    let rows = stmt.query_map(params![run_id], stage_from_row)?;
    let mut stages = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    stages.sort_by_key(|s| s.stage.position());
    Ok(stages)
}

/// Only UNIQUE violations; foreign key, NOT NULL and trigger aborts share the
/// primary `ConstraintViolation` code.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

impl RunStore for SqliteRunStore {
    fn find_project(
        &self,
        project_id: i64,
        organisation_id: i64,
    ) -> Result<Option<Project>, StoreError> {
        let conn = self.lock()?;
        Ok(query_project(&conn, project_id, organisation_id)?)
    }

    fn create_run(&self, request: &RunRequest) -> Result<RunCreation, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(project) = query_project(&tx, request.project_id, request.organisation_id)? else {
            return Ok(RunCreation::ProjectNotFound);
        };

        let processing: Option<i64> = tx
            .query_row(
                "SELECT id FROM processing_runs WHERE project_id = ?1 AND status = 'processing' LIMIT 1",
                params![project.id],
                |row| row.get(0),
            )
            .optional()?;
        if processing.is_some() {
            return Ok(RunCreation::AlreadyProcessing);
        }

        let ready: Vec<Source> = {
            let mut stmt = tx.prepare(
                "SELECT id, project_id, name, status, record_count FROM sources
                 WHERE project_id = ?1 AND status = 'ready' ORDER BY id",
            )?;
            let rows = stmt.query_map(params![project.id], source_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        if ready.is_empty() {
            return Ok(RunCreation::NoReadySources);
        }

        let total_records: i64 = ready.iter().map(|s| s.record_count.unwrap_or(0)).sum();
        let snapshot = ConfigSnapshot {
            target_schema: project.target_schema.clone(),
            quality_settings: request.quality_settings.clone(),
            source_ids: ready.iter().map(|s| s.id).collect(),
        };
        let snapshot_json = serde_json::to_string(&snapshot)
            .map_err(|e| StoreError::Corrupt(format!("config snapshot: {e}")))?;
        let now = fmt_ts(now_utc());

        let inserted = tx.execute(
            "INSERT INTO processing_runs
                (project_id, status, config_snapshot, total_records, processed_records,
                 created_by_id, started_at, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?6)",
            params![
                project.id,
                RunStatus::Processing.as_str(),
                snapshot_json,
                total_records,
                request.created_by_id,
                now
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => return Ok(RunCreation::AlreadyProcessing),
            Err(err) => return Err(err.into()),
        }
        let run_id = tx.last_insert_rowid();

        for stage in StageName::SEQUENCE {
            tx.execute(
                "INSERT INTO processing_stages (run_id, stage, status) VALUES (?1, ?2, ?3)",
                params![run_id, stage.as_str(), StageStatus::Pending.as_str()],
            )?;
        }

        let run = query_run(&tx, run_id)?
            .ok_or_else(|| StoreError::Corrupt(format!("run {run_id} vanished after insert")))?;
        let stages = query_stages(&tx, run_id)?;
        tx.commit()?;

        Ok(RunCreation::Created { run, stages })
    }

    fn list_runs(
        &self,
        project_id: i64,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<ProcessingRun>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM processing_runs r WHERE r.project_id = ?1
             ORDER BY r.created_at DESC, r.id DESC LIMIT ?2 OFFSET ?3"
        ))?;
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![project_id, i64::from(limit), offset], run_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn count_runs(&self, project_id: i64) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM processing_runs WHERE project_id = ?1",
            params![project_id],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    fn find_run(
        &self,
        run_id: i64,
        organisation_id: i64,
    ) -> Result<Option<ProcessingRun>, StoreError> {
        let conn = self.lock()?;
        let run = conn
            .query_row(
                &format!(
                    "SELECT {RUN_COLUMNS} FROM processing_runs r
                     INNER JOIN projects p ON r.project_id = p.id
                     WHERE r.id = ?1 AND p.organisation_id = ?2"
                ),
                params![run_id, organisation_id],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn get_run(&self, run_id: i64) -> Result<Option<ProcessingRun>, StoreError> {
        let conn = self.lock()?;
        Ok(query_run(&conn, run_id)?)
    }

    fn list_stages(&self, run_id: i64) -> Result<Vec<ProcessingStage>, StoreError> {
        let conn = self.lock()?;
        Ok(query_stages(&conn, run_id)?)
    }

    fn cancel_run(
        &self,
        run_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<ProcessingRun>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE processing_runs SET status = 'cancelled', completed_at = ?2
             WHERE id = ?1 AND status = 'processing'",
            params![run_id, fmt_ts(at)],
        )?;
        let run = if changed == 1 {
            query_run(&tx, run_id)?
        } else {
            None
        };
        tx.commit()?;
        Ok(run)
    }

    fn start_stage(
        &self,
        run_id: i64,
        stage: StageName,
        input_count: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE processing_stages
             SET status = 'processing', started_at = ?3, input_count = ?4
             WHERE run_id = ?1 AND stage = ?2 AND status = 'pending'
               AND EXISTS (SELECT 1 FROM processing_runs WHERE id = ?1 AND status = 'processing')",
            params![run_id, stage.as_str(), fmt_ts(at), input_count],
        )?;
        Ok(changed == 1)
    }

    fn complete_stage(
        &self,
        run_id: i64,
        stage: StageName,
        output_count: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE processing_stages
             SET status = 'completed', completed_at = ?3, output_count = ?4
             WHERE run_id = ?1 AND stage = ?2 AND status = 'processing'
               AND EXISTS (SELECT 1 FROM processing_runs WHERE id = ?1 AND status = 'processing')",
            params![run_id, stage.as_str(), fmt_ts(at), output_count],
        )?;
        Ok(changed == 1)
    }

    fn interrupt_stage(
        &self,
        run_id: i64,
        stage: StageName,
        status: StageStatus,
        message: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        if !StageStatus::Processing.can_transition_to(status) {
            return Err(StoreError::StageTransition {
                from: StageStatus::Processing,
                to: status,
            });
        }
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE processing_stages
             SET status = ?3, completed_at = ?4, error_message = ?5
             WHERE run_id = ?1 AND stage = ?2 AND status = 'processing'",
            params![run_id, stage.as_str(), status.as_str(), fmt_ts(at), message],
        )?;
        Ok(changed == 1)
    }

    fn complete_run(
        &self,
        run_id: i64,
        processed_records: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE processing_runs
             SET status = 'completed', processed_records = MAX(processed_records, ?2),
                 completed_at = ?3
             WHERE id = ?1 AND status = 'processing'",
            params![run_id, processed_records, fmt_ts(at)],
        )?;
        Ok(changed == 1)
    }

    fn fail_run(&self, run_id: i64, message: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE processing_runs
             SET status = 'failed', error_message = ?2, completed_at = ?3
             WHERE id = ?1 AND status = 'processing'",
            params![run_id, message, fmt_ts(at)],
        )?;
        Ok(changed == 1)
    }

    fn processing_run_ids(&self) -> Result<Vec<i64>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id FROM processing_runs WHERE status = 'processing' ORDER BY id")?;
        let rows = stmt.query_map(params![], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<i64>>>()?)
    }

    fn insert_seed(
        &self,
        projects: &[NewProject],
        sources: &[NewSource],
    ) -> Result<SeededRows, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let created_at = fmt_ts(now_utc());
        let mut rows = SeededRows::default();

        for project in projects {
            tx.execute(
                "INSERT INTO projects (id, organisation_id, name, target_schema, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    project.id,
                    project.organisation_id,
                    project.name,
                    project.target_schema,
                    created_at
                ],
            )?;
            rows.projects.push(Project {
                id: tx.last_insert_rowid(),
                organisation_id: project.organisation_id,
                name: project.name.clone(),
                target_schema: project.target_schema.clone(),
            });
        }

        for source in sources {
            tx.execute(
                "INSERT INTO sources (id, project_id, name, status, record_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    source.id,
                    source.project_id,
                    source.name,
                    source.status.as_str(),
                    source.record_count,
                    created_at
                ],
            )?;
            rows.sources.push(Source {
                id: tx.last_insert_rowid(),
                project_id: source.project_id,
                name: source.name.clone(),
                status: source.status,
                record_count: source.record_count,
            });
        }

        tx.commit()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SourceStatus;
    use dataprep_protocol::QualitySettings;

    fn project(id: Option<i64>, organisation_id: i64) -> NewProject {
        NewProject {
            id,
            organisation_id,
            name: "support-tickets".to_string(),
            target_schema: Some("qa_pairs".to_string()),
        }
    }

    fn source(project_id: i64, status: SourceStatus, count: Option<i64>) -> NewSource {
        NewSource {
            id: None,
            project_id,
            name: "export.csv".to_string(),
            status,
            record_count: count,
        }
    }

    fn seeded() -> (SqliteRunStore, Project) {
        let store = SqliteRunStore::open_in_memory().unwrap();
        let mut rows = store.insert_seed(&[project(None, 1)], &[]).unwrap();
        let project = rows.projects.remove(0);
        (store, project)
    }

    fn add_source(store: &SqliteRunStore, project_id: i64, status: SourceStatus, count: Option<i64>) {
        store
            .insert_seed(&[], &[source(project_id, status, count)])
            .unwrap();
    }

    fn request(project_id: i64) -> RunRequest {
        RunRequest {
            project_id,
            organisation_id: 1,
            created_by_id: 42,
            quality_settings: QualitySettings::default(),
        }
    }

    fn created(outcome: RunCreation) -> (ProcessingRun, Vec<ProcessingStage>) {
        match outcome {
            RunCreation::Created { run, stages } => (run, stages),
            other => panic!("expected run to be created, got {other:?}"),
        }
    }

    #[test]
    fn test_create_run_sums_only_ready_sources() {
        let (store, project) = seeded();
        add_source(&store, project.id, SourceStatus::Ready, Some(100));
        add_source(&store, project.id, SourceStatus::Ready, None);
        add_source(&store, project.id, SourceStatus::Ready, Some(20));
        add_source(&store, project.id, SourceStatus::Error, Some(999));

        let (run, stages) = created(store.create_run(&request(project.id)).unwrap());

        assert_eq!(run.total_records, 120);
        assert_eq!(run.processed_records, 0);
        assert_eq!(run.status, RunStatus::Processing);
        assert_eq!(run.created_by_id, 42);
        assert!(run.started_at.is_some());
        assert_eq!(run.config_snapshot.source_ids.len(), 3);
        assert_eq!(run.config_snapshot.target_schema.as_deref(), Some("qa_pairs"));

        let names: Vec<_> = stages.iter().map(|s| s.stage).collect();
        assert_eq!(names, StageName::SEQUENCE.to_vec());
        assert!(stages.iter().all(|s| s.status == StageStatus::Pending));
    }

    #[test]
    fn test_precondition_order() {
        let (store, project) = seeded();

        // Wrong organisation is reported before the missing sources
        let mut other_org = request(project.id);
        other_org.organisation_id = 2;
        assert!(matches!(
            store.create_run(&other_org).unwrap(),
            RunCreation::ProjectNotFound
        ));

        assert!(matches!(
            store.create_run(&request(project.id)).unwrap(),
            RunCreation::NoReadySources
        ));
        assert_eq!(store.count_runs(project.id).unwrap(), 0);
    }

    #[test]
    fn test_second_processing_run_rejected() {
        let (store, project) = seeded();
        add_source(&store, project.id, SourceStatus::Ready, Some(5));

        created(store.create_run(&request(project.id)).unwrap());
        assert!(matches!(
            store.create_run(&request(project.id)).unwrap(),
            RunCreation::AlreadyProcessing
        ));
        assert_eq!(store.count_runs(project.id).unwrap(), 1);
    }

    #[test]
    fn test_partial_unique_index_blocks_direct_insert() {
        let (store, project) = seeded();
        add_source(&store, project.id, SourceStatus::Ready, Some(5));
        created(store.create_run(&request(project.id)).unwrap());

        let conn = store.lock().unwrap();
        let err = conn
            .execute(
                "INSERT INTO processing_runs (project_id, status, config_snapshot, created_by_id, created_at)
                 VALUES (?1, 'processing', '{}', 1, '2026-01-01T00:00:00.000000Z')",
                params![project.id],
            )
            .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[test]
    fn test_snapshot_is_write_once() {
        let (store, project) = seeded();
        add_source(&store, project.id, SourceStatus::Ready, Some(5));
        let (run, _) = created(store.create_run(&request(project.id)).unwrap());

        let conn = store.lock().unwrap();
        let result = conn.execute(
            "UPDATE processing_runs SET config_snapshot = '{}' WHERE id = ?1",
            params![run.id],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_cancel_only_when_processing() {
        let (store, project) = seeded();
        add_source(&store, project.id, SourceStatus::Ready, Some(5));
        let (run, _) = created(store.create_run(&request(project.id)).unwrap());

        let cancelled = store.cancel_run(run.id, now_utc()).unwrap().unwrap();
        assert_eq!(cancelled.status, RunStatus::Cancelled);
        assert!(cancelled.completed_at.is_some());
        assert_eq!(cancelled.total_records, run.total_records);
        assert_eq!(cancelled.config_snapshot, run.config_snapshot);

        // Second cancel is a no-op
        assert!(store.cancel_run(run.id, now_utc()).unwrap().is_none());
    }

    #[test]
    fn test_stage_writes_guarded_by_run_status() {
        let (store, project) = seeded();
        add_source(&store, project.id, SourceStatus::Ready, Some(5));
        let (run, _) = created(store.create_run(&request(project.id)).unwrap());

        assert!(store.start_stage(run.id, StageName::Extraction, 5, now_utc()).unwrap());
        // Cannot start twice
        assert!(!store.start_stage(run.id, StageName::Extraction, 5, now_utc()).unwrap());

        store.cancel_run(run.id, now_utc()).unwrap();

        // Late writers cannot advance a cancelled run
        assert!(!store.complete_stage(run.id, StageName::Extraction, 5, now_utc()).unwrap());
        assert!(!store.start_stage(run.id, StageName::PiiDetection, 5, now_utc()).unwrap());
        assert!(!store.complete_run(run.id, 5, now_utc()).unwrap());
        assert!(!store.fail_run(run.id, "boom", now_utc()).unwrap());

        // But the in-flight stage can still be closed out
        assert!(store
            .interrupt_stage(run.id, StageName::Extraction, StageStatus::Cancelled, None, now_utc())
            .unwrap());

        let run = store.get_run(run.id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
    }

    #[test]
    fn test_find_run_scoped_by_organisation() {
        let (store, project) = seeded();
        add_source(&store, project.id, SourceStatus::Ready, Some(5));
        let (run, _) = created(store.create_run(&request(project.id)).unwrap());

        assert!(store.find_run(run.id, 1).unwrap().is_some());
        assert!(store.find_run(run.id, 2).unwrap().is_none());
        assert!(store.find_run(run.id + 100, 1).unwrap().is_none());
    }

    #[test]
    fn test_list_runs_newest_first() {
        let (store, project) = seeded();
        add_source(&store, project.id, SourceStatus::Ready, Some(5));

        let mut ids = Vec::new();
        for _ in 0..3 {
            let (run, _) = created(store.create_run(&request(project.id)).unwrap());
            store.complete_run(run.id, 5, now_utc()).unwrap();
            ids.push(run.id);
        }

        let listed: Vec<_> = store
            .list_runs(project.id, 0, 10)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        ids.reverse();
        assert_eq!(listed, ids);

        let page2 = store.list_runs(project.id, 2, 2).unwrap();
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].id, ids[2]);
    }

    #[test]
    fn test_reopen_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataprep.db");

        {
            let store = SqliteRunStore::open(&path, Duration::from_secs(1)).unwrap();
            store.insert_seed(&[project(Some(7), 3)], &[]).unwrap();
        }

        let store = SqliteRunStore::open(&path, Duration::from_secs(1)).unwrap();
        let project = store.find_project(7, 3).unwrap().unwrap();
        assert_eq!(project.name, "support-tickets");
    }

    #[test]
    fn test_second_owner_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataprep.db");

        let owner = SqliteRunStore::open(&path, Duration::from_millis(50)).unwrap();
        owner
            .insert_seed(
                &[project(Some(1), 1)],
                &[source(1, SourceStatus::Ready, Some(5))],
            )
            .unwrap();
        let (run, _) = created(owner.create_run(&request(1)).unwrap());
        assert!(owner.start_stage(run.id, StageName::Extraction, 5, now_utc()).unwrap());

        let err = SqliteRunStore::open(&path, Duration::from_millis(50))
            .err()
            .expect("second owner must be refused");
        assert!(matches!(err, StoreError::InUse(ref p) if p == &path), "got {err:?}");

        // The live owner's run was not touched
        assert!(owner.complete_stage(run.id, StageName::Extraction, 5, now_utc()).unwrap());
        drop(owner);

        let next = SqliteRunStore::open(&path, Duration::from_millis(50)).unwrap();
        assert_eq!(next.processing_run_ids().unwrap(), vec![run.id]);
    }

    #[test]
    fn test_interrupt_stage_only_to_terminal_status() {
        let (store, project) = seeded();
        add_source(&store, project.id, SourceStatus::Ready, Some(5));
        let (run, _) = created(store.create_run(&request(project.id)).unwrap());
        store.start_stage(run.id, StageName::Extraction, 5, now_utc()).unwrap();

        for target in [StageStatus::Pending, StageStatus::Processing, StageStatus::Completed] {
            let err = store
                .interrupt_stage(run.id, StageName::Extraction, target, None, now_utc())
                .unwrap_err();
            assert!(matches!(err, StoreError::StageTransition { to, .. } if to == target));
        }
        assert_eq!(store.list_stages(run.id).unwrap()[0].status, StageStatus::Processing);
    }

    #[test]
    fn test_unique_violation_distinguished_from_other_constraints() {
        let (store, project) = seeded();
        add_source(&store, project.id, SourceStatus::Ready, Some(5));
        let (run, _) = created(store.create_run(&request(project.id)).unwrap());
        let conn = store.lock().unwrap();

        let duplicate_stage = conn
            .execute(
                "INSERT INTO processing_stages (run_id, stage) VALUES (?1, 'mapping')",
                params![run.id],
            )
            .unwrap_err();
        assert!(is_unique_violation(&duplicate_stage));

        let missing_project = conn
            .execute(
                "INSERT INTO processing_runs (project_id, status, config_snapshot, created_by_id, created_at)
                 VALUES (999, 'failed', '{}', 1, '2026-01-01T00:00:00.000000Z')",
                params![],
            )
            .unwrap_err();
        assert!(!is_unique_violation(&missing_project));

        let write_once = conn
            .execute(
                "UPDATE processing_runs SET total_records = 1 WHERE id = ?1",
                params![run.id],
            )
            .unwrap_err();
        assert!(!is_unique_violation(&write_once));

        let null_name = conn
            .execute(
                "INSERT INTO projects (organisation_id, name, created_at) VALUES (1, NULL, 'x')",
                params![],
            )
            .unwrap_err();
        assert!(!is_unique_violation(&null_name));
    }

    #[test]
    fn test_insert_seed_is_all_or_nothing() {
        let store = SqliteRunStore::open_in_memory().unwrap();

        // Second source points at a project that does not exist
        let result = store.insert_seed(
            &[project(Some(1), 1)],
            &[
                source(1, SourceStatus::Ready, Some(5)),
                source(2, SourceStatus::Ready, Some(5)),
            ],
        );
        assert!(matches!(result, Err(StoreError::Db(_))));
        assert!(store.find_project(1, 1).unwrap().is_none());

        let rows = store
            .insert_seed(&[project(Some(1), 1)], &[source(1, SourceStatus::Ready, Some(5))])
            .unwrap();
        assert_eq!(rows.projects[0].id, 1);
        assert_eq!(rows.sources[0].project_id, 1);
    }
}
