//! Wiring of store, pipeline and HTTP router into a running server.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::api::{self, AppState, TokenAuthenticator};
use crate::config::{DatabaseSection, ServerConfig};
use crate::pipeline::{
    RunOrchestrator, RunQuery, RunSupervisor, SimulatedStageExecutor, StageExecutor,
    StageSequencer,
};
use crate::store::{RunStore, SqliteRunStore, StoreError};

/// Open the configured database, creating and migrating it as needed.
pub fn open_store(database: &DatabaseSection) -> Result<SqliteRunStore, StoreError> {
    if database.is_memory() {
        SqliteRunStore::open_in_memory()
    } else {
        SqliteRunStore::open(Path::new(&database.path), database.busy_timeout())
    }
}

/// A fully wired processing server.
pub struct App {
    state: AppState,
    supervisor: Arc<RunSupervisor>,
}

impl App {
    /// Wire the server with simulated stage work.
    ///
    /// Cancelling `shutdown` interrupts every run the server has started.
    pub fn new(
        config: &ServerConfig,
        store: Arc<dyn RunStore>,
        shutdown: CancellationToken,
    ) -> Self {
        let executor = Arc::new(SimulatedStageExecutor::new(config.pipeline.stage_delay()));
        Self::with_executor(config, store, executor, shutdown)
    }

    pub fn with_executor(
        config: &ServerConfig,
        store: Arc<dyn RunStore>,
        executor: Arc<dyn StageExecutor>,
        shutdown: CancellationToken,
    ) -> Self {
        let supervisor = Arc::new(RunSupervisor::with_root(shutdown));
        let sequencer = Arc::new(StageSequencer::new(
            Arc::clone(&store),
            executor,
            config.pipeline.stage_timeout(),
        ));
        let orchestrator = RunOrchestrator::new(
            Arc::clone(&store),
            Arc::clone(&supervisor),
            sequencer,
            config.pipeline.dispatch_delay(),
        );
        let query = RunQuery::new(store, Arc::clone(&supervisor));

        let state = AppState {
            orchestrator: Arc::new(orchestrator),
            query: Arc::new(query),
            auth: Arc::new(TokenAuthenticator::new(&config.auth.tokens)),
            pagination: config.pagination.clone(),
        };

        Self { state, supervisor }
    }

    pub fn router(&self) -> Router {
        api::router(self.state.clone())
    }

    pub fn supervisor(&self) -> &Arc<RunSupervisor> {
        &self.supervisor
    }

    /// Serve until `shutdown` fires, then give in-flight runs up to `grace`
    /// to record their interruption.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
        grace: Duration,
    ) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(%addr, "processing server listening");

        let stop = shutdown.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { stop.cancelled().await })
            .await?;

        tracing::info!(
            active_runs = self.supervisor.active_count(),
            "http server stopped, interrupting active runs"
        );
        if tokio::time::timeout(grace, self.supervisor.shutdown())
            .await
            .is_err()
        {
            tracing::warn!(
                grace_seconds = grace.as_secs(),
                "grace period elapsed before all runs recorded their interruption"
            );
        }
        Ok(())
    }
}
