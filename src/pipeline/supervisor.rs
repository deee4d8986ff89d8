//! Supervision of background sequencer tasks.
//!
//! Each run gets a child of the root cancellation token. Cancelling one run
//! cancels its child; shutting down cancels the root and therefore every run.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct SupervisedRun {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Registry of in-flight sequencer tasks keyed by run id.
pub struct RunSupervisor {
    root: CancellationToken,
    runs: Mutex<HashMap<i64, SupervisedRun>>,
}

impl RunSupervisor {
    pub fn new() -> Self {
        Self::with_root(CancellationToken::new())
    }

    /// Supervise under an existing token, typically the process shutdown token.
    pub fn with_root(root: CancellationToken) -> Self {
        Self {
            root,
            runs: Mutex::new(HashMap::new()),
        }
    }

    fn runs(&self) -> MutexGuard<'_, HashMap<i64, SupervisedRun>> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the task for `run_id`, handing it the run's cancellation token.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F, Fut>(&self, run_id: i64, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.root.child_token();
        let handle = tokio::spawn(task(token.clone()));

        let mut runs = self.runs();
        runs.retain(|_, run| !run.handle.is_finished());
        if let Some(previous) = runs.insert(run_id, SupervisedRun { token, handle }) {
            // Run ids are never reused; a stale entry can only be a finished task
            previous.token.cancel();
        }
    }

    /// Signal the run's task to stop. Returns false if no task is tracked.
    pub fn cancel(&self, run_id: i64) -> bool {
        match self.runs().get(&run_id) {
            Some(run) => {
                run.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a task for the run is still executing.
    pub fn is_active(&self, run_id: i64) -> bool {
        self.runs()
            .get(&run_id)
            .is_some_and(|run| !run.handle.is_finished())
    }

    pub fn active_count(&self) -> usize {
        self.runs()
            .values()
            .filter(|run| !run.handle.is_finished())
            .count()
    }

    /// Wait for the run's task to finish.
    pub async fn wait(&self, run_id: i64) {
        let handle = self.runs().remove(&run_id).map(|run| run.handle);
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::error!(run_id, error = %err, "sequencer task panicked");
            }
        }
    }

    /// Cancel every run and wait for their tasks to record the interruption.
    pub async fn shutdown(&self) {
        self.root.cancel();
        let drained: Vec<(i64, JoinHandle<()>)> = self
            .runs()
            .drain()
            .map(|(run_id, run)| (run_id, run.handle))
            .collect();

        for (run_id, handle) in drained {
            if let Err(err) = handle.await {
                tracing::error!(run_id, error = %err, "sequencer task panicked");
            }
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.root.is_cancelled()
    }
}

impl Default for RunSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
