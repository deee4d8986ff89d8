//! Startup recovery of runs orphaned by a previous process.
//!
//! A run found PROCESSING at boot has no task driving it. It is marked failed
//! together with whichever stage was in flight. The store holds the database
//! exclusively, so no other live process can own such a run.

use crate::state::{now_utc, StageStatus};
use crate::store::{RunStore, StoreError};

/// Error message recorded on runs found PROCESSING at startup.
pub const RESTART_MESSAGE: &str = "Processing interrupted by server restart";

/// Fail every PROCESSING run. Returns the ids that were recovered.
///
/// Call before the server accepts requests.
pub fn recover_interrupted_runs(store: &dyn RunStore) -> Result<Vec<i64>, StoreError> {
    let mut recovered = Vec::new();

    for run_id in store.processing_run_ids()? {
        let at = now_utc();
        for stage in store.list_stages(run_id)? {
            if stage.status == StageStatus::Processing {
                store.interrupt_stage(
                    run_id,
                    stage.stage,
                    StageStatus::Failed,
                    Some(RESTART_MESSAGE),
                    at,
                )?;
            }
        }
        if store.fail_run(run_id, RESTART_MESSAGE, at)? {
            tracing::warn!(run_id, "recovered processing run left over from a previous process");
            recovered.push(run_id);
        }
    }

    Ok(recovered)
}
