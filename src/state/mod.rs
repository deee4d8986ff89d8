//! Run and stage state machines
//!
//! - Run states: PENDING → PROCESSING → {COMPLETED | FAILED | CANCELLED}
//! - Stage states: PENDING → PROCESSING → {COMPLETED | FAILED | CANCELLED}
//!
//! Runs are created directly in PROCESSING; PENDING exists for completeness
//! of the taxonomy.

mod run_state;
mod stage_state;

pub use run_state::{ConfigSnapshot, ProcessingRun, RunStateError, RunStatus};
pub use stage_state::{ProcessingStage, StageName, StageStatus};

use chrono::{DateTime, Utc};

/// Current UTC timestamp.
///
/// Truncated to microseconds so a value survives a store round trip unchanged.
pub fn now_utc() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}

/// Check if a state is terminal (no further transitions possible)
pub trait TerminalState {
    fn is_terminal(&self) -> bool;
}

/// Error for a status string that names no known state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}
