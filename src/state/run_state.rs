//! Run state machine
//!
//! Run states: PENDING → PROCESSING → {COMPLETED | FAILED | CANCELLED}

use chrono::{DateTime, Utc};
use dataprep_protocol::QualitySettings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{TerminalState, UnknownVariant};

/// Run status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created but not yet advancing
    Pending,
    /// Stages are being advanced
    Processing,
    /// All stages finished
    Completed,
    /// A stage failed or processing was interrupted
    Failed,
    /// Cancelled by a caller while processing
    Cancelled,
}

impl TerminalState for RunStatus {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

impl RunStatus {
    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: RunStatus) -> bool {
        match (self, target) {
            // From PENDING
            (RunStatus::Pending, RunStatus::Processing) => true,
            (RunStatus::Pending, RunStatus::Cancelled) => true,
            (RunStatus::Pending, RunStatus::Failed) => true,

            // From PROCESSING
            (RunStatus::Processing, RunStatus::Completed) => true,
            (RunStatus::Processing, RunStatus::Failed) => true,
            (RunStatus::Processing, RunStatus::Cancelled) => true,

            // Terminal states cannot transition
            _ => false,
        }
    }

    /// Stored/serialized name
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Processing => "processing",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "processing" => Ok(RunStatus::Processing),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "cancelled" => Ok(RunStatus::Cancelled),
            other => Err(UnknownVariant {
                kind: "run status",
                value: other.to_string(),
            }),
        }
    }
}

/// Configuration captured when a run starts. Never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    /// Target schema of the project at start time
    pub target_schema: Option<String>,

    /// Quality settings supplied with the start request (empty object if none)
    pub quality_settings: QualitySettings,

    /// Ready sources contributing to the run
    pub source_ids: Vec<i64>,
}

/// A processing run row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingRun {
    pub id: i64,
    pub project_id: i64,
    pub status: RunStatus,
    pub config_snapshot: ConfigSnapshot,
    pub total_records: i64,
    pub processed_records: i64,
    pub filtered_records: i64,
    pub error_records: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_by_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Errors for run state operations
#[derive(Debug, thiserror::Error)]
pub enum RunStateError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },

    #[error("Run is in terminal state {0}")]
    TerminalState(RunStatus),
}

impl ProcessingRun {
    /// Check that the run may move to `target`.
    pub fn check_transition(&self, target: RunStatus) -> Result<(), RunStateError> {
        if self.status.is_terminal() {
            return Err(RunStateError::TerminalState(self.status));
        }
        if !self.status.can_transition_to(target) {
            return Err(RunStateError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(status: RunStatus) -> ProcessingRun {
        ProcessingRun {
            id: 1,
            project_id: 7,
            status,
            config_snapshot: ConfigSnapshot {
                target_schema: Some("qa_pairs".to_string()),
                quality_settings: QualitySettings::default(),
                source_ids: vec![3],
            },
            total_records: 120,
            processed_records: 0,
            filtered_records: 0,
            error_records: 0,
            started_at: Some(Utc::now()),
            completed_at: None,
            error_message: None,
            created_by_id: 9,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_transitions() {
        assert!(RunStatus::Processing.can_transition_to(RunStatus::Completed));
        assert!(RunStatus::Processing.can_transition_to(RunStatus::Failed));
        assert!(RunStatus::Processing.can_transition_to(RunStatus::Cancelled));
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Processing));
    }

    #[test]
    fn test_invalid_transition() {
        // Cannot skip straight to COMPLETED
        assert!(!RunStatus::Pending.can_transition_to(RunStatus::Completed));
        assert!(matches!(
            run(RunStatus::Pending).check_transition(RunStatus::Completed),
            Err(RunStateError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_terminal_state_no_transition() {
        for status in [RunStatus::Completed, RunStatus::Failed, RunStatus::Cancelled] {
            assert!(status.is_terminal());
            assert!(matches!(
                run(status).check_transition(RunStatus::Cancelled),
                Err(RunStateError::TerminalState(_))
            ));
        }
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in [
            RunStatus::Pending,
            RunStatus::Processing,
            RunStatus::Completed,
            RunStatus::Failed,
            RunStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
        assert!("running".parse::<RunStatus>().is_err());
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_value(run(RunStatus::Processing)).unwrap();

        assert_eq!(json["status"], "processing");
        assert_eq!(json["projectId"], 7);
        assert_eq!(json["totalRecords"], 120);
        assert_eq!(json["configSnapshot"]["targetSchema"], "qa_pairs");
        assert_eq!(json["configSnapshot"]["qualitySettings"], serde_json::json!({}));
        assert_eq!(json["configSnapshot"]["sourceIds"], serde_json::json!([3]));
        assert!(json["completedAt"].is_null());
    }
}
