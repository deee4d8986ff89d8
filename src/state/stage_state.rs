//! Stage state machine
//!
//! Stage states: PENDING → PROCESSING → {COMPLETED | FAILED | CANCELLED}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::UnknownVariant;

/// Pipeline stage names, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Extraction,
    PiiDetection,
    Mapping,
    QualityFilter,
    Export,
}

impl StageName {
    /// The fixed stage sequence every run walks through.
    pub const SEQUENCE: [StageName; 5] = [
        StageName::Extraction,
        StageName::PiiDetection,
        StageName::Mapping,
        StageName::QualityFilter,
        StageName::Export,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Extraction => "extraction",
            StageName::PiiDetection => "pii_detection",
            StageName::Mapping => "mapping",
            StageName::QualityFilter => "quality_filter",
            StageName::Export => "export",
        }
    }

    /// Zero-based position in [`StageName::SEQUENCE`].
    pub fn position(&self) -> usize {
        match self {
            StageName::Extraction => 0,
            StageName::PiiDetection => 1,
            StageName::Mapping => 2,
            StageName::QualityFilter => 3,
            StageName::Export => 4,
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageName::SEQUENCE
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "stage",
                value: s.to_string(),
            })
    }
}

/// Stage status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Waiting for its predecessor
    Pending,
    /// Work in flight
    Processing,
    /// Work finished
    Completed,
    /// Work raised an error or was interrupted by shutdown
    Failed,
    /// Interrupted by run cancellation
    Cancelled,
}

impl StageStatus {
    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: StageStatus) -> bool {
        matches!(
            (self, target),
            (StageStatus::Pending, StageStatus::Processing)
                | (StageStatus::Processing, StageStatus::Completed)
                | (StageStatus::Processing, StageStatus::Failed)
                | (StageStatus::Processing, StageStatus::Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Processing => "processing",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
            StageStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StageStatus::Pending),
            "processing" => Ok(StageStatus::Processing),
            "completed" => Ok(StageStatus::Completed),
            "failed" => Ok(StageStatus::Failed),
            "cancelled" => Ok(StageStatus::Cancelled),
            other => Err(UnknownVariant {
                kind: "stage status",
                value: other.to_string(),
            }),
        }
    }
}

/// A processing stage row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStage {
    pub id: i64,
    pub run_id: i64,
    pub stage: StageName,
    pub status: StageStatus,
    pub input_count: i64,
    pub output_count: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_order() {
        let names: Vec<_> = StageName::SEQUENCE.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            vec!["extraction", "pii_detection", "mapping", "quality_filter", "export"]
        );
        for (i, stage) in StageName::SEQUENCE.iter().enumerate() {
            assert_eq!(stage.position(), i);
        }
    }

    #[test]
    fn test_stage_name_parse() {
        assert_eq!("pii_detection".parse::<StageName>().unwrap(), StageName::PiiDetection);
        assert!("transform".parse::<StageName>().is_err());
    }

    #[test]
    fn test_stage_transitions() {
        assert!(StageStatus::Pending.can_transition_to(StageStatus::Processing));
        assert!(StageStatus::Processing.can_transition_to(StageStatus::Completed));

        // No skipping straight to COMPLETED
        assert!(!StageStatus::Pending.can_transition_to(StageStatus::Completed));
        assert!(!StageStatus::Completed.can_transition_to(StageStatus::Processing));
        assert!(!StageStatus::Cancelled.can_transition_to(StageStatus::Processing));
    }

    #[test]
    fn test_serialization() {
        let stage = ProcessingStage {
            id: 1,
            run_id: 2,
            stage: StageName::QualityFilter,
            status: StageStatus::Pending,
            input_count: 0,
            output_count: 0,
            started_at: None,
            completed_at: None,
            error_message: None,
        };
        let json = serde_json::to_value(&stage).unwrap();
        assert_eq!(json["stage"], "quality_filter");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["runId"], 2);
        assert!(json["errorMessage"].is_null());
    }
}
