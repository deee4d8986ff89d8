//! Rows owned by collaborators (projects, sources) and run creation types.

use dataprep_protocol::QualitySettings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::state::{ProcessingRun, ProcessingStage, UnknownVariant};

/// A project row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: i64,
    pub organisation_id: i64,
    pub name: String,
    pub target_schema: Option<String>,
}

/// Ingestion status of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Pending,
    Processing,
    Ready,
    Error,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Pending => "pending",
            SourceStatus::Processing => "processing",
            SourceStatus::Ready => "ready",
            SourceStatus::Error => "error",
        }
    }
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SourceStatus::Pending),
            "processing" => Ok(SourceStatus::Processing),
            "ready" => Ok(SourceStatus::Ready),
            "error" => Ok(SourceStatus::Error),
            other => Err(UnknownVariant {
                kind: "source status",
                value: other.to_string(),
            }),
        }
    }
}

/// A source row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub status: SourceStatus,
    pub record_count: Option<i64>,
}

/// Project to insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProject {
    /// Explicit id; assigned by the store when absent
    #[serde(default)]
    pub id: Option<i64>,
    pub organisation_id: i64,
    pub name: String,
    #[serde(default)]
    pub target_schema: Option<String>,
}

/// Source to insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSource {
    #[serde(default)]
    pub id: Option<i64>,
    pub project_id: i64,
    pub name: String,
    pub status: SourceStatus,
    #[serde(default)]
    pub record_count: Option<i64>,
}

/// Inputs for [`super::RunStore::create_run`].
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub project_id: i64,
    pub organisation_id: i64,
    pub created_by_id: i64,
    pub quality_settings: QualitySettings,
}

/// Outcome of an attempted run creation.
#[derive(Debug, Clone)]
pub enum RunCreation {
    /// Run and stage rows were written.
    Created {
        run: ProcessingRun,
        stages: Vec<ProcessingStage>,
    },
    /// Project missing or owned by another organisation.
    ProjectNotFound,
    /// The project already has a run in PROCESSING.
    AlreadyProcessing,
    /// The project has no source in READY.
    NoReadySources,
}

/// Rows written by [`super::RunStore::insert_seed`], with their assigned ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeededRows {
    pub projects: Vec<Project>,
    pub sources: Vec<Source>,
}
