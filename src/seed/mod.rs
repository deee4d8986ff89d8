//! Seed file for projects and sources
//!
//! Projects and sources are owned by other services; the `seed` command loads
//! them from a TOML file so the processing server can run standalone.
//!
//! ```toml
//! [[project]]
//! id = 1
//! organisation_id = 1
//! name = "Support tickets"
//! target_schema = "qa_pairs"
//!
//! [[source]]
//! project_id = 1
//! name = "tickets-2024.csv"
//! status = "ready"
//! record_count = 100
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::store::{NewProject, NewSource, RunStore, StoreError};

/// Contents of a seed file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedFile {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    #[serde(default, rename = "project")]
    pub projects: Vec<NewProject>,

    #[serde(default, rename = "source")]
    pub sources: Vec<NewSource>,
}

/// Seed file format version this build reads
pub const SEED_SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SEED_SCHEMA_VERSION
}

/// Errors that can occur when loading or applying a seed file
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("Failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Seed file not found: {0}")]
    NotFound(PathBuf),

    #[error("Unsupported seed schema_version {found}; expected {}", SEED_SCHEMA_VERSION)]
    UnsupportedVersion { found: u32 },

    #[error("Duplicate project id: {0}")]
    DuplicateProject(i64),

    #[error("{entry}: invalid value for '{field}': {reason}")]
    InvalidValue {
        entry: String,
        field: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Rows written by [`SeedFile::apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub projects: usize,
    pub sources: usize,
}

impl SeedFile {
    pub fn load(path: &Path) -> Result<Self, SeedError> {
        if !path.exists() {
            return Err(SeedError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, SeedError> {
        let seed: SeedFile = toml::from_str(content)?;
        seed.validate()?;
        Ok(seed)
    }

    fn validate(&self) -> Result<(), SeedError> {
        if self.schema_version != SEED_SCHEMA_VERSION {
            return Err(SeedError::UnsupportedVersion {
                found: self.schema_version,
            });
        }

        let mut seen = HashSet::new();
        for (i, project) in self.projects.iter().enumerate() {
            let entry = format!("project[{}]", i);
            if let Some(id) = project.id {
                if !seen.insert(id) {
                    return Err(SeedError::DuplicateProject(id));
                }
                check_positive(&entry, "id", id)?;
            }
            check_positive(&entry, "organisation_id", project.organisation_id)?;
            if project.name.trim().is_empty() {
                return Err(invalid(&entry, "name", "name cannot be empty"));
            }
        }

        for (i, source) in self.sources.iter().enumerate() {
            let entry = format!("source[{}]", i);
            check_positive(&entry, "project_id", source.project_id)?;
            if source.name.trim().is_empty() {
                return Err(invalid(&entry, "name", "name cannot be empty"));
            }
            if source.record_count.is_some_and(|n| n < 0) {
                return Err(invalid(&entry, "record_count", "record_count cannot be negative"));
            }
        }

        Ok(())
    }

    /// Insert every project, then every source, in a single transaction.
    pub fn apply(&self, store: &dyn RunStore) -> Result<SeedSummary, SeedError> {
        let rows = store.insert_seed(&self.projects, &self.sources)?;

        for project in &rows.projects {
            tracing::info!(project_id = project.id, name = %project.name, "seeded project");
        }
        for source in &rows.sources {
            tracing::info!(
                project_id = source.project_id,
                source_id = source.id,
                status = %source.status,
                "seeded source"
            );
        }

        Ok(SeedSummary {
            projects: rows.projects.len(),
            sources: rows.sources.len(),
        })
    }
}

fn check_positive(entry: &str, field: &'static str, value: i64) -> Result<(), SeedError> {
    if value <= 0 {
        return Err(invalid(entry, field, "must be a positive integer"));
    }
    Ok(())
}

fn invalid(entry: &str, field: &'static str, reason: &str) -> SeedError {
    SeedError::InvalidValue {
        entry: entry.to_string(),
        field,
        reason: reason.to_string(),
    }
}
