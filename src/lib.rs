//! Dataset preparation processing service
//!
//! Runs the processing pipeline of a dataset-preparation backend: an
//! organisation starts a run for a project, the run walks five fixed stages
//! (extraction, PII detection, mapping, quality filter, export), and clients
//! poll run and stage state over a JSON REST API.

pub mod api;
pub mod config;
pub mod pipeline;
pub mod seed;
pub mod server;
pub mod signal;
pub mod state;
pub mod store;
pub mod telemetry;

pub use config::{EffectiveConfig, ServerConfig};
pub use pipeline::{ProcessingError, RunOrchestrator, RunQuery, RunSupervisor};
pub use server::{open_store, App};
pub use state::{ProcessingRun, ProcessingStage, RunStatus, StageName, StageStatus};
pub use store::{RunStore, SqliteRunStore, StoreError};
