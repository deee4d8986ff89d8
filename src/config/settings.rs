//! Typed view of the merged configuration.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use super::defaults::BuiltinDefaults;

/// Path value that selects a private in-memory database.
pub const MEMORY_DATABASE: &str = ":memory:";

/// Server configuration consumed by `serve`, `migrate` and `seed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub pipeline: PipelineSection,
    pub pagination: PaginationSection,
    pub log: LogSection,
    #[serde(default)]
    pub auth: AuthSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    pub bind: SocketAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub path: String,
    pub busy_timeout_ms: u64,
}

impl DatabaseSection {
    pub fn is_memory(&self) -> bool {
        self.path == MEMORY_DATABASE
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Timing knobs for the stage sequencer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    pub dispatch_delay_ms: u64,
    pub stage_delay_ms: u64,
    pub stage_timeout_seconds: u64,
}

impl PipelineSection {
    pub fn dispatch_delay(&self) -> Duration {
        Duration::from_millis(self.dispatch_delay_ms)
    }

    pub fn stage_delay(&self) -> Duration {
        Duration::from_millis(self.stage_delay_ms)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationSection {
    pub default_limit: u32,
    pub max_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSection {
    pub filter: String,
    /// Append logs to this file instead of stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthSection {
    #[serde(default)]
    pub tokens: Vec<TokenGrant>,
}

/// A bearer token accepted by the API, stored as its SHA-256 hex digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub token_sha256: String,
    pub user_id: i64,
    pub organisation_id: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let d = BuiltinDefaults::default();
        Self {
            server: ServerSection {
                bind: d
                    .bind
                    .parse()
                    .unwrap_or_else(|_| SocketAddr::from((Ipv4Addr::LOCALHOST, 3001))),
            },
            database: DatabaseSection {
                path: d.database_path,
                busy_timeout_ms: d.busy_timeout_ms,
            },
            pipeline: PipelineSection {
                dispatch_delay_ms: d.dispatch_delay_ms,
                stage_delay_ms: d.stage_delay_ms,
                stage_timeout_seconds: d.stage_timeout_seconds,
            },
            pagination: PaginationSection {
                default_limit: d.default_page_limit,
                max_limit: d.max_page_limit,
            },
            log: LogSection {
                filter: d.log_filter,
                file: None,
            },
            auth: AuthSection::default(),
        }
    }
}
