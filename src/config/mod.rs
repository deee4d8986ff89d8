//! Configuration merge system
//!
//! Implements the 4-layer configuration merge:
//! 1. Built-in server defaults
//! 2. Host config (~/.config/dataprep/server.toml)
//! 3. Project config (./dataprep.toml)
//! 4. CLI flags

mod defaults;
mod effective;
mod merge;
mod settings;

pub use defaults::BuiltinDefaults;
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{deep_merge, merge_layers};
pub use settings::{
    AuthSection, DatabaseSection, LogSection, PaginationSection, PipelineSection, ServerConfig,
    ServerSection, TokenGrant, MEMORY_DATABASE,
};

use std::path::PathBuf;

/// Default host config location.
pub fn host_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("dataprep").join("server.toml"))
}

/// Default project config location.
pub fn project_config_path() -> PathBuf {
    PathBuf::from("dataprep.toml")
}
