//! Built-in server defaults (layer 1)

use serde::{Deserialize, Serialize};

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// HTTP listen address (default: 127.0.0.1:3001)
    pub bind: String,

    /// SQLite database file (default: "dataprep.db")
    pub database_path: String,

    /// SQLite busy timeout in milliseconds (default: 5000)
    pub busy_timeout_ms: u64,

    /// Pause between run creation and the first stage (default: 100)
    pub dispatch_delay_ms: u64,

    /// Simulated work duration of each stage (default: 500)
    pub stage_delay_ms: u64,

    /// Upper bound on a single stage (default: 300 = 5 minutes)
    pub stage_timeout_seconds: u64,

    pub default_page_limit: u32,
    pub max_page_limit: u32,

    /// Tracing filter directive (default: "info")
    pub log_filter: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3001".to_string(),
            database_path: "dataprep.db".to_string(),
            busy_timeout_ms: 5000,
            dispatch_delay_ms: 100,
            stage_delay_ms: 500,
            stage_timeout_seconds: 300,
            default_page_limit: dataprep_protocol::DEFAULT_PAGE_LIMIT,
            max_page_limit: dataprep_protocol::MAX_PAGE_LIMIT,
            log_filter: "info".to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "server": {
                "bind": self.bind
            },
            "database": {
                "path": self.database_path,
                "busy_timeout_ms": self.busy_timeout_ms
            },
            "pipeline": {
                "dispatch_delay_ms": self.dispatch_delay_ms,
                "stage_delay_ms": self.stage_delay_ms,
                "stage_timeout_seconds": self.stage_timeout_seconds
            },
            "pagination": {
                "default_limit": self.default_page_limit,
                "max_limit": self.max_page_limit
            },
            "log": {
                "filter": self.log_filter
            },
            "auth": {
                "tokens": []
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let defaults = BuiltinDefaults::default();
        assert_eq!(defaults.bind, "127.0.0.1:3001");
        assert_eq!(defaults.stage_delay_ms, 500);
        assert_eq!(defaults.dispatch_delay_ms, 100);
        assert_eq!(defaults.default_page_limit, 20);
        assert_eq!(defaults.max_page_limit, 100);
    }

    #[test]
    fn test_to_value() {
        let value = BuiltinDefaults::default().to_value();

        assert_eq!(value["server"]["bind"], "127.0.0.1:3001");
        assert_eq!(value["pipeline"]["stage_timeout_seconds"], 300);
        assert!(value["auth"]["tokens"].as_array().unwrap().is_empty());
        assert!(value["log"].get("file").is_none());
    }
}
