//! Monitoring module for Taskweave.
//!
//! Installs the `tracing` subscriber and exposes the sync metrics recorded
//! through the `metrics` facade. No exporter is installed here; an
//! embedding application may install one before recording starts.

use serde::{Deserialize, Serialize};

pub mod logging;
pub mod metrics;

/// Configuration for initializing logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Service name attached to the startup log line
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Log level filter (e.g., "info,taskweave_sync=debug")
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// JSON output instead of the human-readable format
    #[serde(default)]
    pub enable_json_logging: bool,
}

fn default_service_name() -> String {
    "taskweave".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_filter: default_log_filter(),
            enable_json_logging: false,
        }
    }
}

impl MonitoringConfig {
    /// Defaults overridden by `LOG_FILTER` and `TASKWEAVE_JSON_LOGS`
    pub fn from_env(service_name: &str) -> Self {
        let mut config = Self {
            service_name: service_name.to_string(),
            ..Self::default()
        };
        if let Ok(filter) = std::env::var("LOG_FILTER") {
            config.log_filter = filter;
        }
        if let Ok(json) = std::env::var("TASKWEAVE_JSON_LOGS") {
            config.enable_json_logging = json.to_lowercase() == "true" || json == "1";
        }
        config
    }
}

// Exported types
pub use crate::logging::{init_logging, LogExt};
pub use crate::metrics::{LoadSource, SyncMetrics};
