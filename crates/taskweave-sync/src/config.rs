//! Configuration for the sync engine
//!
//! This module contains the configuration type and its environment loading.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{SyncError, SyncResult};
use crate::retry::RetryPolicy;

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Name of the remote document holding the graph
    #[serde(default = "default_document_name")]
    pub document_name: String,

    /// Quiet period before scheduled snapshots are written
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Write attempts before a save is reported as failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay, doubled per attempt
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound on the retry delay before jitter
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,

    /// Base URL of the document API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Bearer token for the document API
    #[serde(default, skip_serializing)]
    pub access_token: Option<String>,

    /// Directory for the local-file fallback
    #[serde(default)]
    pub local_dir: Option<PathBuf>,
}

fn default_document_name() -> String {
    "taskweave.json".to_string()
}

fn default_debounce_ms() -> u64 {
    900
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    400
}

fn default_backoff_cap_ms() -> u64 {
    8000
}

fn default_api_base_url() -> String {
    "https://www.googleapis.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            document_name: default_document_name(),
            debounce_ms: default_debounce_ms(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            access_token: None,
            local_dir: None,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, target: &mut T) {
    if let Ok(raw) = env::var(name) {
        match raw.parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => warn!("Invalid {} value: {}", name, raw),
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables on top of the defaults
    pub fn load() -> SyncResult<Self> {
        let mut config = Self::default();

        if let Ok(name) = env::var("TASKWEAVE_DOCUMENT_NAME") {
            config.document_name = name;
        }

        parse_var("TASKWEAVE_DEBOUNCE_MS", &mut config.debounce_ms);
        parse_var("TASKWEAVE_MAX_ATTEMPTS", &mut config.max_attempts);
        parse_var("TASKWEAVE_BACKOFF_BASE_MS", &mut config.backoff_base_ms);
        parse_var("TASKWEAVE_BACKOFF_CAP_MS", &mut config.backoff_cap_ms);
        parse_var("TASKWEAVE_REQUEST_TIMEOUT_SECS", &mut config.request_timeout_secs);

        if let Ok(url) = env::var("TASKWEAVE_API_BASE_URL") {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }

        if let Ok(token) = env::var("TASKWEAVE_ACCESS_TOKEN") {
            if !token.is_empty() {
                config.access_token = Some(token);
            }
        }

        if let Ok(dir) = env::var("TASKWEAVE_LOCAL_DIR") {
            if !dir.is_empty() {
                config.local_dir = Some(PathBuf::from(dir));
            }
        }

        config.validate()?;

        if config.access_token.is_none() && config.local_dir.is_none() {
            warn!("No TASKWEAVE_ACCESS_TOKEN or TASKWEAVE_LOCAL_DIR provided - changes will not be persisted until a credential is available");
        }

        info!(
            document_name = %config.document_name,
            debounce_ms = config.debounce_ms,
            max_attempts = config.max_attempts,
            "Sync configuration loaded"
        );
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> SyncResult<()> {
        if self.document_name.trim().is_empty() {
            return Err(SyncError::ConfigError(
                "Document name is required".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(SyncError::ConfigError(
                "At least one write attempt is required".to_string(),
            ));
        }
        if self.backoff_cap_ms < self.backoff_base_ms {
            return Err(SyncError::ConfigError(format!(
                "Backoff cap {}ms is below the base delay {}ms",
                self.backoff_cap_ms, self.backoff_base_ms
            )));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base: Duration::from_millis(self.backoff_base_ms),
            cap: Duration::from_millis(self.backoff_cap_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_timing_constants() {
        let config = SyncConfig::default();
        assert_eq!(config.debounce(), Duration::from_millis(900));

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base, Duration::from_millis(400));
        assert_eq!(policy.cap, Duration::from_millis(8000));
        assert_eq!(config.document_name, "taskweave.json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = SyncConfig {
            max_attempts: 0,
            ..SyncConfig::default()
        };
        assert!(matches!(config.validate(), Err(SyncError::ConfigError(_))));

        let config = SyncConfig {
            backoff_base_ms: 500,
            backoff_cap_ms: 100,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SyncConfig {
            document_name: "  ".to_string(),
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: SyncConfig = serde_json::from_str(r#"{"debounce_ms": 50}"#).unwrap();
        assert_eq!(config.debounce_ms, 50);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.api_base_url, "https://www.googleapis.com");
    }

    #[test]
    fn test_access_token_not_serialized() {
        let config = SyncConfig {
            access_token: Some("secret".to_string()),
            ..SyncConfig::default()
        };
        let raw = serde_json::to_string(&config).unwrap();
        assert!(!raw.contains("secret"));
    }
}
