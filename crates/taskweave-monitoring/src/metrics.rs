//! Sync metrics recorded through the `metrics` facade.

use ::metrics::{counter, histogram};
use std::time::Duration;
use tracing::debug;

/// Where a document load came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// Silent load when the engine starts
    Startup,
    /// Explicit user-initiated connect
    Connect,
}

impl LoadSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadSource::Startup => "startup",
            LoadSource::Connect => "connect",
        }
    }
}

/// Sync engine metrics
pub struct SyncMetrics;

impl SyncMetrics {
    /// Record a single write attempt (first try or retry)
    pub fn record_write_attempt(attempt: u32) {
        counter!("taskweave_sync_write_attempts_total", 1);
        if attempt > 1 {
            counter!("taskweave_sync_write_retries_total", 1);
        }
    }

    /// Record the outcome of a whole write, retries included
    pub fn record_write(success: bool, attempts: u32, duration: Duration) {
        let outcome = if success { "success" } else { "failure" };
        counter!("taskweave_sync_writes_total", 1, "outcome" => outcome);
        histogram!("taskweave_sync_write_duration_seconds", duration.as_secs_f64(), "outcome" => outcome);
        histogram!("taskweave_sync_write_attempts", f64::from(attempts));
        debug!(outcome, attempts, duration_ms = duration.as_millis() as u64, "write recorded");
    }

    /// Record the outcome of a document load
    pub fn record_load(source: LoadSource, outcome: &'static str) {
        counter!("taskweave_sync_loads_total", 1, "source" => source.as_str(), "outcome" => outcome);
    }

    /// Record a transition into the needs-auth state
    pub fn record_auth_required() {
        counter!("taskweave_sync_auth_required_total", 1);
    }
}
