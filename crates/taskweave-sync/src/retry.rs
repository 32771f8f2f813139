//! Retry classification and capped exponential backoff for remote writes

use rand::Rng;
use std::time::{Duration, Instant};
use taskweave_monitoring::SyncMetrics;
use taskweave_store::{RemoteDocumentStore, StoreError, StoreResult};
use tracing::{debug, warn};

/// Message fragments marking a failure as transient
const RETRYABLE_MARKERS: &[&str] = &[
    "rate limit",
    "ratelimit",
    "rate_limit",
    "quota",
    "timeout",
    "timed out",
    "network",
];

/// How often and how patiently a write is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base: Duration::from_millis(400),
            cap: Duration::from_millis(8000),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after failed attempt number `attempt` (1-based),
    /// scaled by `jitter`, which is expected in `[0.5, 1.5)`.
    pub fn delay(&self, attempt: u32, jitter: f64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let backoff = self.base.saturating_mul(1u32 << exponent).min(self.cap);
        backoff.mul_f64(jitter)
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let jitter = 0.5 + rand::thread_rng().gen::<f64>();
        self.delay(attempt, jitter)
    }
}

/// Whether a failed write is worth retrying: HTTP 429, any 5xx, or a
/// message that names a rate limit, quota, timeout or network problem.
pub fn is_retryable(error: &StoreError) -> bool {
    match error {
        StoreError::AuthRequired | StoreError::Auth(_) => false,
        StoreError::Timeout(_) | StoreError::Network(_) => true,
        StoreError::Http { status, .. } if *status == 429 || (500..600).contains(status) => true,
        other => {
            let message = other.to_string().to_lowercase();
            RETRYABLE_MARKERS.iter().any(|marker| message.contains(marker))
        }
    }
}

/// Write `payload` to document `id`, retrying transient failures.
///
/// Returns the number of attempts used.
pub async fn write_with_retry(
    store: &dyn RemoteDocumentStore,
    id: &str,
    payload: &str,
    policy: &RetryPolicy,
) -> StoreResult<u32> {
    let started = Instant::now();
    let mut attempt = 1;
    loop {
        SyncMetrics::record_write_attempt(attempt);
        match store.write(id, payload).await {
            Ok(()) => {
                debug!(attempt, "write succeeded");
                SyncMetrics::record_write(true, attempt, started.elapsed());
                return Ok(attempt);
            }
            Err(error) if attempt < policy.max_attempts && is_retryable(&error) => {
                let delay = policy.jittered_delay(attempt);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "write failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                warn!(attempt, %error, "write failed");
                SyncMetrics::record_write(false, attempt, started.elapsed());
                return Err(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskweave_store::InMemoryDocumentStore;

    fn http(status: u16) -> StoreError {
        StoreError::Http {
            status,
            message: "failed".to_string(),
        }
    }

    #[test]
    fn test_classification() {
        assert!(is_retryable(&http(429)));
        assert!(is_retryable(&http(500)));
        assert!(is_retryable(&http(503)));
        assert!(!is_retryable(&http(400)));
        assert!(!is_retryable(&http(404)));
        assert!(is_retryable(&StoreError::Network("reset".to_string())));
        assert!(is_retryable(&StoreError::Timeout("30s".to_string())));
        assert!(is_retryable(&StoreError::BackendError(
            "User Rate Limit Exceeded".to_string()
        )));
        assert!(is_retryable(&StoreError::Http {
            status: 403,
            message: "quotaExceeded: daily quota".to_string()
        }));
        assert!(!is_retryable(&StoreError::Auth("network said no".to_string())));
        assert!(!is_retryable(&StoreError::AuthRequired));
        assert!(!is_retryable(&StoreError::InvalidResponse("bad json".to_string())));
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1, 1.0), Duration::from_millis(400));
        assert_eq!(policy.delay(2, 1.0), Duration::from_millis(800));
        assert_eq!(policy.delay(3, 1.0), Duration::from_millis(1600));
        assert_eq!(policy.delay(5, 1.0), Duration::from_millis(6400));
        assert_eq!(policy.delay(6, 1.0), Duration::from_millis(8000));
        assert_eq!(policy.delay(40, 1.0), Duration::from_millis(8000));
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1, 0.5), Duration::from_millis(200));
        assert_eq!(policy.delay(6, 1.5), Duration::from_millis(12000));
        for attempt in 1..8 {
            let delay = policy.jittered_delay(attempt);
            assert!(delay >= policy.delay(attempt, 0.5));
            assert!(delay < policy.delay(attempt, 1.5));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_503s_then_success() {
        let store = InMemoryDocumentStore::new();
        let id = store.insert_document("graph.json", "{}").await;
        store.fail_next_writes([http(503), http(503)]);

        let attempts = write_with_retry(&store, &id, "{\"a\":1}", &RetryPolicy::default())
            .await
            .unwrap();

        assert_eq!(attempts, 3);
        assert_eq!(store.write_attempts(), 3);
        assert_eq!(store.content(&id).await.as_deref(), Some("{\"a\":1}"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let store = InMemoryDocumentStore::new();
        let id = store.insert_document("graph.json", "{}").await;
        store.fail_next_writes((0..10).map(|_| http(500)));

        let err = write_with_retry(&store, &id, "{}", &RetryPolicy::default())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(500));
        assert_eq!(store.write_attempts(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_not_retried() {
        let store = InMemoryDocumentStore::new();
        let id = store.insert_document("graph.json", "{}").await;
        store.fail_next_writes([http(400)]);

        assert!(write_with_retry(&store, &id, "{}", &RetryPolicy::default())
            .await
            .is_err());
        assert_eq!(store.write_attempts(), 1);
    }
}
