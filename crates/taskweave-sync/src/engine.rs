//! Debounced, single-flight synchronization engine
//!
//! Snapshots handed to [`SyncEngine::schedule`] are coalesced: each call
//! replaces the pending payload and restarts the debounce timer, so a burst
//! of edits produces one write of the latest snapshot. Writes are
//! serialized by a single-flight lock. When the timer fires during a write,
//! a queued flag makes the in-flight writer run exactly one more pass over
//! the latest pending payload.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskweave_core::Graph;
use taskweave_monitoring::{LoadSource, SyncMetrics};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::retry::{write_with_retry, RetryPolicy};
use crate::session::SyncSession;

/// Sync status shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    #[default]
    Idle,
    Loading,
    Saving,
    /// No credential; an explicit connect is needed
    NeedsAuth,
    /// Last operation failed; editing continues against local state
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Loading => "loading",
            SyncStatus::Saving => "saving",
            SyncStatus::NeedsAuth => "needs_auth",
            SyncStatus::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable engine state
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncSnapshot {
    pub status: SyncStatus,
    /// A snapshot is waiting to be written
    pub has_pending: bool,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug)]
struct Inner {
    session: SyncSession,
    debounce: Duration,
    retry: RetryPolicy,
    pending: Mutex<Option<String>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    write_lock: tokio::sync::Mutex<()>,
    queued: AtomicBool,
    state: watch::Sender<SyncSnapshot>,
}

/// Synchronizes graph snapshots with the session's remote document
///
/// Cloning yields another handle to the same engine. Scheduling spawns
/// tokio tasks and must happen inside a runtime.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

impl SyncEngine {
    pub fn new(session: SyncSession, debounce: Duration, retry: RetryPolicy) -> Self {
        let (state, _) = watch::channel(SyncSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                session,
                debounce,
                retry,
                pending: Mutex::new(None),
                timer: Mutex::new(None),
                write_lock: tokio::sync::Mutex::new(()),
                queued: AtomicBool::new(false),
                state,
            }),
        }
    }

    pub fn from_config(session: SyncSession, config: &SyncConfig) -> Self {
        Self::new(session, config.debounce(), config.retry_policy())
    }

    pub fn session(&self) -> &SyncSession {
        &self.inner.session
    }

    pub fn status(&self) -> SyncStatus {
        self.inner.state.borrow().status
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        self.inner.state.borrow().clone()
    }

    /// Receive every state change
    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.inner.state.subscribe()
    }

    /// Payload waiting to be written, if any
    pub fn pending_payload(&self) -> Option<String> {
        self.inner.pending.lock().clone()
    }

    /// Record `graph` as the pending payload and restart the debounce timer
    pub fn schedule(&self, graph: &Graph) -> SyncResult<()> {
        let payload = graph.to_json()?;
        self.schedule_payload(payload);
        Ok(())
    }

    /// Same as [`schedule`](Self::schedule) for an already serialized graph
    pub fn schedule_payload(&self, payload: String) {
        *self.inner.pending.lock() = Some(payload);
        self.inner.publish(|s| s.has_pending = true);

        let inner = Arc::clone(&self.inner);
        let delay = self.inner.debounce;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // detached, so restarting the timer never aborts a write
            tokio::spawn(inner.write_cycle());
        });

        if let Some(previous) = self.inner.timer.lock().replace(timer) {
            previous.abort();
        }
        debug!(debounce_ms = delay.as_millis() as u64, "snapshot scheduled");
    }

    /// Silent start: load the remote document if consent already exists,
    /// otherwise wait in `NeedsAuth` for [`connect`](Self::connect).
    pub async fn start(&self) -> SyncResult<Option<Graph>> {
        match self.inner.session.credential(false).await {
            Ok(Some(_)) => self.inner.load_and_reconcile(LoadSource::Startup).await,
            Ok(None) => {
                info!("no existing consent, waiting for connect");
                self.inner.enter_needs_auth(None);
                SyncMetrics::record_load(LoadSource::Startup, "needs_auth");
                Ok(None)
            }
            Err(e) => {
                let e = SyncError::from(e);
                self.inner.record_failure(&e);
                Err(e)
            }
        }
    }

    /// User-initiated connect: interactive credential, then load.
    ///
    /// Returns the remote graph when the document holds one; the caller
    /// replaces its local state with it.
    pub async fn connect(&self) -> SyncResult<Option<Graph>> {
        let outcome = self
            .inner
            .session
            .credential(true)
            .await
            .map_err(SyncError::from)
            .and_then(|token| token.ok_or(SyncError::NeedsAuth));

        match outcome {
            Ok(_) => self.inner.load_and_reconcile(LoadSource::Connect).await,
            Err(e) => {
                warn!(error = %e, "connect failed");
                SyncMetrics::record_load(LoadSource::Connect, "refused");
                if e.needs_auth() || matches!(e, SyncError::Store(ref s) if s.is_auth()) {
                    self.inner.enter_needs_auth(Some(e.to_string()));
                } else {
                    self.inner.record_failure(&e);
                }
                Err(e)
            }
        }
    }

    /// Cancel the debounce timer and write the pending payload now
    pub async fn flush(&self) -> SyncResult<()> {
        self.inner.cancel_timer();
        self.inner.drain_waiting().await
    }

    /// Final best-effort flush; the engine stays usable afterwards
    pub async fn shutdown(&self) -> SyncResult<()> {
        info!("shutting down sync engine");
        let result = self.flush().await;
        if let Err(ref e) = result {
            warn!(error = %e, "final flush failed");
        }
        result
    }
}

impl Inner {
    fn publish(&self, update: impl FnOnce(&mut SyncSnapshot)) {
        self.state.send_modify(update);
    }

    fn set_status(&self, status: SyncStatus) {
        let previous = self.state.borrow().status;
        if previous != status {
            info!(from = %previous, to = %status, "sync status changed");
        }
        self.publish(|s| s.status = status);
    }

    fn enter_needs_auth(&self, message: Option<String>) {
        self.set_status(SyncStatus::NeedsAuth);
        self.publish(|s| s.last_error = message);
        SyncMetrics::record_auth_required();
    }

    fn record_failure(&self, e: &SyncError) {
        if e.needs_auth() {
            self.enter_needs_auth(None);
            return;
        }
        error!(error = %e, "sync failed");
        self.set_status(SyncStatus::Error);
        let message = e.to_string();
        self.publish(|s| s.last_error = Some(message));
    }

    fn cancel_timer(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }
    }

    /// Timer path: never waits behind an in-flight write
    async fn write_cycle(self: Arc<Self>) {
        loop {
            let Ok(guard) = self.write_lock.try_lock() else {
                debug!("write in flight, follow-up queued");
                self.queued.store(true, Ordering::SeqCst);
                return;
            };
            // failures are reflected in the status
            let _ = self.drain().await;
            drop(guard);

            // a timer that fired while the lock was being released
            if !self.queued.load(Ordering::SeqCst) {
                return;
            }
        }
    }

    /// Wait for any in-flight write, then write what is pending
    async fn drain_waiting(self: &Arc<Self>) -> SyncResult<()> {
        let guard = self.write_lock.lock().await;
        let result = self.drain().await;
        drop(guard);

        if self.queued.load(Ordering::SeqCst) {
            tokio::spawn(Arc::clone(self).write_cycle());
        }
        result
    }

    /// Write the pending payload until nothing new was queued. Requires
    /// the write lock.
    async fn drain(&self) -> SyncResult<()> {
        let mut result = Ok(());
        loop {
            self.queued.store(false, Ordering::SeqCst);
            let Some(payload) = self.pending.lock().clone() else {
                break;
            };

            result = self.write_payload(&payload).await;
            match &result {
                Ok(()) => {
                    let mut pending = self.pending.lock();
                    if pending.as_deref() == Some(payload.as_str()) {
                        *pending = None;
                    }
                    let has_pending = pending.is_some();
                    drop(pending);
                    self.publish(|s| s.has_pending = has_pending);
                }
                Err(e) if e.needs_auth() => {
                    self.queued.store(false, Ordering::SeqCst);
                    break;
                }
                Err(_) => {}
            }

            if !self.queued.swap(false, Ordering::SeqCst) {
                break;
            }
        }
        result
    }

    async fn write_payload(&self, payload: &str) -> SyncResult<()> {
        let result = self.try_write(payload).await;
        match &result {
            Ok(()) => {
                self.set_status(SyncStatus::Idle);
                self.publish(|s| {
                    s.last_saved_at = Some(Utc::now());
                    s.last_error = None;
                });
            }
            Err(e) => {
                if e.needs_auth() {
                    debug!("no credential, keeping pending payload");
                }
                self.record_failure(e);
            }
        }
        result
    }

    async fn try_write(&self, payload: &str) -> SyncResult<()> {
        if self.session.credential(false).await?.is_none() {
            return Err(SyncError::NeedsAuth);
        }

        self.set_status(SyncStatus::Saving);
        let id = self.session.resolve_document_handle().await?;
        let attempts =
            write_with_retry(self.session.store(), &id, payload, &self.retry).await?;
        debug!(%id, attempts, bytes = payload.len(), "snapshot written");
        Ok(())
    }

    async fn load(&self) -> SyncResult<Option<Graph>> {
        self.set_status(SyncStatus::Loading);
        let id = self.session.resolve_document_handle().await?;
        let content = self.session.store().read(&id).await?;
        Ok(content.as_deref().and_then(parse_document))
    }

    /// Load the remote document after a credential was obtained. Remote
    /// data replaces unsaved local changes; without remote data the
    /// pending payload is written.
    async fn load_and_reconcile(self: &Arc<Self>, source: LoadSource) -> SyncResult<Option<Graph>> {
        let loaded = match self.load().await {
            Ok(loaded) => loaded,
            Err(e) => {
                SyncMetrics::record_load(source, "failed");
                self.record_failure(&e);
                return Err(e);
            }
        };

        self.set_status(SyncStatus::Idle);
        self.publish(|s| s.last_error = None);

        if loaded.is_some() {
            SyncMetrics::record_load(source, "loaded");
            if self.pending.lock().take().is_some() {
                self.cancel_timer();
                info!("remote document replaces unsaved local changes");
            }
            self.publish(|s| s.has_pending = false);
        } else {
            SyncMetrics::record_load(source, "empty");
            if self.pending.lock().is_some() {
                info!("writing changes made before the credential was available");
                self.cancel_timer();
                if let Err(e) = self.drain_waiting().await {
                    warn!(error = %e, "could not write pending changes after load");
                }
            }
        }
        Ok(loaded)
    }
}

/// Parse remote content; empty or malformed content is "no data"
fn parse_document(raw: &str) -> Option<Graph> {
    if raw.trim().is_empty() {
        return None;
    }
    match Graph::from_json(raw) {
        Ok(graph) => Some(graph),
        Err(e) => {
            warn!(error = %e, "remote document is not a usable graph, ignoring it");
            None
        }
    }
}
