//! In-memory implementation of RemoteDocumentStore
//!
//! This implementation is primarily intended for testing and development purposes.
//! Beyond storing documents it can inject write failures, delay writes and
//! report call counts and write concurrency.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{RemoteDocumentStore, RemoteFile, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Inner {
    files: RwLock<HashMap<String, RemoteFile>>,
    contents: RwLock<HashMap<String, String>>,
    write_failures: Mutex<VecDeque<StoreError>>,
    write_delay: Mutex<Option<Duration>>,
    writes: Mutex<Vec<(String, String)>>,
    next_id: AtomicUsize,
    find_calls: AtomicUsize,
    create_calls: AtomicUsize,
    read_calls: AtomicUsize,
    write_attempts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// In-memory implementation of RemoteDocumentStore
///
/// Clones share state, so a test can keep a handle while the engine owns
/// another. All data is lost when the last handle is dropped.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    inner: Arc<Inner>,
}

struct InFlightGuard<'a>(&'a Inner);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InMemoryDocumentStore {
    /// Create a new empty in-memory document store
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> String {
        let n = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        format!("doc-{}", n)
    }

    /// Seed a document and return its id
    pub async fn insert_document(&self, name: &str, content: &str) -> String {
        let id = self.allocate_id();
        self.inner.files.write().await.insert(
            id.clone(),
            RemoteFile {
                id: id.clone(),
                name: name.to_string(),
            },
        );
        self.inner
            .contents
            .write()
            .await
            .insert(id.clone(), content.to_string());
        id
    }

    /// Make the next write attempts fail with the given errors, in order
    pub fn fail_next_writes<I>(&self, errors: I)
    where
        I: IntoIterator<Item = StoreError>,
    {
        self.inner.write_failures.lock().extend(errors);
    }

    /// Delay every write by `delay` before it completes
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self.inner.write_delay.lock() = delay;
    }

    /// Current content of a document
    pub async fn content(&self, id: &str) -> Option<String> {
        self.inner.contents.read().await.get(id).cloned()
    }

    /// Successful writes as `(id, payload)`, oldest first
    pub fn writes(&self) -> Vec<(String, String)> {
        self.inner.writes.lock().clone()
    }

    /// Every write call, including failed ones
    pub fn write_attempts(&self) -> usize {
        self.inner.write_attempts.load(Ordering::SeqCst)
    }

    /// Highest number of writes ever running at the same time
    pub fn max_concurrent_writes(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn find_calls(&self) -> usize {
        self.inner.find_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.inner.create_calls.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> usize {
        self.inner.read_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteDocumentStore for InMemoryDocumentStore {
    async fn find_by_name(&self, name: &str) -> StoreResult<Option<RemoteFile>> {
        self.inner.find_calls.fetch_add(1, Ordering::SeqCst);
        let files = self.inner.files.read().await;
        let mut matches: Vec<&RemoteFile> = files.values().filter(|f| f.name == name).collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches.first().map(|f| (*f).clone()))
    }

    async fn create(&self, name: &str) -> StoreResult<String> {
        self.inner.create_calls.fetch_add(1, Ordering::SeqCst);
        let id = self.allocate_id();
        self.inner.files.write().await.insert(
            id.clone(),
            RemoteFile {
                id: id.clone(),
                name: name.to_string(),
            },
        );
        self.inner
            .contents
            .write()
            .await
            .insert(id.clone(), String::new());
        debug!(%id, name, "created in-memory document");
        Ok(id)
    }

    async fn read(&self, id: &str) -> StoreResult<Option<String>> {
        self.inner.read_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.inner.contents.read().await.get(id).cloned())
    }

    async fn write(&self, id: &str, payload: &str) -> StoreResult<()> {
        self.inner.write_attempts.fetch_add(1, Ordering::SeqCst);
        let current = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.inner);

        let delay = *self.inner.write_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.inner.write_failures.lock().pop_front();
        if let Some(error) = failure {
            debug!(%id, %error, "injected write failure");
            return Err(error);
        }

        let mut contents = self.inner.contents.write().await;
        match contents.get_mut(id) {
            Some(content) => *content = payload.to_string(),
            None => {
                return Err(StoreError::Http {
                    status: 404,
                    message: format!("File not found: {}", id),
                })
            }
        }
        drop(contents);

        self.inner
            .writes
            .lock()
            .push((id.to_string(), payload.to_string()));
        Ok(())
    }
}
