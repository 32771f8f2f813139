//! Per-engine session state: the credential provider and the cached
//! document handle.
//!
//! Both are single slots. Every "do we have a token / a handle" question is
//! answered here so a session never creates the document twice or prompts
//! for consent more than needed.

use std::sync::Arc;
use taskweave_store::{AccessToken, RemoteDocumentStore, StoreResult, TokenProvider};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Credential and document handle for one synchronized document
#[derive(Debug)]
pub struct SyncSession {
    store: Arc<dyn RemoteDocumentStore>,
    tokens: Arc<dyn TokenProvider>,
    document_name: String,
    handle: Mutex<Option<String>>,
}

impl SyncSession {
    pub fn new(
        store: Arc<dyn RemoteDocumentStore>,
        tokens: Arc<dyn TokenProvider>,
        document_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            tokens,
            document_name: document_name.into(),
            handle: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &dyn RemoteDocumentStore {
        self.store.as_ref()
    }

    pub fn document_name(&self) -> &str {
        &self.document_name
    }

    /// Request a credential through the shared provider
    pub async fn credential(&self, interactive: bool) -> StoreResult<Option<AccessToken>> {
        self.tokens.request_credential(interactive).await
    }

    /// Whether a valid credential is cached right now
    pub fn has_credential(&self) -> bool {
        self.tokens.cached().is_some()
    }

    /// Handle resolved so far, if any
    pub async fn cached_handle(&self) -> Option<String> {
        self.handle.lock().await.clone()
    }

    /// Return the cached document id, else find the document by name, else
    /// create it. The handle lock is held for the whole lookup so
    /// concurrent callers wait for one resolution.
    pub async fn resolve_document_handle(&self) -> StoreResult<String> {
        let mut slot = self.handle.lock().await;
        if let Some(id) = slot.as_ref() {
            return Ok(id.clone());
        }

        let id = match self.store.find_by_name(&self.document_name).await? {
            Some(file) => {
                debug!(id = %file.id, "found existing document");
                file.id
            }
            None => {
                let id = self.store.create(&self.document_name).await?;
                info!(%id, name = %self.document_name, "created remote document");
                id
            }
        };
        *slot = Some(id.clone());
        Ok(id)
    }

    /// Forget the cached credential and handle
    pub async fn reset(&self) {
        self.tokens.clear();
        *self.handle.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskweave_store::{CachedTokenProvider, InMemoryDocumentStore, StaticCredentialSource};

    fn session(store: &InMemoryDocumentStore) -> SyncSession {
        let tokens = CachedTokenProvider::new(StaticCredentialSource::new(Some(
            AccessToken::new("t"),
        )));
        SyncSession::new(Arc::new(store.clone()), Arc::new(tokens), "graph.json")
    }

    #[tokio::test]
    async fn test_creates_once_then_caches() {
        let store = InMemoryDocumentStore::new();
        let session = session(&store);

        let first = session.resolve_document_handle().await.unwrap();
        let second = session.resolve_document_handle().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.create_calls(), 1);
        assert_eq!(store.find_calls(), 1);
    }

    #[tokio::test]
    async fn test_finds_existing_document() {
        let store = InMemoryDocumentStore::new();
        let existing = store.insert_document("graph.json", "{}").await;
        let session = session(&store);

        assert_eq!(session.resolve_document_handle().await.unwrap(), existing);
        assert_eq!(store.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_resolution_creates_one_document() {
        let store = InMemoryDocumentStore::new();
        let session = session(&store);

        let (a, b) = tokio::join!(
            session.resolve_document_handle(),
            session.resolve_document_handle()
        );

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(store.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_reset_forgets_handle_and_token() {
        let store = InMemoryDocumentStore::new();
        let session = session(&store);
        session.credential(false).await.unwrap();
        session.resolve_document_handle().await.unwrap();
        assert!(session.has_credential());

        session.reset().await;

        assert!(!session.has_credential());
        assert_eq!(session.cached_handle().await, None);
    }
}
