//! OAuth bearer credentials
//!
//! [`CachedTokenProvider`] owns the single cached-credential slot for a
//! session. Every "do we have a token" question goes through it, so the
//! sync engine and the HTTP store never hold stale copies.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

use crate::{StoreError, StoreResult};

/// An OAuth access token
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    secret: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// The bearer value
    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Where credentials come from (an OAuth client, a config value, a test
/// script).
#[async_trait]
pub trait CredentialSource: Send + Sync + Debug {
    /// Ask for a credential. Silent requests resolve to `Ok(None)` when no
    /// prior consent exists; interactive requests need a user gesture and
    /// may also resolve to `Ok(None)` when the user declines.
    async fn acquire(&self, interactive: bool) -> StoreResult<Option<AccessToken>>;
}

/// Acquires and caches the bearer credential for a session
#[async_trait]
pub trait TokenProvider: Send + Sync + Debug {
    /// Silent requests return the cached token when it is still valid.
    /// An interactive request the user declines is an error.
    async fn request_credential(&self, interactive: bool) -> StoreResult<Option<AccessToken>>;

    /// Last known valid token
    fn cached(&self) -> Option<AccessToken>;

    /// Forget the cached token, e.g. after the backend rejected it
    fn clear(&self);
}

/// [`TokenProvider`] caching the credentials of a [`CredentialSource`]
#[derive(Debug)]
pub struct CachedTokenProvider<S> {
    source: S,
    slot: Mutex<Option<AccessToken>>,
}

impl<S: CredentialSource> CachedTokenProvider<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            slot: Mutex::new(None),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

#[async_trait]
impl<S: CredentialSource> TokenProvider for CachedTokenProvider<S> {
    async fn request_credential(&self, interactive: bool) -> StoreResult<Option<AccessToken>> {
        if !interactive {
            if let Some(token) = self.cached() {
                return Ok(Some(token));
            }
        }

        debug!(interactive, "requesting credential");
        match self.source.acquire(interactive).await? {
            Some(token) => {
                info!(interactive, "credential acquired");
                *self.slot.lock() = Some(token.clone());
                Ok(Some(token))
            }
            None if interactive => Err(StoreError::Auth(
                "credential request was declined".to_string(),
            )),
            None => Ok(None),
        }
    }

    fn cached(&self) -> Option<AccessToken> {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|t| t.is_expired(Utc::now())) {
            debug!("cached credential expired");
            *slot = None;
        }
        slot.clone()
    }

    fn clear(&self) {
        *self.slot.lock() = None;
    }
}

/// Source handing out a fixed token, e.g. one read from configuration.
/// Without a token it behaves like a user who never granted consent.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialSource {
    token: Option<AccessToken>,
}

impl StaticCredentialSource {
    pub fn new(token: Option<AccessToken>) -> Self {
        Self { token }
    }
}

#[async_trait]
impl CredentialSource for StaticCredentialSource {
    async fn acquire(&self, _interactive: bool) -> StoreResult<Option<AccessToken>> {
        Ok(self.token.clone())
    }
}

/// Source that replays queued responses, for tests and demos.
///
/// When a queue runs dry the matching default is returned (`None` unless
/// set).
#[derive(Debug, Default)]
pub struct ScriptedCredentialSource {
    silent: Mutex<VecDeque<StoreResult<Option<AccessToken>>>>,
    interactive: Mutex<VecDeque<StoreResult<Option<AccessToken>>>>,
    silent_default: Mutex<Option<AccessToken>>,
    interactive_default: Mutex<Option<AccessToken>>,
    silent_calls: AtomicUsize,
    interactive_calls: AtomicUsize,
}

impl ScriptedCredentialSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consent already granted: every request succeeds with `token`
    pub fn granting(token: AccessToken) -> Self {
        let source = Self::new();
        *source.silent_default.lock() = Some(token.clone());
        *source.interactive_default.lock() = Some(token);
        source
    }

    /// No prior consent, but the user accepts an interactive prompt
    pub fn consenting(token: AccessToken) -> Self {
        let source = Self::new();
        *source.interactive_default.lock() = Some(token);
        source
    }

    pub fn push_silent(&self, response: StoreResult<Option<AccessToken>>) {
        self.silent.lock().push_back(response);
    }

    pub fn push_interactive(&self, response: StoreResult<Option<AccessToken>>) {
        self.interactive.lock().push_back(response);
    }

    pub fn silent_calls(&self) -> usize {
        self.silent_calls.load(Ordering::SeqCst)
    }

    pub fn interactive_calls(&self) -> usize {
        self.interactive_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialSource for ScriptedCredentialSource {
    async fn acquire(&self, interactive: bool) -> StoreResult<Option<AccessToken>> {
        let (queue, default, calls) = if interactive {
            (&self.interactive, &self.interactive_default, &self.interactive_calls)
        } else {
            (&self.silent, &self.silent_default, &self.silent_calls)
        };
        calls.fetch_add(1, Ordering::SeqCst);
        let scripted = queue.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(default.lock().clone()))
    }
}

#[async_trait]
impl<S: CredentialSource + ?Sized> CredentialSource for std::sync::Arc<S> {
    async fn acquire(&self, interactive: bool) -> StoreResult<Option<AccessToken>> {
        (**self).acquire(interactive).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_silent_request_uses_cache() {
        let source = Arc::new(ScriptedCredentialSource::new());
        source.push_silent(Ok(Some(AccessToken::new("t1"))));
        let provider = CachedTokenProvider::new(source.clone());

        let first = provider.request_credential(false).await.unwrap().unwrap();
        let second = provider.request_credential(false).await.unwrap().unwrap();

        assert_eq!(first.secret(), "t1");
        assert_eq!(second.secret(), "t1");
        assert_eq!(source.silent_calls(), 1);
    }

    #[tokio::test]
    async fn test_silent_without_consent_is_not_an_error() {
        let provider = CachedTokenProvider::new(ScriptedCredentialSource::new());
        assert_eq!(provider.request_credential(false).await.unwrap(), None);
        assert!(provider.cached().is_none());
    }

    #[tokio::test]
    async fn test_declined_interactive_request_fails() {
        let source = ScriptedCredentialSource::new();
        source.push_interactive(Ok(None));
        let provider = CachedTokenProvider::new(source);

        let err = provider.request_credential(true).await.unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn test_interactive_always_asks_source() {
        let source = Arc::new(ScriptedCredentialSource::new());
        source.push_interactive(Ok(Some(AccessToken::new("a"))));
        source.push_interactive(Ok(Some(AccessToken::new("b"))));
        let provider = CachedTokenProvider::new(source.clone());

        provider.request_credential(true).await.unwrap();
        let token = provider.request_credential(true).await.unwrap().unwrap();

        assert_eq!(token.secret(), "b");
        assert_eq!(provider.cached().unwrap().secret(), "b");
        assert_eq!(source.interactive_calls(), 2);
    }

    #[tokio::test]
    async fn test_expired_token_is_dropped() {
        let expired = AccessToken::new("old").with_expiry(Utc::now() - Duration::seconds(5));
        let source = StaticCredentialSource::new(Some(expired));
        let provider = CachedTokenProvider::new(source);

        provider.request_credential(false).await.unwrap();
        assert!(provider.cached().is_none());
    }

    #[tokio::test]
    async fn test_clear_forgets_token() {
        let provider =
            CachedTokenProvider::new(StaticCredentialSource::new(Some(AccessToken::new("x"))));
        provider.request_credential(false).await.unwrap();
        assert!(provider.cached().is_some());
        provider.clear();
        assert!(provider.cached().is_none());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let token = AccessToken::new("super-secret");
        assert!(!format!("{token:?}").contains("super-secret"));
    }
}
