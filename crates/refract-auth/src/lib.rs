//! Identity and credential snapshots for pipeline callers.
//!
//! The pipeline never initiates sign-in or sign-out; it only reads whatever
//! session the embedding application already holds. A provider returning
//! `None` for both values describes an anonymous caller, not a failure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Caller identity snapshot surfaced by an identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    /// Stable identifier scoping the caller's object keys and history records.
    pub id: String,
    /// Email address, when the session exposes one.
    pub email: Option<String>,
    /// Display name, when the session exposes one.
    pub name: Option<String>,
}

impl Identity {
    /// Convenience constructor for an identity known only by its id.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            name: None,
        }
    }
}

/// Read-only source of the caller's identity and bearer credential.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Identity of the current caller, if a session is active.
    async fn current_identity(&self) -> Option<Identity>;

    /// Bearer token for the current session, if one is available.
    async fn current_token(&self) -> Option<String>;
}

/// Provider with a fixed identity/token pair, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    identity: Option<Identity>,
    token: Option<String>,
}

impl StaticIdentityProvider {
    /// Provider describing an anonymous caller.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Provider describing a signed-in caller with a bearer token.
    #[must_use]
    pub fn signed_in(identity: Identity, token: impl Into<String>) -> Self {
        Self {
            identity: Some(identity),
            token: Some(token.into()),
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn current_identity(&self) -> Option<Identity> {
        self.identity.clone()
    }

    async fn current_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// Wrapper that memoises the first successful identity snapshot of another
/// provider.
///
/// Only a present identity is cached; an anonymous answer is re-checked on the
/// next call so a caller who signs in later is picked up. Tokens are never
/// cached, since the underlying session may rotate them between calls.
pub struct CachingIdentityProvider<P> {
    inner: P,
    identity: RwLock<Option<Identity>>,
}

impl<P> CachingIdentityProvider<P> {
    /// Wrap a provider with an identity cache.
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            identity: RwLock::new(None),
        }
    }

    /// Drop the cached snapshot, forcing the next call through to the inner
    /// provider. Intended for embedders reacting to a sign-out.
    pub async fn invalidate(&self) {
        *self.identity.write().await = None;
    }
}

#[async_trait]
impl<P: IdentityProvider> IdentityProvider for CachingIdentityProvider<P> {
    async fn current_identity(&self) -> Option<Identity> {
        if let Some(cached) = self.identity.read().await.clone() {
            return Some(cached);
        }

        let fetched = self.inner.current_identity().await;
        if let Some(identity) = &fetched {
            *self.identity.write().await = Some(identity.clone());
        }
        fetched
    }

    async fn current_token(&self) -> Option<String> {
        self.inner.current_token().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingProvider {
        identity: Option<Identity>,
        identity_calls: AtomicUsize,
        token_calls: AtomicUsize,
    }

    impl CountingProvider {
        fn new(identity: Option<Identity>) -> Self {
            Self {
                identity,
                identity_calls: AtomicUsize::new(0),
                token_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl IdentityProvider for CountingProvider {
        async fn current_identity(&self) -> Option<Identity> {
            self.identity_calls.fetch_add(1, Ordering::SeqCst);
            self.identity.clone()
        }

        async fn current_token(&self) -> Option<String> {
            self.token_calls.fetch_add(1, Ordering::SeqCst);
            Some("token".into())
        }
    }

    #[tokio::test]
    async fn static_provider_returns_fixed_snapshot() {
        let provider =
            StaticIdentityProvider::signed_in(Identity::with_id("user-1"), "bearer-token");
        assert_eq!(
            provider.current_identity().await.map(|identity| identity.id),
            Some("user-1".to_string())
        );
        assert_eq!(provider.current_token().await.as_deref(), Some("bearer-token"));

        let anonymous = StaticIdentityProvider::anonymous();
        assert!(anonymous.current_identity().await.is_none());
        assert!(anonymous.current_token().await.is_none());
    }

    #[tokio::test]
    async fn caching_provider_memoises_present_identity() {
        let inner = CountingProvider::new(Some(Identity::with_id("user-2")));
        let provider = CachingIdentityProvider::new(inner);

        assert!(provider.current_identity().await.is_some());
        assert!(provider.current_identity().await.is_some());
        assert_eq!(provider.inner.identity_calls.load(Ordering::SeqCst), 1);

        provider.invalidate().await;
        assert!(provider.current_identity().await.is_some());
        assert_eq!(provider.inner.identity_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn caching_provider_rechecks_anonymous_answers() {
        let inner = CountingProvider::new(None);
        let provider = CachingIdentityProvider::new(inner);

        assert!(provider.current_identity().await.is_none());
        assert!(provider.current_identity().await.is_none());
        assert_eq!(provider.inner.identity_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn tokens_are_never_cached() {
        let inner = CountingProvider::new(Some(Identity::with_id("user-3")));
        let provider = CachingIdentityProvider::new(inner);

        assert_eq!(provider.current_token().await.as_deref(), Some("token"));
        assert_eq!(provider.current_token().await.as_deref(), Some("token"));
        assert_eq!(provider.inner.token_calls.load(Ordering::SeqCst), 2);
    }
}
