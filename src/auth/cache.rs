//! Short-lived identity snapshot.
//!
//! Identity checks are frequent (menus, guards, access decisions) so the current
//! identity is cached for a short TTL. On a miss the access token claims are tried
//! first; only when they carry no role does the cache fall back to the network.

use crate::auth::{clock::Clock, jwt, token::TokenStore, types::Identity};
use chrono::{DateTime, Duration, Utc};
use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::Duration as StdDuration,
};
use tracing::debug;

#[derive(Clone, Debug)]
struct CacheEntry {
    value: Option<Identity>,
    expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct SessionCache {
    entry: Arc<Mutex<Option<CacheEntry>>>,
    tokens: TokenStore,
    clock: Arc<dyn Clock>,
    ttl: StdDuration,
}

impl SessionCache {
    #[must_use]
    pub fn new(tokens: TokenStore, ttl: StdDuration) -> Self {
        let clock = Arc::clone(tokens.clock());
        Self {
            entry: Arc::new(Mutex::new(None)),
            tokens,
            clock,
            ttl,
        }
    }

    /// Returns the cached identity, the identity in the access token claims, or
    /// whatever `fetcher` resolves to, in that order. The result is cached either
    /// way, including a `None` from the fetcher.
    pub async fn get_cached<F, Fut>(&self, fetcher: F) -> Option<Identity>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<Identity>>,
    {
        if let Some(value) = self.peek() {
            return value;
        }

        if let Some(identity) = self
            .tokens
            .read()
            .and_then(|auth| jwt::identity(&auth.access_token))
            .filter(Identity::has_role)
        {
            debug!("identity resolved from token claims");
            self.set(Some(identity.clone()), self.ttl);
            return Some(identity);
        }

        debug!("identity cache miss; querying backend");
        let fetched = fetcher().await;
        self.set(fetched.clone(), self.ttl);
        fetched
    }

    /// The live entry, if any. The outer `Option` is the cache hit, the inner one
    /// the cached value (which may be a cached "nobody").
    #[must_use]
    pub fn peek(&self) -> Option<Option<Identity>> {
        let now = self.clock.now();
        let guard = self.entry.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone())
    }

    pub fn set(&self, value: Option<Identity>, ttl: StdDuration) {
        let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let now = self.clock.now();
        let expires_at = Duration::try_milliseconds(millis)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        *self.entry.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(CacheEntry { value, expires_at });
    }

    /// Caches `identity` for the default TTL.
    pub fn set_identity(&self, identity: Identity) {
        self.set(Some(identity), self.ttl);
    }

    pub fn clear(&self) {
        *self.entry.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Replaces the entry with the identity carried by a freshly issued access token.
    pub fn repopulate(&self, access_token: &str) {
        match jwt::identity(access_token) {
            Some(identity) => self.set_identity(identity),
            None => self.clear(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::{
        clock::ManualClock, jwt::tests::token, storage::MemoryStorage, types::Role,
        types::SaveTokens,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache() -> (SessionCache, TokenStore, ManualClock) {
        let clock = ManualClock::default();
        let tokens = TokenStore::new(Arc::new(MemoryStorage::new()), Arc::new(clock.clone()));
        let cache = SessionCache::new(tokens.clone(), StdDuration::from_secs(60));
        (cache, tokens, clock)
    }

    fn admin() -> Identity {
        Identity::new("1", "a@b.com", vec![Role::Admin])
    }

    #[tokio::test]
    async fn live_entry_skips_fetcher_until_ttl_elapses() {
        let (cache, _, clock) = cache();
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        cache.set(Some(admin()), StdDuration::from_millis(100));

        let first = cache
            .get_cached(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                None
            })
            .await;
        assert_eq!(first, Some(admin()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        clock.advance(StdDuration::from_millis(150));

        let second = cache
            .get_cached(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                None
            })
            .await;
        assert_eq!(second, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn token_claims_with_role_avoid_network() -> Result<(), crate::Error> {
        let (cache, tokens, _) = cache();
        let jwt = token(&json!({"sub": "5", "email": "t@school.test", "roles": ["TEACHER"]}));
        tokens.save(SaveTokens::new("Bearer", jwt))?;

        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let identity = cache
            .get_cached(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                None
            })
            .await
            .unwrap();
        assert_eq!(identity.roles, vec![Role::Teacher]);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(cache.peek(), Some(Some(identity)));
        Ok(())
    }

    #[tokio::test]
    async fn claims_without_role_fall_back_to_fetcher() -> Result<(), crate::Error> {
        let (cache, tokens, _) = cache();
        let jwt = token(&json!({"sub": "5", "email": "t@school.test"}));
        tokens.save(SaveTokens::new("Bearer", jwt))?;

        let identity = cache.get_cached(|| async { Some(admin()) }).await;
        assert_eq!(identity, Some(admin()));
        Ok(())
    }

    #[tokio::test]
    async fn fetch_failure_is_cached_as_absent() {
        let (cache, _, _) = cache();
        assert_eq!(cache.get_cached(|| async { None }).await, None);
        assert_eq!(cache.peek(), Some(None));

        let again = cache.get_cached(|| async { Some(admin()) }).await;
        assert_eq!(again, None);
    }

    #[test]
    fn repopulate_replaces_or_clears() {
        let (cache, _, _) = cache();
        cache.repopulate(&token(&json!({"sub": "2", "role": "PARENT"})));
        let identity = cache.peek().flatten().unwrap();
        assert_eq!(identity.roles, vec![Role::Parent]);

        cache.repopulate("not-a-jwt");
        assert_eq!(cache.peek(), None);
    }
}
