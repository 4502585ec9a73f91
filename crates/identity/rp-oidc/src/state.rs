//! Correlation of pending login attempts across the redirect boundary.

use crate::error::{OidcError, OidcResult};
use crate::types::AuthenticationAttempt;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Storage for attempts waiting for their callback, keyed by `state`.
#[async_trait]
pub trait CorrelationStore: Send + Sync {
    /// Register a new attempt.
    async fn put(&self, attempt: AuthenticationAttempt) -> OidcResult<()>;

    /// Atomically remove and return the attempt for `state`.
    ///
    /// Of several concurrent calls with the same `state`, at most one gets `Some`.
    async fn take_if_present(&self, state: &str) -> OidcResult<Option<AuthenticationAttempt>>;

    /// Drop attempts whose callback never arrived.
    async fn cleanup_expired(&self) -> OidcResult<usize>;
}

/// In-memory implementation of [`CorrelationStore`].
#[derive(Debug, Default)]
pub struct InMemoryCorrelationStore {
    attempts: DashMap<String, AuthenticationAttempt>,
}

impl InMemoryCorrelationStore {
    pub fn new() -> Self {
        Self {
            attempts: DashMap::new(),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.attempts.len()
    }
}

#[async_trait]
impl CorrelationStore for InMemoryCorrelationStore {
    async fn put(&self, attempt: AuthenticationAttempt) -> OidcResult<()> {
        match self.attempts.entry(attempt.state.clone()) {
            Entry::Occupied(_) => Err(OidcError::Store(
                "state already registered for a pending attempt".to_string(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(attempt);
                Ok(())
            }
        }
    }

    async fn take_if_present(&self, state: &str) -> OidcResult<Option<AuthenticationAttempt>> {
        let Some((_, attempt)) = self.attempts.remove(state) else {
            return Ok(None);
        };

        if attempt.is_expired() {
            return Ok(None);
        }

        Ok(Some(attempt))
    }

    async fn cleanup_expired(&self) -> OidcResult<usize> {
        let now = Utc::now();
        let before = self.attempts.len();
        self.attempts.retain(|_, attempt| attempt.expires_at >= now);
        Ok(before.saturating_sub(self.attempts.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;
    use url::Url;

    fn attempt(state: &str, ttl_seconds: u64) -> AuthenticationAttempt {
        AuthenticationAttempt::new(
            state.to_string(),
            format!("nonce-{}", state),
            Url::parse("https://app.example/return").unwrap(),
            None,
            ttl_seconds,
        )
    }

    #[tokio::test]
    async fn test_take_is_single_use() {
        let store = InMemoryCorrelationStore::new();
        store.put(attempt("s1", 300)).await.unwrap();

        let taken = store.take_if_present("s1").await.unwrap().unwrap();
        assert_eq!(taken.nonce, "nonce-s1");

        assert!(store.take_if_present("s1").await.unwrap().is_none());
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_state_rejected() {
        let store = InMemoryCorrelationStore::new();
        store.put(attempt("s1", 300)).await.unwrap();
        assert!(matches!(
            store.put(attempt("s1", 300)).await,
            Err(OidcError::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_attempt_is_not_returned() {
        let store = InMemoryCorrelationStore::new();
        let mut expired = attempt("old", 300);
        expired.expires_at = Utc::now() - Duration::minutes(1);
        store.put(expired).await.unwrap();

        assert!(store.take_if_present("old").await.unwrap().is_none());
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let store = InMemoryCorrelationStore::new();
        let mut expired = attempt("old", 300);
        expired.expires_at = Utc::now() - Duration::minutes(1);
        store.put(expired).await.unwrap();
        store.put(attempt("fresh", 300)).await.unwrap();

        assert_eq!(store.cleanup_expired().await.unwrap(), 1);
        assert!(store.take_if_present("fresh").await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_take_has_single_winner() {
        let store = Arc::new(InMemoryCorrelationStore::new());
        store.put(attempt("contested", 300)).await.unwrap();

        let mut handles = vec![];
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.take_if_present("contested").await.unwrap().is_some()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
