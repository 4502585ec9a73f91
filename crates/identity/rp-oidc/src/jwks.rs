//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! The cache hands out `Arc` snapshots of the whole key set. A refresh builds a new
//! set off to the side and swaps it in, so readers never see a partial update and
//! never wait on the network. Concurrent refreshes collapse into one fetch.

use crate::config::OidcClientConfig;
use crate::error::{OidcError, OidcResult};
use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, PublicKeyUse};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// Public signing keys published by the IdP, as fetched at one point in time.
#[derive(Debug, Clone)]
pub struct SigningKeySet {
    keys: Vec<Jwk>,
    pub fetched_at: DateTime<Utc>,
    fetched: Instant,
}

impl SigningKeySet {
    /// Keep only keys usable for signature verification.
    pub fn from_keys(keys: Vec<Jwk>) -> Self {
        let keys = keys
            .into_iter()
            .filter(|jwk| {
                !matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption))
                    && !matches!(jwk.algorithm, AlgorithmParameters::OctetKey(_))
            })
            .collect();

        Self {
            keys,
            fetched_at: Utc::now(),
            fetched: Instant::now(),
        }
    }

    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys
            .iter()
            .find(|jwk| jwk.common.key_id.as_deref() == Some(kid))
    }

    /// The only key in the set, if there is exactly one.
    pub fn sole_key(&self) -> Option<&Jwk> {
        match self.keys.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    pub fn key_ids(&self) -> Vec<&str> {
        self.keys
            .iter()
            .filter_map(|jwk| jwk.common.key_id.as_deref())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn age(&self) -> Duration {
        self.fetched.elapsed()
    }
}

#[derive(Deserialize)]
struct RawJwkSet {
    keys: Vec<serde_json::Value>,
}

/// How long a stale set is served without retrying after a failed background refresh.
const FAILED_REFRESH_BACKOFF: Duration = Duration::from_secs(30);

/// Marks how many fetch attempts a caller had seen when it decided to refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RefreshTicket(u64);

#[derive(Default)]
struct RefreshState {
    last_failure: Option<Instant>,
}

/// Lazily populated, shared cache of the IdP's signing keys.
pub struct KeySetCache {
    http_client: Client,
    jwks_uri: Url,
    ttl: Duration,
    current: RwLock<Option<Arc<SigningKeySet>>>,
    refresh: Mutex<RefreshState>,
    /// Completed fetch attempts, failed ones included. Only bumped under `refresh`.
    attempts: AtomicU64,
}

impl KeySetCache {
    pub fn new(config: &OidcClientConfig, http_client: Client) -> OidcResult<Self> {
        Ok(Self {
            http_client,
            jwks_uri: Url::parse(&config.jwks_endpoint)?,
            ttl: config.key_set_ttl(),
            current: RwLock::new(None),
            refresh: Mutex::new(RefreshState::default()),
            attempts: AtomicU64::new(0),
        })
    }

    /// The cached set, without touching the network.
    pub async fn snapshot(&self) -> Option<Arc<SigningKeySet>> {
        self.current.read().await.clone()
    }

    /// The current key set, fetching it on first use or once it is older than the TTL.
    ///
    /// A stale set is never held up by the network: while another caller is
    /// refreshing, or shortly after a refresh failed, the stale set is returned as is.
    /// An error is returned only when no set was ever obtained.
    pub async fn key_set(&self) -> OidcResult<Arc<SigningKeySet>> {
        let ticket = self.ticket();
        match self.snapshot().await {
            Some(set) if set.age() < self.ttl => Ok(set),
            Some(stale) => {
                let Ok(state) = self.refresh.try_lock() else {
                    debug!("Key set refresh in flight, serving the stale set");
                    return Ok(stale);
                };
                if state
                    .last_failure
                    .is_some_and(|at| at.elapsed() < FAILED_REFRESH_BACKOFF)
                {
                    return Ok(stale);
                }
                match self.refresh_locked(state, ticket).await {
                    Ok(fresh) => Ok(fresh),
                    Err(e) => {
                        warn!("Serving stale signing keys: {}", e);
                        Ok(stale)
                    }
                }
            }
            None => self.refresh_after(ticket).await,
        }
    }

    /// Look up a key by `kid`, fetching the set on first use.
    pub async fn get_key(&self, kid: &str) -> OidcResult<Option<Jwk>> {
        Ok(self.key_set().await?.find(kid).cloned())
    }

    /// Re-fetch the key set now.
    pub async fn refresh(&self) -> OidcResult<Arc<SigningKeySet>> {
        self.refresh_after(self.ticket()).await
    }

    pub(crate) fn ticket(&self) -> RefreshTicket {
        RefreshTicket(self.attempts.load(Ordering::Acquire))
    }

    /// Fetch unless some fetch attempt finished after `ticket` was taken.
    ///
    /// Callers that queued behind an in-flight fetch share its outcome: the new set
    /// on success, the previous set (or the error, if there is none) on failure.
    pub(crate) async fn refresh_after(
        &self,
        ticket: RefreshTicket,
    ) -> OidcResult<Arc<SigningKeySet>> {
        let state = self.refresh.lock().await;
        self.refresh_locked(state, ticket).await
    }

    async fn refresh_locked(
        &self,
        mut state: MutexGuard<'_, RefreshState>,
        ticket: RefreshTicket,
    ) -> OidcResult<Arc<SigningKeySet>> {
        if self.ticket() != ticket {
            debug!("Key set fetch already attempted by a concurrent caller");
            return self.snapshot().await.ok_or_else(|| {
                OidcError::KeySetUnavailable("concurrent key set fetch failed".to_string())
            });
        }

        let outcome = match self.fetch().await {
            Ok(set) => {
                let fresh = Arc::new(set);
                *self.current.write().await = Some(fresh.clone());
                state.last_failure = None;
                info!(
                    keys = fresh.len(),
                    kids = ?fresh.key_ids(),
                    "Signing key set refreshed"
                );
                Ok(fresh)
            }
            Err(e) => {
                state.last_failure = Some(Instant::now());
                Err(e)
            }
        };
        self.attempts.fetch_add(1, Ordering::Release);
        outcome
    }

    async fn fetch(&self) -> OidcResult<SigningKeySet> {
        let response = self
            .http_client
            .get(self.jwks_uri.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| OidcError::KeySetUnavailable(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(OidcError::KeySetUnavailable(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let raw: RawJwkSet = response
            .json()
            .await
            .map_err(|e| OidcError::KeySetUnavailable(format!("invalid JWKS document: {}", e)))?;

        let mut keys = Vec::with_capacity(raw.keys.len());
        for value in raw.keys {
            match serde_json::from_value::<Jwk>(value) {
                Ok(jwk) => keys.push(jwk),
                Err(e) => warn!("Skipping unsupported JWK: {}", e),
            }
        }

        let set = SigningKeySet::from_keys(keys);
        if set.is_empty() {
            return Err(OidcError::KeySetUnavailable(
                "key set contains no signing keys".to_string(),
            ));
        }
        Ok(set)
    }

    /// Refresh the key set on a fixed interval until the returned task is aborted.
    pub fn spawn_periodic_refresh(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = cache.refresh().await {
                    warn!("Periodic key set refresh failed: {}", e);
                }
            }
        })
    }
}

impl std::fmt::Debug for KeySetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySetCache")
            .field("jwks_uri", &self.jwks_uri.as_str())
            .field("ttl", &self.ttl)
            .finish()
    }
}
