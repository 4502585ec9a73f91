//! Per-attempt orchestration of the authorization code flow.

use crate::config::OidcClientConfig;
use crate::error::{Claim, OidcError, OidcResult};
use crate::exchange::TokenExchanger;
use crate::jwks::KeySetCache;
use crate::request::{RequestBuilder, short};
use crate::state::CorrelationStore;
use crate::transport::build_http_client;
use crate::types::{
    AttemptPhase, AuthRequest, AuthenticationAttempt, CallbackParams, IdentityClaims,
};
use crate::verifier::IdentityVerifier;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Drives login attempts from the authentication request to a verified identity.
///
/// Each attempt moves `Initiated -> CallbackReceived -> Exchanging -> Verifying` and ends
/// `Completed` or `Failed`. An attempt is consumed from the store when its callback
/// arrives, so it can pass through the flow at most once.
#[derive(Clone)]
pub struct FlowOrchestrator {
    config: Arc<OidcClientConfig>,
    store: Arc<dyn CorrelationStore>,
    requests: RequestBuilder,
    exchanger: TokenExchanger,
    verifier: IdentityVerifier,
}

impl FlowOrchestrator {
    /// Validate `config` and build every component with a shared HTTP client.
    pub fn new(config: OidcClientConfig, store: Arc<dyn CorrelationStore>) -> OidcResult<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let http_client = build_http_client(&config)?;
        let keys = Arc::new(KeySetCache::new(&config, http_client.clone())?);

        let requests = RequestBuilder::new(config.clone(), store)?;
        let exchanger = TokenExchanger::new(config.clone(), http_client)?;
        let verifier = IdentityVerifier::new(config.clone(), keys);

        info!(
            issuer = %config.issuer,
            client_id = %config.client_id,
            "OIDC flow configured"
        );

        Ok(Self::with_components(config, requests, exchanger, verifier))
    }

    /// Assemble from pre-built components, e.g. to share one key cache between flows.
    ///
    /// Callbacks are resolved against the store `requests` registers attempts in.
    pub fn with_components(
        config: Arc<OidcClientConfig>,
        requests: RequestBuilder,
        exchanger: TokenExchanger,
        verifier: IdentityVerifier,
    ) -> Self {
        Self {
            config,
            store: requests.store().clone(),
            requests,
            exchanger,
            verifier,
        }
    }

    pub fn config(&self) -> &OidcClientConfig {
        &self.config
    }

    pub fn key_cache(&self) -> &Arc<KeySetCache> {
        self.verifier.key_cache()
    }

    /// Start a login with the configured redirect URI and scopes.
    pub async fn begin_login(&self, autologin_subject: Option<&str>) -> OidcResult<AuthRequest> {
        let request = self.requests.build_default(autologin_subject).await?;
        info!(state = %short(&request.state), "Login attempt initiated");
        Ok(request)
    }

    pub async fn build_auth_request(
        &self,
        redirect_uri: &Url,
        scope: &str,
        autologin_subject: Option<&str>,
    ) -> OidcResult<(Url, AuthenticationAttempt)> {
        self.requests
            .build(redirect_uri, scope, autologin_subject)
            .await
    }

    /// Complete the attempt identified by the callback's `state`.
    ///
    /// Errors carry internal detail for logging; browser-facing code should only show
    /// [`OidcError::user_message`].
    pub async fn handle_callback(&self, params: CallbackParams) -> OidcResult<IdentityClaims> {
        let Some(state) = params.state.as_deref().filter(|s| !s.is_empty()) else {
            warn!("Callback without state parameter");
            return Err(OidcError::UnknownState);
        };

        let Some(attempt) = self.store.take_if_present(state).await? else {
            warn!(state = %short(state), "Callback for unknown, consumed or expired state");
            return Err(OidcError::UnknownState);
        };

        let mut tracker = PhaseTracker::new(&attempt.state);
        tracker.advance(AttemptPhase::CallbackReceived);

        let result = self.complete(&attempt, params, &mut tracker).await;
        match &result {
            Ok(claims) => {
                tracker.advance(AttemptPhase::Completed);
                info!(
                    state = %tracker.state,
                    subject = %claims.subject,
                    "Authentication completed"
                );
            }
            Err(e) => tracker.fail(e),
        }
        result
    }

    async fn complete(
        &self,
        attempt: &AuthenticationAttempt,
        params: CallbackParams,
        tracker: &mut PhaseTracker,
    ) -> OidcResult<IdentityClaims> {
        if let Some(error) = params.error {
            return Err(OidcError::AuthorizationDenied {
                error,
                description: params.error_description.unwrap_or_default(),
            });
        }

        let code = params
            .code
            .filter(|code| !code.is_empty())
            .ok_or_else(|| {
                OidcError::ExchangeFailed("callback carries no authorization code".to_string())
            })?;

        if let Some(returned) = params.nonce.as_deref() {
            if returned != attempt.nonce {
                return Err(OidcError::claim(
                    Claim::Nonce,
                    "callback nonce does not match the attempt",
                ));
            }
        }

        tracker.advance(AttemptPhase::Exchanging);
        let tokens = self.exchanger.exchange(&code, &attempt.redirect_uri).await?;

        tracker.advance(AttemptPhase::Verifying);
        self.verifier
            .verify(&tokens.id_token, &attempt.nonce, &self.config.client_id)
            .await
    }

    /// Drop attempts whose callback never arrived.
    pub async fn cleanup_expired(&self) -> OidcResult<usize> {
        let removed = self.store.cleanup_expired().await?;
        if removed > 0 {
            debug!(removed, "Purged expired login attempts");
        }
        Ok(removed)
    }
}

struct PhaseTracker {
    state: String,
    phase: AttemptPhase,
}

impl PhaseTracker {
    fn new(state: &str) -> Self {
        Self {
            state: short(state).to_string(),
            phase: AttemptPhase::Initiated,
        }
    }

    fn advance(&mut self, next: AttemptPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal transition {} -> {}",
            self.phase,
            next
        );
        debug!(state = %self.state, from = %self.phase, to = %next, "Attempt phase");
        self.phase = next;
    }

    fn fail(&mut self, error: &OidcError) {
        let from = self.phase;
        self.advance(AttemptPhase::Failed);
        warn!(
            state = %self.state,
            phase = %from,
            reason = ?error.reason(),
            "Authentication failed: {}",
            error
        );
    }
}

impl std::fmt::Debug for FlowOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowOrchestrator")
            .field("issuer", &self.config.issuer)
            .field("client_id", &self.config.client_id)
            .finish()
    }
}
