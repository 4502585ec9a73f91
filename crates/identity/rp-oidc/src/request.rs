//! Authentication request construction.

use crate::config::OidcClientConfig;
use crate::error::{OidcError, OidcResult};
use crate::state::CorrelationStore;
use crate::types::{AuthRequest, AuthenticationAttempt};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Bytes of OS entropy behind each `state` and `nonce`.
const CORRELATION_BYTES: usize = 32;

/// Query parameter the IdP reads to skip interactive credential entry.
pub const AUTOLOGIN_PARAM: &str = "autologin";

/// Draw a URL-safe random token from the OS entropy source.
pub fn generate_correlation_token() -> OidcResult<String> {
    let mut bytes = [0u8; CORRELATION_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| OidcError::EntropyUnavailable(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Builds authorization endpoint URLs and registers the matching attempts.
#[derive(Clone)]
pub struct RequestBuilder {
    config: Arc<OidcClientConfig>,
    authorization_endpoint: Url,
    store: Arc<dyn CorrelationStore>,
}

impl RequestBuilder {
    pub fn new(
        config: Arc<OidcClientConfig>,
        store: Arc<dyn CorrelationStore>,
    ) -> OidcResult<Self> {
        let authorization_endpoint = Url::parse(&config.authorization_endpoint)?;
        Ok(Self {
            config,
            authorization_endpoint,
            store,
        })
    }

    /// Where attempts are registered.
    pub fn store(&self) -> &Arc<dyn CorrelationStore> {
        &self.store
    }

    /// Build the authentication request and register the attempt under its `state`.
    ///
    /// Passing `autologin_subject` produces the auto-login variant; everything else
    /// is identical.
    pub async fn build(
        &self,
        redirect_uri: &Url,
        scope: &str,
        autologin_subject: Option<&str>,
    ) -> OidcResult<(Url, AuthenticationAttempt)> {
        let attempt = AuthenticationAttempt::new(
            generate_correlation_token()?,
            generate_correlation_token()?,
            redirect_uri.clone(),
            autologin_subject.map(String::from),
            self.config.attempt_ttl_seconds,
        );

        let mut url = self.authorization_endpoint.clone();
        {
            let mut params = url.query_pairs_mut();
            params.append_pair("redirect_uri", redirect_uri.as_str());
            params.append_pair("scope", scope);
            params.append_pair("state", &attempt.state);
            params.append_pair("nonce", &attempt.nonce);
            params.append_pair("response_type", "code");
            params.append_pair("client_id", &self.config.client_id);
            if let Some(subject) = autologin_subject {
                params.append_pair(AUTOLOGIN_PARAM, subject);
            }
        }

        // Registered before the URL leaves this function, so an early callback resolves.
        self.store.put(attempt.clone()).await?;

        debug!(
            state = %short(&attempt.state),
            autologin = autologin_subject.is_some(),
            "Built authentication request"
        );

        Ok((url, attempt))
    }

    /// [`build`](Self::build) with the configured redirect URI and scopes.
    pub async fn build_default(&self, autologin_subject: Option<&str>) -> OidcResult<AuthRequest> {
        let redirect_uri = self.config.redirect_url()?;
        let scope = self.config.scopes.join(" ");
        let (url, attempt) = self.build(&redirect_uri, &scope, autologin_subject).await?;
        Ok(AuthRequest {
            url,
            state: attempt.state,
        })
    }
}

/// Prefix of a correlation value, safe to put in logs.
pub(crate) fn short(value: &str) -> &str {
    value.get(..8).unwrap_or(value)
}
