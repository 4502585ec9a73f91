//! Back-channel exchange of an authorization code for tokens.

use crate::config::OidcClientConfig;
use crate::error::{OidcError, OidcResult};
use crate::types::{TokenErrorResponse, TokenResponse};
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, error, info};
use url::Url;

/// Calls the IdP token endpoint. One call per code, never retried.
#[derive(Clone)]
pub struct TokenExchanger {
    http_client: Client,
    config: Arc<OidcClientConfig>,
    token_endpoint: Url,
}

impl TokenExchanger {
    pub fn new(config: Arc<OidcClientConfig>, http_client: Client) -> OidcResult<Self> {
        let token_endpoint = Url::parse(&config.token_endpoint)?;
        Ok(Self {
            http_client,
            config,
            token_endpoint,
        })
    }

    /// Exchange `code` for tokens.
    ///
    /// Any transport error, non-success status, undecodable body or missing
    /// `id_token` yields [`OidcError::ExchangeFailed`].
    pub async fn exchange(&self, code: &str, redirect_uri: &Url) -> OidcResult<TokenResponse> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
        ];

        let mut request = self
            .http_client
            .post(self.token_endpoint.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params);

        if let Some(secret) = &self.config.client_secret {
            request = request.basic_auth(&self.config.client_id, Some(secret));
        }

        let response = request.send().await.map_err(|e| {
            error!("Token endpoint unreachable: {}", e);
            OidcError::ExchangeFailed(format!("token request failed: {}", e))
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            OidcError::ExchangeFailed(format!("failed to read token response: {}", e))
        })?;

        if !status.is_success() {
            let detail = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => format!(
                    "{}: {}",
                    err.error,
                    err.error_description.as_deref().unwrap_or("No description")
                ),
                Err(_) => format!("HTTP {}", status),
            };
            error!("Token exchange rejected: {}", detail);
            return Err(OidcError::ExchangeFailed(detail));
        }

        let value: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            OidcError::ExchangeFailed(format!("token response is not JSON: {}", e))
        })?;

        if value.get("id_token").and_then(|v| v.as_str()).is_none() {
            return Err(OidcError::ExchangeFailed(
                "token response has no id_token".to_string(),
            ));
        }

        let token_response: TokenResponse = serde_json::from_value(value).map_err(|e| {
            OidcError::ExchangeFailed(format!("invalid token response: {}", e))
        })?;

        debug!(token_type = %token_response.token_type, "Token response received");
        info!("Successfully exchanged code for tokens");
        Ok(token_response)
    }
}
