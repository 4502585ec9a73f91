//! Relying-party configuration.

use crate::error::{OidcError, OidcResult};
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Immutable configuration for one relying party registered at one IdP.
///
/// Every component takes this by value (usually behind an `Arc`) at construction,
/// so several IdP configurations can live side by side in one process.
#[derive(Clone, Serialize, Deserialize)]
pub struct OidcClientConfig {
    pub client_id: String,
    /// Sent with HTTP Basic on the token endpoint when present.
    #[serde(default, skip_serializing)]
    pub client_secret: Option<String>,
    /// Expected `iss` of every ID token.
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_endpoint: String,
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// PEM bundle the IdP's certificate chain must chain up to. When set, the
    /// platform trust store is not consulted.
    #[serde(default)]
    pub root_ca_path: Option<PathBuf>,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
    #[serde(default = "default_attempt_ttl")]
    pub attempt_ttl_seconds: u64,
    #[serde(default = "default_clock_skew")]
    pub clock_skew_seconds: u64,
    #[serde(default = "default_key_set_ttl")]
    pub key_set_ttl_seconds: u64,
    #[serde(default = "default_algorithms")]
    pub allowed_algorithms: Vec<Algorithm>,
}

/// Upper bound for every duration setting (one year).
pub const MAX_DURATION_SECONDS: u64 = 365 * 24 * 60 * 60;

fn default_scopes() -> Vec<String> {
    vec!["openid".to_string()]
}

fn default_http_timeout() -> u64 {
    30
}

fn default_attempt_ttl() -> u64 {
    600 // 10 minutes
}

fn default_clock_skew() -> u64 {
    60
}

fn default_key_set_ttl() -> u64 {
    3600
}

fn default_algorithms() -> Vec<Algorithm> {
    vec![Algorithm::RS256]
}

impl OidcClientConfig {
    pub fn new(
        client_id: impl Into<String>,
        issuer: impl Into<String>,
        authorization_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
        jwks_endpoint: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            issuer: issuer.into(),
            authorization_endpoint: authorization_endpoint.into(),
            token_endpoint: token_endpoint.into(),
            jwks_endpoint: jwks_endpoint.into(),
            redirect_uri: redirect_uri.into(),
            scopes: default_scopes(),
            root_ca_path: None,
            http_timeout_seconds: default_http_timeout(),
            attempt_ttl_seconds: default_attempt_ttl(),
            clock_skew_seconds: default_clock_skew(),
            key_set_ttl_seconds: default_key_set_ttl(),
            allowed_algorithms: default_algorithms(),
        }
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_root_ca(mut self, path: impl Into<PathBuf>) -> Self {
        self.root_ca_path = Some(path.into());
        self
    }

    pub fn with_http_timeout(mut self, seconds: u64) -> Self {
        self.http_timeout_seconds = seconds;
        self
    }

    pub fn with_attempt_ttl(mut self, seconds: u64) -> Self {
        self.attempt_ttl_seconds = seconds;
        self
    }

    pub fn with_clock_skew(mut self, seconds: u64) -> Self {
        self.clock_skew_seconds = seconds;
        self
    }

    pub fn with_key_set_ttl(mut self, seconds: u64) -> Self {
        self.key_set_ttl_seconds = seconds;
        self
    }

    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.allowed_algorithms = algorithms;
        self
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    pub fn key_set_ttl(&self) -> Duration {
        Duration::from_secs(self.key_set_ttl_seconds)
    }

    pub fn redirect_url(&self) -> OidcResult<Url> {
        Ok(Url::parse(&self.redirect_uri)?)
    }

    /// Check the configuration before any component is built from it.
    pub fn validate(&self) -> OidcResult<()> {
        if self.client_id.is_empty() {
            return Err(OidcError::Config("client_id cannot be empty".to_string()));
        }
        if self.issuer.is_empty() {
            return Err(OidcError::Config("issuer cannot be empty".to_string()));
        }

        for (name, value) in [
            ("authorization_endpoint", &self.authorization_endpoint),
            ("token_endpoint", &self.token_endpoint),
            ("jwks_endpoint", &self.jwks_endpoint),
            ("redirect_uri", &self.redirect_uri),
        ] {
            Url::parse(value)
                .map_err(|e| OidcError::Config(format!("{} is not a valid URL: {}", name, e)))?;
        }

        if !self.scopes.iter().any(|s| s == "openid") {
            return Err(OidcError::Config(
                "scopes must include 'openid'".to_string(),
            ));
        }
        if self.http_timeout_seconds == 0 {
            return Err(OidcError::Config(
                "http_timeout_seconds must be positive".to_string(),
            ));
        }
        if self.attempt_ttl_seconds == 0 {
            return Err(OidcError::Config(
                "attempt_ttl_seconds must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("http_timeout_seconds", self.http_timeout_seconds),
            ("attempt_ttl_seconds", self.attempt_ttl_seconds),
            ("clock_skew_seconds", self.clock_skew_seconds),
            ("key_set_ttl_seconds", self.key_set_ttl_seconds),
        ] {
            if value > MAX_DURATION_SECONDS {
                return Err(OidcError::Config(format!(
                    "{} must not exceed {} seconds",
                    name, MAX_DURATION_SECONDS
                )));
            }
        }
        if self.allowed_algorithms.is_empty() {
            return Err(OidcError::Config(
                "allowed_algorithms cannot be empty".to_string(),
            ));
        }
        if let Some(alg) = self
            .allowed_algorithms
            .iter()
            .find(|alg| matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512))
        {
            return Err(OidcError::Config(format!(
                "symmetric algorithm {:?} cannot be used with a published key set",
                alg
            )));
        }

        Ok(())
    }
}

impl fmt::Debug for OidcClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("issuer", &self.issuer)
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("jwks_endpoint", &self.jwks_endpoint)
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("root_ca_path", &self.root_ca_path)
            .field("http_timeout_seconds", &self.http_timeout_seconds)
            .finish_non_exhaustive()
    }
}
