//! OIDC protocol types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// A login attempt waiting for its IdP callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationAttempt {
    pub state: String,
    pub nonce: String,
    pub redirect_uri: Url,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub autologin_subject: Option<String>,
}

impl AuthenticationAttempt {
    pub fn new(
        state: String,
        nonce: String,
        redirect_uri: Url,
        autologin_subject: Option<String>,
        ttl_seconds: u64,
    ) -> Self {
        let created_at = Utc::now();
        // Saturates: a TTL past the representable range never expires
        let expires_at = seconds_delta(ttl_seconds)
            .and_then(|ttl| created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            state,
            nonce,
            redirect_uri,
            created_at,
            expires_at,
            autologin_subject,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// `seconds` as a signed span, if chrono can represent it.
pub(crate) fn seconds_delta(seconds: u64) -> Option<Duration> {
    i64::try_from(seconds).ok().and_then(Duration::try_seconds)
}

/// Where to send the browser, plus the state that identifies the attempt.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub url: Url,
    pub state: String,
}

/// Query parameters of the IdP redirect back to the relying party.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    pub fn new(code: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            state: Some(state.into()),
            ..Self::default()
        }
    }
}

/// Successful token endpoint response.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    pub id_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: Option<u64>,
    pub scope: Option<String>,
    pub refresh_token: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenResponse {
    pub fn expires_in(&self) -> Option<std::time::Duration> {
        self.expires_in.map(std::time::Duration::from_secs)
    }
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"<redacted>")
            .field("id_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Error body returned by the token endpoint (RFC 6749 section 5.2).
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenErrorResponse {
    pub error: String,
    pub error_description: Option<String>,
}

/// Personal data block carried in the IdP's ID tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileAttributes {
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub date_of_birth: Option<String>,
}

/// Verified identity. Only ever constructed after signature and claim checks pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub subject: String,
    pub issuer: String,
    pub audience: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub nonce: String,
    /// Every claim not listed above, as sent by the IdP.
    pub personal_data: serde_json::Map<String, serde_json::Value>,
}

impl IdentityClaims {
    pub fn profile_attributes(&self) -> Option<ProfileAttributes> {
        self.personal_data
            .get("profile_attributes")
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Authentication methods reference (`amr`).
    pub fn authentication_methods(&self) -> Vec<String> {
        match self.personal_data.get("amr") {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            Some(serde_json::Value::String(single)) => vec![single.clone()],
            _ => Vec::new(),
        }
    }

    /// Authentication context class reference (`acr`), i.e. level of assurance.
    pub fn assurance_level(&self) -> Option<&str> {
        self.personal_data.get("acr").and_then(|v| v.as_str())
    }
}

/// Phases of a single login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    Initiated,
    CallbackReceived,
    Exchanging,
    Verifying,
    Completed,
    Failed,
}

impl AttemptPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptPhase::Completed | AttemptPhase::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_advance_to(self, next: AttemptPhase) -> bool {
        use AttemptPhase::*;
        match (self, next) {
            (Initiated, CallbackReceived)
            | (CallbackReceived, Exchanging)
            | (Exchanging, Verifying)
            | (Verifying, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for AttemptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
