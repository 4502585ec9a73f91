//! OIDC relying-party error types.

use std::fmt;
use thiserror::Error;

pub type OidcResult<T> = Result<T, OidcError>;

/// Text shown to end users for every failed login, whatever the cause.
pub const GENERIC_FAILURE_MESSAGE: &str = "Authentication failed. Please try again.";

/// ID token claims that can fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Issuer,
    Audience,
    AuthorizedParty,
    IssuedAt,
    Expiry,
    Nonce,
    Subject,
}

impl fmt::Display for Claim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Claim::Issuer => "iss",
            Claim::Audience => "aud",
            Claim::AuthorizedParty => "azp",
            Claim::IssuedAt => "iat",
            Claim::Expiry => "exp",
            Claim::Nonce => "nonce",
            Claim::Subject => "sub",
        };
        f.write_str(name)
    }
}

/// Reason code attached to a failed authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Callback did not correlate to any pending attempt.
    UnknownState,
    /// No usable token came back from the IdP.
    ExchangeFailed,
    /// The ID token was obtained but did not verify.
    InvalidIdentityToken,
    /// Local failure (entropy, store, configuration).
    Internal,
}

#[derive(Debug, Error)]
pub enum OidcError {
    #[error("Callback state does not match any pending authentication attempt")]
    UnknownState,

    #[error("Identity provider returned an error: {error}: {description}")]
    AuthorizationDenied { error: String, description: String },

    #[error("Token exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("Malformed ID token: {0}")]
    MalformedToken(String),

    #[error("No signing key found for key id '{0}'")]
    UnknownSigningKey(String),

    #[error("ID token signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("ID token claim '{claim}' failed validation: {detail}")]
    ClaimValidationFailed { claim: Claim, detail: String },

    #[error("Signing key set unavailable: {0}")]
    KeySetUnavailable(String),

    #[error("Entropy source failure: {0}")]
    EntropyUnavailable(String),

    #[error("Correlation store error: {0}")]
    Store(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),
}

impl OidcError {
    pub(crate) fn claim(claim: Claim, detail: impl Into<String>) -> Self {
        OidcError::ClaimValidationFailed {
            claim,
            detail: detail.into(),
        }
    }

    /// Collapse the error into the reason code recorded for the attempt.
    pub fn reason(&self) -> FailureReason {
        match self {
            OidcError::UnknownState => FailureReason::UnknownState,
            OidcError::AuthorizationDenied { .. } | OidcError::ExchangeFailed(_) => {
                FailureReason::ExchangeFailed
            }
            OidcError::MalformedToken(_)
            | OidcError::UnknownSigningKey(_)
            | OidcError::SignatureInvalid(_)
            | OidcError::ClaimValidationFailed { .. }
            | OidcError::KeySetUnavailable(_) => FailureReason::InvalidIdentityToken,
            OidcError::EntropyUnavailable(_)
            | OidcError::Store(_)
            | OidcError::Config(_)
            | OidcError::Url(_) => FailureReason::Internal,
        }
    }

    /// The only text that may cross into a browser-facing response.
    pub fn user_message(&self) -> &'static str {
        GENERIC_FAILURE_MESSAGE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_errors_collapse_to_invalid_token() {
        let errors = [
            OidcError::MalformedToken("x".into()),
            OidcError::UnknownSigningKey("k1".into()),
            OidcError::SignatureInvalid("x".into()),
            OidcError::claim(Claim::Nonce, "mismatch"),
            OidcError::KeySetUnavailable("down".into()),
        ];
        for error in errors {
            assert_eq!(error.reason(), FailureReason::InvalidIdentityToken);
        }
        assert_eq!(
            OidcError::UnknownState.reason(),
            FailureReason::UnknownState
        );
    }

    #[test]
    fn test_user_message_hides_detail() {
        let error = OidcError::SignatureInvalid("RSA verification failed for kid k1".into());
        assert!(!error.user_message().contains("RSA"));
        assert!(!error.user_message().contains("k1"));
        assert_eq!(error.user_message(), GENERIC_FAILURE_MESSAGE);
    }

    #[test]
    fn test_claim_error_names_claim() {
        let error = OidcError::claim(Claim::Issuer, "unexpected issuer");
        assert!(error.to_string().contains("'iss'"));
    }
}
