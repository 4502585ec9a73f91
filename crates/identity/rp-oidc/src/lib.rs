//! OpenID Connect relying-party engine.
//!
//! This crate implements the client side of the OIDC Authorization Code flow: it builds
//! authentication requests correlated by `state` and `nonce`, consumes the IdP callback
//! exactly once, exchanges the code at the token endpoint and verifies the returned ID
//! token against the IdP's published signing keys. Presentation is left to the caller,
//! which receives either verified [`IdentityClaims`] or a typed [`OidcError`].

mod config;
mod error;
mod exchange;
mod flow;
mod jwks;
mod request;
mod state;
mod transport;
mod types;
mod verifier;

#[cfg(test)]
mod test_support;

pub use config::OidcClientConfig;
pub use error::{Claim, FailureReason, GENERIC_FAILURE_MESSAGE, OidcError, OidcResult};
pub use exchange::TokenExchanger;
pub use flow::FlowOrchestrator;
pub use jwks::{KeySetCache, SigningKeySet};
pub use request::{AUTOLOGIN_PARAM, RequestBuilder, generate_correlation_token};
pub use state::{CorrelationStore, InMemoryCorrelationStore};
pub use transport::build_http_client;
pub use types::{
    AttemptPhase, AuthRequest, AuthenticationAttempt, CallbackParams, IdentityClaims,
    ProfileAttributes, TokenResponse,
};
pub use verifier::IdentityVerifier;

// Re-exported so callers can configure the algorithm allow-list
pub use jsonwebtoken::Algorithm;
