//! HTTP client used for back-channel calls to the IdP.

use crate::config::OidcClientConfig;
use crate::error::{OidcError, OidcResult};
use reqwest::{Certificate, Client, redirect};
use std::path::Path;
use tracing::{debug, warn};

/// Build the client shared by the token exchanger and the key set cache.
///
/// With `root_ca_path` configured, only the roots in that bundle are trusted and plain
/// HTTP is refused. Every request is bounded by `http_timeout_seconds`.
pub fn build_http_client(config: &OidcClientConfig) -> OidcResult<Client> {
    let mut builder = Client::builder()
        .timeout(config.http_timeout())
        .connect_timeout(config.http_timeout())
        .redirect(redirect::Policy::none());

    match &config.root_ca_path {
        Some(path) => {
            let roots = load_root_certificates(path)?;
            let count = roots.len();

            builder = builder.tls_built_in_root_certs(false).https_only(true);
            for root in roots {
                builder = builder.add_root_certificate(root);
            }
            debug!(
                roots = count,
                "Pinned IdP transport to root CA bundle {}",
                path.display()
            );
        }
        None => {
            warn!(
                "No root CA configured for IdP {}; falling back to the platform trust store",
                config.issuer
            );
        }
    }

    builder
        .build()
        .map_err(|e| OidcError::Config(format!("failed to create HTTP client: {}", e)))
}

/// Every certificate in the PEM bundle at `path`.
fn load_root_certificates(path: &Path) -> OidcResult<Vec<Certificate>> {
    let pem = std::fs::read(path).map_err(|e| {
        OidcError::Config(format!(
            "cannot read root CA file {}: {}",
            path.display(),
            e
        ))
    })?;
    let roots = Certificate::from_pem_bundle(&pem).map_err(|e| {
        OidcError::Config(format!("invalid root CA in {}: {}", path.display(), e))
    })?;
    if roots.is_empty() {
        return Err(OidcError::Config(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OidcClientConfig {
        OidcClientConfig::new(
            "client-1",
            "https://idp.example",
            "https://idp.example/oidc/authorize",
            "https://idp.example/oidc/token",
            "https://idp.example/oidc/jwks",
            "https://app.example/return",
        )
    }

    #[test]
    fn test_client_with_configured_root() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/root_ca.pem");
        assert!(build_http_client(&config().with_root_ca(path)).is_ok());
    }

    #[test]
    fn test_every_root_in_bundle_is_loaded() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/root_bundle.pem");
        assert_eq!(load_root_certificates(Path::new(path)).unwrap().len(), 2);
        assert!(build_http_client(&config().with_root_ca(path)).is_ok());
    }

    #[test]
    fn test_missing_root_file_is_config_error() {
        let result = build_http_client(&config().with_root_ca("/nonexistent/rootCA.pem"));
        assert!(matches!(result, Err(OidcError::Config(_))));
    }

    #[test]
    fn test_garbage_root_file_is_config_error() {
        // A private key is not a certificate.
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/primary.pem");
        let result = build_http_client(&config().with_root_ca(path));
        assert!(matches!(result, Err(OidcError::Config(_))));
    }

    #[test]
    fn test_client_without_root() {
        assert!(build_http_client(&config()).is_ok());
    }
}
