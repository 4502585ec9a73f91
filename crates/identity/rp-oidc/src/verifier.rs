//! ID token verification.
//!
//! Order matters: the token is decoded structurally, the signing key resolved and the
//! signature checked before any claim is looked at. Claims of a forged token are never
//! treated as meaningful.

use crate::config::OidcClientConfig;
use crate::error::{Claim, OidcError, OidcResult};
use crate::jwks::KeySetCache;
use crate::types::{IdentityClaims, seconds_delta};
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

type RawClaims = Map<String, Value>;

/// Verifies ID tokens against the IdP's published keys and this client's expectations.
#[derive(Clone)]
pub struct IdentityVerifier {
    config: Arc<OidcClientConfig>,
    keys: Arc<KeySetCache>,
}

impl IdentityVerifier {
    pub fn new(config: Arc<OidcClientConfig>, keys: Arc<KeySetCache>) -> Self {
        Self { config, keys }
    }

    pub fn key_cache(&self) -> &Arc<KeySetCache> {
        &self.keys
    }

    /// Verify `id_token` and return its claims.
    pub async fn verify(
        &self,
        id_token: &str,
        expected_nonce: &str,
        expected_audience: &str,
    ) -> OidcResult<IdentityClaims> {
        let header = decode_header(id_token)
            .map_err(|e| OidcError::MalformedToken(format!("undecodable header: {}", e)))?;

        if !self.config.allowed_algorithms.contains(&header.alg) {
            return Err(OidcError::SignatureInvalid(format!(
                "algorithm {:?} is not allowed",
                header.alg
            )));
        }

        let jwk = self.resolve_key(header.kid.as_deref()).await?;
        let raw = verify_signature(id_token, header.alg, &jwk)?;
        let claims = self.validate_claims(raw, expected_nonce, expected_audience, Utc::now())?;

        debug!(kid = ?header.kid, "ID token verified");
        Ok(claims)
    }

    /// Find the signing key, forcing one key set refresh if it is not cached.
    async fn resolve_key(&self, kid: Option<&str>) -> OidcResult<Jwk> {
        let set = self.keys.key_set().await?;
        if let Some(jwk) = select_key(&set, kid) {
            return Ok(jwk.clone());
        }
        let ticket = self.keys.ticket();

        let label = kid.unwrap_or("<none>").to_string();
        debug!(kid = %label, "Signing key not cached, refreshing key set");

        let refreshed = match self.keys.refresh_after(ticket).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warn!("Key set refresh for unknown key {} failed: {}", label, e);
                return Err(OidcError::UnknownSigningKey(label));
            }
        };

        select_key(&refreshed, kid)
            .cloned()
            .ok_or(OidcError::UnknownSigningKey(label))
    }

    fn validate_claims(
        &self,
        mut raw: RawClaims,
        expected_nonce: &str,
        expected_audience: &str,
        now: DateTime<Utc>,
    ) -> OidcResult<IdentityClaims> {
        let issuer = take_string(&mut raw, "iss", Claim::Issuer)?;
        if issuer != self.config.issuer {
            return Err(OidcError::claim(
                Claim::Issuer,
                format!("expected '{}', got '{}'", self.config.issuer, issuer),
            ));
        }

        let subject = take_string(&mut raw, "sub", Claim::Subject)?;
        if subject.is_empty() {
            return Err(OidcError::claim(Claim::Subject, "empty subject"));
        }

        let audience = match raw.remove("aud") {
            Some(Value::String(single)) => vec![single],
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s),
                    _ => Err(OidcError::claim(Claim::Audience, "non-string audience")),
                })
                .collect::<OidcResult<Vec<_>>>()?,
            _ => return Err(OidcError::claim(Claim::Audience, "missing")),
        };
        if !audience.iter().any(|aud| aud == expected_audience) {
            return Err(OidcError::claim(
                Claim::Audience,
                format!("'{}' is not an audience of this token", expected_audience),
            ));
        }
        if audience.len() > 1 {
            if let Some(azp) = raw.get("azp").and_then(Value::as_str) {
                if azp != expected_audience {
                    return Err(OidcError::claim(
                        Claim::AuthorizedParty,
                        format!("token was issued to '{}'", azp),
                    ));
                }
            }
        }

        let issued_at = take_timestamp(&mut raw, "iat", Claim::IssuedAt)?;
        let expires_at = take_timestamp(&mut raw, "exp", Claim::Expiry)?;
        let skew = seconds_delta(self.config.clock_skew_seconds);
        let earliest = skew
            .and_then(|skew| issued_at.checked_sub_signed(skew))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let latest = skew
            .and_then(|skew| expires_at.checked_add_signed(skew))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        if now < earliest {
            return Err(OidcError::claim(
                Claim::IssuedAt,
                format!("issued in the future ({})", issued_at),
            ));
        }
        if now > latest {
            return Err(OidcError::claim(
                Claim::Expiry,
                format!("expired at {}", expires_at),
            ));
        }

        let nonce = take_string(&mut raw, "nonce", Claim::Nonce)?;
        if nonce != expected_nonce {
            return Err(OidcError::claim(
                Claim::Nonce,
                "does not match the nonce of this attempt",
            ));
        }

        Ok(IdentityClaims {
            subject,
            issuer,
            audience,
            issued_at,
            expires_at,
            nonce,
            personal_data: raw,
        })
    }
}

fn select_key<'a>(set: &'a crate::jwks::SigningKeySet, kid: Option<&str>) -> Option<&'a Jwk> {
    match kid {
        Some(kid) => set.find(kid),
        None => set.sole_key(),
    }
}

fn algorithm_fits_key(alg: Algorithm, jwk: &Jwk) -> bool {
    use Algorithm::*;
    // A key that names its algorithm is only good for that one
    if let Some(declared) = &jwk.common.key_algorithm {
        if signing_algorithm(declared) != Some(alg) {
            return false;
        }
    }
    match &jwk.algorithm {
        AlgorithmParameters::RSA(_) => {
            matches!(alg, RS256 | RS384 | RS512 | PS256 | PS384 | PS512)
        }
        AlgorithmParameters::EllipticCurve(_) => matches!(alg, ES256 | ES384),
        AlgorithmParameters::OctetKeyPair(_) => alg == EdDSA,
        AlgorithmParameters::OctetKey(_) => false,
    }
}

fn signing_algorithm(declared: &KeyAlgorithm) -> Option<Algorithm> {
    let alg = match declared {
        KeyAlgorithm::HS256 => Algorithm::HS256,
        KeyAlgorithm::HS384 => Algorithm::HS384,
        KeyAlgorithm::HS512 => Algorithm::HS512,
        KeyAlgorithm::ES256 => Algorithm::ES256,
        KeyAlgorithm::ES384 => Algorithm::ES384,
        KeyAlgorithm::RS256 => Algorithm::RS256,
        KeyAlgorithm::RS384 => Algorithm::RS384,
        KeyAlgorithm::RS512 => Algorithm::RS512,
        KeyAlgorithm::PS256 => Algorithm::PS256,
        KeyAlgorithm::PS384 => Algorithm::PS384,
        KeyAlgorithm::PS512 => Algorithm::PS512,
        KeyAlgorithm::EdDSA => Algorithm::EdDSA,
        // Key management algorithms never sign
        _ => return None,
    };
    Some(alg)
}

/// Check the JWS signature and return the payload, with no claim validation.
fn verify_signature(id_token: &str, alg: Algorithm, jwk: &Jwk) -> OidcResult<RawClaims> {
    if !algorithm_fits_key(alg, jwk) {
        return Err(OidcError::SignatureInvalid(format!(
            "algorithm {:?} does not match the key",
            alg
        )));
    }

    let key = DecodingKey::from_jwk(jwk)
        .map_err(|e| OidcError::SignatureInvalid(format!("unusable signing key: {}", e)))?;

    let mut validation = Validation::new(alg);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<RawClaims>(id_token, &key, &validation).map_err(|e| match e.kind() {
        ErrorKind::InvalidSignature => OidcError::SignatureInvalid("signature mismatch".into()),
        ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidKeyFormat
        | ErrorKind::InvalidRsaKey(_)
        | ErrorKind::InvalidEcdsaKey => OidcError::SignatureInvalid(e.to_string()),
        _ => OidcError::MalformedToken(e.to_string()),
    })?;

    Ok(data.claims)
}

fn take_string(raw: &mut RawClaims, name: &str, claim: Claim) -> OidcResult<String> {
    match raw.remove(name) {
        Some(Value::String(value)) => Ok(value),
        Some(_) => Err(OidcError::claim(claim, "not a string")),
        None => Err(OidcError::claim(claim, "missing")),
    }
}

fn take_timestamp(raw: &mut RawClaims, name: &str, claim: Claim) -> OidcResult<DateTime<Utc>> {
    let seconds = match raw.remove(name) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| OidcError::claim(claim, "not a timestamp"))?,
        Some(_) => return Err(OidcError::claim(claim, "not a number")),
        None => return Err(OidcError::claim(claim, "missing")),
    };

    DateTime::from_timestamp(seconds, 0).ok_or_else(|| OidcError::claim(claim, "out of range"))
}
