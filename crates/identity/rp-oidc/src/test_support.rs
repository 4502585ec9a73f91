//! Fixture keys and token minting for tests.

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};

/// RSA-2048 test key pair. The private half lives under `fixtures/`.
#[derive(Clone, Copy)]
pub struct KeyPair {
    pub private_pem: &'static [u8],
    pub modulus: &'static str,
}

impl KeyPair {
    pub fn primary() -> Self {
        Self {
            private_pem: include_bytes!("../fixtures/primary.pem"),
            modulus: "qgBBdoFKI_jNLI0a63I3vfFhJJUsp7QifQSKooTBOIQEM5HHYBL3Vtt3c3HIAx2TenEir5ZhtiXCxSOTTG7TgI6ksDBf235su6zKrwWfn9_G6mvQrTVlxm-tXLBND8U225_Bd8xiclxx10jW7xm04uYm8CjVjwiGOTcqrma5ZjdthZcltQ7CdCY7jO4y1vx-xRTqFawJ9-wm3E9qAX-ZLe1r4mWqDK3Bnj6EEV6yY2fLP6kYMADjjLk7ziPQGyxXqCVc2scd0j88EycAZzjqi0E_-OnCvtvBtTZ4CcsFjx8fVV-OXXXOSt4qP0Q2AeeRWTYCNBQAH2AGpgz0Sigf6w",
        }
    }

    pub fn rotated() -> Self {
        Self {
            private_pem: include_bytes!("../fixtures/rotated.pem"),
            modulus: "tbdKnWgmbwwXJP2vQ28x70oFXjQyMvxecgPLBA9ucPtRuURFmy3_bTeYq0pst7705sBF5omAoZd3oe1dERo3rMgUoLXRL43tWhAfju6xXIr3xZEdb7P23CLSXCp6Je7szpJpGHtIWqfRX0tKXBeLe0RghcoA9mG5fK_sAH0wkZUMlGmSKLRf2jf1_BqeHGM0Ud_jTjrWtlRNYsXJ2btf7iKlHRtYEx4vI3J9QjKQsVm_1hL0epIPU0G9D6JmrU6dQGTi8y29Ihgl-NTrNXO_kUE8W09qFwtyauTHhFRjVvRZusSuyyvvKOytpQu4K2n_fk7U_BFpfgIrkdyAKTAiTQ",
        }
    }

    pub fn jwk(&self, kid: &str) -> Value {
        json!({
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": kid,
            "n": self.modulus,
            "e": "AQAB"
        })
    }

    /// Sign `claims` as an RS256 JWS with `kid` in the header.
    pub fn sign(&self, kid: Option<&str>, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = kid.map(String::from);
        let key = EncodingKey::from_rsa_pem(self.private_pem).unwrap();
        encode(&header, claims, &key).unwrap()
    }
}

pub fn jwks_body(keys: &[(&str, KeyPair)]) -> Value {
    json!({
        "keys": keys.iter().map(|(kid, pair)| pair.jwk(kid)).collect::<Vec<_>>()
    })
}

/// Claims of a valid ID token for `client_id` issued by `issuer` right now.
pub fn id_token_claims(issuer: &str, client_id: &str, nonce: &str) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "iss": issuer,
        "sub": "EE60001019906",
        "aud": client_id,
        "iat": now,
        "nbf": now,
        "exp": now + 600,
        "nonce": nonce,
        "amr": ["mID"],
        "acr": "high",
        "profile_attributes": {
            "given_name": "MARY ÄNN",
            "family_name": "O’CONNEŽ-ŠUSLIK TESTNUMBER",
            "date_of_birth": "2000-01-01"
        }
    })
}
