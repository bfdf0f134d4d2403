//! Wrap bearer tokens into signed PoP tokens.

use super::key::{Jwk, PopKey};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use kubelogin_core::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Confirmation {
    pub jwk: Jwk,
}

/// Claims of a PoP token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopClaims {
    pub at: String,
    pub ts: i64,
    pub u: String,
    pub cnf: Confirmation,
    pub nonce: String,
}

/// Sign `access_token` for host `u` at time `ts`.
pub fn format_access_token(
    key: &PopKey,
    access_token: &str,
    u: &str,
    ts: i64,
    nonce: &str,
) -> Result<String> {
    let header = Header {
        typ: Some("pop".to_string()),
        alg: Algorithm::RS256,
        kid: Some(key.kid().to_string()),
        ..Default::default()
    };
    let claims = PopClaims {
        at: access_token.to_string(),
        ts,
        u: u.to_string(),
        cnf: Confirmation {
            jwk: key.jwk().clone(),
        },
        nonce: nonce.to_string(),
    };
    let encoding_key = EncodingKey::from_rsa_der(key.pkcs1_der());
    encode(&header, &claims, &encoding_key)
        .map_err(|e| Error::config(format!("failed to sign PoP token: {}", e)))
}

/// Sign with the current time and a fresh nonce.
pub fn sign(key: &PopKey, access_token: &str, u: &str) -> Result<String> {
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    format_access_token(key, access_token, u, Utc::now().timestamp(), &nonce)
}
