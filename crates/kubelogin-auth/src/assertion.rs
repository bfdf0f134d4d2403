//! Client certificate credentials and signed client assertions.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use kubelogin_core::{Error, Result};
use rsa::RsaPrivateKey;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::DecodePrivateKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Assertions are valid for ten minutes.
const ASSERTION_LIFETIME_SECONDS: i64 = 600;

#[derive(Debug, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
    pub jti: String,
    pub nbf: i64,
    pub sub: String,
}

/// Certificate thumbprint plus the RSA signing key from a PEM bundle.
pub struct ClientCertificate {
    key_der: Vec<u8>,
    thumbprint: String,
}

impl ClientCertificate {
    /// Load a PEM file holding a certificate and its private key.
    pub fn load(path: &Path, password: &str) -> Result<Self> {
        let content = std::fs::read(path).map_err(|e| Error::io_at(path, e))?;
        let content = String::from_utf8(content).map_err(|_| {
            Error::config(format!(
                "{}: only PEM encoded certificates are supported",
                path.display()
            ))
        })?;
        Self::from_pem(&content, password)
    }

    /// Parse a PEM bundle. The private key may be PKCS#1, PKCS#8 or
    /// password-encrypted PKCS#8.
    pub fn from_pem(content: &str, password: &str) -> Result<Self> {
        let entries = pem::parse_many(content)
            .map_err(|e| Error::config(format!("failed to parse PEM content: {}", e)))?;

        let cert = entries
            .iter()
            .find(|p| p.tag() == "CERTIFICATE")
            .ok_or_else(|| Error::config("no certificate found in PEM"))?;
        let thumbprint = URL_SAFE_NO_PAD.encode(Sha256::digest(cert.contents()));

        let key = entries
            .iter()
            .find_map(|p| match p.tag() {
                "RSA PRIVATE KEY" => Some(
                    RsaPrivateKey::from_pkcs1_der(p.contents()).map_err(|e| e.to_string()),
                ),
                "PRIVATE KEY" => Some(
                    RsaPrivateKey::from_pkcs8_der(p.contents()).map_err(|e| e.to_string()),
                ),
                "ENCRYPTED PRIVATE KEY" => Some(
                    RsaPrivateKey::from_pkcs8_encrypted_der(p.contents(), password)
                        .map_err(|e| e.to_string()),
                ),
                _ => None,
            })
            .ok_or_else(|| Error::config("no private key found in PEM"))?
            .map_err(|e| Error::config(format!("failed to parse certificate private key: {}", e)))?;

        let key_der = key
            .to_pkcs1_der()
            .map_err(|e| Error::config(format!("failed to encode private key: {}", e)))?
            .as_bytes()
            .to_vec();

        Ok(Self {
            key_der,
            thumbprint,
        })
    }

    /// base64url SHA-256 of the DER certificate (`x5t#S256`).
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    /// Sign a client assertion for `audience` (the token endpoint).
    pub fn assertion(&self, client_id: &str, audience: &str) -> Result<String> {
        let mut header = Header::new(Algorithm::RS256);
        header.x5t_s256 = Some(self.thumbprint.clone());

        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            aud: audience.to_string(),
            exp: now + ASSERTION_LIFETIME_SECONDS,
            iat: now,
            iss: client_id.to_string(),
            jti: uuid::Uuid::new_v4().to_string(),
            nbf: now,
            sub: client_id.to_string(),
        };

        encode(&header, &claims, &EncodingKey::from_rsa_der(&self.key_der))
            .map_err(|e| Error::config(format!("failed to create client assertion: {}", e)))
    }
}

impl std::fmt::Debug for ClientCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCertificate")
            .field("thumbprint", &self.thumbprint)
            .finish_non_exhaustive()
    }
}
