//! RSA key backing proof-of-possession tokens.

use crate::fs;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use kubelogin_core::{Error, Result};
use rsa::RsaPrivateKey;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, warn};

pub const POP_KEY_FILE: &str = "pop_key.pem";
const KEY_BITS: usize = 2048;

/// Public half of the key as a JSON Web Key.
///
/// Field order is lexicographic so the serialized form doubles as the
/// RFC 7638 thumbprint input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub e: String,
    pub kty: String,
    pub n: String,
}

#[derive(Serialize)]
struct ReqCnf<'a> {
    kid: &'a str,
    xms_ksl: &'a str,
}

/// Signing key plus the values derived from it.
pub struct PopKey {
    der: Vec<u8>,
    jwk: Jwk,
    thumbprint: String,
}

impl PopKey {
    /// Load `<dir>/pop_key.pem`, or generate and persist a fresh key.
    ///
    /// A key that cannot be written is still returned; the next
    /// invocation simply generates another one.
    pub fn load_or_create(dir: &Path) -> Result<Self> {
        let path = dir.join(POP_KEY_FILE);
        match fs::read_optional(&path) {
            Ok(Some(bytes)) => match std::str::from_utf8(&bytes)
                .ok()
                .and_then(|pem| RsaPrivateKey::from_pkcs1_pem(pem).ok())
            {
                Some(key) => {
                    debug!(path = %path.display(), "Loaded PoP key");
                    return Self::from_key(&key);
                }
                None => warn!(path = %path.display(), "Ignoring unparseable PoP key"),
            },
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to read PoP key"),
        }

        let key = Self::generate_key()?;
        match key.to_pkcs1_pem(LineEnding::LF) {
            Ok(pem) => {
                if let Err(e) = fs::write_private(&path, pem.as_bytes()) {
                    warn!(path = %path.display(), error = %e, "Failed to persist PoP key");
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode PoP key"),
        }
        Self::from_key(&key)
    }

    /// Generate an ephemeral key that is never written to disk.
    pub fn generate() -> Result<Self> {
        Self::from_key(&Self::generate_key()?)
    }

    pub fn from_pkcs1_pem(pem: &str) -> Result<Self> {
        let key = RsaPrivateKey::from_pkcs1_pem(pem)
            .map_err(|e| Error::config(format!("invalid PoP key: {}", e)))?;
        Self::from_key(&key)
    }

    fn generate_key() -> Result<RsaPrivateKey> {
        debug!(bits = KEY_BITS, "Generating PoP key");
        RsaPrivateKey::new(&mut rand::thread_rng(), KEY_BITS)
            .map_err(|e| Error::config(format!("failed to generate PoP key: {}", e)))
    }

    fn from_key(key: &RsaPrivateKey) -> Result<Self> {
        let der = key
            .to_pkcs1_der()
            .map_err(|e| Error::config(format!("failed to encode PoP key: {}", e)))?
            .as_bytes()
            .to_vec();
        let jwk = Jwk {
            e: URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
            kty: "RSA".to_string(),
            n: URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
        };
        let canonical = serde_json::to_vec(&jwk)?;
        let thumbprint = URL_SAFE_NO_PAD.encode(Sha256::digest(&canonical));
        Ok(Self {
            der,
            jwk,
            thumbprint,
        })
    }

    pub fn jwk(&self) -> &Jwk {
        &self.jwk
    }

    /// base64url SHA-256 of the canonical JWK.
    pub fn jwk_thumbprint(&self) -> &str {
        &self.thumbprint
    }

    pub fn kid(&self) -> &str {
        &self.thumbprint
    }

    /// `req_cnf` parameter announcing this key to the token endpoint.
    pub fn req_cnf(&self) -> Result<String> {
        let cnf = serde_json::to_vec(&ReqCnf {
            kid: &self.thumbprint,
            xms_ksl: "sw",
        })?;
        Ok(URL_SAFE_NO_PAD.encode(cnf))
    }

    /// PKCS#1 DER encoding of the private key.
    pub(crate) fn pkcs1_der(&self) -> &[u8] {
        &self.der
    }
}

impl std::fmt::Debug for PopKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PopKey")
            .field("kid", &self.thumbprint)
            .finish_non_exhaustive()
    }
}
