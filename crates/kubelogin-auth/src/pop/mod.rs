//! Proof-of-possession tokens.

pub mod key;
pub mod signer;

pub use key::{Jwk, PopKey};

use kubelogin_core::options::POP_CLAIM_HOST;
use kubelogin_core::{AccessToken, Error, Result, TokenType};
use std::collections::BTreeMap;

/// A PoP key bound to the claims a token will be signed for.
#[derive(Debug)]
pub struct PopBinding {
    key: PopKey,
    host: String,
    req_cnf: String,
}

impl PopBinding {
    pub fn new(key: PopKey, claims: &BTreeMap<String, String>) -> Result<Self> {
        let host = claims
            .get(POP_CLAIM_HOST)
            .filter(|h| !h.is_empty())
            .cloned()
            .ok_or_else(|| Error::config("required u-claim not provided for PoP token flow"))?;
        let req_cnf = key.req_cnf()?;
        Ok(Self { key, host, req_cnf })
    }

    /// Extra token request parameters asking for a PoP-bound token.
    pub fn request_params(&self) -> [(&'static str, &str); 2] {
        [("token_type", "pop"), ("req_cnf", self.req_cnf.as_str())]
    }

    /// Sign the issued bearer for the bound host.
    pub fn wrap(&self, token: AccessToken) -> Result<AccessToken> {
        let signed = signer::sign(&self.key, &token.token, &self.host)?;
        Ok(AccessToken {
            token: signed,
            expires_on: token.expires_on,
            token_type: TokenType::Pop,
        })
    }

    pub fn key(&self) -> &PopKey {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use key::tests::test_key;

    #[test]
    fn test_binding_requires_u_claim() {
        let claims = BTreeMap::from([("x".to_string(), "y".to_string())]);
        let err = PopBinding::new(test_key(), &claims).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_wrap_keeps_expiry() {
        let claims = BTreeMap::from([("u".to_string(), "host".to_string())]);
        let binding = PopBinding::new(test_key(), &claims).unwrap();
        assert_eq!(binding.request_params()[0], ("token_type", "pop"));

        let bearer = AccessToken::expiring_in("at", 3600);
        let wrapped = binding.wrap(bearer.clone()).unwrap();
        assert_eq!(wrapped.token_type, TokenType::Pop);
        assert_eq!(wrapped.expires_on, bearer.expires_on);
        assert_eq!(wrapped.token.split('.').count(), 3);
    }
}
