//! Access tokens and authentication records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tokens expiring within this window are treated as expired.
pub const EXPIRY_BUFFER_SECONDS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    #[default]
    Bearer,
    Pop,
}

/// A short-lived credential issued by the identity provider.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
    #[serde(default)]
    pub token_type: TokenType,
}

impl AccessToken {
    pub fn bearer(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_on,
            token_type: TokenType::Bearer,
        }
    }

    /// Build a token from a relative `expires_in` (seconds).
    pub fn expiring_in(token: impl Into<String>, expires_in: i64) -> Self {
        Self::bearer(token, Utc::now() + Duration::seconds(expires_in))
    }

    /// Check if the token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_on <= now + Duration::seconds(EXPIRY_BUFFER_SECONDS)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("expires_on", &self.expires_on)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Account metadata that lets interactive providers re-authenticate silently.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthenticationRecord {
    pub authority: String,
    pub client_id: String,
    pub home_account_id: String,
    pub tenant_id: String,
    pub username: String,
    pub version: String,
}

impl AuthenticationRecord {
    pub const VERSION: &'static str = "1.0";
}
