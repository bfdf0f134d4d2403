//! ExecCredential-side token cache.
//!
//! One JSON file per `(environment, server, client, tenant, legacy)` tuple
//! holding the last token handed to kubectl.

use super::keys::sanitize_key;
use crate::fs;
use chrono::{DateTime, Duration, Utc};
use kubelogin_core::token::EXPIRY_BUFFER_SECONDS;
use kubelogin_core::{AccessToken, Options, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A cached token entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub refresh_token: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires_on: DateTime<Utc>,
    #[serde(default)]
    pub resource: String,
}

impl CachedToken {
    pub fn new(token: &AccessToken, refresh_token: Option<String>, resource: &str) -> Self {
        Self {
            access_token: token.token.clone(),
            refresh_token: refresh_token.unwrap_or_default(),
            expires_on: token.expires_on,
            resource: resource.to_string(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_on <= now + Duration::seconds(EXPIRY_BUFFER_SECONDS)
    }

    /// Usable as-is for `audience` at `now`.
    pub fn is_fresh_for(&self, audience: &str, now: DateTime<Utc>) -> bool {
        self.resource == audience && !self.is_expired_at(now)
    }

    pub fn can_refresh(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    pub fn to_access_token(&self) -> AccessToken {
        AccessToken::bearer(self.access_token.clone(), self.expires_on)
    }
}

/// File-backed cache for a single scope tuple.
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    /// Create a new cache for `options` rooted at `dir`.
    pub fn new(dir: &Path, options: &Options) -> Self {
        Self {
            path: dir.join(Self::file_name(options)),
        }
    }

    /// `<env>-<server>-<client>-<tenant>[_legacy].json`
    pub fn file_name(options: &Options) -> String {
        let mut name = format!(
            "{}-{}-{}-{}",
            options.environment, options.server_id, options.client_id, options.tenant_id
        );
        if options.is_legacy {
            name.push_str("_legacy");
        }
        format!("{}.json", sanitize_key(&name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached entry; missing or corrupt files are a miss.
    pub fn read(&self) -> Result<Option<CachedToken>> {
        let Some(bytes) = fs::read_optional(&self.path)? else {
            debug!(path = %self.path.display(), "Token cache miss");
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring corrupt token cache");
                Ok(None)
            }
        }
    }

    pub fn write(&self, token: &CachedToken) -> Result<()> {
        let bytes = serde_json::to_vec(token)?;
        fs::write_private(&self.path, &bytes)?;
        debug!(path = %self.path.display(), "Token cache written");
        Ok(())
    }
}
