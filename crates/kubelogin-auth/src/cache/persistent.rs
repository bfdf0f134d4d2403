//! Provider-side cache: an encrypted token blob plus the account record.

use super::accessor::{CacheAccessor, EncryptedFileAccessor};
use super::keys::account_key;
use crate::fs;
use chrono::Utc;
use kubelogin_core::{AccessToken, AuthenticationRecord, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Decrypted contents of the cache blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Access tokens keyed by scope.
    #[serde(default)]
    pub access_tokens: BTreeMap<String, AccessToken>,
}

impl CacheState {
    /// A cached token for `scope` that is not about to expire.
    pub fn valid_token(&self, scope: &str) -> Option<&AccessToken> {
        self.access_tokens
            .get(scope)
            .filter(|t| !t.is_expired_at(Utc::now()))
    }

    pub fn insert(&mut self, scope: &str, token: AccessToken, refresh_token: Option<String>) {
        self.access_tokens.insert(scope.to_string(), token);
        if refresh_token.is_some() {
            self.refresh_token = refresh_token;
        }
    }
}

pub struct PersistentCache {
    record_path: PathBuf,
    accessor: Box<dyn CacheAccessor>,
}

impl PersistentCache {
    /// Create a new cache for one app registration under `dir`.
    pub fn new(dir: &Path, client_id: &str, tenant_id: &str) -> Self {
        let key = account_key(client_id, tenant_id);
        Self {
            record_path: dir.join(format!("{}.record.json", key)),
            accessor: Box::new(EncryptedFileAccessor::new(
                dir.join(format!("{}.cache.bin", key)),
            )),
        }
    }

    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    /// Load the authentication record; a missing or unreadable record is `None`.
    pub fn load_record(&self) -> Option<AuthenticationRecord> {
        match fs::read_optional(&self.record_path) {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(path = %self.record_path.display(), error = %e, "Ignoring corrupt authentication record");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read authentication record");
                None
            }
        }
    }

    pub fn save_record(&self, record: &AuthenticationRecord) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(record)?;
        fs::write_private(&self.record_path, &bytes)?;
        debug!(path = %self.record_path.display(), "Authentication record saved");
        Ok(())
    }

    /// Load the token blob; failures degrade to an empty state.
    pub fn load(&self) -> CacheState {
        match self.accessor.read() {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(error = %e, "Ignoring corrupt token cache blob");
                CacheState::default()
            }),
            Err(e) if e.is_not_found() => CacheState::default(),
            Err(e) => {
                warn!(error = %e, "Failed to read token cache blob");
                CacheState::default()
            }
        }
    }

    pub fn store(&self, state: &CacheState) -> Result<()> {
        let bytes = serde_json::to_vec(state)?;
        self.accessor.write(&bytes)
    }

    /// Store, logging instead of failing.
    pub fn store_or_warn(&self, state: &CacheState) {
        if let Err(e) = self.store(state) {
            warn!(error = %e, "Failed to write token cache blob");
        }
    }

    pub fn clear(&self) -> Result<()> {
        self.accessor.delete()
    }
}
