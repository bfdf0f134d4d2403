//! Silent token acquisition shared by the user flows.

use super::record_from_id_token;
use crate::authority::{AuthorityClient, TokenResponse};
use crate::cache::PersistentCache;
use crate::pop::PopBinding;
use kubelogin_core::{AccessToken, AuthenticationRecord, Error, Result};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, trace, warn};

/// Account state for a user flow: the authority, the provider-side cache
/// and an optional PoP binding.
pub(crate) struct UserSession {
    authority: AuthorityClient,
    client_id: String,
    cache: PersistentCache,
    pop: Option<PopBinding>,
    last_refresh_token: Mutex<Option<String>>,
}

impl UserSession {
    pub fn new(
        authority: AuthorityClient,
        client_id: &str,
        cache_dir: &Path,
        pop: Option<PopBinding>,
    ) -> Self {
        let cache = PersistentCache::new(cache_dir, client_id, authority.tenant_id());
        Self {
            authority,
            client_id: client_id.to_string(),
            cache,
            pop,
            last_refresh_token: Mutex::new(None),
        }
    }

    pub fn authority(&self) -> &AuthorityClient {
        &self.authority
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn is_pop(&self) -> bool {
        self.pop.is_some()
    }

    /// Extra token request parameters for PoP.
    pub fn pop_params(&self) -> Vec<(&str, &str)> {
        self.pop
            .as_ref()
            .map(|p| p.request_params().to_vec())
            .unwrap_or_default()
    }

    pub fn has_record(&self) -> bool {
        self.cache.load_record().is_some()
    }

    fn cache_key(&self, scope: &str) -> String {
        if self.pop.is_some() {
            format!("{}#pop", scope)
        } else {
            scope.to_string()
        }
    }

    /// Use a cached token or the cached refresh token.
    ///
    /// Returns `None` when the user has to sign in again.
    pub async fn acquire_silent(&self, scope: &str) -> Result<Option<AccessToken>> {
        let Some(record) = self.cache.load_record() else {
            return Ok(None);
        };
        let state = self.cache.load();
        if let Some(token) = state.valid_token(&self.cache_key(scope)) {
            debug!(username = %record.username, "Using cached access token");
            self.remember(state.refresh_token.clone());
            return self.finish(token.clone()).map(Some);
        }
        let Some(refresh_token) = state.refresh_token else {
            return Ok(None);
        };

        let extra = self.pop_params();
        match self
            .authority
            .refresh_token(&self.client_id, &refresh_token, scope, &extra)
            .await
        {
            Ok(response) => {
                debug!(username = %record.username, "Refreshed access token");
                self.complete(scope, &response, Some(&record)).map(|(t, _)| Some(t))
            }
            Err(e @ Error::Auth { .. }) => {
                trace!(error = %e, "Silent refresh failed");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Persist a fresh token response and return the token to hand out.
    pub fn complete(
        &self,
        scope: &str,
        response: &TokenResponse,
        previous: Option<&AuthenticationRecord>,
    ) -> Result<(AccessToken, AuthenticationRecord)> {
        let record = response
            .id_token
            .as_deref()
            .and_then(|id| record_from_id_token(id, &self.authority.authority(), &self.client_id))
            .or_else(|| previous.cloned())
            .unwrap_or_else(|| AuthenticationRecord {
                authority: self.authority.authority(),
                client_id: self.client_id.clone(),
                tenant_id: self.authority.tenant_id().to_string(),
                version: AuthenticationRecord::VERSION.to_string(),
                ..Default::default()
            });
        if let Err(e) = self.cache.save_record(&record) {
            warn!(error = %e, "Failed to save authentication record");
        }

        let token = response.to_access_token();
        let mut state = self.cache.load();
        state.insert(
            &self.cache_key(scope),
            token.clone(),
            response.refresh_token.clone(),
        );
        self.cache.store_or_warn(&state);
        self.remember(state.refresh_token);

        Ok((self.finish(token)?, record))
    }

    fn finish(&self, token: AccessToken) -> Result<AccessToken> {
        match &self.pop {
            Some(pop) => pop.wrap(token),
            None => Ok(token),
        }
    }

    fn remember(&self, refresh_token: Option<String>) {
        if let Ok(mut last) = self.last_refresh_token.lock() {
            *last = refresh_token;
        }
    }

    /// Refresh token of the last acquisition, for the ExecCredential cache.
    pub fn last_refresh_token(&self) -> Option<String> {
        if self.pop.is_some() {
            return None;
        }
        self.last_refresh_token.lock().ok().and_then(|t| t.clone())
    }
}
