//! Resource owner password credentials grant.

use super::user::UserSession;
use super::{CredentialProvider, single_scope};
use crate::authority::{AuthorityClient, TokenResponse};
use crate::pop::PopBinding;
use async_trait::async_trait;
use kubelogin_core::{AccessToken, AuthenticationRecord, Result};
use std::path::Path;
use tracing::debug;

pub struct UsernamePassword {
    session: UserSession,
    username: String,
    password: String,
}

impl UsernamePassword {
    /// Create a new username/password provider.
    pub fn new(
        authority: AuthorityClient,
        client_id: &str,
        username: &str,
        password: &str,
        cache_dir: &Path,
        pop: Option<PopBinding>,
    ) -> Self {
        Self {
            session: UserSession::new(authority, client_id, cache_dir, pop),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    async fn sign_in(&self, scope: &str) -> Result<TokenResponse> {
        debug!(username = %self.username, "Requesting token with username and password");
        let authority = self.session.authority();
        let (audience_key, audience) = authority.user_audience_param(scope);
        let mut params = vec![
            ("grant_type", "password"),
            ("client_id", self.session.client_id()),
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
            (audience_key, audience.as_str()),
        ];
        params.extend(self.session.pop_params());
        authority.request_token(&params).await
    }

    fn fallback_record(&self) -> AuthenticationRecord {
        let authority = self.session.authority();
        AuthenticationRecord {
            authority: authority.authority(),
            client_id: self.session.client_id().to_string(),
            tenant_id: authority.tenant_id().to_string(),
            username: self.username.clone(),
            version: AuthenticationRecord::VERSION.to_string(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl CredentialProvider for UsernamePassword {
    fn name(&self) -> &str {
        if self.session.is_pop() {
            "UsernamePasswordWithPoP"
        } else {
            "UsernamePassword"
        }
    }

    fn need_authenticate(&self) -> bool {
        !self.session.has_record()
    }

    async fn authenticate(&self, scope: &str) -> Result<AuthenticationRecord> {
        let response = self.sign_in(scope).await?;
        let (_, record) = self
            .session
            .complete(scope, &response, Some(&self.fallback_record()))?;
        Ok(record)
    }

    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken> {
        let scope = single_scope(scopes)?;
        if let Some(token) = self.session.acquire_silent(scope).await? {
            return Ok(token);
        }
        let response = self.sign_in(scope).await?;
        self.session
            .complete(scope, &response, Some(&self.fallback_record()))
            .map(|(t, _)| t)
    }

    fn refresh_token(&self) -> Option<String> {
        self.session.last_refresh_token()
    }
}
