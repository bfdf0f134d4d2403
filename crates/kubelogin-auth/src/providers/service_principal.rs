//! Client credentials grant with a secret or a certificate.

use super::{CredentialProvider, single_scope};
use crate::assertion::ClientCertificate;
use crate::authority::{AuthorityClient, TokenResponse};
use crate::cache::PersistentCache;
use crate::pop::PopBinding;
use async_trait::async_trait;
use kubelogin_core::{AccessToken, Result};
use std::path::Path;
use tracing::debug;

pub enum ClientCredential {
    Secret(String),
    Certificate(ClientCertificate),
}

impl ClientCredential {
    pub fn from_certificate_file(path: &Path, password: &str) -> Result<Self> {
        Ok(Self::Certificate(ClientCertificate::load(path, password)?))
    }
}

pub struct ServicePrincipal {
    authority: AuthorityClient,
    client_id: String,
    credential: ClientCredential,
    pop: Option<PopBinding>,
    cache: Option<PersistentCache>,
}

impl ServicePrincipal {
    /// Create a new service principal provider; `cache_dir` enables the
    /// provider-side token cache.
    pub fn new(
        authority: AuthorityClient,
        client_id: &str,
        credential: ClientCredential,
        pop: Option<PopBinding>,
        cache_dir: Option<&Path>,
    ) -> Self {
        let cache = cache_dir.map(|dir| PersistentCache::new(dir, client_id, authority.tenant_id()));
        Self {
            authority,
            client_id: client_id.to_string(),
            credential,
            pop,
            cache,
        }
    }

    fn cache_key(&self, scope: &str) -> String {
        if self.pop.is_some() {
            format!("{}#pop", scope)
        } else {
            scope.to_string()
        }
    }

    async fn request(&self, scope: &str) -> Result<TokenResponse> {
        let extra: Vec<(&str, &str)> = self
            .pop
            .as_ref()
            .map(|p| p.request_params().to_vec())
            .unwrap_or_default();

        match &self.credential {
            ClientCredential::Secret(secret) => {
                let (audience_key, audience) = self.authority.audience_param(scope);
                let mut params = vec![
                    ("grant_type", "client_credentials"),
                    ("client_id", self.client_id.as_str()),
                    ("client_secret", secret.as_str()),
                    (audience_key, audience.as_str()),
                ];
                params.extend(extra);
                self.authority.request_token(&params).await
            }
            ClientCredential::Certificate(cert) => {
                let assertion = cert.assertion(&self.client_id, &self.authority.token_endpoint())?;
                self.authority
                    .client_assertion_token(&self.client_id, &assertion, scope, &extra)
                    .await
            }
        }
    }

    fn finish(&self, token: AccessToken) -> Result<AccessToken> {
        match &self.pop {
            Some(pop) => pop.wrap(token),
            None => Ok(token),
        }
    }
}

#[async_trait]
impl CredentialProvider for ServicePrincipal {
    fn name(&self) -> &str {
        match (&self.credential, self.pop.is_some()) {
            (ClientCredential::Secret(_), false) => "ClientSecret",
            (ClientCredential::Secret(_), true) => "ClientSecretWithPoP",
            (ClientCredential::Certificate(_), false) => "ClientCertificate",
            (ClientCredential::Certificate(_), true) => "ClientCertificateWithPoP",
        }
    }

    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken> {
        let scope = single_scope(scopes)?;
        let key = self.cache_key(scope);

        if let Some(cache) = &self.cache {
            let state = cache.load();
            if let Some(token) = state.valid_token(&key) {
                debug!(client_id = %self.client_id, "Using cached service principal token");
                return self.finish(token.clone());
            }
        }

        debug!(client_id = %self.client_id, tenant_id = %self.authority.tenant_id(), "Requesting service principal token");
        let response = self.request(scope).await?;
        let token = response.to_access_token();

        if let Some(cache) = &self.cache {
            let mut state = cache.load();
            state.insert(&key, token.clone(), None);
            cache.store_or_warn(&state);
        }
        self.finish(token)
    }
}
