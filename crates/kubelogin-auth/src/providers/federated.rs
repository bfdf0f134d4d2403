//! Federated identity: exchange an externally issued assertion for a token.

use super::{CredentialProvider, single_scope};
use crate::authority::AuthorityClient;
use async_trait::async_trait;
use kubelogin_core::env::{self, EnvSource};
use kubelogin_core::{AccessToken, Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::debug;

/// Audience requested for federated assertions.
pub const TOKEN_EXCHANGE_AUDIENCE: &str = "api://AzureADTokenExchange";

const PIPELINES_API_VERSION: &str = "7.1";

/// Produces the client assertion for one token request.
#[async_trait]
pub trait AssertionSource: Send + Sync {
    async fn assertion(&self) -> Result<String>;
}

/// Client-assertion exchange around an [`AssertionSource`].
pub struct FederatedCredential {
    name: &'static str,
    authority: AuthorityClient,
    client_id: String,
    source: Box<dyn AssertionSource>,
}

impl FederatedCredential {
    pub fn new(
        name: &'static str,
        authority: AuthorityClient,
        client_id: &str,
        source: Box<dyn AssertionSource>,
    ) -> Self {
        Self {
            name,
            authority,
            client_id: client_id.to_string(),
            source,
        }
    }
}

#[async_trait]
impl CredentialProvider for FederatedCredential {
    fn name(&self) -> &str {
        self.name
    }

    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken> {
        let scope = single_scope(scopes)?;
        let assertion = self.source.assertion().await?;
        debug!(provider = self.name, client_id = %self.client_id, "Exchanging federated assertion");
        let response = self
            .authority
            .client_assertion_token(&self.client_id, &assertion, scope, &[])
            .await?;
        Ok(response.to_access_token())
    }
}

/// Projected service account token on disk, re-read on every request.
pub struct TokenFileAssertion {
    path: PathBuf,
}

impl TokenFileAssertion {
    pub fn new(path: &str) -> Self {
        Self {
            path: PathBuf::from(path),
        }
    }
}

#[async_trait]
impl AssertionSource for TokenFileAssertion {
    async fn assertion(&self) -> Result<String> {
        let token = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::io_at(&self.path, e))?;
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::config(format!(
                "federated token file {} is empty",
                self.path.display()
            )));
        }
        Ok(token.to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipelinesOidcResponse {
    oidc_token: String,
}

/// Azure DevOps service connection OIDC token.
pub struct AzurePipelinesAssertion {
    http: reqwest::Client,
    request_uri: String,
    access_token: String,
    service_connection_id: String,
}

impl AzurePipelinesAssertion {
    pub fn new(
        http: reqwest::Client,
        request_uri: &str,
        access_token: &str,
        service_connection_id: &str,
    ) -> Self {
        Self {
            http,
            request_uri: request_uri.to_string(),
            access_token: access_token.to_string(),
            service_connection_id: service_connection_id.to_string(),
        }
    }

    /// Read `SYSTEM_OIDCREQUESTURI` and `SYSTEM_ACCESSTOKEN`.
    pub fn from_env(
        http: reqwest::Client,
        service_connection_id: &str,
        env: &dyn EnvSource,
    ) -> Result<Self> {
        let access_token = env.require(env::SYSTEM_ACCESSTOKEN)?;
        let request_uri = env.require(env::SYSTEM_OIDCREQUESTURI)?;
        Ok(Self::new(
            http,
            &request_uri,
            &access_token,
            service_connection_id,
        ))
    }
}

#[async_trait]
impl AssertionSource for AzurePipelinesAssertion {
    async fn assertion(&self) -> Result<String> {
        let response = self
            .http
            .post(&self.request_uri)
            .query(&[
                ("api-version", PIPELINES_API_VERSION),
                ("serviceConnectionId", self.service_connection_id.as_str()),
            ])
            .bearer_auth(&self.access_token)
            .header("Content-Type", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::auth(
                None,
                format!(
                    "Azure Pipelines OIDC request failed with status {}: {}",
                    status, error_text
                ),
            ));
        }
        let body: PipelinesOidcResponse = response.json().await?;
        Ok(body.oidc_token)
    }
}

#[derive(Debug, Deserialize)]
struct GithubIdTokenResponse {
    value: String,
}

/// GitHub Actions OIDC ID token.
pub struct GithubActionsAssertion {
    http: reqwest::Client,
    request_url: String,
    request_token: String,
}

impl GithubActionsAssertion {
    pub fn new(http: reqwest::Client, request_url: &str, request_token: &str) -> Self {
        Self {
            http,
            request_url: request_url.to_string(),
            request_token: request_token.to_string(),
        }
    }

    /// Read `ACTIONS_ID_TOKEN_REQUEST_URL` and `ACTIONS_ID_TOKEN_REQUEST_TOKEN`.
    pub fn from_env(http: reqwest::Client, env: &dyn EnvSource) -> Result<Self> {
        let request_token = env.require(env::ACTIONS_ID_TOKEN_REQUEST_TOKEN)?;
        let request_url = env.require(env::ACTIONS_ID_TOKEN_REQUEST_URL)?;
        Ok(Self::new(http, &request_url, &request_token))
    }
}

#[async_trait]
impl AssertionSource for GithubActionsAssertion {
    async fn assertion(&self) -> Result<String> {
        let response = self
            .http
            .get(&self.request_url)
            .query(&[("audience", TOKEN_EXCHANGE_AUDIENCE)])
            .header("Authorization", format!("bearer {}", self.request_token))
            .header("Accept", "application/json; api-version=2.0")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::auth(
                None,
                format!(
                    "GitHub Actions ID token request failed with status {}: {}",
                    status, error_text
                ),
            ));
        }
        let body: GithubIdTokenResponse = response.json().await?;
        Ok(body.value)
    }
}
