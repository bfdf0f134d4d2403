//! Managed identity via the instance metadata service.

use super::{CredentialProvider, single_scope};
use crate::authority::{TokenResponse, parse_error};
use async_trait::async_trait;
use kubelogin_core::options::DEFAULT_SCOPE_SUFFIX;
use kubelogin_core::{AccessToken, Error, Result};
use tracing::debug;
use url::Url;

pub const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";

/// Which managed identity to ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySelector {
    /// The system-assigned (or only) identity.
    Default,
    ClientId(String),
    ResourceId(String),
}

pub struct ManagedIdentity {
    http: reqwest::Client,
    endpoint: String,
    identity: IdentitySelector,
}

impl ManagedIdentity {
    /// Create a new managed identity provider; the client ID wins when both
    /// selectors are set.
    pub fn new(http: reqwest::Client, client_id: &str, identity_resource_id: &str) -> Self {
        let identity = if !client_id.is_empty() {
            IdentitySelector::ClientId(client_id.to_string())
        } else if !identity_resource_id.is_empty() {
            IdentitySelector::ResourceId(identity_resource_id.to_string())
        } else {
            IdentitySelector::Default
        };
        Self {
            http,
            endpoint: IMDS_ENDPOINT.to_string(),
            identity,
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn identity(&self) -> &IdentitySelector {
        &self.identity
    }

    fn request_url(&self, scope: &str) -> Result<Url> {
        let resource = scope.strip_suffix(DEFAULT_SCOPE_SUFFIX).unwrap_or(scope);
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| Error::config(format!("invalid IMDS endpoint URL: {}", e)))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("api-version", IMDS_API_VERSION);
            query.append_pair("resource", resource);
            match &self.identity {
                IdentitySelector::Default => {}
                IdentitySelector::ClientId(id) => {
                    query.append_pair("client_id", id);
                }
                IdentitySelector::ResourceId(id) => {
                    query.append_pair("msi_res_id", id);
                }
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl CredentialProvider for ManagedIdentity {
    fn name(&self) -> &str {
        "ManagedIdentity"
    }

    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken> {
        let url = self.request_url(single_scope(scopes)?)?;
        debug!(identity = ?self.identity, "Requesting managed identity token");

        let response = self.http.get(url).header("Metadata", "true").send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(parse_error(status, &body));
        }
        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| Error::auth(None, format!("invalid IMDS token response: {}", e)))?;
        Ok(token.to_access_token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn imds_body() -> serde_json::Value {
        serde_json::json!({
            "access_token": "msi-at",
            "expires_in": "3599",
            "expires_on": "4102444800",
            "resource": "server",
            "token_type": "Bearer"
        })
    }

    #[test]
    fn test_identity_selection() {
        let http = reqwest::Client::new();
        assert_eq!(
            ManagedIdentity::new(http.clone(), "", "").identity(),
            &IdentitySelector::Default
        );
        assert_eq!(
            ManagedIdentity::new(http.clone(), "cid", "/sub/rid").identity(),
            &IdentitySelector::ClientId("cid".into())
        );
        assert_eq!(
            ManagedIdentity::new(http, "", "/sub/rid").identity(),
            &IdentitySelector::ResourceId("/sub/rid".into())
        );
    }

    #[tokio::test]
    async fn test_user_assigned_identity_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata/identity/oauth2/token"))
            .and(header("Metadata", "true"))
            .and(query_param("api-version", "2018-02-01"))
            .and(query_param("resource", "server"))
            .and(query_param("client_id", "cid"))
            .respond_with(ResponseTemplate::new(200).set_body_json(imds_body()))
            .expect(1)
            .mount(&server)
            .await;

        let provider = ManagedIdentity::new(reqwest::Client::new(), "cid", "")
            .with_endpoint(&format!("{}/metadata/identity/oauth2/token", server.uri()));
        let token = provider.get_token(&["server/.default"]).await.unwrap();
        assert_eq!(token.token, "msi-at");
        assert_eq!(token.expires_on.timestamp(), 4_102_444_800);
    }

    #[tokio::test]
    async fn test_imds_error_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata/identity/oauth2/token"))
            .and(query_param("msi_res_id", "/sub/rid"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_request",
                "error_description": "Identity not found"
            })))
            .mount(&server)
            .await;

        let provider = ManagedIdentity::new(reqwest::Client::new(), "", "/sub/rid")
            .with_endpoint(&format!("{}/metadata/identity/oauth2/token", server.uri()));
        let err = provider.get_token(&["server/.default"]).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "authentication failed (invalid_request): Identity not found"
        );
    }
}
