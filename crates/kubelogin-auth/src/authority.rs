//! OAuth2 client for a single directory authority.

use crate::cloud;
use chrono::{DateTime, TimeZone, Utc};
use kubelogin_core::options::DEFAULT_SCOPE_SUFFIX;
use kubelogin_core::{AccessToken, Error, Result};
use serde::{Deserialize, Deserializer};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Scopes requested alongside the resource scope for user flows.
pub const USER_FLOW_SCOPES: &str = "openid profile offline_access";

const INSTANCE_DISCOVERY_URL: &str =
    "https://login.microsoftonline.com/common/discovery/instance";

/// OAuth endpoint flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointVersion {
    /// `oauth2/{token,devicecode,authorize}` with a `resource` parameter.
    V1,
    /// `oauth2/v2.0/{token,devicecode,authorize}` with a `scope` parameter.
    V2,
}

/// Raw token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default, deserialize_with = "flexible_i64")]
    pub expires_in: Option<i64>,
    #[serde(default, deserialize_with = "flexible_i64")]
    pub expires_on: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
}

impl TokenResponse {
    pub fn expires_at(&self) -> DateTime<Utc> {
        if let Some(on) = self.expires_on
            && let Some(at) = Utc.timestamp_opt(on, 0).single()
        {
            return at;
        }
        Utc::now() + chrono::Duration::seconds(self.expires_in.unwrap_or(3600))
    }

    pub fn to_access_token(&self) -> AccessToken {
        AccessToken::bearer(self.access_token.clone(), self.expires_at())
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryResponse {
    #[serde(default)]
    tenant_discovery_endpoint: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Accept numbers and numeric strings; v1 endpoints send strings.
pub(crate) fn flexible_i64<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrString {
        Num(i64),
        Str(String),
    }

    match Option::<NumOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumOrString::Num(n)) => Ok(Some(n)),
        Some(NumOrString::Str(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// OAuth2 client bound to `authority_host + tenant_id`.
pub struct AuthorityClient {
    http: reqwest::Client,
    authority_host: String,
    tenant_id: String,
    version: EndpointVersion,
    instance_discovery: bool,
    validated: OnceCell<()>,
}

impl AuthorityClient {
    pub fn new(
        http: reqwest::Client,
        authority_host: &str,
        tenant_id: &str,
        version: EndpointVersion,
    ) -> Self {
        Self {
            http,
            authority_host: cloud::with_trailing_slash(authority_host),
            tenant_id: tenant_id.to_string(),
            version,
            instance_discovery: false,
            validated: OnceCell::new(),
        }
    }

    /// Validate unknown authorities against the public instance discovery endpoint.
    pub fn with_instance_discovery(mut self, enabled: bool) -> Self {
        self.instance_discovery = enabled;
        self
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn version(&self) -> EndpointVersion {
        self.version
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn authority(&self) -> String {
        format!("{}{}/", self.authority_host, self.tenant_id)
    }

    fn endpoint(&self, name: &str) -> String {
        match self.version {
            EndpointVersion::V1 => format!("{}oauth2/{}", self.authority(), name),
            EndpointVersion::V2 => format!("{}oauth2/v2.0/{}", self.authority(), name),
        }
    }

    pub fn token_endpoint(&self) -> String {
        self.endpoint("token")
    }

    pub fn devicecode_endpoint(&self) -> String {
        self.endpoint("devicecode")
    }

    pub fn authorize_endpoint(&self) -> String {
        self.endpoint("authorize")
    }

    /// The audience parameter for `scope` in this endpoint flavor.
    ///
    /// v1 endpoints take the bare resource instead of a `/.default` scope.
    pub fn audience_param(&self, scope: &str) -> (&'static str, String) {
        match self.version {
            EndpointVersion::V1 => (
                "resource",
                scope
                    .strip_suffix(DEFAULT_SCOPE_SUFFIX)
                    .unwrap_or(scope)
                    .to_string(),
            ),
            EndpointVersion::V2 => ("scope", scope.to_string()),
        }
    }

    /// Audience parameter for interactive user flows, which also need
    /// refresh and ID tokens.
    pub fn user_audience_param(&self, scope: &str) -> (&'static str, String) {
        match self.version {
            EndpointVersion::V1 => self.audience_param(scope),
            EndpointVersion::V2 => ("scope", format!("{} {}", scope, USER_FLOW_SCOPES)),
        }
    }

    /// POST a form to the token endpoint.
    pub async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        self.post_form(&self.token_endpoint(), params).await
    }

    /// POST a form to an endpoint of this authority and decode the JSON reply.
    pub async fn post_form<T>(&self, url: &str, params: &[(&str, &str)]) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.ensure_valid_authority().await?;

        let grant = params
            .iter()
            .find(|(k, _)| *k == "grant_type")
            .map(|(_, v)| *v)
            .unwrap_or("-");
        debug!(url = %url, grant_type = %grant, "Sending identity provider request");

        let response = self.http.post(url).form(params).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(parse_error(status, &body));
        }
        serde_json::from_str(&body).map_err(|e| {
            Error::auth(None, format!("unexpected response from {}: {}", url, e))
        })
    }

    /// Exchange a client assertion for a token (client credentials grant).
    pub async fn client_assertion_token(
        &self,
        client_id: &str,
        assertion: &str,
        scope: &str,
        extra: &[(&str, &str)],
    ) -> Result<TokenResponse> {
        let (audience_key, audience) = self.audience_param(scope);
        let mut params = vec![
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE),
            ("client_assertion", assertion),
            (audience_key, audience.as_str()),
        ];
        params.extend_from_slice(extra);
        self.request_token(&params).await
    }

    /// Redeem a refresh token.
    pub async fn refresh_token(
        &self,
        client_id: &str,
        refresh_token: &str,
        scope: &str,
        extra: &[(&str, &str)],
    ) -> Result<TokenResponse> {
        let (audience_key, audience) = self.user_audience_param(scope);
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("client_id", client_id),
            ("refresh_token", refresh_token),
            (audience_key, audience.as_str()),
        ];
        params.extend_from_slice(extra);
        self.request_token(&params).await
    }

    async fn ensure_valid_authority(&self) -> Result<()> {
        if !self.instance_discovery || cloud::is_known_authority_host(&self.authority_host) {
            return Ok(());
        }
        self.validated
            .get_or_try_init(|| async {
                let authorize = self.authorize_endpoint();
                debug!(authority = %self.authority(), "Running instance discovery");
                let response = self
                    .http
                    .get(INSTANCE_DISCOVERY_URL)
                    .query(&[
                        ("api-version", "1.1"),
                        ("authorization_endpoint", authorize.as_str()),
                    ])
                    .send()
                    .await?;
                let discovery: DiscoveryResponse = response.json().await?;
                match (discovery.error, discovery.tenant_discovery_endpoint) {
                    (None, Some(_)) => Ok(()),
                    (error, _) => {
                        warn!(authority = %self.authority(), "Instance discovery rejected authority");
                        Err(Error::config(format!(
                            "authority {} failed instance discovery: {}",
                            self.authority(),
                            discovery
                                .error_description
                                .or(error)
                                .unwrap_or_else(|| "unknown authority".to_string())
                        )))
                    }
                }
            })
            .await
            .map(|_| ())
    }
}

/// Turn an IdP error body into `Error::Auth`.
pub(crate) fn parse_error(status: reqwest::StatusCode, body: &str) -> Error {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) => Error::auth(
            Some(err.error),
            err.error_description
                .unwrap_or_else(|| format!("request failed with status {}", status)),
        ),
        Err(_) => Error::auth(
            None,
            format!("request failed with status {}: {}", status, body.trim()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(host: &str, version: EndpointVersion) -> AuthorityClient {
        AuthorityClient::new(reqwest::Client::new(), host, "tid", version)
    }

    #[test]
    fn test_endpoints() {
        let v2 = client("https://login.microsoftonline.com", EndpointVersion::V2);
        assert_eq!(
            v2.token_endpoint(),
            "https://login.microsoftonline.com/tid/oauth2/v2.0/token"
        );
        let v1 = client("https://login.microsoftonline.com/", EndpointVersion::V1);
        assert_eq!(
            v1.devicecode_endpoint(),
            "https://login.microsoftonline.com/tid/oauth2/devicecode"
        );
    }

    #[test]
    fn test_audience_param() {
        let v2 = client("https://h/", EndpointVersion::V2);
        assert_eq!(
            v2.audience_param("srv/.default"),
            ("scope", "srv/.default".to_string())
        );
        let v1 = client("https://h/", EndpointVersion::V1);
        assert_eq!(v1.audience_param("srv/.default"), ("resource", "srv".to_string()));
    }

    #[test]
    fn test_token_response_accepts_string_numbers() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token":"at","token_type":"Bearer","expires_in":"3599","expires_on":"1700000000"}"#,
        )
        .unwrap();
        assert_eq!(response.expires_in, Some(3599));
        assert_eq!(response.expires_at().timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn test_error_body_becomes_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tid/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "invalid_client",
                "error_description": "AADSTS7000215: Invalid client secret provided.",
                "error_codes": [7000215]
            })))
            .mount(&server)
            .await;

        let client = client(&server.uri(), EndpointVersion::V2);
        let err = client
            .request_token(&[("grant_type", "client_credentials")])
            .await
            .unwrap_err();
        match err {
            Error::Auth { code, message } => {
                assert_eq!(code.as_deref(), Some("invalid_client"));
                assert!(message.contains("AADSTS7000215"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
