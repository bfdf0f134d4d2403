//! Device authorization grant.

use super::user::UserSession;
use super::{CredentialProvider, single_scope};
use crate::authority::{AuthorityClient, EndpointVersion, TokenResponse, flexible_i64};
use async_trait::async_trait;
use kubelogin_core::{AccessToken, AuthenticationRecord, Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_POLL_INTERVAL: u64 = 5;
const SLOW_DOWN_INCREMENT: u64 = 5;

/// Response from the device authorization endpoint.
#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    #[serde(default, alias = "verification_url")]
    verification_uri: String,
    #[serde(default, deserialize_with = "flexible_i64")]
    expires_in: Option<i64>,
    #[serde(default, deserialize_with = "flexible_i64")]
    interval: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

impl DeviceCodeResponse {
    fn prompt(&self) -> String {
        self.message.clone().unwrap_or_else(|| {
            format!(
                "To sign in, use a web browser to open the page {} and enter the code {} to authenticate.",
                self.verification_uri, self.user_code
            )
        })
    }
}

pub struct DeviceCode {
    session: UserSession,
}

impl DeviceCode {
    /// Create a new device code provider.
    pub fn new(authority: AuthorityClient, client_id: &str, cache_dir: &Path) -> Self {
        Self {
            session: UserSession::new(authority, client_id, cache_dir, None),
        }
    }

    async fn sign_in(&self, scope: &str) -> Result<TokenResponse> {
        let authority = self.session.authority();
        let client_id = self.session.client_id();
        let (audience_key, audience) = authority.user_audience_param(scope);

        let device: DeviceCodeResponse = authority
            .post_form(
                &authority.devicecode_endpoint(),
                &[("client_id", client_id), (audience_key, audience.as_str())],
            )
            .await?;
        eprintln!("{}", device.prompt());

        let mut interval = device
            .interval
            .map(|i| i.max(0) as u64)
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        let expires_in = device.expires_in.unwrap_or(900).max(0) as u64;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(expires_in);

        let (grant_type, code_param) = match authority.version() {
            EndpointVersion::V1 => ("device_code", "code"),
            EndpointVersion::V2 => ("urn:ietf:params:oauth:grant-type:device_code", "device_code"),
        };

        loop {
            tokio::time::sleep(Duration::from_secs(interval)).await;
            if tokio::time::Instant::now() > deadline {
                return Err(Error::auth(
                    Some("expired_token".to_string()),
                    "device code expired before sign-in completed",
                ));
            }

            let params = [
                ("grant_type", grant_type),
                ("client_id", client_id),
                (code_param, device.device_code.as_str()),
                (audience_key, audience.as_str()),
            ];
            match authority.request_token(&params).await {
                Ok(response) => return Ok(response),
                Err(Error::Auth { code: Some(code), .. }) if code == "authorization_pending" => {
                    debug!("Waiting for device code sign-in");
                }
                Err(Error::Auth { code: Some(code), .. }) if code == "slow_down" => {
                    interval += SLOW_DOWN_INCREMENT;
                    debug!(interval, "Identity provider asked to slow down");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl CredentialProvider for DeviceCode {
    fn name(&self) -> &str {
        "DeviceCode"
    }

    fn need_authenticate(&self) -> bool {
        !self.session.has_record()
    }

    async fn authenticate(&self, scope: &str) -> Result<AuthenticationRecord> {
        let response = self.sign_in(scope).await?;
        let (_, record) = self.session.complete(scope, &response, None)?;
        info!(username = %record.username, "Signed in with device code");
        Ok(record)
    }

    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken> {
        let scope = single_scope(scopes)?;
        if let Some(token) = self.session.acquire_silent(scope).await? {
            return Ok(token);
        }
        let response = self.sign_in(scope).await?;
        self.session.complete(scope, &response, None).map(|(t, _)| t)
    }

    fn refresh_token(&self) -> Option<String> {
        self.session.last_refresh_token()
    }
}
