//! Credential providers and the dispatcher that picks one per invocation.

pub mod cli;
pub mod device_code;
pub mod federated;
pub mod interactive;
pub mod managed_identity;
pub mod service_principal;
pub mod username_password;
mod user;

use crate::authority::{AuthorityClient, EndpointVersion};
use crate::cloud;
use crate::pop::{PopBinding, PopKey};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use kubelogin_core::{
    AccessToken, AuthenticationRecord, EnvSource, Error, LoginMethod, Options, Result,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

pub use cli::{AzureCli, AzureDeveloperCli};
pub use device_code::DeviceCode;
pub use federated::{
    AssertionSource, AzurePipelinesAssertion, FederatedCredential, GithubActionsAssertion,
    TokenFileAssertion,
};
pub use interactive::InteractiveBrowser;
pub use managed_identity::ManagedIdentity;
pub use service_principal::{ClientCredential, ServicePrincipal};
pub use username_password::UsernamePassword;

/// A source of access tokens.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Whether an interactive `authenticate` must run before `get_token`
    /// can succeed silently.
    fn need_authenticate(&self) -> bool {
        false
    }

    /// Establish the user's identity and cache it for later silent calls.
    async fn authenticate(&self, _scope: &str) -> Result<AuthenticationRecord> {
        Err(Error::NotSupported(format!(
            "{} does not support authenticate",
            self.name()
        )))
    }

    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken>;

    /// Refresh token issued alongside the last token, if the flow has one.
    fn refresh_token(&self) -> Option<String> {
        None
    }
}

/// Pick the first scope; every flow here requests a single resource.
pub(crate) fn single_scope<'a>(scopes: &[&'a str]) -> Result<&'a str> {
    scopes
        .first()
        .copied()
        .ok_or_else(|| Error::config("at least one scope is required"))
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Http(e.to_string()))
}

/// Endpoint flavor for a login method.
///
/// Legacy mode talks to the v1 endpoints for the flows that support it.
pub fn endpoint_version(options: &Options) -> EndpointVersion {
    match options.login_method {
        LoginMethod::ServicePrincipal
        | LoginMethod::DeviceCode
        | LoginMethod::ResourceOwnerPassword
            if options.is_legacy =>
        {
            EndpointVersion::V1
        }
        _ => EndpointVersion::V2,
    }
}

/// Authority host for AAD flows: `--authority-host` wins over the cloud.
pub fn authority_host(options: &Options, env: &dyn EnvSource) -> Result<String> {
    if options.authority_host.is_empty() {
        Ok(cloud::resolve(&options.environment, env)?.active_directory_authority_host)
    } else {
        Ok(options.authority_host.clone())
    }
}

/// Build the OAuth client the AAD flows of `options` talk to.
pub fn authority_client(options: &Options, env: &dyn EnvSource) -> Result<AuthorityClient> {
    let http = http_client(options.timeout)?;
    Ok(AuthorityClient::new(
        http,
        &authority_host(options, env)?,
        &options.tenant_id,
        endpoint_version(options),
    )
    .with_instance_discovery(!options.disable_instance_discovery))
}

fn pop_binding(options: &Options) -> Result<Option<PopBinding>> {
    if !options.is_pop_enabled {
        return Ok(None);
    }
    let key = PopKey::load_or_create(&options.auth_record_cache_dir())?;
    Ok(Some(PopBinding::new(key, &options.pop_claims_map()?)?))
}

/// Create the credential provider for `options`.
pub fn new_credential(
    options: &Options,
    env: &dyn EnvSource,
) -> Result<Box<dyn CredentialProvider>> {
    let cache_dir = options.auth_record_cache_dir();
    let provider: Box<dyn CredentialProvider> = match options.login_method {
        LoginMethod::DeviceCode => Box::new(DeviceCode::new(
            authority_client(options, env)?,
            &options.client_id,
            &cache_dir,
        )),
        LoginMethod::Interactive => Box::new(
            InteractiveBrowser::new(
                authority_client(options, env)?,
                &options.client_id,
                &cache_dir,
                pop_binding(options)?,
            )
            .with_redirect_url(&options.redirect_url)
            .with_login_hint(&options.login_hint),
        ),
        LoginMethod::ServicePrincipal => {
            let credential = if !options.client_secret.is_empty() {
                ClientCredential::Secret(options.client_secret.clone())
            } else {
                ClientCredential::from_certificate_file(
                    &PathBuf::from(&options.client_certificate_path),
                    &options.client_certificate_password,
                )?
            };
            let persistent = options.use_persistent_cache.then_some(cache_dir.as_path());
            Box::new(ServicePrincipal::new(
                authority_client(options, env)?,
                &options.client_id,
                credential,
                pop_binding(options)?,
                persistent,
            ))
        }
        LoginMethod::ResourceOwnerPassword => Box::new(UsernamePassword::new(
            authority_client(options, env)?,
            &options.client_id,
            &options.username,
            &options.password,
            &cache_dir,
            pop_binding(options)?,
        )),
        LoginMethod::ManagedIdentity => Box::new(ManagedIdentity::new(
            http_client(options.timeout)?,
            &options.client_id,
            &options.identity_resource_id,
        )),
        LoginMethod::WorkloadIdentity => Box::new(FederatedCredential::new(
            "WorkloadIdentity",
            authority_client(options, env)?,
            &options.client_id,
            Box::new(TokenFileAssertion::new(&options.federated_token_file)),
        )),
        LoginMethod::AzureCli => Box::new(AzureCli::new(&options.tenant_id, options.timeout)),
        LoginMethod::AzureDeveloperCli => {
            Box::new(AzureDeveloperCli::new(&options.tenant_id, options.timeout))
        }
        LoginMethod::AzurePipelines => Box::new(FederatedCredential::new(
            "AzurePipelines",
            authority_client(options, env)?,
            &options.client_id,
            Box::new(AzurePipelinesAssertion::from_env(
                http_client(options.timeout)?,
                &options.azure_pipelines_service_connection_id,
                env,
            )?),
        )),
        LoginMethod::GithubActions => Box::new(FederatedCredential::new(
            "GithubActions",
            authority_client(options, env)?,
            &options.client_id,
            Box::new(GithubActionsAssertion::from_env(
                http_client(options.timeout)?,
                env,
            )?),
        )),
    };
    debug!(provider = %provider.name(), login = %options.login_method, "Selected credential provider");
    Ok(provider)
}

#[derive(Debug, Default, Deserialize)]
struct IdTokenClaims {
    #[serde(default)]
    oid: String,
    #[serde(default)]
    tid: String,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    upn: Option<String>,
    #[serde(default)]
    unique_name: Option<String>,
}

/// Build an authentication record from an unverified ID token.
///
/// The token came straight from the token endpoint over TLS, so only its
/// payload is read.
pub(crate) fn record_from_id_token(
    id_token: &str,
    authority: &str,
    client_id: &str,
) -> Option<AuthenticationRecord> {
    let payload = id_token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: IdTokenClaims = serde_json::from_slice(&bytes).ok()?;
    let username = claims
        .preferred_username
        .or(claims.upn)
        .or(claims.unique_name)
        .unwrap_or_default();
    Some(AuthenticationRecord {
        authority: authority.to_string(),
        client_id: client_id.to_string(),
        home_account_id: format!("{}.{}", claims.oid, claims.tid),
        tenant_id: claims.tid,
        username,
        version: AuthenticationRecord::VERSION.to_string(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use kubelogin_core::FlagId;
    use std::collections::HashMap;

    /// An unsigned JWT carrying `claims`.
    pub(crate) fn fake_jwt(claims: serde_json::Value) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        )
    }

    fn options(login: &str, cache_dir: &std::path::Path) -> Options {
        let mut opts = Options::new();
        opts.apply(FlagId::Login, login).unwrap();
        opts.server_id = "server".into();
        opts.client_id = "cid".into();
        opts.tenant_id = "tid".into();
        opts.cache_dir = cache_dir.to_string_lossy().into_owned();
        opts
    }

    #[test]
    fn test_record_from_id_token() {
        let jwt = fake_jwt(serde_json::json!({
            "oid": "oid-1",
            "tid": "tid-1",
            "preferred_username": "alice@example.com"
        }));
        let record = record_from_id_token(&jwt, "https://login/tid-1/", "cid").unwrap();
        assert_eq!(record.home_account_id, "oid-1.tid-1");
        assert_eq!(record.username, "alice@example.com");
        assert_eq!(record.version, "1.0");
        assert!(record_from_id_token("garbage", "a", "c").is_none());
    }

    #[test]
    fn test_endpoint_version() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options("spn", dir.path());
        assert_eq!(endpoint_version(&opts), EndpointVersion::V2);
        opts.is_legacy = true;
        assert_eq!(endpoint_version(&opts), EndpointVersion::V1);
        let mut opts = options("interactive", dir.path());
        opts.is_legacy = true;
        assert_eq!(endpoint_version(&opts), EndpointVersion::V2);
    }

    #[test]
    fn test_dispatcher_names() {
        let dir = tempfile::tempdir().unwrap();
        let env = HashMap::<String, String>::new();
        let cases = [
            ("devicecode", "DeviceCode"),
            ("interactive", "InteractiveBrowser"),
            ("ropc", "UsernamePassword"),
            ("msi", "ManagedIdentity"),
            ("workloadidentity", "WorkloadIdentity"),
            ("azurecli", "AzureCLI"),
            ("azd", "AzureDeveloperCLI"),
        ];
        for (login, expected) in cases {
            let provider = new_credential(&options(login, dir.path()), &env).unwrap();
            assert_eq!(provider.name(), expected, "login {}", login);
        }

        let mut opts = options("spn", dir.path());
        opts.client_secret = "secret".into();
        assert_eq!(new_credential(&opts, &env).unwrap().name(), "ClientSecret");
    }

    #[test]
    fn test_dispatcher_pop_variant() {
        let dir = tempfile::tempdir().unwrap();
        let env = HashMap::<String, String>::new();
        let mut opts = options("spn", dir.path());
        opts.client_secret = "secret".into();
        opts.is_pop_enabled = true;
        opts.pop_claims = "u=cluster.example.com".into();
        std::fs::write(
            dir.path().join(crate::pop::key::POP_KEY_FILE),
            crate::pop::key::tests::test_key_pem(),
        )
        .unwrap();
        assert_eq!(
            new_credential(&opts, &env).unwrap().name(),
            "ClientSecretWithPoP"
        );
    }

    #[test]
    fn test_pipelines_requires_system_access_token() {
        let dir = tempfile::tempdir().unwrap();
        let env = HashMap::<String, String>::new();
        let mut opts = options("azurepipelines", dir.path());
        opts.azure_pipelines_service_connection_id = "conn".into();
        let err = match new_credential(&opts, &env) {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("SYSTEM_ACCESSTOKEN"));
    }

    #[tokio::test]
    async fn test_authenticate_not_supported_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let env = HashMap::<String, String>::new();
        let provider = new_credential(&options("msi", dir.path()), &env).unwrap();
        assert!(!provider.need_authenticate());
        let err = provider.authenticate("server/.default").await.unwrap_err();
        assert!(matches!(err, Error::NotSupported(_)));
    }
}
