//! Unified options populated from flags, environment variables and,
//! during conversion, existing kubeconfig arguments.

use crate::env::{self, EnvSource};
use crate::error::{Error, Result};
use crate::flags::{self, Command, EnvBinding, FlagId};
use crate::login::LoginMethod;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_SCOPE_SUFFIX: &str = "/.default";
pub const LEGACY_AUDIENCE_PREFIX: &str = "spn:";
pub const POP_CLAIM_HOST: &str = "u";

/// Options for a single invocation.
///
/// String fields use the empty string for "not provided".
#[derive(Clone)]
pub struct Options {
    pub login_method: LoginMethod,
    pub client_id: String,
    pub tenant_id: String,
    pub server_id: String,
    pub environment: String,

    pub client_secret: String,
    pub client_certificate_path: String,
    pub client_certificate_password: String,
    pub username: String,
    pub password: String,

    pub federated_token_file: String,
    pub authority_host: String,
    pub identity_resource_id: String,
    pub azure_pipelines_service_connection_id: String,

    pub is_legacy: bool,
    pub use_azurerm_env_vars: bool,
    pub use_persistent_cache: bool,
    pub disable_instance_discovery: bool,
    pub disable_environment_override: bool,
    pub timeout: Duration,
    pub redirect_url: String,
    pub login_hint: String,

    pub is_pop_enabled: bool,
    pub pop_claims: String,

    pub cache_dir: String,
    pub token_cache_dir: String,

    pub context: String,
    pub azure_config_dir: String,
    pub kubeconfig_path: String,

    explicit: BTreeSet<FlagId>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            login_method: LoginMethod::default(),
            client_id: String::new(),
            tenant_id: String::new(),
            server_id: String::new(),
            environment: String::new(),
            client_secret: String::new(),
            client_certificate_path: String::new(),
            client_certificate_password: String::new(),
            username: String::new(),
            password: String::new(),
            federated_token_file: String::new(),
            authority_host: String::new(),
            identity_resource_id: String::new(),
            azure_pipelines_service_connection_id: String::new(),
            is_legacy: false,
            use_azurerm_env_vars: false,
            use_persistent_cache: false,
            disable_instance_discovery: false,
            disable_environment_override: false,
            timeout: DEFAULT_TIMEOUT,
            redirect_url: String::new(),
            login_hint: String::new(),
            is_pop_enabled: false,
            pop_claims: String::new(),
            cache_dir: String::new(),
            token_cache_dir: String::new(),
            context: String::new(),
            azure_config_dir: String::new(),
            kubeconfig_path: String::new(),
            explicit: BTreeSet::new(),
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field from its textual flag value.
    pub fn apply(&mut self, id: FlagId, raw: &str) -> Result<()> {
        match id {
            FlagId::Login => self.login_method = raw.parse()?,
            FlagId::ClientId => self.client_id = raw.to_string(),
            FlagId::ClientSecret => self.client_secret = raw.to_string(),
            FlagId::ClientCertificate => self.client_certificate_path = raw.to_string(),
            FlagId::ClientCertificatePassword => {
                self.client_certificate_password = raw.to_string()
            }
            FlagId::Username => self.username = raw.to_string(),
            FlagId::Password => self.password = raw.to_string(),
            FlagId::ServerId => self.server_id = raw.to_string(),
            FlagId::TenantId => self.tenant_id = raw.to_string(),
            FlagId::Environment => self.environment = raw.to_string(),
            FlagId::Legacy => self.is_legacy = parse_switch(raw)?,
            FlagId::CacheDir => self.cache_dir = raw.to_string(),
            FlagId::TokenCacheDir => self.token_cache_dir = raw.to_string(),
            FlagId::PopEnabled => self.is_pop_enabled = parse_switch(raw)?,
            FlagId::PopClaims => self.pop_claims = raw.to_string(),
            FlagId::RedirectUrl => self.redirect_url = raw.to_string(),
            FlagId::LoginHint => self.login_hint = raw.to_string(),
            FlagId::FederatedTokenFile => self.federated_token_file = raw.to_string(),
            FlagId::AuthorityHost => self.authority_host = raw.to_string(),
            FlagId::IdentityResourceId => self.identity_resource_id = raw.to_string(),
            FlagId::ServiceConnectionId => {
                self.azure_pipelines_service_connection_id = raw.to_string()
            }
            FlagId::UseAzureRmEnvVars => self.use_azurerm_env_vars = parse_switch(raw)?,
            FlagId::UsePersistentCache => self.use_persistent_cache = parse_switch(raw)?,
            FlagId::DisableInstanceDiscovery => {
                self.disable_instance_discovery = parse_switch(raw)?
            }
            FlagId::DisableEnvironmentOverride => {
                self.disable_environment_override = parse_switch(raw)?
            }
            FlagId::Timeout => self.timeout = flags::parse_duration(raw)?,
            FlagId::Context => self.context = raw.to_string(),
            FlagId::AzureConfigDir => self.azure_config_dir = raw.to_string(),
            FlagId::Kubeconfig => self.kubeconfig_path = raw.to_string(),
        }
        Ok(())
    }

    /// Set a field from a user-supplied flag and remember that the user set it.
    pub fn apply_explicit(&mut self, id: FlagId, raw: &str) -> Result<()> {
        self.apply(id, raw)?;
        self.explicit.insert(id);
        Ok(())
    }

    /// Whether the user passed this flag on the command line.
    pub fn is_set(&self, id: FlagId) -> bool {
        self.explicit.contains(&id)
    }

    /// Current textual value of a flag; switches render as `"true"` or `""`.
    pub fn value(&self, id: FlagId) -> String {
        let switch = |b: bool| if b { "true".to_string() } else { String::new() };
        match id {
            FlagId::Login => self.login_method.as_str().to_string(),
            FlagId::ClientId => self.client_id.clone(),
            FlagId::ClientSecret => self.client_secret.clone(),
            FlagId::ClientCertificate => self.client_certificate_path.clone(),
            FlagId::ClientCertificatePassword => self.client_certificate_password.clone(),
            FlagId::Username => self.username.clone(),
            FlagId::Password => self.password.clone(),
            FlagId::ServerId => self.server_id.clone(),
            FlagId::TenantId => self.tenant_id.clone(),
            FlagId::Environment => self.environment.clone(),
            FlagId::Legacy => switch(self.is_legacy),
            FlagId::CacheDir => self.cache_dir.clone(),
            FlagId::TokenCacheDir => self.token_cache_dir.clone(),
            FlagId::PopEnabled => switch(self.is_pop_enabled),
            FlagId::PopClaims => self.pop_claims.clone(),
            FlagId::RedirectUrl => self.redirect_url.clone(),
            FlagId::LoginHint => self.login_hint.clone(),
            FlagId::FederatedTokenFile => self.federated_token_file.clone(),
            FlagId::AuthorityHost => self.authority_host.clone(),
            FlagId::IdentityResourceId => self.identity_resource_id.clone(),
            FlagId::ServiceConnectionId => self.azure_pipelines_service_connection_id.clone(),
            FlagId::UseAzureRmEnvVars => switch(self.use_azurerm_env_vars),
            FlagId::UsePersistentCache => switch(self.use_persistent_cache),
            FlagId::DisableInstanceDiscovery => switch(self.disable_instance_discovery),
            FlagId::DisableEnvironmentOverride => switch(self.disable_environment_override),
            FlagId::Timeout => format!("{}s", self.timeout.as_secs()),
            FlagId::Context => self.context.clone(),
            FlagId::AzureConfigDir => self.azure_config_dir.clone(),
            FlagId::Kubeconfig => self.kubeconfig_path.clone(),
        }
    }

    /// Let environment variables override flag values (`get-token`).
    pub fn apply_env_overrides(&mut self, env: &dyn EnvSource) -> Result<()> {
        if self.disable_environment_override {
            debug!("Environment override disabled");
            return Ok(());
        }

        for spec in flags::flags_for(Command::GetToken) {
            let Some(name) = spec.env_name(self.use_azurerm_env_vars) else {
                continue;
            };
            if let Some(value) = env.get(name) {
                debug!(flag = spec.long, env = name, "Overriding flag from environment");
                self.apply(spec.id, &value)?;
            }
        }

        if self.login_method == LoginMethod::AzureCli
            && let Some(value) = env.get(env::AZURE_CLI_TIMEOUT)
        {
            self.timeout = flags::parse_duration(&value)?;
        }
        Ok(())
    }

    /// Fill flags that default from the environment when the user left them unset.
    pub fn apply_env_defaults(&mut self, command: Command, env: &dyn EnvSource) -> Result<()> {
        for spec in flags::flags_for(command) {
            if let EnvBinding::Default(name) = spec.env
                && self.value(spec.id).is_empty()
                && let Some(value) = env.get(name)
            {
                self.apply(spec.id, &value)?;
            }
        }
        Ok(())
    }

    /// Default the cache directory to `<home>/.kube/cache/kubelogin`.
    pub fn apply_default_cache_dir(&mut self, home: Option<&Path>) {
        if self.cache_dir.is_empty()
            && let Some(home) = home
        {
            self.cache_dir = default_cache_dir(home).to_string_lossy().into_owned();
        }
    }

    /// Directory holding authentication records, the PoP key and the
    /// provider-side cache.
    pub fn auth_record_cache_dir(&self) -> PathBuf {
        PathBuf::from(&self.cache_dir)
    }

    /// Directory holding ExecCredential-side token cache files.
    ///
    /// `--token-cache-dir` is honored for backwards compatibility.
    pub fn token_cache_dir(&self) -> PathBuf {
        if self.token_cache_dir.is_empty() {
            PathBuf::from(&self.cache_dir)
        } else {
            PathBuf::from(&self.token_cache_dir)
        }
    }

    /// OAuth scope sent to the identity provider.
    pub fn scope(&self) -> String {
        format!("{}{}", self.server_id, DEFAULT_SCOPE_SUFFIX)
    }

    /// Audience compared against cached tokens.
    pub fn target_audience(&self) -> String {
        if self.is_legacy {
            format!("{}{}", LEGACY_AUDIENCE_PREFIX, self.server_id)
        } else {
            self.server_id.clone()
        }
    }

    pub fn pop_claims_map(&self) -> Result<BTreeMap<String, String>> {
        parse_pop_claims(&self.pop_claims)
    }

    /// Validate options for `get-token`.
    pub fn validate(&self) -> Result<()> {
        if self.server_id.is_empty() {
            return Err(Error::config("--server-id is required"));
        }
        if self.timeout.is_zero() {
            return Err(Error::config("--timeout must be greater than 0"));
        }
        self.validate_pop()?;
        if !self.authority_host.is_empty() {
            validate_authority_host(&self.authority_host)?;
        }

        let require = |value: &str, what: &str| -> Result<()> {
            if value.is_empty() {
                Err(Error::config(format!(
                    "{} is required for login method {}",
                    what, self.login_method
                )))
            } else {
                Ok(())
            }
        };

        match self.login_method {
            LoginMethod::DeviceCode | LoginMethod::Interactive => {
                require(&self.client_id, "--client-id")?;
                require(&self.tenant_id, "--tenant-id")?;
            }
            LoginMethod::ServicePrincipal => {
                require(&self.client_id, "--client-id")?;
                require(&self.tenant_id, "--tenant-id")?;
                match (
                    self.client_secret.is_empty(),
                    self.client_certificate_path.is_empty(),
                ) {
                    (true, true) => {
                        return Err(Error::config(
                            "either --client-secret or --client-certificate must be provided for spn login",
                        ));
                    }
                    (false, false) => {
                        return Err(Error::config(
                            "only one of --client-secret or --client-certificate may be provided for spn login",
                        ));
                    }
                    _ => {}
                }
            }
            LoginMethod::ResourceOwnerPassword => {
                require(&self.client_id, "--client-id")?;
                require(&self.tenant_id, "--tenant-id")?;
                require(&self.username, "--username")?;
                require(&self.password, "--password")?;
            }
            LoginMethod::WorkloadIdentity => {
                require(&self.client_id, "--client-id")?;
                require(&self.tenant_id, "--tenant-id")?;
                require(&self.federated_token_file, "--federated-token-file")?;
                require(&self.authority_host, "--authority-host")?;
            }
            LoginMethod::AzurePipelines => {
                require(&self.client_id, "--client-id")?;
                require(&self.tenant_id, "--tenant-id")?;
                require(
                    &self.azure_pipelines_service_connection_id,
                    "--azure-pipelines-service-connection-id",
                )?;
            }
            LoginMethod::GithubActions => {
                require(&self.client_id, "--client-id")?;
                require(&self.tenant_id, "--tenant-id")?;
            }
            LoginMethod::ManagedIdentity
            | LoginMethod::AzureCli
            | LoginMethod::AzureDeveloperCli => {}
        }
        Ok(())
    }

    fn validate_pop(&self) -> Result<()> {
        check_pop_pair(self.is_pop_enabled, &self.pop_claims)?;
        match (self.is_pop_enabled, self.pop_claims.is_empty()) {
            (true, false) => {
                if !self.login_method.supports_pop() {
                    return Err(Error::config(format!(
                        "PoP tokens are not supported for login method {}",
                        self.login_method
                    )));
                }
                parse_pop_claims(&self.pop_claims).map(|_| ())
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |s: &str| if s.is_empty() { "" } else { "***" };
        f.debug_struct("Options")
            .field("login_method", &self.login_method)
            .field("client_id", &self.client_id)
            .field("tenant_id", &self.tenant_id)
            .field("server_id", &self.server_id)
            .field("environment", &self.environment)
            .field("client_secret", &redact(&self.client_secret))
            .field("client_certificate_path", &self.client_certificate_path)
            .field(
                "client_certificate_password",
                &redact(&self.client_certificate_password),
            )
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("federated_token_file", &self.federated_token_file)
            .field("authority_host", &self.authority_host)
            .field("identity_resource_id", &self.identity_resource_id)
            .field("is_legacy", &self.is_legacy)
            .field("is_pop_enabled", &self.is_pop_enabled)
            .field("pop_claims", &self.pop_claims)
            .field("cache_dir", &self.cache_dir)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// `<home>/.kube/cache/kubelogin`
pub fn default_cache_dir(home: &Path) -> PathBuf {
    home.join(".kube").join("cache").join("kubelogin")
}

fn parse_switch(raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "" | "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::config(format!("invalid boolean value: {:?}", raw))),
    }
}

/// `--pop-enabled` and `--pop-claims` must be given together.
pub fn check_pop_pair(enabled: bool, claims: &str) -> Result<()> {
    match (enabled, claims.is_empty()) {
        (true, true) => Err(Error::config(
            "`--pop-claims` is required when specifying `--pop-enabled`",
        )),
        (false, false) => Err(Error::config(
            "`--pop-enabled` is required when specifying `--pop-claims`",
        )),
        _ => Ok(()),
    }
}

/// Parse `k=v,k=v` PoP claims; the `u` claim is mandatory.
pub fn parse_pop_claims(raw: &str) -> Result<BTreeMap<String, String>> {
    let mut claims = BTreeMap::new();
    for pair in raw.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            Error::config(format!(
                "Invalid format for PoP claim {:?}. Expected key=value",
                pair
            ))
        })?;
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            return Err(Error::config(format!(
                "Invalid format for PoP claim {:?}. Expected key=value",
                pair
            )));
        }
        claims.insert(key.to_string(), value.to_string());
    }
    if !claims.contains_key(POP_CLAIM_HOST) {
        return Err(Error::config(
            "required u-claim not provided for PoP token flow. Please provide the ARM ID of the cluster in the format `u=<ARM_ID>`",
        ));
    }
    Ok(claims)
}

/// The authority host must be an absolute URL ending with `/`.
pub fn validate_authority_host(raw: &str) -> Result<()> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| Error::config(format!("authority host {:?} is not a valid URL: {}", raw, e)))?;
    if parsed.cannot_be_a_base() || parsed.host_str().is_none() {
        return Err(Error::config(format!(
            "authority host {:?} is not a valid URL",
            raw
        )));
    }
    if !raw.ends_with('/') {
        return Err(Error::config(format!(
            "authority host {:?} must end with a trailing slash",
            raw
        )));
    }
    Ok(())
}
