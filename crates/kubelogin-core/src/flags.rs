//! The authoritative flag table.
//!
//! Every option exposed on the command line is declared once in [`FLAGS`],
//! together with the environment variable that feeds it and the commands
//! that accept it. Both the clap command tree and environment resolution are
//! driven from this table.

use crate::env;
use crate::error::{Error, Result};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FlagId {
    Login,
    ClientId,
    ClientSecret,
    ClientCertificate,
    ClientCertificatePassword,
    Username,
    Password,
    ServerId,
    TenantId,
    Environment,
    Legacy,
    CacheDir,
    TokenCacheDir,
    PopEnabled,
    PopClaims,
    RedirectUrl,
    LoginHint,
    FederatedTokenFile,
    AuthorityHost,
    IdentityResourceId,
    ServiceConnectionId,
    UseAzureRmEnvVars,
    UsePersistentCache,
    DisableInstanceDiscovery,
    DisableEnvironmentOverride,
    Timeout,
    Context,
    AzureConfigDir,
    Kubeconfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    /// Takes a string value.
    Text,
    /// Boolean switch; presence means `true`.
    Switch,
    /// Duration such as `60s` or `5m`.
    Duration,
}

/// Which subcommands register a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    GetToken,
    Convert,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    GetToken,
    Convert,
}

impl Scope {
    pub fn includes(&self, command: Command) -> bool {
        matches!(
            (self, command),
            (Scope::Both, _)
                | (Scope::GetToken, Command::GetToken)
                | (Scope::Convert, Command::Convert)
        )
    }
}

/// How an environment variable feeds a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvBinding {
    None,
    /// The variable overrides the flag value during `get-token`.
    Override(&'static str),
    /// As `Override`, with a Terraform alias used under `--use-azurerm-env-vars`.
    OverrideWithArm(&'static str, &'static str),
    /// The variable supplies the default when the flag is absent.
    Default(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct FlagSpec {
    pub id: FlagId,
    pub long: &'static str,
    pub help: &'static str,
    pub kind: FlagKind,
    pub scope: Scope,
    pub env: EnvBinding,
}

impl FlagSpec {
    /// Name of the variable to consult, honoring the Terraform alias set.
    pub fn env_name(&self, use_arm: bool) -> Option<&'static str> {
        match self.env {
            EnvBinding::Override(name) => Some(name),
            EnvBinding::OverrideWithArm(azure, arm) => Some(if use_arm { arm } else { azure }),
            EnvBinding::None | EnvBinding::Default(_) => None,
        }
    }
}

const fn flag(
    id: FlagId,
    long: &'static str,
    kind: FlagKind,
    scope: Scope,
    env: EnvBinding,
    help: &'static str,
) -> FlagSpec {
    FlagSpec {
        id,
        long,
        help,
        kind,
        scope,
        env,
    }
}

use EnvBinding::{Default as EnvDefault, None as NoEnv, Override, OverrideWithArm};
use FlagKind::{Duration as Dur, Switch, Text};

pub static FLAGS: &[FlagSpec] = &[
    flag(FlagId::Login, "login", Text, Scope::Both, Override(env::AAD_LOGIN_METHOD),
        "Login method. Supported methods: devicecode, interactive, spn, ropc, msi, azurecli, azd, workloadidentity, azurepipelines, githubactions"),
    flag(FlagId::ClientId, "client-id", Text, Scope::Both,
        OverrideWithArm(env::AZURE_CLIENT_ID, env::ARM_CLIENT_ID),
        "AAD client application ID"),
    flag(FlagId::ClientSecret, "client-secret", Text, Scope::Both,
        OverrideWithArm(env::AZURE_CLIENT_SECRET, env::ARM_CLIENT_SECRET),
        "AAD client application secret. Used in spn login"),
    flag(FlagId::ClientCertificate, "client-certificate", Text, Scope::Both,
        OverrideWithArm(env::AZURE_CLIENT_CERTIFICATE_PATH, env::ARM_CLIENT_CERTIFICATE_PATH),
        "AAD client cert in PEM format. Used in spn login"),
    flag(FlagId::ClientCertificatePassword, "client-certificate-password", Text, Scope::Both,
        OverrideWithArm(env::AZURE_CLIENT_CERTIFICATE_PASSWORD, env::ARM_CLIENT_CERTIFICATE_PASSWORD),
        "Password for the client certificate key"),
    flag(FlagId::Username, "username", Text, Scope::Both, Override(env::AZURE_USERNAME),
        "user name for ropc login flow"),
    flag(FlagId::Password, "password", Text, Scope::Both, Override(env::AZURE_PASSWORD),
        "password for ropc login flow"),
    flag(FlagId::ServerId, "server-id", Text, Scope::Both, NoEnv,
        "AAD server application ID"),
    flag(FlagId::TenantId, "tenant-id", Text, Scope::Both,
        OverrideWithArm(env::AZURE_TENANT_ID, env::ARM_TENANT_ID),
        "AAD tenant ID"),
    flag(FlagId::Environment, "environment", Text, Scope::Both, NoEnv,
        "Azure environment name"),
    flag(FlagId::Legacy, "legacy", Switch, Scope::Both, NoEnv,
        "set to true to get token with 'spn:' prefix in audience claim"),
    flag(FlagId::CacheDir, "cache-dir", Text, Scope::Both, EnvDefault(env::KUBECACHEDIR),
        "directory to cache token"),
    flag(FlagId::TokenCacheDir, "token-cache-dir", Text, Scope::Both, NoEnv,
        "directory to cache token (deprecated alias of --cache-dir)"),
    flag(FlagId::PopEnabled, "pop-enabled", Switch, Scope::Both, NoEnv,
        "set to true to request a proof-of-possession/PoP token"),
    flag(FlagId::PopClaims, "pop-claims", Text, Scope::Both, NoEnv,
        "contains a comma-separated list of claims to attach to the pop token, at minimum u=<ARM ID of the cluster>"),
    flag(FlagId::RedirectUrl, "redirect-url", Text, Scope::Both, NoEnv,
        "The redirect URL used to listen for the interactive login response"),
    flag(FlagId::LoginHint, "login-hint", Text, Scope::Both, NoEnv,
        "The login hint to pre-fill the username in the interactive login flow"),
    flag(FlagId::FederatedTokenFile, "federated-token-file", Text, Scope::Both,
        Override(env::AZURE_FEDERATED_TOKEN_FILE),
        "Workload Identity federated token file"),
    flag(FlagId::AuthorityHost, "authority-host", Text, Scope::Both,
        Override(env::AZURE_AUTHORITY_HOST),
        "Workload Identity authority host"),
    flag(FlagId::IdentityResourceId, "identity-resource-id", Text, Scope::Both, NoEnv,
        "Managed Identity resource id"),
    flag(FlagId::ServiceConnectionId, "azure-pipelines-service-connection-id", Text, Scope::Both, NoEnv,
        "Azure Pipelines service connection ID"),
    flag(FlagId::UseAzureRmEnvVars, "use-azurerm-env-vars", Switch, Scope::Both, NoEnv,
        "Use environment variable names of Terraform Azure Provider (ARM_*)"),
    flag(FlagId::UsePersistentCache, "use-persistent-cache", Switch, Scope::Both, NoEnv,
        "Use an encrypted persistent cache for service principal tokens"),
    flag(FlagId::DisableInstanceDiscovery, "disable-instance-discovery", Switch, Scope::Both, NoEnv,
        "Skip authority validation and instance discovery"),
    flag(FlagId::DisableEnvironmentOverride, "disable-environment-override", Switch, Scope::Both, NoEnv,
        "Ignore environment variables when resolving options"),
    flag(FlagId::Timeout, "timeout", Dur, Scope::Both, NoEnv,
        "Timeout duration for Azure CLI token requests"),
    flag(FlagId::Context, "context", Text, Scope::Convert, NoEnv,
        "The name of the kubeconfig context to use"),
    flag(FlagId::AzureConfigDir, "azure-config-dir", Text, Scope::Convert, EnvDefault(env::AZURE_CONFIG_DIR),
        "Azure CLI config path"),
    flag(FlagId::Kubeconfig, "kubeconfig", Text, Scope::Convert, NoEnv,
        "Path to the kubeconfig file to convert"),
];

pub fn spec(id: FlagId) -> &'static FlagSpec {
    FLAGS
        .iter()
        .find(|f| f.id == id)
        .unwrap_or_else(|| unreachable!("flag {:?} missing from FLAGS", id))
}

pub fn flags_for(command: Command) -> impl Iterator<Item = &'static FlagSpec> {
    FLAGS.iter().filter(move |f| f.scope.includes(command))
}

/// Parse a duration such as `90`, `500ms`, `60s`, `5m` or `1h`.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| Error::config(format!("invalid duration: {:?}", raw)))?;
    match unit {
        "" | "s" => Ok(Duration::from_secs(value)),
        "ms" => Ok(Duration::from_millis(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        _ => Err(Error::config(format!("invalid duration unit in {:?}", raw))),
    }
}
