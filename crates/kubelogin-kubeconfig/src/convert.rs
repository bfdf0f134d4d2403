//! Rewrite kubeconfig users into kubelogin exec stanzas.
//!
//! A user entry is converted when it uses the retired `azure` auth provider
//! or already execs kubelogin. Each argument is resolved in order from an
//! explicitly set flag, the legacy provider config, then the existing exec
//! arguments.

use crate::loader::{self, KubeconfigFile, KubeconfigSet, LoadingRules};
use crate::model::{AuthInfo, ExecConfig, ExecEnvVar, Kubeconfig};
use kubelogin_core::env::AZURE_CONFIG_DIR;
use kubelogin_core::options::check_pop_pair;
use kubelogin_core::{Error, FlagId, LoginMethod, Options, Result};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

pub const EXEC_COMMAND: &str = "kubelogin";
pub const EXEC_API_VERSION: &str = "client.authentication.k8s.io/v1beta1";
pub const DEFAULT_INSTALL_HINT: &str = "\nkubelogin is not installed which is required to connect to AAD enabled cluster.\n\nTo learn more, please go to https://aka.ms/aks/kubelogin\n";

const LEGACY_SERVER_ID: &str = "apiserver-id";
const LEGACY_CLIENT_ID: &str = "client-id";
const LEGACY_TENANT_ID: &str = "tenant-id";
const LEGACY_ENVIRONMENT: &str = "environment";
const LEGACY_CONFIG_MODE: &str = "config-mode";

/// Result of a conversion that has not been saved yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    /// Names of the rewritten users.
    pub users: Vec<String>,
    /// Files holding at least one rewritten user.
    pub files: Vec<KubeconfigFile>,
}

/// Load, convert and save in one step.
///
/// Nothing is written unless every selected user converts.
pub fn convert_kubeconfig(rules: &LoadingRules, options: &Options) -> Result<Conversion> {
    let set = rules.load()?;
    let conversion = convert(&set, options)?;
    loader::save(&conversion.files)?;
    Ok(conversion)
}

/// Convert every selected user across the loaded files.
pub fn convert(set: &KubeconfigSet, options: &Options) -> Result<Conversion> {
    let target = if options.context.is_empty() {
        None
    } else {
        let context = set.context(&options.context).ok_or_else(|| {
            Error::config(format!(
                "no context exists with the name: {:?}",
                options.context
            ))
        })?;
        Some(context.user.clone())
    };

    let mut users = Vec::new();
    let mut files = Vec::new();
    let mut shadowed = HashSet::new();
    for file in &set.files {
        let mut config = file.config.clone();
        let converted = convert_document(&mut config, options, target.as_deref(), &shadowed)?;
        shadowed.extend(file.config.auth_infos.iter().map(|a| a.name.clone()));
        if !converted.is_empty() {
            users.extend(converted);
            files.push(KubeconfigFile {
                path: file.path.clone(),
                config,
            });
        }
    }

    if users.is_empty() {
        info!("No kubeconfig user needed conversion");
    }
    Ok(Conversion { users, files })
}

/// Convert matching users of a single document in place.
///
/// `skip` holds names already defined by a higher-precedence file.
pub fn convert_document(
    config: &mut Kubeconfig,
    options: &Options,
    target_user: Option<&str>,
    skip: &HashSet<String>,
) -> Result<Vec<String>> {
    let mut converted = Vec::new();
    for entry in &mut config.auth_infos {
        if target_user.is_some_and(|t| t != entry.name) || skip.contains(&entry.name) {
            continue;
        }
        let Some(auth_info) = entry.auth_info.as_mut() else {
            continue;
        };
        if !auth_info.is_legacy_provider() && !auth_info.is_kubelogin_exec() {
            debug!(user = %entry.name, "Skipping user without azure auth");
            continue;
        }

        let exec = build_exec(auth_info, options)
            .map_err(|e| Error::config(format!("user {:?}: {}", entry.name, plain_message(&e))))?;
        info!(user = %entry.name, args = exec.args.len(), "Converted kubeconfig user");
        auth_info.auth_provider = None;
        auth_info.exec = Some(exec);
        converted.push(entry.name.clone());
    }
    Ok(converted)
}

fn plain_message(err: &Error) -> String {
    match err {
        Error::Configuration(message) => message.clone(),
        other => other.to_string(),
    }
}

/// Where unset arguments are harvested from.
enum Origin<'a> {
    LegacyProvider(&'a BTreeMap<String, String>),
    Exec(&'a [String]),
}

struct Resolver<'a> {
    options: &'a Options,
    origin: Origin<'a>,
}

impl<'a> Resolver<'a> {
    fn new(options: &'a Options, auth_info: &'a AuthInfo) -> Self {
        let origin = match (&auth_info.auth_provider, &auth_info.exec) {
            (Some(provider), _) if auth_info.is_legacy_provider() => {
                Origin::LegacyProvider(&provider.config)
            }
            (_, Some(exec)) => Origin::Exec(&exec.args),
            _ => Origin::Exec(&[]),
        };
        Self { options, origin }
    }

    fn text(&self, id: FlagId) -> String {
        if self.options.is_set(id) {
            return self.options.value(id);
        }
        match self.origin {
            Origin::LegacyProvider(config) => legacy_key(id)
                .and_then(|key| config.get(key))
                .cloned()
                .unwrap_or_default(),
            Origin::Exec(args) => exec_arg(args, flag_name(id)).unwrap_or_default(),
        }
    }

    fn switch(&self, id: FlagId) -> bool {
        if self.options.is_set(id) {
            return self.options.value(id) == "true";
        }
        match self.origin {
            Origin::LegacyProvider(_) => false,
            Origin::Exec(args) => exec_switch(args, flag_name(id)),
        }
    }

    fn login_method(&self) -> Result<LoginMethod> {
        if self.options.is_set(FlagId::Login) {
            return Ok(self.options.login_method);
        }
        match self.origin {
            Origin::LegacyProvider(_) => Ok(LoginMethod::DeviceCode),
            Origin::Exec(args) => match exec_arg(args, flag_name(FlagId::Login)) {
                Some(raw) => raw.parse(),
                None => Ok(LoginMethod::DeviceCode),
            },
        }
    }

    fn is_legacy(&self) -> bool {
        match self.origin {
            Origin::LegacyProvider(config) => {
                let user_legacy = self.options.is_set(FlagId::Legacy) && self.options.is_legacy;
                let config_mode = config.get(LEGACY_CONFIG_MODE).map(String::as_str);
                user_legacy || matches!(config_mode, None | Some("") | Some("0"))
            }
            Origin::Exec(_) => self.switch(FlagId::Legacy),
        }
    }

    /// `--token-cache-dir` is read as an alias of `--cache-dir`.
    fn cache_dir(&self) -> String {
        if self.options.is_set(FlagId::CacheDir) {
            return self.options.cache_dir.clone();
        }
        if self.options.is_set(FlagId::TokenCacheDir) {
            return self.options.token_cache_dir.clone();
        }
        match self.origin {
            Origin::LegacyProvider(_) => String::new(),
            Origin::Exec(args) => exec_arg(args, flag_name(FlagId::CacheDir))
                .or_else(|| exec_arg(args, flag_name(FlagId::TokenCacheDir)))
                .unwrap_or_default(),
        }
    }

    /// Value only when the user passed the flag for this conversion.
    fn user_set(&self, id: FlagId) -> Option<String> {
        if self.options.is_set(id) {
            Some(self.options.value(id)).filter(|v| !v.is_empty())
        } else {
            None
        }
    }
}

fn legacy_key(id: FlagId) -> Option<&'static str> {
    match id {
        FlagId::ServerId => Some(LEGACY_SERVER_ID),
        FlagId::ClientId => Some(LEGACY_CLIENT_ID),
        FlagId::TenantId => Some(LEGACY_TENANT_ID),
        FlagId::Environment => Some(LEGACY_ENVIRONMENT),
        _ => None,
    }
}

fn flag_name(id: FlagId) -> &'static str {
    kubelogin_core::flags::spec(id).long
}

/// Value of `--name value` or `--name=value` in `args`.
fn exec_arg(args: &[String], name: &str) -> Option<String> {
    let long = format!("--{}", name);
    let inline = format!("--{}=", name);
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if *arg == long {
            return iter.next().cloned();
        }
        if let Some(value) = arg.strip_prefix(&inline) {
            return Some(value.to_string());
        }
    }
    None
}

fn exec_switch(args: &[String], name: &str) -> bool {
    let long = format!("--{}", name);
    let inline = format!("--{}=", name);
    args.iter().any(|arg| {
        *arg == long
            || arg
                .strip_prefix(&inline)
                .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1"))
    })
}

struct ArgBuilder {
    method: LoginMethod,
    args: Vec<String>,
}

impl ArgBuilder {
    fn push(&mut self, id: FlagId, value: &str) {
        if !value.is_empty() {
            self.args.push(format!("--{}", flag_name(id)));
            self.args.push(value.to_string());
        }
    }

    fn push_required(&mut self, id: FlagId, value: &str) -> Result<()> {
        if value.is_empty() {
            return Err(Error::config(format!(
                "--{} is required for login method {}",
                flag_name(id),
                self.method
            )));
        }
        self.push(id, value);
        Ok(())
    }

    fn push_switch(&mut self, id: FlagId, on: bool) {
        if on {
            self.args.push(format!("--{}", flag_name(id)));
        }
    }

    fn push_pop(&mut self, enabled: bool, claims: &str) {
        if enabled {
            self.push_switch(FlagId::PopEnabled, true);
            self.push(FlagId::PopClaims, claims);
        }
    }
}

fn build_exec(auth_info: &AuthInfo, options: &Options) -> Result<ExecConfig> {
    let resolver = Resolver::new(options, auth_info);
    let method = resolver.login_method()?;

    let server_id = resolver.text(FlagId::ServerId);
    if server_id.is_empty() {
        return Err(Error::config("--server-id is required"));
    }

    let pop_enabled = resolver.switch(FlagId::PopEnabled);
    let pop_claims = resolver.text(FlagId::PopClaims);
    check_pop_pair(pop_enabled, &pop_claims)?;

    let mut builder = ArgBuilder {
        method,
        args: vec![
            "get-token".to_string(),
            format!("--{}", flag_name(FlagId::Login)),
            method.to_string(),
            format!("--{}", flag_name(FlagId::ServerId)),
            server_id,
        ],
    };
    builder.push(FlagId::CacheDir, &resolver.cache_dir());

    let client_id = resolver.text(FlagId::ClientId);
    let tenant_id = resolver.text(FlagId::TenantId);
    let environment = resolver.text(FlagId::Environment);
    let is_legacy = resolver.is_legacy();
    let mut env = None;

    match method {
        LoginMethod::DeviceCode => {
            builder.push_required(FlagId::ClientId, &client_id)?;
            builder.push_required(FlagId::TenantId, &tenant_id)?;
            builder.push(FlagId::Environment, &environment);
            builder.push_switch(FlagId::Legacy, is_legacy);
        }
        LoginMethod::Interactive => {
            builder.push_required(FlagId::ClientId, &client_id)?;
            builder.push_required(FlagId::TenantId, &tenant_id)?;
            builder.push(FlagId::Environment, &environment);
            builder.push_pop(pop_enabled, &pop_claims);
            builder.push(FlagId::RedirectUrl, &resolver.text(FlagId::RedirectUrl));
            builder.push(FlagId::LoginHint, &resolver.text(FlagId::LoginHint));
        }
        LoginMethod::ServicePrincipal => {
            builder.push_required(FlagId::ClientId, &client_id)?;
            builder.push_required(FlagId::TenantId, &tenant_id)?;
            builder.push(FlagId::Environment, &environment);
            if !options.client_secret.is_empty() {
                builder.push(FlagId::ClientSecret, &options.client_secret);
            } else if !options.client_certificate_path.is_empty() {
                builder.push(FlagId::ClientCertificate, &options.client_certificate_path);
                builder.push(
                    FlagId::ClientCertificatePassword,
                    &options.client_certificate_password,
                );
            }
            builder.push_switch(FlagId::Legacy, is_legacy);
            builder.push_pop(pop_enabled, &pop_claims);
            builder.push_switch(
                FlagId::DisableEnvironmentOverride,
                options.disable_environment_override,
            );
        }
        LoginMethod::ResourceOwnerPassword => {
            builder.push_required(FlagId::ClientId, &client_id)?;
            builder.push_required(FlagId::TenantId, &tenant_id)?;
            builder.push(FlagId::Environment, &environment);
            builder.push(FlagId::Username, &options.username);
            builder.push(FlagId::Password, &options.password);
            builder.push_switch(FlagId::Legacy, is_legacy);
        }
        LoginMethod::ManagedIdentity => {
            if let Some(client_id) = resolver.user_set(FlagId::ClientId) {
                builder.push(FlagId::ClientId, &client_id);
            } else if let Some(resource_id) = resolver.user_set(FlagId::IdentityResourceId) {
                builder.push(FlagId::IdentityResourceId, &resource_id);
            }
        }
        LoginMethod::WorkloadIdentity => {
            for id in [
                FlagId::ClientId,
                FlagId::TenantId,
                FlagId::AuthorityHost,
                FlagId::FederatedTokenFile,
            ] {
                if let Some(value) = resolver.user_set(id) {
                    builder.push(id, &value);
                }
            }
        }
        LoginMethod::AzureCli => {
            if !options.azure_config_dir.is_empty() {
                env = Some(vec![ExecEnvVar {
                    name: AZURE_CONFIG_DIR.to_string(),
                    value: options.azure_config_dir.clone(),
                }]);
            }
            if let Some(tenant_id) = resolver.user_set(FlagId::TenantId) {
                builder.push(FlagId::TenantId, &tenant_id);
            }
        }
        LoginMethod::AzureDeveloperCli => {
            if let Some(tenant_id) = resolver.user_set(FlagId::TenantId) {
                builder.push(FlagId::TenantId, &tenant_id);
            }
        }
        LoginMethod::AzurePipelines | LoginMethod::GithubActions => {
            builder.push_required(FlagId::ClientId, &client_id)?;
            builder.push_required(FlagId::TenantId, &tenant_id)?;
            builder.push(FlagId::Environment, &environment);
            if method == LoginMethod::AzurePipelines {
                builder.push_required(
                    FlagId::ServiceConnectionId,
                    &resolver.text(FlagId::ServiceConnectionId),
                )?;
            }
        }
    }

    let install_hint = auth_info
        .exec
        .as_ref()
        .and_then(|e| e.install_hint.clone())
        .filter(|hint| !hint.is_empty())
        .unwrap_or_else(|| DEFAULT_INSTALL_HINT.to_string());

    Ok(ExecConfig {
        api_version: Some(EXEC_API_VERSION.to_string()),
        command: EXEC_COMMAND.to_string(),
        args: builder.args,
        env,
        install_hint: Some(install_hint),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AuthProviderConfig, NamedAuthInfo};
    use pretty_assertions::assert_eq;

    fn legacy_user(config: &[(&str, &str)]) -> AuthInfo {
        AuthInfo {
            auth_provider: Some(AuthProviderConfig {
                name: "azure".to_string(),
                config: config
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            }),
            ..Default::default()
        }
    }

    fn exec_user(args: &[&str], install_hint: Option<&str>) -> AuthInfo {
        AuthInfo {
            exec: Some(ExecConfig {
                api_version: Some(EXEC_API_VERSION.to_string()),
                command: "kubelogin".to_string(),
                args: args.iter().map(|a| a.to_string()).collect(),
                install_hint: install_hint.map(str::to_string),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn options(flags: &[(FlagId, &str)]) -> Options {
        let mut options = Options::new();
        for (id, value) in flags {
            options.apply_explicit(*id, value).unwrap();
        }
        options
    }

    fn sorted(mut args: Vec<String>) -> Vec<String> {
        args.sort();
        args
    }

    fn expect_args(actual: &[String], expected: &[&str]) {
        assert_eq!(
            sorted(actual.to_vec()),
            sorted(expected.iter().map(|s| s.to_string()).collect())
        );
    }

    #[test]
    fn test_legacy_provider_defaults_to_devicecode() {
        let user = legacy_user(&[
            ("environment", "foo"),
            ("apiserver-id", "srv"),
            ("client-id", "cid"),
            ("tenant-id", "tid"),
        ]);
        let exec = build_exec(&user, &Options::new()).unwrap();
        expect_args(
            &exec.args,
            &[
                "get-token", "--server-id", "srv", "--client-id", "cid", "--tenant-id", "tid",
                "--environment", "foo", "--legacy", "--login", "devicecode",
            ],
        );
        assert_eq!(&exec.args[..5], ["get-token", "--login", "devicecode", "--server-id", "srv"]);
        assert_eq!(exec.command, "kubelogin");
        assert_eq!(exec.api_version.as_deref(), Some(EXEC_API_VERSION));
        assert_eq!(exec.install_hint.as_deref(), Some(DEFAULT_INSTALL_HINT));
    }

    #[test]
    fn test_legacy_provider_to_msi_with_override() {
        let user = legacy_user(&[("apiserver-id", "srv"), ("client-id", "cid")]);
        let options = options(&[(FlagId::Login, "msi"), (FlagId::ClientId, "msi-cid")]);
        let exec = build_exec(&user, &options).unwrap();
        expect_args(
            &exec.args,
            &["get-token", "--server-id", "srv", "--client-id", "msi-cid", "--login", "msi"],
        );
    }

    #[test]
    fn test_exec_devicecode_to_azurecli_drops_unset_tenant() {
        let user = exec_user(
            &[
                "get-token", "--login", "devicecode", "--server-id", "srv", "--client-id", "cid",
                "--tenant-id", "tid", "--environment", "AzurePublicCloud",
            ],
            None,
        );
        let options = options(&[(FlagId::Login, "azurecli")]);
        let exec = build_exec(&user, &options).unwrap();
        expect_args(&exec.args, &["get-token", "--server-id", "srv", "--login", "azurecli"]);
        assert_eq!(exec.env, None);
    }

    #[test]
    fn test_pop_enabled_without_claims_fails() {
        let user = exec_user(&["get-token", "--server-id", "srv"], None);
        let options = options(&[(FlagId::Login, "interactive"), (FlagId::PopEnabled, "true")]);
        let err = build_exec(&user, &options).unwrap_err();
        assert_eq!(
            err.to_string(),
            "`--pop-claims` is required when specifying `--pop-enabled`"
        );

        let options = options_with_claims_only();
        assert!(build_exec(&user, &options).is_err());
    }

    fn options_with_claims_only() -> Options {
        options(&[(FlagId::Login, "interactive"), (FlagId::PopClaims, "u=host")])
    }

    #[test]
    fn test_pop_pair_emitted_for_interactive() {
        let user = exec_user(
            &["get-token", "--server-id", "srv", "--client-id", "cid", "--tenant-id", "tid"],
            None,
        );
        let options = options(&[
            (FlagId::Login, "interactive"),
            (FlagId::PopEnabled, "true"),
            (FlagId::PopClaims, "u=host"),
            (FlagId::LoginHint, "me@example.com"),
        ]);
        let exec = build_exec(&user, &options).unwrap();
        expect_args(
            &exec.args,
            &[
                "get-token", "--login", "interactive", "--server-id", "srv", "--client-id", "cid",
                "--tenant-id", "tid", "--pop-enabled", "--pop-claims", "u=host", "--login-hint",
                "me@example.com",
            ],
        );
    }

    #[test]
    fn test_existing_install_hint_preserved() {
        let user = exec_user(
            &["get-token", "--login", "azurecli", "--server-id", "srv"],
            Some("custom hint"),
        );
        let exec = build_exec(&user, &Options::new()).unwrap();
        assert_eq!(exec.install_hint.as_deref(), Some("custom hint"));
        expect_args(&exec.args, &["get-token", "--login", "azurecli", "--server-id", "srv"]);
    }

    #[test]
    fn test_user_flag_beats_existing_exec_arg() {
        let user = exec_user(
            &[
                "get-token", "--login", "devicecode", "--server-id", "old", "--client-id", "cid",
                "--tenant-id", "tid", "--legacy",
            ],
            None,
        );
        let options = options(&[(FlagId::ServerId, "new")]);
        let exec = build_exec(&user, &options).unwrap();
        expect_args(
            &exec.args,
            &[
                "get-token", "--login", "devicecode", "--server-id", "new", "--client-id", "cid",
                "--tenant-id", "tid", "--legacy",
            ],
        );
    }

    #[test]
    fn test_config_mode_one_is_not_legacy() {
        let user = legacy_user(&[
            ("apiserver-id", "srv"),
            ("client-id", "cid"),
            ("tenant-id", "tid"),
            ("config-mode", "1"),
        ]);
        let exec = build_exec(&user, &Options::new()).unwrap();
        assert!(!exec.args.contains(&"--legacy".to_string()));

        let exec = build_exec(&user, &options(&[(FlagId::Legacy, "true")])).unwrap();
        assert!(exec.args.contains(&"--legacy".to_string()));
    }

    #[test]
    fn test_token_cache_dir_alias() {
        let user = exec_user(
            &[
                "get-token", "--login", "azd", "--server-id", "srv", "--token-cache-dir",
                "/var/cache",
            ],
            None,
        );
        let exec = build_exec(&user, &Options::new()).unwrap();
        expect_args(
            &exec.args,
            &["get-token", "--login", "azd", "--server-id", "srv", "--cache-dir", "/var/cache"],
        );
    }

    #[test]
    fn test_inline_exec_args_are_read() {
        let user = exec_user(&["get-token", "--login=azd", "--server-id=srv"], None);
        let exec = build_exec(&user, &Options::new()).unwrap();
        expect_args(&exec.args, &["get-token", "--login", "azd", "--server-id", "srv"]);
    }

    #[test]
    fn test_missing_required_args() {
        let user = legacy_user(&[("client-id", "cid"), ("tenant-id", "tid")]);
        let err = build_exec(&user, &Options::new()).unwrap_err();
        assert_eq!(err.to_string(), "--server-id is required");

        let user = legacy_user(&[("apiserver-id", "srv"), ("tenant-id", "tid")]);
        let err = build_exec(&user, &Options::new()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(
            err.to_string(),
            "--client-id is required for login method devicecode"
        );
    }

    #[test]
    fn test_spn_arguments() {
        let user = legacy_user(&[("apiserver-id", "srv"), ("client-id", "cid"), ("tenant-id", "tid")]);
        let options = options(&[
            (FlagId::Login, "spn"),
            (FlagId::ClientCertificate, "/certs/spn.pem"),
            (FlagId::ClientCertificatePassword, "pw"),
            (FlagId::DisableEnvironmentOverride, "true"),
        ]);
        let exec = build_exec(&user, &options).unwrap();
        expect_args(
            &exec.args,
            &[
                "get-token", "--login", "spn", "--server-id", "srv", "--client-id", "cid",
                "--tenant-id", "tid", "--client-certificate", "/certs/spn.pem",
                "--client-certificate-password", "pw", "--legacy",
                "--disable-environment-override",
            ],
        );
    }

    #[test]
    fn test_workload_identity_only_user_set() {
        let user = exec_user(
            &["get-token", "--server-id", "srv", "--client-id", "cid", "--tenant-id", "tid"],
            None,
        );
        let options = options(&[
            (FlagId::Login, "workloadidentity"),
            (FlagId::FederatedTokenFile, "/var/run/token"),
        ]);
        let exec = build_exec(&user, &options).unwrap();
        expect_args(
            &exec.args,
            &[
                "get-token", "--login", "workloadidentity", "--server-id", "srv",
                "--federated-token-file", "/var/run/token",
            ],
        );
    }

    #[test]
    fn test_azurecli_config_dir_env() {
        let user = exec_user(&["get-token", "--server-id", "srv"], None);
        let mut options = options(&[(FlagId::Login, "azurecli"), (FlagId::TenantId, "tid")]);
        options.azure_config_dir = "/home/u/.azure".to_string();
        let exec = build_exec(&user, &options).unwrap();
        expect_args(
            &exec.args,
            &["get-token", "--login", "azurecli", "--server-id", "srv", "--tenant-id", "tid"],
        );
        assert_eq!(
            exec.env,
            Some(vec![ExecEnvVar {
                name: "AZURE_CONFIG_DIR".to_string(),
                value: "/home/u/.azure".to_string(),
            }])
        );
    }

    #[test]
    fn test_azure_pipelines_service_connection() {
        let user = exec_user(
            &[
                "get-token", "--login", "azurepipelines", "--server-id", "srv",
                "--client-id", "cid", "--tenant-id", "tid",
                "--azure-pipelines-service-connection-id", "old-conn",
            ],
            None,
        );
        let exec = build_exec(&user, &Options::new()).unwrap();
        expect_args(
            &exec.args,
            &[
                "get-token", "--login", "azurepipelines", "--server-id", "srv",
                "--client-id", "cid", "--tenant-id", "tid",
                "--azure-pipelines-service-connection-id", "old-conn",
            ],
        );

        let overridden = options(&[(FlagId::ServiceConnectionId, "new-conn")]);
        let exec = build_exec(&user, &overridden).unwrap();
        assert!(exec.args.contains(&"new-conn".to_string()));
        assert!(!exec.args.contains(&"old-conn".to_string()));

        let legacy = legacy_user(&[
            ("apiserver-id", "srv"),
            ("client-id", "cid"),
            ("tenant-id", "tid"),
        ]);
        let err = build_exec(&legacy, &options(&[(FlagId::Login, "azurepipelines")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "--azure-pipelines-service-connection-id is required for login method azurepipelines"
        );
    }

    #[test]
    fn test_unknown_existing_login_fails() {
        let user = exec_user(&["get-token", "--login", "kerberos", "--server-id", "srv"], None);
        assert!(matches!(
            build_exec(&user, &Options::new()).unwrap_err(),
            Error::Configuration(_)
        ));
    }

    #[test]
    fn test_convert_document_selects_users() {
        let mut config = Kubeconfig {
            auth_infos: vec![
                NamedAuthInfo {
                    name: "legacy".to_string(),
                    auth_info: Some(legacy_user(&[
                        ("apiserver-id", "srv"),
                        ("client-id", "cid"),
                        ("tenant-id", "tid"),
                    ])),
                },
                NamedAuthInfo {
                    name: "other-exec".to_string(),
                    auth_info: Some(AuthInfo {
                        exec: Some(ExecConfig {
                            command: "aws".to_string(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                },
                NamedAuthInfo {
                    name: "empty".to_string(),
                    auth_info: None,
                },
            ],
            ..Default::default()
        };
        let original_other = config.auth_infos[1].clone();

        let converted =
            convert_document(&mut config, &Options::new(), None, &HashSet::new()).unwrap();
        assert_eq!(converted, vec!["legacy".to_string()]);

        let legacy = config.auth_infos[0].auth_info.as_ref().unwrap();
        assert!(legacy.auth_provider.is_none());
        assert!(legacy.is_kubelogin_exec());
        assert_eq!(config.auth_infos[1], original_other);
    }

    #[test]
    fn test_error_names_the_user() {
        let mut config = Kubeconfig {
            auth_infos: vec![NamedAuthInfo {
                name: "broken".to_string(),
                auth_info: Some(legacy_user(&[("client-id", "cid")])),
            }],
            ..Default::default()
        };
        let err = convert_document(&mut config, &Options::new(), None, &HashSet::new())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "user \"broken\": --server-id is required"
        );
    }
}
