//! CLI command definitions.
//!
//! Subcommand flags are registered from the shared flag table so the
//! command line and environment resolution cannot drift apart.

use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command as ClapCommand, value_parser};
use kubelogin_core::flags::{self, Command, FlagId, FlagKind, FlagSpec};
use kubelogin_core::{Options, Result};

pub const GET_TOKEN: &str = "get-token";
pub const CONVERT_KUBECONFIG: &str = "convert-kubeconfig";
pub const REMOVE_CACHE_DIR: &str = "remove-cache-dir";
pub const REMOVE_TOKENS: &str = "remove-tokens";

pub const VERBOSITY: &str = "v";

/// Build the `kubelogin` command tree.
pub fn build() -> ClapCommand {
    ClapCommand::new("kubelogin")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Login to Azure AD (Entra ID) to get a token for Kubernetes")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new(VERBOSITY)
                .short('v')
                .long("v")
                .global(true)
                .value_name("LEVEL")
                .value_parser(value_parser!(u8))
                .default_value("0")
                .help("Log verbosity; 4 enables debug and 5 trace output"),
        )
        .subcommand(
            with_flags(
                ClapCommand::new(GET_TOKEN)
                    .about("Get AAD token and print it as an ExecCredential"),
                flags::flags_for(Command::GetToken),
            ),
        )
        .subcommand(
            with_flags(
                ClapCommand::new(CONVERT_KUBECONFIG)
                    .about("Convert kubeconfig to use kubelogin exec credentials"),
                flags::flags_for(Command::Convert),
            ),
        )
        .subcommand(
            ClapCommand::new(REMOVE_CACHE_DIR)
                .about("Remove all cached tokens from the cache directory")
                .arg(flag_arg(flags::spec(FlagId::CacheDir))),
        )
        .subcommand(
            ClapCommand::new(REMOVE_TOKENS)
                .about("Remove all cached tokens from the legacy token cache directory")
                .arg(flag_arg(flags::spec(FlagId::TokenCacheDir))),
        )
}

fn with_flags<'a>(
    command: ClapCommand,
    specs: impl Iterator<Item = &'a FlagSpec>,
) -> ClapCommand {
    specs.fold(command, |command, spec| command.arg(flag_arg(spec)))
}

fn flag_arg(spec: &FlagSpec) -> Arg {
    let arg = Arg::new(spec.long).long(spec.long).help(spec.help);
    match spec.kind {
        FlagKind::Text => arg.value_name("VALUE").action(ArgAction::Set),
        FlagKind::Duration => arg.value_name("DURATION").action(ArgAction::Set),
        // `--flag` or `--flag=false`
        FlagKind::Switch => arg
            .num_args(0..=1)
            .require_equals(true)
            .default_missing_value("true")
            .value_name("BOOL")
            .action(ArgAction::Set),
    }
}

/// Collect every flag the user typed into an [`Options`], marking each as
/// explicitly set.
pub fn options_from_matches(matches: &ArgMatches, specs: &[&FlagSpec]) -> Result<Options> {
    let mut options = Options::new();
    for spec in specs {
        if matches.value_source(spec.long) != Some(ValueSource::CommandLine) {
            continue;
        }
        let raw = matches
            .get_one::<String>(spec.long)
            .map(String::as_str)
            .unwrap_or_default();
        options.apply_explicit(spec.id, raw)?;
    }
    Ok(options)
}

/// Flags registered on `command`.
pub fn specs_for(command: Command) -> Vec<&'static FlagSpec> {
    flags::flags_for(command).collect()
}

pub fn verbosity(matches: &ArgMatches) -> u8 {
    matches.get_one::<u8>(VERBOSITY).copied().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubelogin_core::LoginMethod;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn parse(args: &[&str]) -> (String, ArgMatches) {
        let matches = build().try_get_matches_from(args).unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        (name.to_string(), sub.clone())
    }

    #[test]
    fn test_command_tree_is_valid() {
        build().debug_assert();
    }

    #[test]
    fn test_get_token_flags_are_explicit() {
        let (name, sub) = parse(&[
            "kubelogin",
            "get-token",
            "--login",
            "spn",
            "--server-id",
            "srv",
            "--client-id",
            "cid",
            "--legacy",
            "--timeout",
            "30s",
        ]);
        assert_eq!(name, GET_TOKEN);

        let options = options_from_matches(&sub, &specs_for(Command::GetToken)).unwrap();
        assert_eq!(options.login_method, LoginMethod::ServicePrincipal);
        assert_eq!(options.server_id, "srv");
        assert!(options.is_legacy);
        assert_eq!(options.timeout, Duration::from_secs(30));
        assert!(options.is_set(FlagId::ClientId));
        assert!(!options.is_set(FlagId::TenantId));
    }

    #[test]
    fn test_switch_accepts_explicit_false() {
        let (_, sub) = parse(&["kubelogin", "convert-kubeconfig", "--legacy=false"]);
        let options = options_from_matches(&sub, &specs_for(Command::Convert)).unwrap();
        assert!(options.is_set(FlagId::Legacy));
        assert!(!options.is_legacy);
    }

    #[test]
    fn test_scoped_flags() {
        assert!(
            build()
                .try_get_matches_from(["kubelogin", "get-token", "--context", "aks"])
                .is_err()
        );
        assert!(
            build()
                .try_get_matches_from(["kubelogin", "convert-kubeconfig", "--context", "aks"])
                .is_ok()
        );
    }

    #[test]
    fn test_convert_accepts_service_connection_and_transport_flags() {
        let (_, sub) = parse(&[
            "kubelogin",
            "convert-kubeconfig",
            "--login",
            "azurepipelines",
            "--azure-pipelines-service-connection-id",
            "conn",
            "--timeout",
            "90s",
            "--use-azurerm-env-vars",
            "--use-persistent-cache",
            "--disable-instance-discovery",
        ]);
        let options = options_from_matches(&sub, &specs_for(Command::Convert)).unwrap();
        assert_eq!(options.azure_pipelines_service_connection_id, "conn");
        assert!(options.is_set(FlagId::ServiceConnectionId));
        assert_eq!(options.timeout, Duration::from_secs(90));
        assert!(options.use_azurerm_env_vars);
        assert!(options.use_persistent_cache);
        assert!(options.disable_instance_discovery);
    }

    #[test]
    fn test_global_verbosity() {
        let (_, sub) = parse(&["kubelogin", "remove-cache-dir", "-v", "5"]);
        assert_eq!(verbosity(&sub), 5);
        let (_, sub) = parse(&["kubelogin", "remove-tokens"]);
        assert_eq!(verbosity(&sub), 0);
    }

    #[test]
    fn test_unknown_login_is_rejected() {
        let (_, sub) = parse(&["kubelogin", "get-token", "--login", "kerberos"]);
        let err = options_from_matches(&sub, &specs_for(Command::GetToken)).unwrap_err();
        assert!(err.to_string().contains("kerberos"));
    }
}
