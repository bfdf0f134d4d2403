//! Login methods.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named credential acquisition strategy selected with `--login`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LoginMethod {
    #[default]
    DeviceCode,
    Interactive,
    ServicePrincipal,
    ResourceOwnerPassword,
    ManagedIdentity,
    WorkloadIdentity,
    AzureCli,
    AzureDeveloperCli,
    AzurePipelines,
    GithubActions,
}

impl LoginMethod {
    pub const ALL: [LoginMethod; 10] = [
        LoginMethod::DeviceCode,
        LoginMethod::Interactive,
        LoginMethod::ServicePrincipal,
        LoginMethod::ResourceOwnerPassword,
        LoginMethod::ManagedIdentity,
        LoginMethod::WorkloadIdentity,
        LoginMethod::AzureCli,
        LoginMethod::AzureDeveloperCli,
        LoginMethod::AzurePipelines,
        LoginMethod::GithubActions,
    ];

    /// The value accepted by `--login` and emitted into kubeconfig args.
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginMethod::DeviceCode => "devicecode",
            LoginMethod::Interactive => "interactive",
            LoginMethod::ServicePrincipal => "spn",
            LoginMethod::ResourceOwnerPassword => "ropc",
            LoginMethod::ManagedIdentity => "msi",
            LoginMethod::WorkloadIdentity => "workloadidentity",
            LoginMethod::AzureCli => "azurecli",
            LoginMethod::AzureDeveloperCli => "azd",
            LoginMethod::AzurePipelines => "azurepipelines",
            LoginMethod::GithubActions => "githubactions",
        }
    }

    /// Whether the method can request PoP tokens.
    pub fn supports_pop(&self) -> bool {
        matches!(
            self,
            LoginMethod::Interactive
                | LoginMethod::ServicePrincipal
                | LoginMethod::ResourceOwnerPassword
        )
    }

    /// Whether `get-token` consults the on-disk ExecCredential cache.
    pub fn uses_token_cache(&self) -> bool {
        !matches!(
            self,
            LoginMethod::ManagedIdentity
                | LoginMethod::WorkloadIdentity
                | LoginMethod::AzureCli
                | LoginMethod::AzureDeveloperCli
                | LoginMethod::ServicePrincipal
        )
    }

    pub fn supported_values() -> String {
        Self::ALL
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for LoginMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoginMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "devicecode" => Ok(LoginMethod::DeviceCode),
            "interactive" => Ok(LoginMethod::Interactive),
            "spn" => Ok(LoginMethod::ServicePrincipal),
            "ropc" => Ok(LoginMethod::ResourceOwnerPassword),
            "msi" => Ok(LoginMethod::ManagedIdentity),
            "workloadidentity" => Ok(LoginMethod::WorkloadIdentity),
            "azurecli" => Ok(LoginMethod::AzureCli),
            "azd" => Ok(LoginMethod::AzureDeveloperCli),
            "azurepipelines" => Ok(LoginMethod::AzurePipelines),
            "githubactions" => Ok(LoginMethod::GithubActions),
            _ => Err(Error::config(format!(
                "'{}' is not a supported login method. Supported methods: {}",
                s,
                Self::supported_values()
            ))),
        }
    }
}

impl TryFrom<String> for LoginMethod {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<LoginMethod> for String {
    fn from(value: LoginMethod) -> Self {
        value.as_str().to_string()
    }
}
