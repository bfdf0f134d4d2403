//! Cloud environment registry.

use kubelogin_core::env::{self, EnvSource};
use kubelogin_core::{Error, Result};
use serde::Deserialize;

pub const PUBLIC_AUTHORITY_HOST: &str = "https://login.microsoftonline.com/";
pub const CHINA_AUTHORITY_HOST: &str = "https://login.chinacloudapi.cn/";
pub const US_GOVERNMENT_AUTHORITY_HOST: &str = "https://login.microsoftonline.us/";

/// Authority hosts that never need instance discovery.
pub const KNOWN_AUTHORITY_HOSTS: [&str; 3] = [
    PUBLIC_AUTHORITY_HOST,
    CHINA_AUTHORITY_HOST,
    US_GOVERNMENT_AUTHORITY_HOST,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudConfiguration {
    /// Canonical environment name, used in cache file names.
    pub name: String,
    /// Always ends with `/`.
    pub active_directory_authority_host: String,
}

impl CloudConfiguration {
    fn new(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            active_directory_authority_host: with_trailing_slash(host),
        }
    }

    /// `authority_host + tenant_id + "/"`
    pub fn authority(&self, tenant_id: &str) -> String {
        format!("{}{}/", self.active_directory_authority_host, tenant_id)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvironmentFile {
    active_directory_endpoint: String,
}

/// Resolve an environment name; empty means the public cloud.
pub fn resolve(name: &str, env: &dyn EnvSource) -> Result<CloudConfiguration> {
    match name.to_ascii_lowercase().as_str() {
        "" | "azurepubliccloud" | "azurecloud" | "public" => Ok(CloudConfiguration::new(
            "AzurePublicCloud",
            PUBLIC_AUTHORITY_HOST,
        )),
        "azurechinacloud" | "china" => Ok(CloudConfiguration::new(
            "AzureChinaCloud",
            CHINA_AUTHORITY_HOST,
        )),
        "azureusgovernmentcloud" | "azureusgovernment" | "usgovernment" => Ok(
            CloudConfiguration::new("AzureUSGovernmentCloud", US_GOVERNMENT_AUTHORITY_HOST),
        ),
        "azurestackcloud" => {
            let path = env.require(env::AZURE_ENVIRONMENT_FILEPATH)?;
            let content =
                std::fs::read_to_string(&path).map_err(|e| Error::io_at(&path, e))?;
            let file: EnvironmentFile = serde_json::from_str(&content)?;
            Ok(CloudConfiguration::new(
                "AzureStackCloud",
                &file.active_directory_endpoint,
            ))
        }
        _ => Err(Error::config(format!("unknown environment: {}", name))),
    }
}

pub fn is_known_authority_host(host: &str) -> bool {
    let host = with_trailing_slash(host);
    KNOWN_AUTHORITY_HOSTS.iter().any(|known| *known == host)
}

pub(crate) fn with_trailing_slash(host: &str) -> String {
    if host.ends_with('/') {
        host.to_string()
    } else {
        format!("{}/", host)
    }
}
