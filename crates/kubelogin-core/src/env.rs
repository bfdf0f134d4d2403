//! Environment variable access.

use std::collections::HashMap;

pub const AAD_LOGIN_METHOD: &str = "AAD_LOGIN_METHOD";
pub const AZURE_CLIENT_ID: &str = "AZURE_CLIENT_ID";
pub const AZURE_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";
pub const AZURE_CLIENT_CERTIFICATE_PATH: &str = "AZURE_CLIENT_CERTIFICATE_PATH";
pub const AZURE_CLIENT_CERTIFICATE_PASSWORD: &str = "AZURE_CLIENT_CERTIFICATE_PASSWORD";
pub const AZURE_TENANT_ID: &str = "AZURE_TENANT_ID";
pub const AZURE_USERNAME: &str = "AZURE_USERNAME";
pub const AZURE_PASSWORD: &str = "AZURE_PASSWORD";
pub const AZURE_FEDERATED_TOKEN_FILE: &str = "AZURE_FEDERATED_TOKEN_FILE";
pub const AZURE_AUTHORITY_HOST: &str = "AZURE_AUTHORITY_HOST";
pub const AZURE_CONFIG_DIR: &str = "AZURE_CONFIG_DIR";
pub const AZURE_CLI_TIMEOUT: &str = "AZURE_CLI_TIMEOUT";
pub const AZURE_ENVIRONMENT_FILEPATH: &str = "AZURE_ENVIRONMENT_FILEPATH";
pub const KUBECACHEDIR: &str = "KUBECACHEDIR";
pub const KUBECONFIG: &str = "KUBECONFIG";
pub const KUBERNETES_EXEC_INFO: &str = "KUBERNETES_EXEC_INFO";

pub const SYSTEM_ACCESSTOKEN: &str = "SYSTEM_ACCESSTOKEN";
pub const SYSTEM_OIDCREQUESTURI: &str = "SYSTEM_OIDCREQUESTURI";
pub const ACTIONS_ID_TOKEN_REQUEST_TOKEN: &str = "ACTIONS_ID_TOKEN_REQUEST_TOKEN";
pub const ACTIONS_ID_TOKEN_REQUEST_URL: &str = "ACTIONS_ID_TOKEN_REQUEST_URL";

pub const ARM_CLIENT_ID: &str = "ARM_CLIENT_ID";
pub const ARM_CLIENT_SECRET: &str = "ARM_CLIENT_SECRET";
pub const ARM_CLIENT_CERTIFICATE_PATH: &str = "ARM_CLIENT_CERTIFICATE_PATH";
pub const ARM_CLIENT_CERTIFICATE_PASSWORD: &str = "ARM_CLIENT_CERTIFICATE_PASSWORD";
pub const ARM_TENANT_ID: &str = "ARM_TENANT_ID";

/// Read-only view of environment variables.
///
/// Empty values are reported as unset.
pub trait EnvSource: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;

    fn require(&self, name: &str) -> crate::Result<String> {
        self.get(name).ok_or_else(|| {
            crate::Error::config(format!("environment variable {} is not set", name))
        })
    }
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }
}

impl EnvSource for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name).filter(|v| !v.is_empty()).cloned()
    }
}

impl<T: EnvSource + ?Sized> EnvSource for &T {
    fn get(&self, name: &str) -> Option<String> {
        (**self).get(name)
    }
}

/// Build a map-backed environment from pairs.
pub fn env_from<I, K, V>(pairs: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
