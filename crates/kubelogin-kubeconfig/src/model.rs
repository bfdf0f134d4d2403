//! Kubeconfig document model.
//!
//! Only the parts conversion reads or rewrites are typed. Every other key is
//! carried through `extra` so a load/save cycle does not drop data.

use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;

pub type Extra = BTreeMap<String, Value>;

/// Read an explicit `null` (as written by client-go) as the empty value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Kubeconfig {
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub contexts: Vec<NamedContext>,

    #[serde(
        default,
        rename = "users",
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub auth_infos: Vec<NamedAuthInfo>,

    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    #[serde(default, deserialize_with = "null_as_default")]
    pub cluster: String,

    /// Name of the auth info (`users[].name`) this context uses.
    #[serde(default, deserialize_with = "null_as_default")]
    pub user: String,

    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamedAuthInfo {
    pub name: String,

    #[serde(default, rename = "user", skip_serializing_if = "Option::is_none")]
    pub auth_info: Option<AuthInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthInfo {
    #[serde(
        default,
        rename = "auth-provider",
        skip_serializing_if = "Option::is_none"
    )]
    pub auth_provider: Option<AuthProviderConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<ExecConfig>,

    #[serde(flatten)]
    pub extra: Extra,
}

/// The retired in-tree auth provider stanza.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthProviderConfig {
    pub name: String,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub config: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub command: String,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<ExecEnvVar>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_hint: Option<String>,

    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecEnvVar {
    pub name: String,
    pub value: String,
}

impl Kubeconfig {
    pub fn from_yaml(content: &str) -> kubelogin_core::Result<Self> {
        // An empty file is a valid, empty kubeconfig.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml(&self) -> kubelogin_core::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn context(&self, name: &str) -> Option<&Context> {
        self.contexts
            .iter()
            .find(|c| c.name == name)
            .and_then(|c| c.context.as_ref())
    }
}

impl AuthInfo {
    /// Whether this entry uses the retired `azure` auth provider.
    pub fn is_legacy_provider(&self) -> bool {
        self.auth_provider
            .as_ref()
            .is_some_and(|p| p.name == "azure")
    }

    /// Whether this entry already execs kubelogin.
    pub fn is_kubelogin_exec(&self) -> bool {
        self.exec
            .as_ref()
            .is_some_and(|e| e.command.contains("kubelogin"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
apiVersion: v1
kind: Config
current-context: aks
preferences: {}
clusters:
- name: aks
  cluster:
    server: https://aks.example.com:443
    certificate-authority-data: Zm9v
contexts:
- name: aks
  context:
    cluster: aks
    user: clusterUser_rg_aks
    namespace: default
users:
- name: clusterUser_rg_aks
  user:
    auth-provider:
      name: azure
      config:
        apiserver-id: srv
        client-id: cid
        tenant-id: tid
        environment: AzurePublicCloud
- name: exec-user
  user:
    exec:
      apiVersion: client.authentication.k8s.io/v1beta1
      command: kubelogin
      args: [get-token, --server-id, srv]
      installHint: install it
      provideClusterInfo: false
- name: cert-user
  user:
    client-certificate-data: YmFy
"#;

    #[test]
    fn test_parse_typed_parts() {
        let config = Kubeconfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.auth_infos.len(), 3);
        assert_eq!(config.context("aks").unwrap().user, "clusterUser_rg_aks");

        let legacy = config.auth_infos[0].auth_info.as_ref().unwrap();
        assert!(legacy.is_legacy_provider());
        assert_eq!(
            legacy.auth_provider.as_ref().unwrap().config["apiserver-id"],
            "srv"
        );

        let exec = config.auth_infos[1].auth_info.as_ref().unwrap();
        assert!(exec.is_kubelogin_exec());
        assert_eq!(
            exec.exec.as_ref().unwrap().install_hint.as_deref(),
            Some("install it")
        );

        let cert = config.auth_infos[2].auth_info.as_ref().unwrap();
        assert!(!cert.is_legacy_provider());
        assert!(!cert.is_kubelogin_exec());
    }

    #[test]
    fn test_unknown_keys_survive_roundtrip() {
        let config = Kubeconfig::from_yaml(SAMPLE).unwrap();
        let reparsed = Kubeconfig::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(reparsed, config);

        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("certificate-authority-data: Zm9v"));
        assert!(yaml.contains("client-certificate-data: YmFy"));
        assert!(yaml.contains("namespace: default"));
        assert!(yaml.contains("provideClusterInfo: false"));
        assert!(yaml.contains("current-context: aks"));
    }

    #[test]
    fn test_null_users() {
        let config = Kubeconfig::from_yaml("users: null\n").unwrap();
        assert!(config.auth_infos.is_empty());
        assert!(!config.to_yaml().unwrap().contains("users"));
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(Kubeconfig::from_yaml("  \n").unwrap(), Kubeconfig::default());
    }
}
