//! client-go ExecCredential input and output.

use chrono::SecondsFormat;
use kubelogin_core::env::{EnvSource, KUBERNETES_EXEC_INFO};
use kubelogin_core::{AccessToken, Error, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::debug;

pub const API_VERSION_V1: &str = "client.authentication.k8s.io/v1";
pub const API_VERSION_V1BETA1: &str = "client.authentication.k8s.io/v1beta1";

const KIND: &str = "ExecCredential";

/// What kubectl passes in `KUBERNETES_EXEC_INFO`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecInfo {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub spec: ExecInfoSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecInfoSpec {
    #[serde(default)]
    pub interactive: bool,
}

impl ExecInfo {
    /// Read `KUBERNETES_EXEC_INFO`; unset means an empty request.
    pub fn from_env(env: &dyn EnvSource) -> Result<Self> {
        match env.get(KUBERNETES_EXEC_INFO) {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                Error::config(format!("failed to parse {}: {}", KUBERNETES_EXEC_INFO, e))
            }),
            None => Ok(Self::unset()),
        }
    }

    /// Older clients send nothing; assume a user may be prompted.
    fn unset() -> Self {
        Self {
            spec: ExecInfoSpec { interactive: true },
            ..Self::default()
        }
    }

    /// The API version to answer with.
    pub fn response_version(&self) -> Result<&'static str> {
        match self.api_version.as_str() {
            "" | API_VERSION_V1BETA1 => Ok(API_VERSION_V1BETA1),
            API_VERSION_V1 => Ok(API_VERSION_V1),
            other => Err(Error::config(format!(
                "api version: {} is not supported",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecCredential {
    pub kind: &'static str,
    pub api_version: &'static str,
    pub status: ExecCredentialStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecCredentialStatus {
    pub token: String,
    pub expiration_timestamp: String,
}

impl ExecCredential {
    pub fn new(api_version: &'static str, token: &AccessToken) -> Self {
        Self {
            kind: KIND,
            api_version,
            status: ExecCredentialStatus {
                token: token.token.clone(),
                expiration_timestamp: token
                    .expires_on
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
            },
        }
    }

    /// Write the credential as a single JSON line.
    pub fn write_to(&self, out: &mut dyn Write) -> Result<()> {
        serde_json::to_writer(&mut *out, self)?;
        out.write_all(b"\n")?;
        out.flush()?;
        debug!(api_version = self.api_version, expires = %self.status.expiration_timestamp, "Wrote ExecCredential");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use kubelogin_core::env::env_from;
    use pretty_assertions::assert_eq;

    fn version_for(exec_info: Option<&str>) -> Result<&'static str> {
        let env = env_from(exec_info.map(|v| (KUBERNETES_EXEC_INFO, v.to_string())));
        ExecInfo::from_env(&env)?.response_version()
    }

    #[test]
    fn test_version_echo() {
        assert_eq!(version_for(None).unwrap(), API_VERSION_V1BETA1);
        assert_eq!(
            version_for(Some(
                r#"{"apiVersion":"client.authentication.k8s.io/v1","kind":"ExecCredential","spec":{"interactive":true}}"#
            ))
            .unwrap(),
            API_VERSION_V1
        );
        assert_eq!(
            version_for(Some(
                r#"{"apiVersion":"client.authentication.k8s.io/v1beta1","kind":"ExecCredential","spec":{}}"#
            ))
            .unwrap(),
            API_VERSION_V1BETA1
        );
        assert_eq!(
            version_for(Some(r#"{"kind":"ExecCredential"}"#)).unwrap(),
            API_VERSION_V1BETA1
        );
    }

    #[test]
    fn test_unsupported_version() {
        let err = version_for(Some(
            r#"{"apiVersion":"client.authentication.k8s.io/v1alpha1"}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(matches!(
            version_for(Some("not json")).unwrap_err(),
            Error::Configuration(_)
        ));
    }

    #[test]
    fn test_interactive_flag_parsed() {
        let env = env_from([(
            KUBERNETES_EXEC_INFO,
            r#"{"apiVersion":"client.authentication.k8s.io/v1","spec":{"interactive":true}}"#,
        )]);
        assert!(ExecInfo::from_env(&env).unwrap().spec.interactive);

        let env = env_from([(
            KUBERNETES_EXEC_INFO,
            r#"{"apiVersion":"client.authentication.k8s.io/v1","spec":{"interactive":false}}"#,
        )]);
        assert!(!ExecInfo::from_env(&env).unwrap().spec.interactive);

        let unset = env_from::<_, String, String>([]);
        assert!(ExecInfo::from_env(&unset).unwrap().spec.interactive);
    }

    #[test]
    fn test_output_document() {
        let token = AccessToken::bearer("at", Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        let mut out = Vec::new();
        ExecCredential::new(API_VERSION_V1, &token)
            .write_to(&mut out)
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"kind\":\"ExecCredential\",\"apiVersion\":\"client.authentication.k8s.io/v1\",\"status\":{\"token\":\"at\",\"expirationTimestamp\":\"2023-11-14T22:13:20Z\"}}\n"
        );
    }
}
