//! Tokens from the Azure CLI and the Azure Developer CLI.

use super::{CredentialProvider, single_scope};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use kubelogin_core::options::DEFAULT_SCOPE_SUFFIX;
use kubelogin_core::{AccessToken, Error, Result};
use serde::Deserialize;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzCliToken {
    access_token: String,
    #[serde(default)]
    expires_on: Option<String>,
    #[serde(default, rename = "expires_on")]
    expires_on_unix: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzdToken {
    token: String,
    expires_on: String,
}

/// Run a CLI and return its stdout, bounded by `timeout`.
async fn run(program: &str, args: &[String], timeout: Duration) -> Result<Vec<u8>> {
    let mut command = if cfg!(target_os = "windows") {
        let mut command = Command::new("cmd");
        command.arg("/c").arg(program);
        command
    } else {
        Command::new(program)
    };
    command.args(args).kill_on_drop(true);
    debug!(program, ?args, "Running credential CLI");

    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| Error::Timeout(timeout))?
        .map_err(|e| Error::auth(None, format!("failed to execute {}: {}", program, e)))?;

    if !output.status.success() {
        return Err(Error::auth(
            None,
            format!(
                "{} failed: {}",
                program,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }
    Ok(output.stdout)
}

fn parse_az_output(stdout: &[u8]) -> Result<AccessToken> {
    let token: AzCliToken = serde_json::from_slice(stdout)
        .map_err(|e| Error::auth(None, format!("invalid Azure CLI token response: {}", e)))?;

    let expires_on = match (token.expires_on_unix, token.expires_on.as_deref()) {
        (Some(unix), _) => Utc.timestamp_opt(unix, 0).single(),
        // Older CLIs report local time without an offset.
        (None, Some(local)) => NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .and_then(|naive| Local.from_local_datetime(&naive).earliest())
            .map(|t| t.with_timezone(&Utc)),
        (None, None) => None,
    }
    .ok_or_else(|| Error::auth(None, "Azure CLI token response has no valid expiry"))?;

    Ok(AccessToken::bearer(token.access_token, expires_on))
}

fn parse_azd_output(stdout: &[u8]) -> Result<AccessToken> {
    let token: AzdToken = serde_json::from_slice(stdout).map_err(|e| {
        Error::auth(None, format!("invalid Azure Developer CLI token response: {}", e))
    })?;
    let expires_on = DateTime::parse_from_rfc3339(&token.expires_on)
        .map_err(|e| Error::auth(None, format!("invalid expiresOn from azd: {}", e)))?
        .with_timezone(&Utc);
    Ok(AccessToken::bearer(token.token, expires_on))
}

/// `az account get-access-token`
pub struct AzureCli {
    program: String,
    tenant_id: String,
    timeout: Duration,
}

impl AzureCli {
    pub fn new(tenant_id: &str, timeout: Duration) -> Self {
        Self {
            program: "az".to_string(),
            tenant_id: tenant_id.to_string(),
            timeout,
        }
    }

    pub fn with_program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }

    fn args(&self, scope: &str) -> Vec<String> {
        let resource = scope.strip_suffix(DEFAULT_SCOPE_SUFFIX).unwrap_or(scope);
        let mut args: Vec<String> = ["account", "get-access-token", "--output", "json", "--resource"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push(resource.to_string());
        if !self.tenant_id.is_empty() {
            args.push("--tenant".to_string());
            args.push(self.tenant_id.clone());
        }
        args
    }
}

#[async_trait]
impl CredentialProvider for AzureCli {
    fn name(&self) -> &str {
        "AzureCLI"
    }

    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken> {
        let args = self.args(single_scope(scopes)?);
        let stdout = run(&self.program, &args, self.timeout).await?;
        parse_az_output(&stdout)
    }
}

/// `azd auth token`
pub struct AzureDeveloperCli {
    program: String,
    tenant_id: String,
    timeout: Duration,
}

impl AzureDeveloperCli {
    pub fn new(tenant_id: &str, timeout: Duration) -> Self {
        Self {
            program: "azd".to_string(),
            tenant_id: tenant_id.to_string(),
            timeout,
        }
    }

    pub fn with_program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }

    fn args(&self, scope: &str) -> Vec<String> {
        let mut args: Vec<String> = ["auth", "token", "--output", "json", "--scope"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push(scope.to_string());
        if !self.tenant_id.is_empty() {
            args.push("--tenant-id".to_string());
            args.push(self.tenant_id.clone());
        }
        args
    }
}

#[async_trait]
impl CredentialProvider for AzureDeveloperCli {
    fn name(&self) -> &str {
        "AzureDeveloperCLI"
    }

    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken> {
        let args = self.args(single_scope(scopes)?);
        let stdout = run(&self.program, &args, self.timeout).await?;
        parse_azd_output(&stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_az_args() {
        let cli = AzureCli::new("tid", Duration::from_secs(1));
        assert_eq!(
            cli.args("server/.default"),
            vec![
                "account",
                "get-access-token",
                "--output",
                "json",
                "--resource",
                "server",
                "--tenant",
                "tid"
            ]
        );
        let cli = AzureCli::new("", Duration::from_secs(1));
        assert!(!cli.args("server/.default").contains(&"--tenant".to_string()));
    }

    #[test]
    fn test_azd_args() {
        let cli = AzureDeveloperCli::new("tid", Duration::from_secs(1));
        assert_eq!(
            cli.args("server/.default"),
            vec!["auth", "token", "--output", "json", "--scope", "server/.default", "--tenant-id", "tid"]
        );
    }

    #[test]
    fn test_parse_az_output_prefers_unix_expiry() {
        let token = parse_az_output(
            br#"{"accessToken":"az-at","expiresOn":"2023-11-14 22:13:20.000000","expires_on":1700000000,"tokenType":"Bearer"}"#,
        )
        .unwrap();
        assert_eq!(token.token, "az-at");
        assert_eq!(token.expires_on.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_parse_az_output_local_time() {
        let token =
            parse_az_output(br#"{"accessToken":"az-at","expiresOn":"2099-01-01 00:00:00.000000"}"#)
                .unwrap();
        assert!(!token.is_expired());
    }

    #[test]
    fn test_parse_azd_output() {
        let token =
            parse_azd_output(br#"{"token":"azd-at","expiresOn":"2099-01-01T00:00:00Z"}"#).unwrap();
        assert_eq!(token.token, "azd-at");
        assert!(parse_azd_output(b"not json").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_cli_program() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("az");
        std::fs::write(
            &script,
            "#!/bin/sh\necho '{\"accessToken\":\"script-at\",\"expires_on\":4102444800}'\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cli = AzureCli::new("", Duration::from_secs(10)).with_program(&script.to_string_lossy());
        let token = cli.get_token(&["server/.default"]).await.unwrap();
        assert_eq!(token.token, "script-at");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cli_failure_surfaces_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("azd");
        std::fs::write(&script, "#!/bin/sh\necho 'not logged in' >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cli = AzureDeveloperCli::new("", Duration::from_secs(10))
            .with_program(&script.to_string_lossy());
        let err = cli.get_token(&["server/.default"]).await.unwrap_err();
        assert!(err.to_string().contains("not logged in"));
    }
}
