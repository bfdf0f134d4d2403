//! Command handlers.

use crate::exec_credential::{ExecCredential, ExecInfo};
use crate::pipeline;
use kubelogin_auth::{fs, new_credential};
use kubelogin_core::flags::Command;
use kubelogin_core::{EnvSource, Error, Options, Result};
use kubelogin_kubeconfig::{LoadingRules, convert_kubeconfig};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Resolve options, acquire a token and wrap it for kubectl.
pub async fn get_token(
    mut options: Options,
    env: &dyn EnvSource,
    home: Option<&Path>,
) -> Result<ExecCredential> {
    options.apply_env_overrides(env)?;
    options.apply_env_defaults(Command::GetToken, env)?;
    options.apply_default_cache_dir(home);
    options.validate()?;
    debug!(options = ?options, "Resolved get-token options");

    let exec_info = ExecInfo::from_env(env)?;
    let api_version = exec_info.response_version()?;
    debug!(interactive = exec_info.spec.interactive, "Read exec info");

    let provider = new_credential(&options, env)?;
    let token = pipeline::acquire_token(
        &options,
        env,
        provider.as_ref(),
        exec_info.spec.interactive,
    )
    .await?;
    Ok(ExecCredential::new(api_version, &token))
}

/// Rewrite the kubeconfig to exec kubelogin.
pub fn convert(mut options: Options, env: &dyn EnvSource, home: Option<&Path>) -> Result<()> {
    options.apply_env_defaults(Command::Convert, env)?;
    let rules = LoadingRules::new(&options.kubeconfig_path, env, home)?;
    let conversion = convert_kubeconfig(&rules, &options)?;
    for file in &conversion.files {
        info!(path = %file.path.display(), "Updated kubeconfig");
    }
    Ok(())
}

/// Delete the cache directory holding records, keys and tokens.
pub fn remove_cache_dir(
    mut options: Options,
    env: &dyn EnvSource,
    home: Option<&Path>,
) -> Result<()> {
    options.apply_env_defaults(Command::GetToken, env)?;
    options.apply_default_cache_dir(home);
    remove_dir(options.auth_record_cache_dir())
}

/// Delete the legacy token cache directory.
pub fn remove_tokens(mut options: Options, env: &dyn EnvSource, home: Option<&Path>) -> Result<()> {
    options.apply_env_defaults(Command::GetToken, env)?;
    options.apply_default_cache_dir(home);
    remove_dir(options.token_cache_dir())
}

fn remove_dir(dir: PathBuf) -> Result<()> {
    if dir.as_os_str().is_empty() {
        return Err(Error::config("cache directory is not set"));
    }
    fs::remove_dir_all_if_exists(&dir)?;
    info!(dir = %dir.display(), "Removed cache directory");
    Ok(())
}
