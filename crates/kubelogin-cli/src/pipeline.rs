//! Token acquisition for `get-token`.
//!
//! The ExecCredential-side cache is consulted first, then a refresh token
//! from that cache, and finally the credential provider itself.

use chrono::Utc;
use kubelogin_auth::providers;
use kubelogin_auth::{CachedToken, CredentialProvider, TokenCache};
use kubelogin_core::{AccessToken, EnvSource, Error, LoginMethod, Options, Result};
use tracing::{debug, info, trace, warn};

/// Produce a token for `options` using `provider` on a cache miss.
///
/// When `interactive` is false, a login that would prompt the user fails
/// instead of waiting on a device code or browser nobody can answer.
pub async fn acquire_token(
    options: &Options,
    env: &dyn EnvSource,
    provider: &dyn CredentialProvider,
    interactive: bool,
) -> Result<AccessToken> {
    let scope = options.scope();
    let audience = options.target_audience();

    // PoP tokens are bound to a single request and are never cached.
    let cache = (options.login_method.uses_token_cache() && !options.is_pop_enabled)
        .then(|| TokenCache::new(&options.token_cache_dir(), options));

    if let Some(cache) = &cache
        && let Some(entry) = read_or_warn(cache)
    {
        if entry.is_fresh_for(&audience, Utc::now()) {
            debug!(path = %cache.path().display(), "Using cached token");
            return Ok(entry.to_access_token());
        }
        if entry.can_refresh() {
            match refresh(options, env, &entry).await {
                Ok(refreshed) => {
                    info!("Refreshed cached token");
                    write_or_warn(cache, &refreshed);
                    return Ok(refreshed.to_access_token());
                }
                Err(e) => trace!(error = %e, "Token refresh failed, acquiring a new token"),
            }
        }
    }

    if provider.need_authenticate() {
        if !interactive && prompts_user(options.login_method) {
            return Err(Error::config(format!(
                "login method {} needs user interaction but kubectl reports a non-interactive session",
                options.login_method
            )));
        }
        debug!(provider = %provider.name(), "Authenticating");
        provider.authenticate(&scope).await?;
    }
    let token = provider.get_token(&[scope.as_str()]).await?;
    debug!(provider = %provider.name(), expires_on = %token.expires_on, "Acquired token");

    if let Some(cache) = &cache {
        let entry = CachedToken::new(&token, provider.refresh_token(), &audience);
        write_or_warn(cache, &entry);
    }
    Ok(token)
}

fn prompts_user(method: LoginMethod) -> bool {
    matches!(method, LoginMethod::DeviceCode | LoginMethod::Interactive)
}

async fn refresh(
    options: &Options,
    env: &dyn EnvSource,
    entry: &CachedToken,
) -> Result<CachedToken> {
    let authority = providers::authority_client(options, env)?;
    let response = authority
        .refresh_token(&options.client_id, &entry.refresh_token, &options.scope(), &[])
        .await?;
    let refresh_token = response
        .refresh_token
        .clone()
        .filter(|rt| !rt.is_empty())
        .unwrap_or_else(|| entry.refresh_token.clone());
    Ok(CachedToken::new(
        &response.to_access_token(),
        Some(refresh_token),
        &options.target_audience(),
    ))
}

fn read_or_warn(cache: &TokenCache) -> Option<CachedToken> {
    match cache.read() {
        Ok(entry) => entry,
        Err(e) => {
            warn!(path = %cache.path().display(), error = %e, "Failed to read token cache");
            None
        }
    }
}

fn write_or_warn(cache: &TokenCache, entry: &CachedToken) {
    if let Err(e) = cache.write(entry) {
        warn!(path = %cache.path().display(), error = %e, "Failed to write token cache");
    }
}
