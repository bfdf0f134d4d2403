//! Authorization code flow with PKCE and a loopback redirect.

use super::user::UserSession;
use super::{CredentialProvider, single_scope};
use crate::authority::{AuthorityClient, TokenResponse};
use crate::pop::PopBinding;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use kubelogin_core::{AccessToken, AuthenticationRecord, Error, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use url::Url;

const SUCCESS_PAGE: &str = "<html><body><p>Authentication complete. You can close this window.</p></body></html>";
const FAILURE_PAGE: &str = "<html><body><p>Authentication failed. Return to the terminal for details.</p></body></html>";

/// Launches a browser at the authorization URL.
pub type BrowserOpener = Box<dyn Fn(&str) -> Result<()> + Send + Sync>;

pub struct InteractiveBrowser {
    session: UserSession,
    redirect_url: String,
    login_hint: String,
    opener: BrowserOpener,
}

struct Pkce {
    verifier: String,
    challenge: String,
}

impl Pkce {
    fn new() -> Self {
        let bytes: [u8; 32] = rand::random();
        let verifier = URL_SAFE_NO_PAD.encode(bytes);
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}

impl InteractiveBrowser {
    /// Create a new interactive browser provider.
    pub fn new(
        authority: AuthorityClient,
        client_id: &str,
        cache_dir: &Path,
        pop: Option<PopBinding>,
    ) -> Self {
        Self {
            session: UserSession::new(authority, client_id, cache_dir, pop),
            redirect_url: String::new(),
            login_hint: String::new(),
            opener: Box::new(open_browser),
        }
    }

    pub fn with_redirect_url(mut self, redirect_url: &str) -> Self {
        self.redirect_url = redirect_url.to_string();
        self
    }

    pub fn with_login_hint(mut self, login_hint: &str) -> Self {
        self.login_hint = login_hint.to_string();
        self
    }

    pub fn with_opener(mut self, opener: BrowserOpener) -> Self {
        self.opener = opener;
        self
    }

    /// Bind the loopback listener and work out the redirect URI it serves.
    async fn listen(&self) -> Result<(TcpListener, String)> {
        if self.redirect_url.is_empty() {
            let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
            let port = listener.local_addr()?.port();
            return Ok((listener, format!("http://localhost:{}", port)));
        }

        let url = Url::parse(&self.redirect_url)
            .map_err(|e| Error::config(format!("invalid --redirect-url: {}", e)))?;
        let host = match url.host_str() {
            Some("localhost") | None => "127.0.0.1",
            Some(host) => host,
        };
        let port = url.port_or_known_default().unwrap_or(0);
        let listener = TcpListener::bind((host, port)).await?;
        let mut redirect = url.clone();
        if port == 0 {
            let bound = listener.local_addr()?.port();
            redirect
                .set_port(Some(bound))
                .map_err(|_| Error::config("invalid --redirect-url"))?;
        }
        Ok((listener, redirect.to_string().trim_end_matches('/').to_string()))
    }

    fn authorize_url(
        &self,
        scope: &str,
        redirect_uri: &str,
        pkce: &Pkce,
        state: &str,
    ) -> Result<Url> {
        let authority = self.session.authority();
        let (audience_key, audience) = authority.user_audience_param(scope);
        let mut params = vec![
            ("client_id", self.session.client_id()),
            ("response_type", "code"),
            ("response_mode", "query"),
            ("redirect_uri", redirect_uri),
            (audience_key, audience.as_str()),
            ("code_challenge", pkce.challenge.as_str()),
            ("code_challenge_method", "S256"),
            ("state", state),
        ];
        if self.login_hint.is_empty() {
            params.push(("prompt", "select_account"));
        } else {
            params.push(("login_hint", self.login_hint.as_str()));
        }
        Url::parse_with_params(&authority.authorize_endpoint(), &params)
            .map_err(|e| Error::config(format!("invalid authority: {}", e)))
    }

    async fn sign_in(&self, scope: &str) -> Result<TokenResponse> {
        let (listener, redirect_uri) = self.listen().await?;
        let pkce = Pkce::new();
        let state = uuid::Uuid::new_v4().simple().to_string();
        let url = self.authorize_url(scope, &redirect_uri, &pkce, &state)?;

        eprintln!("Opening a browser to sign in. If it does not open, visit:\n{}", url);
        if let Err(e) = (self.opener)(url.as_str()) {
            warn!(error = %e, "Failed to open a browser");
        }

        let code = wait_for_code(&listener, &state).await?;
        debug!("Received authorization code");

        let authority = self.session.authority();
        let (audience_key, audience) = authority.user_audience_param(scope);
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("client_id", self.session.client_id()),
            ("code", code.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("code_verifier", pkce.verifier.as_str()),
            (audience_key, audience.as_str()),
        ];
        params.extend(self.session.pop_params());
        authority.request_token(&params).await
    }
}

/// Serve the loopback redirect until it carries a code for `state`.
async fn wait_for_code(listener: &TcpListener, state: &str) -> Result<String> {
    loop {
        let (stream, _) = listener.accept().await?;
        let (query, mut stream) = read_request(stream).await?;

        if let Some(error) = query.get("error") {
            respond(&mut stream, "200 OK", FAILURE_PAGE).await;
            return Err(Error::auth(
                Some(error.clone()),
                query
                    .get("error_description")
                    .cloned()
                    .unwrap_or_else(|| "authorization failed".to_string()),
            ));
        }
        let Some(code) = query.get("code") else {
            respond(&mut stream, "404 Not Found", "").await;
            continue;
        };
        if query.get("state").map(String::as_str) != Some(state) {
            respond(&mut stream, "400 Bad Request", FAILURE_PAGE).await;
            return Err(Error::auth(None, "authorization response state mismatch"));
        }
        respond(&mut stream, "200 OK", SUCCESS_PAGE).await;
        return Ok(code.clone());
    }
}

async fn read_request(stream: TcpStream) -> Result<(HashMap<String, String>, TcpStream)> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).await? == 0 || header.trim().is_empty() {
            break;
        }
    }

    let target = request_line.split_whitespace().nth(1).unwrap_or("/");
    let query = Url::parse(&format!("http://localhost{}", target))
        .map(|u| u.query_pairs().into_owned().collect())
        .unwrap_or_default();
    Ok((query, reader.into_inner()))
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!(error = %e, "Failed to answer loopback request");
    }
    let _ = stream.shutdown().await;
}

fn open_browser(url: &str) -> Result<()> {
    let mut command = if cfg!(target_os = "windows") {
        let mut command = std::process::Command::new("cmd");
        command.args(["/c", "start", ""]);
        command
    } else if cfg!(target_os = "macos") {
        std::process::Command::new("open")
    } else {
        std::process::Command::new("xdg-open")
    };
    command
        .arg(url)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
        .map_err(Error::from)
}

#[async_trait]
impl CredentialProvider for InteractiveBrowser {
    fn name(&self) -> &str {
        if self.session.is_pop() {
            "InteractiveBrowserWithPoP"
        } else {
            "InteractiveBrowser"
        }
    }

    fn need_authenticate(&self) -> bool {
        !self.session.has_record()
    }

    async fn authenticate(&self, scope: &str) -> Result<AuthenticationRecord> {
        let response = self.sign_in(scope).await?;
        let (_, record) = self.session.complete(scope, &response, None)?;
        info!(username = %record.username, "Signed in with browser");
        Ok(record)
    }

    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken> {
        let scope = single_scope(scopes)?;
        if let Some(token) = self.session.acquire_silent(scope).await? {
            return Ok(token);
        }
        let response = self.sign_in(scope).await?;
        self.session.complete(scope, &response, None).map(|(t, _)| t)
    }

    fn refresh_token(&self) -> Option<String> {
        self.session.last_refresh_token()
    }
}
