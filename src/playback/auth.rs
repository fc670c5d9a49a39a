//! OAuth session for the remote playback API
//!
//! Uses the authorization-code flow with a cached refresh token. The first
//! run needs a browser: the authorize URL is logged and the redirect is
//! caught by a one-shot listener on the redirect URI's port.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Permissions needed to read and control playback
pub const SCOPE: &str = "user-read-playback-state user-modify-playback-state";

/// Refresh this long before the token actually expires
const EXPIRY_MARGIN_SECS: i64 = 60;

/// How long to wait for the browser redirect
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token endpoint returned {status}: {body}")]
    TokenEndpoint { status: u16, body: String },

    #[error("token cache {path}: {reason}")]
    Cache { path: PathBuf, reason: String },

    #[error("invalid authorization callback: {0}")]
    Callback(String),

    #[error("authorization state mismatch")]
    StateMismatch,

    #[error("timed out waiting for authorization")]
    Timeout,
}

/// Client credentials for the authorization-code flow
#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// Token persisted between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub scope: String,
}

impl CachedToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now + chrono::Duration::seconds(EXPIRY_MARGIN_SECS) >= self.expires_at
    }

    /// Whether this token was granted every scope we need
    pub fn covers_scope(&self, scope: &str) -> bool {
        let granted: Vec<&str> = self.scope.split_whitespace().collect();
        scope.split_whitespace().all(|s| granted.contains(&s))
    }
}

/// Response body of the token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    /// Keep the previous refresh token when the endpoint omits a new one
    fn into_cached(self, previous_refresh: Option<String>, now: DateTime<Utc>) -> CachedToken {
        CachedToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: now + chrono::Duration::seconds(self.expires_in),
            scope: self.scope.unwrap_or_else(|| SCOPE.to_string()),
        }
    }
}

/// JSON file holding the cached token
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached token; a missing file is not an error
    pub fn load(&self) -> Result<Option<CachedToken>, AuthError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.cache_error(e)),
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| self.cache_error(e))
    }

    pub fn save(&self, token: &CachedToken) -> Result<(), AuthError> {
        let json = serde_json::to_string_pretty(token).map_err(|e| self.cache_error(e))?;
        std::fs::write(&self.path, json).map_err(|e| self.cache_error(e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| self.cache_error(e))?;
        }

        Ok(())
    }

    fn cache_error(&self, e: impl std::fmt::Display) -> AuthError {
        AuthError::Cache {
            path: self.path.clone(),
            reason: e.to_string(),
        }
    }
}

/// Authorized session that hands out fresh access tokens
pub struct OAuthSession {
    client: Client,
    credentials: OAuthCredentials,
    store: TokenStore,
    accounts_base: String,
    token: Mutex<CachedToken>,
}

impl OAuthSession {
    /// Restore the cached token, refreshing or re-authorizing as needed
    pub async fn connect(
        client: Client,
        credentials: OAuthCredentials,
        store: TokenStore,
        accounts_base: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let accounts_base = accounts_base.into();

        let cached = match store.load() {
            Ok(cached) => cached.filter(|token| token.covers_scope(SCOPE)),
            Err(e) => {
                warn!(error = %e, "ignoring unreadable token cache");
                None
            }
        };

        let token = match cached {
            Some(token) if !token.is_expired(Utc::now()) => {
                debug!(path = %store.path().display(), "using cached token");
                token
            }
            Some(CachedToken {
                refresh_token: Some(refresh_token),
                ..
            }) => {
                match refresh(&client, &credentials, &accounts_base, &refresh_token).await {
                    Ok(token) => token,
                    Err(e) => {
                        warn!(error = %e, "token refresh failed, re-authorizing");
                        authorize_interactively(&client, &credentials, &accounts_base).await?
                    }
                }
            }
            _ => authorize_interactively(&client, &credentials, &accounts_base).await?,
        };

        if let Err(e) = store.save(&token) {
            warn!(error = %e, "failed to write token cache");
        }

        Ok(Self {
            client,
            credentials,
            store,
            accounts_base,
            token: Mutex::new(token),
        })
    }

    /// A valid access token, refreshed first if it is about to expire
    pub async fn access_token(&self) -> Result<String, AuthError> {
        let mut token = self.token.lock().await;

        if token.is_expired(Utc::now()) {
            let Some(refresh_token) = token.refresh_token.clone() else {
                return Err(AuthError::TokenEndpoint {
                    status: 401,
                    body: "token expired and no refresh token is cached".to_string(),
                });
            };

            let fresh = refresh(
                &self.client,
                &self.credentials,
                &self.accounts_base,
                &refresh_token,
            )
            .await?;

            if let Err(e) = self.store.save(&fresh) {
                warn!(error = %e, "failed to write token cache");
            }
            *token = fresh;
        }

        Ok(token.access_token.clone())
    }

    /// Force the next `access_token` call to refresh
    pub async fn invalidate(&self) {
        let mut token = self.token.lock().await;
        token.expires_at = Utc::now();
    }
}

/// Browser URL the user opens to grant access
pub fn authorize_url(
    accounts_base: &str,
    credentials: &OAuthCredentials,
    state: &str,
) -> Result<Url, AuthError> {
    let mut url = Url::parse(&format!("{}/authorize", accounts_base.trim_end_matches('/')))
        .map_err(|e| AuthError::Callback(e.to_string()))?;

    url.query_pairs_mut()
        .append_pair("client_id", &credentials.client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", &credentials.redirect_uri)
        .append_pair("scope", SCOPE)
        .append_pair("state", state);

    Ok(url)
}

/// Extract the authorization code from the callback's HTTP request line
pub fn parse_callback(request_line: &str, expected_state: &str) -> Result<String, AuthError> {
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| AuthError::Callback(format!("malformed request: {}", request_line)))?;

    let url = Url::parse(&format!("http://localhost{}", target))
        .map_err(|e| AuthError::Callback(e.to_string()))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => return Err(AuthError::Callback(value.into_owned())),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Err(AuthError::StateMismatch);
    }

    code.ok_or_else(|| AuthError::Callback("no authorization code in callback".to_string()))
}

async fn refresh(
    client: &Client,
    credentials: &OAuthCredentials,
    accounts_base: &str,
    refresh_token: &str,
) -> Result<CachedToken, AuthError> {
    debug!("refreshing access token");
    let response = request_token(
        client,
        credentials,
        accounts_base,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ],
    )
    .await?;

    Ok(response.into_cached(Some(refresh_token.to_string()), Utc::now()))
}

async fn authorize_interactively(
    client: &Client,
    credentials: &OAuthCredentials,
    accounts_base: &str,
) -> Result<CachedToken, AuthError> {
    let redirect = Url::parse(&credentials.redirect_uri)
        .map_err(|e| AuthError::Callback(format!("invalid redirect URI: {}", e)))?;
    let host = redirect.host_str().unwrap_or("localhost").to_string();
    let port = redirect.port_or_known_default().unwrap_or(8888);

    let state: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();

    let listener = TcpListener::bind((host.as_str(), port))
        .await
        .map_err(|e| AuthError::Callback(format!("cannot listen on {}:{}: {}", host, port, e)))?;

    let url = authorize_url(accounts_base, credentials, &state)?;
    info!("authorization required - open this URL in a browser:");
    info!("{}", url);

    let code = tokio::time::timeout(CALLBACK_TIMEOUT, wait_for_callback(&listener, &state))
        .await
        .map_err(|_| AuthError::Timeout)??;

    let response = request_token(
        client,
        credentials,
        accounts_base,
        &[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", credentials.redirect_uri.as_str()),
        ],
    )
    .await?;

    info!("authorization complete");
    Ok(response.into_cached(None, Utc::now()))
}

/// Accept connections until one carries a valid callback
async fn wait_for_callback(listener: &TcpListener, state: &str) -> Result<String, AuthError> {
    loop {
        let (mut stream, _) = listener
            .accept()
            .await
            .map_err(|e| AuthError::Callback(e.to_string()))?;

        let mut buf = vec![0u8; 8192];
        let n = stream
            .read(&mut buf)
            .await
            .map_err(|e| AuthError::Callback(e.to_string()))?;
        let request = String::from_utf8_lossy(&buf[..n]);
        let request_line = request.lines().next().unwrap_or_default();

        let result = parse_callback(request_line, state);
        let body = match &result {
            Ok(_) => "Authorization complete. You can close this window.",
            Err(_) => "Authorization failed. Check the daemon log.",
        };
        let reply = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let _ = stream.write_all(reply.as_bytes()).await;

        match result {
            Ok(code) => return Ok(code),
            // Browsers also ask for /favicon.ico
            Err(AuthError::StateMismatch) if !request_line.contains("state=") => continue,
            Err(e) => return Err(e),
        }
    }
}

async fn request_token(
    client: &Client,
    credentials: &OAuthCredentials,
    accounts_base: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse, AuthError> {
    let url = format!("{}/api/token", accounts_base.trim_end_matches('/'));
    let response = client
        .post(&url)
        .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
        .form(form)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::TokenEndpoint {
            status: status.as_u16(),
            body,
        });
    }

    Ok(response.json().await?)
}
