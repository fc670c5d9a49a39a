//! Remote playback backend (Spotify Web API)
//!
//! Commands target a cached device id. A 404 means the device went away:
//! the cache is cleared and the controller asks for a refresh.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::auth::{OAuthCredentials, OAuthSession, TokenStore};
use super::{BackendError, Direction, PlaybackBackend};
use crate::config::RemoteConfig;
use crate::retry::RetryPolicy;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A playback device as listed by the API
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Device {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_restricted: bool,
}

#[derive(Debug, Deserialize)]
struct DeviceList {
    devices: Vec<Device>,
}

#[derive(Debug, Deserialize)]
struct PlaybackStatus {
    is_playing: bool,
}

/// Prefer the active device, otherwise the first controllable one
pub fn select_device(devices: &[Device]) -> Option<&Device> {
    let usable = |d: &&Device| d.id.is_some() && !d.is_restricted;

    devices
        .iter()
        .filter(usable)
        .find(|d| d.is_active)
        .or_else(|| devices.iter().find(usable))
}

/// Map an unsuccessful HTTP status onto a backend error
pub fn classify_status(status: StatusCode, body: String) -> BackendError {
    match status {
        StatusCode::NOT_FOUND => BackendError::NotReady(if body.is_empty() {
            "no active device".to_string()
        } else {
            body
        }),
        StatusCode::FORBIDDEN => BackendError::Forbidden(body),
        StatusCode::UNAUTHORIZED => BackendError::Unauthorized(body),
        _ => BackendError::Api {
            status: status.as_u16(),
            body,
        },
    }
}

pub struct RemoteApiBackend {
    client: Client,
    auth: OAuthSession,
    api_base: String,
    device: RwLock<Option<Device>>,
    retry: RetryPolicy,
}

impl RemoteApiBackend {
    /// Authorize and pick an initial device.
    ///
    /// Having no device yet is fine; one is resolved on first use.
    pub async fn connect(
        config: &RemoteConfig,
        credentials: OAuthCredentials,
    ) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Transport(format!("failed to create HTTP client: {}", e)))?;

        let auth = OAuthSession::connect(
            client.clone(),
            credentials,
            TokenStore::new(&config.token_cache),
            config.accounts_base.clone(),
        )
        .await
        .map_err(|e| BackendError::Unauthorized(e.to_string()))?;

        let backend = Self {
            client,
            auth,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            device: RwLock::new(None),
            retry: RetryPolicy::default(),
        };

        match backend.refresh_target().await {
            Ok(true) => {}
            Ok(false) => {
                warn!("no playback devices found");
                warn!("open the player on a device (desktop app, web player, or phone)");
            }
            Err(e) => warn!(error = %e, "could not list playback devices"),
        }

        Ok(backend)
    }

    async fn device_id(&self) -> Option<String> {
        self.device.read().await.as_ref().and_then(|d| d.id.clone())
    }

    /// Send one request with retries for transient failures
    async fn send(
        &self,
        method: Method,
        path: &str,
        device_id: Option<&str>,
    ) -> Result<reqwest::Response, BackendError> {
        let label = format!("{} {}", method, path);
        self.retry
            .run(
                &label,
                || self.send_once(method.clone(), path, device_id),
                BackendError::is_transient,
            )
            .await
    }

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        device_id: Option<&str>,
    ) -> Result<reqwest::Response, BackendError> {
        let token = self
            .auth
            .access_token()
            .await
            .map_err(|e| BackendError::Unauthorized(e.to_string()))?;

        let url = format!("{}{}", self.api_base, path);
        let mut request = self.client.request(method.clone(), &url).bearer_auth(token);
        if let Some(device_id) = device_id {
            request = request.query(&[("device_id", device_id)]);
        }
        if method == Method::PUT || method == Method::POST {
            request = request.header(CONTENT_LENGTH, 0u64);
        }

        let started = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        debug!(
            %method,
            path,
            status = status.as_u16(),
            duration_ms = started.elapsed().as_millis() as u64,
            "remote API response"
        );

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error = classify_status(status, body);

        match &error {
            BackendError::NotReady(_) => {
                // The cached device is gone
                *self.device.write().await = None;
            }
            BackendError::Unauthorized(_) => self.auth.invalidate().await,
            _ => {}
        }

        Err(error)
    }

    async fn command(&self, method: Method, path: &str) -> Result<(), BackendError> {
        let device_id = self.device_id().await;
        self.send(method, path, device_id.as_deref()).await?;
        Ok(())
    }
}

#[async_trait]
impl PlaybackBackend for RemoteApiBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn is_playing(&self) -> Result<Option<bool>, BackendError> {
        let response = self.send(Method::GET, "/v1/me/player", None).await?;

        // 204: nothing is playing on any device
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Some(false));
        }

        let status: PlaybackStatus = response
            .json()
            .await
            .map_err(|e| BackendError::Transport(format!("invalid playback status: {}", e)))?;
        Ok(Some(status.is_playing))
    }

    async fn refresh_target(&self) -> Result<bool, BackendError> {
        let response = self.send(Method::GET, "/v1/me/player/devices", None).await?;
        let list: DeviceList = response
            .json()
            .await
            .map_err(|e| BackendError::Transport(format!("invalid device list: {}", e)))?;

        let selected = select_device(&list.devices).cloned();
        match &selected {
            Some(device) => info!(
                device = %device.name,
                active = device.is_active,
                "playback device selected"
            ),
            None => warn!(listed = list.devices.len(), "no usable playback devices"),
        }

        let found = selected.is_some();
        *self.device.write().await = selected;
        Ok(found)
    }

    async fn resume(&self) -> Result<(), BackendError> {
        self.command(Method::PUT, "/v1/me/player/play").await
    }

    async fn pause(&self) -> Result<(), BackendError> {
        self.command(Method::PUT, "/v1/me/player/pause").await
    }

    async fn skip(&self, direction: Direction) -> Result<(), BackendError> {
        let path = match direction {
            Direction::Next => "/v1/me/player/next",
            Direction::Previous => "/v1/me/player/previous",
        };
        self.command(Method::POST, path).await
    }
}
