//! Configuration loading and management
//!
//! Everything comes from environment variables (optionally seeded from a
//! `.env` file). There are no command-line flags.

use std::path::PathBuf;
use std::time::Duration;

use crate::hotkey::{HotKey, HotkeyBindings, DEBOUNCE_WINDOW};
use crate::playback::OAuthCredentials;
use crate::sampler::{GameLayout, GameVersion};

pub const DEFAULT_PROCESS_NAME: &str = "gta_sa.exe";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8888/callback";
pub const DEFAULT_TOKEN_CACHE: &str = ".spotify_cache";
pub const DEFAULT_PLAYER_PROCESS: &str = "Spotify.exe";

/// Errors in user-supplied configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("RADIO_MIRROR_BACKEND must be \"remote\" or \"window\", got {0:?}")]
    InvalidBackend(String),

    #[error("unknown game version {0:?}")]
    UnknownGameVersion(String),

    #[error("{key} is not a valid number: {value:?}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key}: {source}")]
    InvalidKey {
        key: &'static str,
        source: crate::hotkey::UnknownKey,
    },
}

/// Which playback backend drives the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Remote control API over OAuth
    #[default]
    Remote,
    /// Key messages to the local player window
    Window,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Remote => write!(f, "remote"),
            BackendKind::Window => write!(f, "window"),
        }
    }
}

/// Settings for the remote API backend
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    /// Where the OAuth token is cached between runs
    pub token_cache: PathBuf,
    pub api_base: String,
    pub accounts_base: String,
}

impl RemoteConfig {
    /// Credentials, if both id and secret are set
    pub fn credentials(&self) -> Option<OAuthCredentials> {
        Some(OAuthCredentials {
            client_id: self.client_id.clone()?,
            client_secret: self.client_secret.clone()?,
            redirect_uri: self.redirect_uri.clone(),
        })
    }
}

/// Settings for the window automation backend
#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub process_name: String,
    /// Title the player shows while idle
    #[cfg_attr(not(windows), allow(dead_code))]
    pub idle_title_prefix: String,
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Game executable to attach to
    pub process_name: String,
    pub layout: GameLayout,
    pub backend: BackendKind,
    pub remote: RemoteConfig,
    pub window: WindowConfig,
    pub hotkeys: HotkeyBindings,
    pub debounce: Duration,
    /// Delay between samples while attached
    pub sample_interval: Duration,
    /// Delay between attach attempts while the game is not running
    pub attach_retry_interval: Duration,
    /// Bounded wait for the monitor to stop
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend = match get("RADIO_MIRROR_BACKEND") {
            None => BackendKind::default(),
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "remote" | "spotify" | "api" => BackendKind::Remote,
                "window" | "desktop" | "local" => BackendKind::Window,
                _ => return Err(ConfigError::InvalidBackend(value)),
            },
        };

        let mut layout = match get("RADIO_MIRROR_GAME_VERSION") {
            None => GameLayout::default(),
            Some(name) => GameVersion::from_name(&name)
                .ok_or(ConfigError::UnknownGameVersion(name))?
                .layout(),
        };
        if let Some(offset) = parse_number(&get, "RADIO_MIRROR_STATION_OFFSET")? {
            layout.station_offset = offset;
        }
        if let Some(offset) = parse_number(&get, "RADIO_MIRROR_VEHICLE_OFFSET")? {
            layout.vehicle_offset = offset;
        }
        if let Some(id) = parse_number(&get, "RADIO_MIRROR_USER_RADIO_ID")? {
            layout.user_radio_station =
                u8::try_from(id).map_err(|_| ConfigError::InvalidNumber {
                    key: "RADIO_MIRROR_USER_RADIO_ID",
                    value: id.to_string(),
                })?;
        }

        let defaults = HotkeyBindings::default();
        let hotkeys = HotkeyBindings {
            previous: parse_key(&get, "RADIO_MIRROR_PREV_KEY")?.unwrap_or(defaults.previous),
            next: parse_key(&get, "RADIO_MIRROR_NEXT_KEY")?.unwrap_or(defaults.next),
        };

        let remote = RemoteConfig {
            client_id: get("SPOTIPY_CLIENT_ID"),
            client_secret: get("SPOTIPY_CLIENT_SECRET"),
            redirect_uri: get("SPOTIPY_REDIRECT_URI")
                .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string()),
            token_cache: get("RADIO_MIRROR_TOKEN_CACHE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_CACHE)),
            api_base: "https://api.spotify.com".to_string(),
            accounts_base: "https://accounts.spotify.com".to_string(),
        };

        let window = WindowConfig {
            process_name: get("RADIO_MIRROR_PLAYER_PROCESS")
                .unwrap_or_else(|| DEFAULT_PLAYER_PROCESS.to_string()),
            idle_title_prefix: "Spotify".to_string(),
        };

        Ok(Self {
            process_name: get("RADIO_MIRROR_PROCESS")
                .unwrap_or_else(|| DEFAULT_PROCESS_NAME.to_string()),
            layout,
            backend,
            remote,
            window,
            hotkeys,
            debounce: DEBOUNCE_WINDOW,
            sample_interval: Duration::from_secs(1),
            attach_retry_interval: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(2),
        })
    }
}

/// Parse a hex (`0x`-prefixed) or decimal number
fn parse_number<G>(get: &G, key: &'static str) -> Result<Option<u64>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(value) = get(key) else {
        return Ok(None);
    };

    let trimmed = value.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => trimmed.replace('_', "").parse(),
    };

    parsed
        .map(Some)
        .map_err(|_| ConfigError::InvalidNumber { key, value })
}

fn parse_key<G>(get: &G, key: &'static str) -> Result<Option<HotKey>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|value| value.parse::<HotKey>())
        .transpose()
        .map_err(|source| ConfigError::InvalidKey { key, source })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.process_name, "gta_sa.exe");
        assert_eq!(config.backend, BackendKind::Remote);
        assert_eq!(config.layout, GameVersion::V1_0Us.layout());
        assert_eq!(config.remote.redirect_uri, "http://localhost:8888/callback");
        assert_eq!(config.remote.token_cache, PathBuf::from(".spotify_cache"));
        assert!(config.remote.credentials().is_none());
        assert_eq!(config.hotkeys, HotkeyBindings::default());
        assert_eq!(config.debounce, Duration::from_millis(300));
        assert_eq!(config.sample_interval, Duration::from_secs(1));
        assert_eq!(config.attach_retry_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_credentials_need_id_and_secret() {
        let config = load(&[("SPOTIPY_CLIENT_ID", "id")]).unwrap();
        assert!(config.remote.credentials().is_none());

        let config = load(&[
            ("SPOTIPY_CLIENT_ID", "id"),
            ("SPOTIPY_CLIENT_SECRET", "secret"),
            ("SPOTIPY_REDIRECT_URI", "http://127.0.0.1:9000/cb"),
        ])
        .unwrap();
        let credentials = config.remote.credentials().unwrap();
        assert_eq!(credentials.client_id, "id");
        assert_eq!(credentials.redirect_uri, "http://127.0.0.1:9000/cb");
    }

    #[test]
    fn test_backend_selection() {
        assert_eq!(
            load(&[("RADIO_MIRROR_BACKEND", "Window")]).unwrap().backend,
            BackendKind::Window
        );
        assert_eq!(
            load(&[("RADIO_MIRROR_BACKEND", "bluetooth")]).unwrap_err(),
            ConfigError::InvalidBackend("bluetooth".to_string())
        );
    }

    #[test]
    fn test_layout_overrides() {
        let config = load(&[
            ("RADIO_MIRROR_STATION_OFFSET", "0x4CB7A6"),
            ("RADIO_MIRROR_VEHICLE_OFFSET", "8000000"),
            ("RADIO_MIRROR_USER_RADIO_ID", "11"),
        ])
        .unwrap();
        assert_eq!(config.layout.station_offset, 0x4CB7A6);
        assert_eq!(config.layout.vehicle_offset, 8_000_000);
        assert_eq!(config.layout.user_radio_station, 11);
    }

    #[test]
    fn test_invalid_numbers() {
        assert!(matches!(
            load(&[("RADIO_MIRROR_STATION_OFFSET", "0xZZ")]),
            Err(ConfigError::InvalidNumber { key: "RADIO_MIRROR_STATION_OFFSET", .. })
        ));
        assert!(matches!(
            load(&[("RADIO_MIRROR_USER_RADIO_ID", "300")]),
            Err(ConfigError::InvalidNumber { .. })
        ));
        assert_eq!(
            load(&[("RADIO_MIRROR_GAME_VERSION", "2.0")]).unwrap_err(),
            ConfigError::UnknownGameVersion("2.0".to_string())
        );
    }

    #[test]
    fn test_hotkey_overrides() {
        let config = load(&[
            ("RADIO_MIRROR_PREV_KEY", "PageUp"),
            ("RADIO_MIRROR_NEXT_KEY", "PageDown"),
        ])
        .unwrap();
        assert_eq!(config.hotkeys.previous, HotKey::PageUp);
        assert_eq!(config.hotkeys.next, HotKey::PageDown);

        assert!(matches!(
            load(&[("RADIO_MIRROR_NEXT_KEY", "mouse4")]),
            Err(ConfigError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = load(&[("RADIO_MIRROR_PROCESS", "  "), ("SPOTIPY_CLIENT_ID", "")]).unwrap();
        assert_eq!(config.process_name, "gta_sa.exe");
        assert!(config.remote.client_id.is_none());
    }
}
