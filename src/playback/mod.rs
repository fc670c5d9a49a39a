//! Playback control
//!
//! `PlaybackController` turns radio events and navigation requests into
//! commands for one `PlaybackBackend`, chosen at startup:
//! - `remote`: the Spotify Web API over OAuth
//! - `window`: key messages posted to the desktop player's window

mod auth;
mod controller;
mod remote;
#[cfg_attr(not(windows), allow(dead_code))]
mod window;

pub use auth::OAuthCredentials;
pub use controller::PlaybackController;
pub use remote::RemoteApiBackend;
#[cfg_attr(not(windows), allow(unused_imports))]
pub use window::WindowAutomationBackend;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::{BackendKind, Config};
use crate::state::RadioState;

/// Track navigation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Previous,
    Next,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Previous => write!(f, "previous"),
            Direction::Next => write!(f, "next"),
        }
    }
}

/// Errors reported by playback backends
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// No device or window to send commands to
    #[error("playback target not available: {0}")]
    NotReady(String),

    #[error("permission denied: {0}")]
    Forbidden(String),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response {status}: {body}")]
    Api { status: u16, body: String },
}

impl BackendError {
    /// Failures worth retrying after a short delay
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Transport(_) => true,
            BackendError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// A playback target the controller can drive
#[async_trait]
pub trait PlaybackBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// True when `resume` and `pause` send the same play/pause toggle.
    /// Such a backend must never be driven while its status is unknown.
    fn toggles_playback(&self) -> bool {
        false
    }

    /// `Some(true)` when playing, `Some(false)` when paused or idle,
    /// `None` when the backend cannot tell
    async fn is_playing(&self) -> Result<Option<bool>, BackendError>;

    /// Re-resolve the device or window. Returns whether a target was found.
    async fn refresh_target(&self) -> Result<bool, BackendError>;

    async fn resume(&self) -> Result<(), BackendError>;

    /// Pause, keeping the playback position
    async fn pause(&self) -> Result<(), BackendError>;

    async fn skip(&self, direction: Direction) -> Result<(), BackendError>;
}

/// Build the controller for the configured backend.
///
/// Missing credentials or a failed backend setup leave the controller
/// disabled rather than stopping the daemon.
pub async fn connect(config: &Config, radio_state: RadioState) -> PlaybackController {
    match config.backend {
        BackendKind::Remote => connect_remote(config, radio_state).await,
        BackendKind::Window => connect_window(config, radio_state),
    }
}

async fn connect_remote(config: &Config, radio_state: RadioState) -> PlaybackController {
    let Some(credentials) = config.remote.credentials() else {
        warn!("remote playback credentials not found");
        warn!("set SPOTIPY_CLIENT_ID and SPOTIPY_CLIENT_SECRET to enable playback control");
        return PlaybackController::disabled(
            "credentials missing: set SPOTIPY_CLIENT_ID and SPOTIPY_CLIENT_SECRET",
            radio_state,
        );
    };

    match RemoteApiBackend::connect(&config.remote, credentials).await {
        Ok(backend) => {
            info!(backend = backend.name(), "playback backend connected");
            PlaybackController::new(Box::new(backend), radio_state)
        }
        Err(e) => {
            error!(error = %e, "failed to initialize remote playback");
            warn!("playback control disabled - check credentials and network connection");
            PlaybackController::disabled(format!("remote setup failed: {}", e), radio_state)
        }
    }
}

#[cfg(windows)]
fn connect_window(config: &Config, radio_state: RadioState) -> PlaybackController {
    let backend = WindowAutomationBackend::new(
        window::NativeWindows::new(),
        config.window.process_name.clone(),
        config.window.idle_title_prefix.clone(),
    );
    info!(
        backend = backend.name(),
        player = %config.window.process_name,
        "playback backend ready"
    );
    PlaybackController::new(Box::new(backend), radio_state)
}

#[cfg(not(windows))]
fn connect_window(config: &Config, radio_state: RadioState) -> PlaybackController {
    warn!(
        player = %config.window.process_name,
        "window automation is only available on Windows"
    );
    PlaybackController::disabled("window automation requires Windows", radio_state)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// A backend call observed by `RecordingBackend`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Call {
        Status,
        Refresh,
        Resume,
        Pause,
        Skip(Direction),
    }

    #[derive(Default)]
    struct Script {
        calls: Vec<Call>,
        status: Option<Result<Option<bool>, BackendError>>,
        command_results: VecDeque<Result<(), BackendError>>,
        refresh_result: Option<Result<bool, BackendError>>,
        toggles: bool,
    }

    /// Backend that records every call and replays scripted results
    #[derive(Clone, Default)]
    pub struct RecordingBackend {
        script: Arc<Mutex<Script>>,
    }

    impl RecordingBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<Call> {
            self.script.lock().unwrap().calls.clone()
        }

        pub fn count(&self, call: Call) -> usize {
            self.calls().iter().filter(|c| **c == call).count()
        }

        pub fn set_status(&self, status: Result<Option<bool>, BackendError>) {
            self.script.lock().unwrap().status = Some(status);
        }

        /// Queue results for upcoming resume/pause/skip calls
        pub fn push_command_result(&self, result: Result<(), BackendError>) {
            self.script.lock().unwrap().command_results.push_back(result);
        }

        pub fn set_refresh_result(&self, result: Result<bool, BackendError>) {
            self.script.lock().unwrap().refresh_result = Some(result);
        }

        /// Behave like a backend whose resume and pause share one toggle
        pub fn set_toggles(&self, toggles: bool) {
            self.script.lock().unwrap().toggles = toggles;
        }

        fn record(&self, call: Call) {
            self.script.lock().unwrap().calls.push(call);
        }

        fn next_command_result(&self, call: Call) -> Result<(), BackendError> {
            let mut script = self.script.lock().unwrap();
            script.calls.push(call);
            script.command_results.pop_front().unwrap_or(Ok(()))
        }
    }

    #[async_trait]
    impl PlaybackBackend for RecordingBackend {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn toggles_playback(&self) -> bool {
            self.script.lock().unwrap().toggles
        }

        async fn is_playing(&self) -> Result<Option<bool>, BackendError> {
            self.record(Call::Status);
            self.script.lock().unwrap().status.clone().unwrap_or(Ok(None))
        }

        async fn refresh_target(&self) -> Result<bool, BackendError> {
            self.record(Call::Refresh);
            self.script
                .lock()
                .unwrap()
                .refresh_result
                .clone()
                .unwrap_or(Ok(true))
        }

        async fn resume(&self) -> Result<(), BackendError> {
            self.next_command_result(Call::Resume)
        }

        async fn pause(&self) -> Result<(), BackendError> {
            self.next_command_result(Call::Pause)
        }

        async fn skip(&self, direction: Direction) -> Result<(), BackendError> {
            self.next_command_result(Call::Skip(direction))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(BackendError::Transport("reset".into()).is_transient());
        assert!(BackendError::Api {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(BackendError::Api {
            status: 429,
            body: String::new()
        }
        .is_transient());
        assert!(!BackendError::Api {
            status: 400,
            body: String::new()
        }
        .is_transient());
        assert!(!BackendError::NotReady("no device".into()).is_transient());
        assert!(!BackendError::Forbidden("premium required".into()).is_transient());
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(Direction::Next.to_string(), "next");
        assert_eq!(Direction::Previous.to_string(), "previous");
    }
}
