//! Playback controller
//!
//! Maps radio events and navigation requests onto backend commands.
//! Nothing here is fatal: every failure is logged and the next event
//! tries again.

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{BackendError, Direction, PlaybackBackend};
use crate::events::RadioEvent;
use crate::state::RadioState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Resume,
    Pause,
    Skip(Direction),
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Resume => write!(f, "resume"),
            Command::Pause => write!(f, "pause"),
            Command::Skip(direction) => write!(f, "skip {}", direction),
        }
    }
}

/// Drives the configured playback backend
pub struct PlaybackController {
    backend: Option<Box<dyn PlaybackBackend>>,
    /// Why playback control is off, when `backend` is `None`
    disabled_reason: String,
    radio_state: RadioState,
    /// Last successful resume/pause. Also serialises activate/deactivate.
    last_toggle: Mutex<Option<Command>>,
}

impl PlaybackController {
    pub fn new(backend: Box<dyn PlaybackBackend>, radio_state: RadioState) -> Self {
        Self {
            backend: Some(backend),
            disabled_reason: String::new(),
            radio_state,
            last_toggle: Mutex::new(None),
        }
    }

    /// A controller that logs `reason` and otherwise does nothing
    pub fn disabled(reason: impl Into<String>, radio_state: RadioState) -> Self {
        Self {
            backend: None,
            disabled_reason: reason.into(),
            radio_state,
            last_toggle: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Apply a state machine event
    pub async fn apply(&self, event: &RadioEvent) {
        match event {
            RadioEvent::Activated { .. } => self.activate().await,
            RadioEvent::Deactivated { .. } => self.deactivate().await,
        }
    }

    /// Start playback unless it is already playing
    pub async fn activate(&self) {
        self.toggle(Command::Resume).await;
    }

    /// Pause playback unless it is already paused
    pub async fn deactivate(&self) {
        self.toggle(Command::Pause).await;
    }

    /// Skip a track, but only while the user radio is active
    pub async fn navigate(&self, direction: Direction) {
        if !self.radio_state.is_active() {
            debug!(%direction, "user radio inactive, navigation suppressed");
            return;
        }

        let Some(backend) = self.backend() else {
            return;
        };

        let command = Command::Skip(direction);
        let result = self.issue_with_refresh(backend, command).await;
        report(backend, command, &result);
    }

    fn backend(&self) -> Option<&dyn PlaybackBackend> {
        match &self.backend {
            Some(backend) => Some(backend.as_ref()),
            None => {
                warn!(reason = %self.disabled_reason, "playback control disabled, command ignored");
                None
            }
        }
    }

    async fn toggle(&self, command: Command) {
        let Some(backend) = self.backend() else {
            return;
        };

        let mut last_toggle = self.last_toggle.lock().await;
        let want_playing = command == Command::Resume;

        let (status, refreshed) = status_with_refresh(backend).await;
        match &status {
            Ok(Some(playing)) if *playing == want_playing => {
                info!(
                    backend = backend.name(),
                    playing = *playing,
                    "playback already in requested state, no action needed"
                );
                *last_toggle = Some(command);
                return;
            }
            Ok(Some(_)) => {}
            Ok(None) => {}
            Err(e) => {
                debug!(backend = backend.name(), error = %e, "playback status unavailable");
            }
        }

        if !matches!(status, Ok(Some(_))) {
            if backend.toggles_playback() {
                warn!(
                    backend = backend.name(),
                    %command,
                    "player state unknown, not sending play/pause toggle"
                );
                return;
            }
            if *last_toggle == Some(command) {
                info!(backend = backend.name(), %command, "command already issued, skipping");
                return;
            }
        }

        // The one refresh may already have been spent on the status check
        let result = if refreshed {
            issue(backend, command).await
        } else {
            self.issue_with_refresh(backend, command).await
        };
        if result.is_ok() {
            *last_toggle = Some(command);
        }
        report(backend, command, &result);
    }

    /// Issue a command; on `NotReady`, refresh the target once and retry once
    async fn issue_with_refresh(
        &self,
        backend: &dyn PlaybackBackend,
        command: Command,
    ) -> Result<(), BackendError> {
        match issue(backend, command).await {
            Err(BackendError::NotReady(reason)) => {
                info!(backend = backend.name(), %reason, "playback target not ready, refreshing");
                match backend.refresh_target().await {
                    Ok(true) => issue(backend, command).await,
                    Ok(false) => Err(BackendError::NotReady(reason)),
                    Err(e) => Err(e),
                }
            }
            other => other,
        }
    }
}

/// Query playback status, refreshing the target once if it is not resolved
/// yet. The flag reports whether the refresh was used.
async fn status_with_refresh(
    backend: &dyn PlaybackBackend,
) -> (Result<Option<bool>, BackendError>, bool) {
    match backend.is_playing().await {
        Err(BackendError::NotReady(reason)) => {
            info!(backend = backend.name(), %reason, "playback target not ready, refreshing");
            let status = match backend.refresh_target().await {
                Ok(true) => backend.is_playing().await,
                Ok(false) => Err(BackendError::NotReady(reason)),
                Err(e) => Err(e),
            };
            (status, true)
        }
        other => (other, false),
    }
}

async fn issue(backend: &dyn PlaybackBackend, command: Command) -> Result<(), BackendError> {
    match command {
        Command::Resume => backend.resume().await,
        Command::Pause => backend.pause().await,
        Command::Skip(direction) => backend.skip(direction).await,
    }
}

fn report(backend: &dyn PlaybackBackend, command: Command, result: &Result<(), BackendError>) {
    let name = backend.name();
    match result {
        Ok(()) => info!(backend = name, %command, "playback command sent"),
        Err(BackendError::NotReady(reason)) => {
            warn!(backend = name, %command, %reason, "no playback target, command dropped");
            warn!("open the player on a device (desktop app, web player, or phone)");
        }
        Err(BackendError::Forbidden(reason)) => {
            error!(backend = name, %command, %reason, "playback control denied");
            error!("check the player account and app permissions");
        }
        Err(e) => warn!(backend = name, %command, error = %e, "playback command failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::DeactivationCause;
    use crate::playback::testing::{Call, RecordingBackend};

    fn controller(backend: &RecordingBackend, active: bool) -> PlaybackController {
        let state = RadioState::new();
        state.set_active(active);
        PlaybackController::new(Box::new(backend.clone()), state)
    }

    #[tokio::test]
    async fn test_activate_when_paused_resumes() {
        let backend = RecordingBackend::new();
        backend.set_status(Ok(Some(false)));

        controller(&backend, true).activate().await;
        assert_eq!(backend.calls(), vec![Call::Status, Call::Resume]);
    }

    #[tokio::test]
    async fn test_activate_twice_while_playing_issues_no_duplicate() {
        let backend = RecordingBackend::new();
        backend.set_status(Ok(Some(true)));

        let controller = controller(&backend, true);
        controller.activate().await;
        controller.activate().await;

        assert_eq!(backend.count(Call::Resume), 0);
    }

    #[tokio::test]
    async fn test_activate_twice_with_unknown_status_issues_one_start() {
        let backend = RecordingBackend::new();
        backend.set_status(Ok(None));

        let controller = controller(&backend, true);
        controller.activate().await;
        controller.activate().await;

        assert_eq!(backend.count(Call::Resume), 1);
    }

    #[tokio::test]
    async fn test_deactivate_pauses_and_skips_when_paused() {
        let backend = RecordingBackend::new();
        backend.set_status(Ok(Some(true)));

        let controller = controller(&backend, false);
        controller.deactivate().await;
        assert_eq!(backend.count(Call::Pause), 1);

        backend.set_status(Ok(Some(false)));
        controller.deactivate().await;
        assert_eq!(backend.count(Call::Pause), 1);
    }

    #[tokio::test]
    async fn test_not_found_triggers_exactly_one_refresh() {
        let backend = RecordingBackend::new();
        backend.set_status(Ok(Some(false)));
        backend.push_command_result(Err(BackendError::NotReady("404".into())));
        backend.push_command_result(Err(BackendError::NotReady("404".into())));

        controller(&backend, true).activate().await;

        assert_eq!(backend.count(Call::Refresh), 1);
        assert_eq!(backend.count(Call::Resume), 2);
    }

    #[tokio::test]
    async fn test_refresh_without_target_gives_up() {
        let backend = RecordingBackend::new();
        backend.set_status(Ok(Some(false)));
        backend.set_refresh_result(Ok(false));
        backend.push_command_result(Err(BackendError::NotReady("no window".into())));

        controller(&backend, true).activate().await;

        assert_eq!(
            backend.calls(),
            vec![Call::Status, Call::Resume, Call::Refresh]
        );
    }

    #[tokio::test]
    async fn test_failed_activation_is_retried_next_time() {
        let backend = RecordingBackend::new();
        backend.set_status(Ok(None));
        backend.set_refresh_result(Ok(false));
        backend.push_command_result(Err(BackendError::NotReady("no device".into())));

        let controller = controller(&backend, true);
        controller.activate().await;
        controller.activate().await;

        assert_eq!(backend.count(Call::Resume), 2);
    }

    #[tokio::test]
    async fn test_forbidden_is_not_retried() {
        let backend = RecordingBackend::new();
        backend.set_status(Ok(Some(false)));
        backend.push_command_result(Err(BackendError::Forbidden("premium required".into())));

        controller(&backend, true).activate().await;

        assert_eq!(backend.count(Call::Resume), 1);
        assert_eq!(backend.count(Call::Refresh), 0);
    }

    #[tokio::test]
    async fn test_unresolved_target_refreshed_before_status() {
        let backend = RecordingBackend::new();
        backend.set_status(Err(BackendError::NotReady("no device".into())));
        backend.push_command_result(Err(BackendError::NotReady("no device".into())));

        controller(&backend, true).activate().await;

        // The single refresh goes to the status check, not to the command
        assert_eq!(
            backend.calls(),
            vec![Call::Status, Call::Refresh, Call::Status, Call::Resume]
        );
    }

    #[tokio::test]
    async fn test_toggle_backend_skips_when_already_playing() {
        let backend = RecordingBackend::new();
        backend.set_toggles(true);
        backend.set_status(Ok(Some(true)));

        controller(&backend, true).activate().await;
        assert_eq!(backend.count(Call::Resume), 0);
    }

    #[tokio::test]
    async fn test_toggle_backend_never_sent_with_unknown_status() {
        let backend = RecordingBackend::new();
        backend.set_toggles(true);
        backend.set_status(Ok(None));

        let controller = controller(&backend, true);
        controller.activate().await;
        controller.deactivate().await;

        backend.set_status(Err(BackendError::Transport("timeout".into())));
        controller.activate().await;

        assert_eq!(backend.count(Call::Resume), 0);
        assert_eq!(backend.count(Call::Pause), 0);
    }

    #[tokio::test]
    async fn test_toggle_backend_sent_when_state_differs() {
        let backend = RecordingBackend::new();
        backend.set_toggles(true);
        backend.set_status(Ok(Some(true)));

        controller(&backend, false).deactivate().await;
        assert_eq!(backend.calls(), vec![Call::Status, Call::Pause]);
    }

    #[tokio::test]
    async fn test_status_error_still_issues_command() {
        let backend = RecordingBackend::new();
        backend.set_status(Err(BackendError::Transport("timeout".into())));

        controller(&backend, true).activate().await;
        assert_eq!(backend.count(Call::Resume), 1);
    }

    #[tokio::test]
    async fn test_navigation_suppressed_while_inactive() {
        let backend = RecordingBackend::new();
        let controller = controller(&backend, false);

        controller.navigate(Direction::Next).await;
        controller.navigate(Direction::Previous).await;

        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_navigation_forwarded_while_active() {
        let backend = RecordingBackend::new();
        let controller = controller(&backend, true);

        controller.navigate(Direction::Previous).await;
        assert_eq!(backend.calls(), vec![Call::Skip(Direction::Previous)]);
    }

    #[tokio::test]
    async fn test_apply_maps_events() {
        let backend = RecordingBackend::new();
        backend.set_status(Ok(None));
        let controller = controller(&backend, true);

        controller.apply(&RadioEvent::Activated { duration_ms: 0 }).await;
        controller
            .apply(&RadioEvent::Deactivated {
                cause: DeactivationCause::ExitedVehicle,
                duration_ms: 10,
            })
            .await;

        assert_eq!(backend.count(Call::Resume), 1);
        assert_eq!(backend.count(Call::Pause), 1);
    }

    #[tokio::test]
    async fn test_disabled_controller_is_noop() {
        let controller = PlaybackController::disabled("credentials missing", RadioState::new());
        assert!(!controller.is_enabled());

        controller.activate().await;
        controller.deactivate().await;
        controller.navigate(Direction::Next).await;
    }
}
