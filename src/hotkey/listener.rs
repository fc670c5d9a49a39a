//! Global hotkey listener using a low-level keyboard hook
//!
//! Monitors system-wide key presses for the navigation bindings.
//! Runs on a dedicated thread; the hook callback only forwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::keys::HotkeyBindings;
use crate::playback::Direction;

/// Events sent from the hotkey listener to the navigation forwarder
#[cfg_attr(not(windows), allow(dead_code))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// A navigation key went down
    Pressed(Direction),
}

/// Global hotkey listener for previous/next track keys
pub struct HotkeyListener {
    bindings: HotkeyBindings,
    event_tx: mpsc::Sender<HotkeyEvent>,
    running: Arc<AtomicBool>,
}

impl HotkeyListener {
    /// Create a new hotkey listener
    pub fn new(bindings: HotkeyBindings, event_tx: mpsc::Sender<HotkeyEvent>) -> Self {
        Self {
            bindings,
            event_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the hotkey listener
    ///
    /// This spawns a dedicated thread that installs the keyboard hook.
    /// The hook stays installed until the process exits; `stop()` makes it
    /// ignore further events.
    pub fn start(&self) -> Result<(), HotkeyError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HotkeyError::AlreadyRunning);
        }

        let result = platform::spawn(self.bindings, self.event_tx.clone(), Arc::clone(&self.running));
        if result.is_err() {
            self.running.store(false, Ordering::SeqCst);
        }
        result
    }

    /// Stop forwarding key presses
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the listener is currently running
    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Errors that can occur in the hotkey listener
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("hotkey listener is already running")]
    AlreadyRunning,

    #[cfg_attr(not(windows), allow(dead_code))]
    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),

    #[cfg_attr(windows, allow(dead_code))]
    #[error("global hotkeys are not supported on this platform")]
    Unsupported,
}

/// Forward a key press without blocking the hook callback
#[cfg_attr(not(windows), allow(dead_code))]
fn forward(event_tx: &mpsc::Sender<HotkeyEvent>, direction: Direction) {
    match event_tx.try_send(HotkeyEvent::Pressed(direction)) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::debug!(%direction, "hotkey channel full, press dropped");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::warn!("failed to send hotkey event - channel closed?");
        }
    }
}

#[cfg(windows)]
mod platform {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    use rdev::{listen, Event, EventType};
    use tokio::sync::mpsc;
    use tracing::{error, info};

    use super::{forward, HotkeyError, HotkeyEvent};
    use crate::hotkey::keys::{HotKey, HotkeyBindings};

    pub(super) fn spawn(
        bindings: HotkeyBindings,
        event_tx: mpsc::Sender<HotkeyEvent>,
        running: Arc<AtomicBool>,
    ) -> Result<(), HotkeyError> {
        thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || {
                info!(?bindings, "hotkey listener thread started");

                // Hook callback - must be fast and non-blocking
                let callback = move |event: Event| {
                    if !running.load(Ordering::Relaxed) {
                        return;
                    }
                    if let EventType::KeyPress(key) = event.event_type {
                        if let Some(direction) =
                            HotKey::from_rdev(key).and_then(|k| bindings.direction_for(k))
                        {
                            forward(&event_tx, direction);
                        }
                    }
                };

                if let Err(e) = listen(callback) {
                    error!(?e, "hotkey listener error");
                }

                info!("hotkey listener thread stopped");
            })
            .map_err(|e| HotkeyError::ThreadSpawn(e.to_string()))?;

        Ok(())
    }
}

#[cfg(not(windows))]
mod platform {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::{HotkeyError, HotkeyEvent};
    use crate::hotkey::keys::HotkeyBindings;

    pub(super) fn spawn(
        _bindings: HotkeyBindings,
        _event_tx: mpsc::Sender<HotkeyEvent>,
        _running: Arc<AtomicBool>,
    ) -> Result<(), HotkeyError> {
        Err(HotkeyError::Unsupported)
    }
}
