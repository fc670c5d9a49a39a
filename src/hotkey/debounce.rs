//! Per-key debouncing for navigation hotkeys
//!
//! A key fires once, then stays suppressed until a fixed delay has passed.
//! Key-repeat from a held key is unreliable, so the flag is cleared by a
//! timer rather than by a key-up event; this approximates "suppress repeats
//! within the window".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::listener::HotkeyEvent;
use crate::playback::{Direction, PlaybackController};

/// Default suppression window after a key fires
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(300);

/// Tracks which navigation keys are inside their suppression window
#[derive(Debug, Clone)]
pub struct KeyDebouncer {
    previous: Arc<AtomicBool>,
    next: Arc<AtomicBool>,
    window: Duration,
}

impl KeyDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            previous: Arc::new(AtomicBool::new(false)),
            next: Arc::new(AtomicBool::new(false)),
            window,
        }
    }

    fn flag(&self, direction: Direction) -> &Arc<AtomicBool> {
        match direction {
            Direction::Previous => &self.previous,
            Direction::Next => &self.next,
        }
    }

    /// Returns true if the key should fire now.
    ///
    /// Must be called inside a tokio runtime; the reset runs as a delayed task.
    pub fn try_fire(&self, direction: Direction) -> bool {
        let flag = self.flag(direction);
        if flag.swap(true, Ordering::AcqRel) {
            return false;
        }

        let flag = Arc::clone(flag);
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            flag.store(false, Ordering::Release);
        });

        true
    }
}

impl Default for KeyDebouncer {
    fn default() -> Self {
        Self::new(DEBOUNCE_WINDOW)
    }
}

/// Forward debounced hotkey presses to the playback controller.
///
/// Each navigation runs in its own task so a slow backend never holds up
/// the next key press.
pub async fn forward_navigation(
    mut hotkey_rx: mpsc::Receiver<HotkeyEvent>,
    debouncer: KeyDebouncer,
    playback: Arc<PlaybackController>,
) {
    info!("navigation forwarder started");

    while let Some(event) = hotkey_rx.recv().await {
        let HotkeyEvent::Pressed(direction) = event;

        if !debouncer.try_fire(direction) {
            debug!(%direction, "hotkey debounced");
            continue;
        }

        let playback = Arc::clone(&playback);
        tokio::spawn(async move {
            playback.navigate(direction).await;
        });
    }

    info!("navigation forwarder stopped");
}
