//! Hotkey module for global track navigation keys
//!
//! Listens for the previous/next bindings system-wide, debounces them and
//! forwards navigation to the playback controller.

mod debounce;
mod keys;
mod listener;

pub use debounce::{forward_navigation, KeyDebouncer, DEBOUNCE_WINDOW};
pub use keys::{HotKey, HotkeyBindings, UnknownKey};
pub use listener::{HotkeyEvent, HotkeyListener};
