//! Hotkey definitions and bindings
//!
//! Provides the keys that can be bound to track navigation and the
//! mapping from a pressed key to a navigation direction.

use std::str::FromStr;

use crate::playback::Direction;

/// Keys that can be bound globally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HotKey {
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
    PageUp,
    PageDown,
    Home,
    End,
    Insert,
    Delete,
    KeypadMinus,
    KeypadPlus,
}

/// Error for a key name that is not bindable
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown hotkey: {0}")]
pub struct UnknownKey(pub String);

impl FromStr for HotKey {
    type Err = UnknownKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = match s.trim().to_ascii_lowercase().as_str() {
            "f1" => HotKey::F1,
            "f2" => HotKey::F2,
            "f3" => HotKey::F3,
            "f4" => HotKey::F4,
            "f5" => HotKey::F5,
            "f6" => HotKey::F6,
            "f7" => HotKey::F7,
            "f8" => HotKey::F8,
            "f9" => HotKey::F9,
            "f10" => HotKey::F10,
            "f11" => HotKey::F11,
            "f12" => HotKey::F12,
            "pageup" | "pgup" => HotKey::PageUp,
            "pagedown" | "pgdn" => HotKey::PageDown,
            "home" => HotKey::Home,
            "end" => HotKey::End,
            "insert" | "ins" => HotKey::Insert,
            "delete" | "del" => HotKey::Delete,
            "kpminus" | "numpad-" | "numpadminus" => HotKey::KeypadMinus,
            "kpplus" | "numpad+" | "numpadplus" => HotKey::KeypadPlus,
            _ => return Err(UnknownKey(s.to_string())),
        };
        Ok(key)
    }
}

#[cfg(windows)]
impl HotKey {
    /// Map a key reported by the OS hook onto a bindable key
    pub fn from_rdev(key: rdev::Key) -> Option<Self> {
        use rdev::Key;

        let key = match key {
            Key::F1 => HotKey::F1,
            Key::F2 => HotKey::F2,
            Key::F3 => HotKey::F3,
            Key::F4 => HotKey::F4,
            Key::F5 => HotKey::F5,
            Key::F6 => HotKey::F6,
            Key::F7 => HotKey::F7,
            Key::F8 => HotKey::F8,
            Key::F9 => HotKey::F9,
            Key::F10 => HotKey::F10,
            Key::F11 => HotKey::F11,
            Key::F12 => HotKey::F12,
            Key::PageUp => HotKey::PageUp,
            Key::PageDown => HotKey::PageDown,
            Key::Home => HotKey::Home,
            Key::End => HotKey::End,
            Key::Insert => HotKey::Insert,
            Key::Delete => HotKey::Delete,
            Key::KpMinus => HotKey::KeypadMinus,
            Key::KpPlus => HotKey::KeypadPlus,
            _ => return None,
        };
        Some(key)
    }
}

/// Keys bound to previous/next track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotkeyBindings {
    pub previous: HotKey,
    pub next: HotKey,
}

impl Default for HotkeyBindings {
    fn default() -> Self {
        Self {
            previous: HotKey::F9,
            next: HotKey::F10,
        }
    }
}

impl HotkeyBindings {
    /// Navigation direction bound to `key`, if any
    #[cfg_attr(not(windows), allow(dead_code))]
    pub fn direction_for(&self, key: HotKey) -> Option<Direction> {
        if key == self.previous {
            Some(Direction::Previous)
        } else if key == self.next {
            Some(Direction::Next)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keys() {
        assert_eq!("F9".parse::<HotKey>(), Ok(HotKey::F9));
        assert_eq!(" pagedown ".parse::<HotKey>(), Ok(HotKey::PageDown));
        assert_eq!("numpad+".parse::<HotKey>(), Ok(HotKey::KeypadPlus));
        assert!("space".parse::<HotKey>().is_err());
    }

    #[test]
    fn test_default_bindings() {
        let bindings = HotkeyBindings::default();
        assert_eq!(bindings.direction_for(HotKey::F9), Some(Direction::Previous));
        assert_eq!(bindings.direction_for(HotKey::F10), Some(Direction::Next));
        assert_eq!(bindings.direction_for(HotKey::F1), None);
    }
}
