//! Window automation backend
//!
//! Drives the desktop player by posting key messages to its top-level
//! window, so the game keeps foreground focus. Playback state is read from
//! the window title: the player shows its own name while idle and the
//! current track while playing.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{BackendError, Direction, PlaybackBackend};

/// Raw top-level window handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHandle(pub isize);

/// Keys the backend knows how to send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualKey {
    Space,
    Control,
    Left,
    Right,
}

impl VirtualKey {
    /// Win32 virtual-key code
    pub fn code(self) -> u16 {
        match self {
            VirtualKey::Space => 0x20,
            VirtualKey::Control => 0x11,
            VirtualKey::Left => 0x25,
            VirtualKey::Right => 0x27,
        }
    }

    /// Arrow keys live on the extended part of the keyboard
    pub fn is_extended(self) -> bool {
        matches!(self, VirtualKey::Left | VirtualKey::Right)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStroke {
    Down(VirtualKey),
    Up(VirtualKey),
}

/// Space toggles play/pause
pub fn play_pause_keys() -> Vec<KeyStroke> {
    vec![
        KeyStroke::Down(VirtualKey::Space),
        KeyStroke::Up(VirtualKey::Space),
    ]
}

/// Ctrl+Right / Ctrl+Left skip tracks
pub fn skip_keys(direction: Direction) -> Vec<KeyStroke> {
    let arrow = match direction {
        Direction::Next => VirtualKey::Right,
        Direction::Previous => VirtualKey::Left,
    };
    vec![
        KeyStroke::Down(VirtualKey::Control),
        KeyStroke::Down(arrow),
        KeyStroke::Up(arrow),
        KeyStroke::Up(VirtualKey::Control),
    ]
}

/// OS facilities needed to find and drive the player window
pub trait WindowAutomation: Send + Sync {
    /// Top-level window belonging to a process with this name
    fn find_window(&self, process_name: &str) -> Option<WindowHandle>;

    /// Current title, or `None` if the window no longer exists
    fn window_title(&self, window: WindowHandle) -> Option<String>;

    fn send_keys(&self, window: WindowHandle, keys: &[KeyStroke]) -> Result<(), String>;
}

pub struct WindowAutomationBackend<W> {
    automation: W,
    process_name: String,
    /// Title prefix shown while nothing is playing
    idle_title_prefix: String,
    window: Mutex<Option<WindowHandle>>,
}

impl<W: WindowAutomation> WindowAutomationBackend<W> {
    pub fn new(automation: W, process_name: String, idle_title_prefix: String) -> Self {
        Self {
            automation,
            process_name,
            idle_title_prefix,
            window: Mutex::new(None),
        }
    }

    fn cached_window(&self) -> Option<WindowHandle> {
        *self.window.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_window(&self, window: Option<WindowHandle>) {
        *self.window.lock().unwrap_or_else(|e| e.into_inner()) = window;
    }

    fn not_ready(&self) -> BackendError {
        BackendError::NotReady(format!("no window found for {}", self.process_name))
    }

    fn send(&self, keys: &[KeyStroke]) -> Result<(), BackendError> {
        let window = self.cached_window().ok_or_else(|| self.not_ready())?;

        self.automation.send_keys(window, keys).map_err(|e| {
            debug!(error = %e, "key send failed, dropping window handle");
            self.set_window(None);
            BackendError::NotReady(format!("send to player window failed: {}", e))
        })
    }
}

#[async_trait]
impl<W: WindowAutomation> PlaybackBackend for WindowAutomationBackend<W> {
    fn name(&self) -> &'static str {
        "window"
    }

    fn toggles_playback(&self) -> bool {
        true
    }

    async fn is_playing(&self) -> Result<Option<bool>, BackendError> {
        let window = self.cached_window().ok_or_else(|| self.not_ready())?;

        let Some(title) = self.automation.window_title(window) else {
            self.set_window(None);
            return Err(self.not_ready());
        };

        if title.is_empty() {
            return Ok(None);
        }
        Ok(Some(!title.starts_with(&self.idle_title_prefix)))
    }

    async fn refresh_target(&self) -> Result<bool, BackendError> {
        let window = self.automation.find_window(&self.process_name);
        match window {
            Some(handle) => info!(player = %self.process_name, hwnd = handle.0, "player window found"),
            None => info!(player = %self.process_name, "player window not found"),
        }
        self.set_window(window);
        Ok(window.is_some())
    }

    async fn resume(&self) -> Result<(), BackendError> {
        self.send(&play_pause_keys())
    }

    async fn pause(&self) -> Result<(), BackendError> {
        self.send(&play_pause_keys())
    }

    async fn skip(&self, direction: Direction) -> Result<(), BackendError> {
        self.send(&skip_keys(direction))
    }
}

#[cfg(windows)]
pub use native::NativeWindows;

#[cfg(windows)]
mod native {
    use std::ffi::c_void;
    use std::sync::Mutex;

    use sysinfo::System;
    use windows::core::BOOL;
    use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};
    use windows::Win32::UI::Input::KeyboardAndMouse::{MapVirtualKeyW, MAPVK_VK_TO_VSC};
    use windows::Win32::UI::WindowsAndMessaging::{
        EnumWindows, GetWindowTextLengthW, GetWindowTextW, GetWindowThreadProcessId,
        IsWindowVisible, PostMessageW, WM_KEYDOWN, WM_KEYUP,
    };

    use super::{KeyStroke, WindowAutomation, WindowHandle};
    use crate::memory::find_process_ids;

    /// Win32 implementation of `WindowAutomation`
    pub struct NativeWindows {
        system: Mutex<System>,
    }

    impl NativeWindows {
        pub fn new() -> Self {
            Self {
                system: Mutex::new(System::new()),
            }
        }
    }

    fn hwnd(window: WindowHandle) -> HWND {
        HWND(window.0 as *mut c_void)
    }

    unsafe extern "system" fn collect_window(hwnd: HWND, lparam: LPARAM) -> BOOL {
        let windows = &mut *(lparam.0 as *mut Vec<(WindowHandle, u32)>);

        if IsWindowVisible(hwnd).as_bool() && GetWindowTextLengthW(hwnd) > 0 {
            let mut pid = 0u32;
            GetWindowThreadProcessId(hwnd, Some(&mut pid as *mut u32));
            windows.push((WindowHandle(hwnd.0 as isize), pid));
        }

        BOOL(1)
    }

    /// lParam for WM_KEYDOWN/WM_KEYUP: repeat count, scan code, flags
    fn key_lparam(stroke: KeyStroke) -> isize {
        let (key, up) = match stroke {
            KeyStroke::Down(key) => (key, false),
            KeyStroke::Up(key) => (key, true),
        };

        let scan = unsafe { MapVirtualKeyW(key.code() as u32, MAPVK_VK_TO_VSC) };
        let mut value: u32 = 1 | ((scan & 0xFF) << 16);
        if key.is_extended() {
            value |= 1 << 24;
        }
        if up {
            value |= (1 << 30) | (1 << 31);
        }
        value as isize
    }

    impl WindowAutomation for NativeWindows {
        fn find_window(&self, process_name: &str) -> Option<WindowHandle> {
            let pids = {
                let mut system = self.system.lock().unwrap_or_else(|e| e.into_inner());
                find_process_ids(&mut system, process_name)
            };
            if pids.is_empty() {
                return None;
            }

            let mut windows: Vec<(WindowHandle, u32)> = Vec::new();
            unsafe {
                EnumWindows(
                    Some(collect_window),
                    LPARAM(&mut windows as *mut Vec<(WindowHandle, u32)> as isize),
                )
            }
            .ok()?;

            windows
                .into_iter()
                .find(|(_, pid)| pids.contains(pid))
                .map(|(window, _)| window)
        }

        fn window_title(&self, window: WindowHandle) -> Option<String> {
            let hwnd = hwnd(window);
            let owner = unsafe { GetWindowThreadProcessId(hwnd, None) };
            if owner == 0 {
                return None;
            }

            let mut buf = [0u16; 512];
            let len = unsafe { GetWindowTextW(hwnd, &mut buf) };
            Some(String::from_utf16_lossy(&buf[..len.max(0) as usize]))
        }

        fn send_keys(&self, window: WindowHandle, keys: &[KeyStroke]) -> Result<(), String> {
            let hwnd = hwnd(window);
            for stroke in keys {
                let (message, key) = match *stroke {
                    KeyStroke::Down(key) => (WM_KEYDOWN, key),
                    KeyStroke::Up(key) => (WM_KEYUP, key),
                };
                unsafe {
                    PostMessageW(
                        Some(hwnd),
                        message,
                        WPARAM(key.code() as usize),
                        LPARAM(key_lparam(*stroke)),
                    )
                }
                .map_err(|e| e.to_string())?;
            }
            Ok(())
        }
    }
}
