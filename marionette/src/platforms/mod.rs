//! Native OS collaborators: process/window resolution, input injection and
//! pixel capture.
//!
//! The engine only ever talks to [`NativeApi`]; the per-OS implementations
//! live in submodules selected by `cfg`, and tests substitute a scripted
//! implementation.

use image::RgbaImage;

use crate::errors::SimulatorError;
use crate::types::{Key, WindowPosition};

#[cfg(target_os = "windows")]
pub mod windows;

/// Opaque handle to a top-level window (HWND on Windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub u64);

/// The OS capability surface the interaction provider is built on.
///
/// Input comes in two delivery modes: `send_*` methods inject global input
/// (the window must be in the foreground), `post_*` methods address a
/// specific window so it can stay in the background. The provider selects
/// per its operating mode.
pub trait NativeApi: Send {
    /// Main windows of every running process whose executable name matches
    /// `process_name` (without extension, case-insensitive). May be empty.
    fn find_main_windows(&self, process_name: &str) -> Result<Vec<WindowHandle>, SimulatorError>;

    fn is_foreground(&self, window: WindowHandle) -> Result<bool, SimulatorError>;

    fn bring_to_foreground(&self, window: WindowHandle) -> Result<(), SimulatorError>;

    /// Client-area origin (screen coordinates), size and minimized flag,
    /// captured in one query.
    fn window_position(&self, window: WindowHandle) -> Result<WindowPosition, SimulatorError>;

    /// Enables or disables the window for real user input.
    fn set_window_enabled(
        &self,
        window: WindowHandle,
        enabled: bool,
    ) -> Result<(), SimulatorError>;

    /// Forces the window topmost, or removes the forcing.
    fn set_window_topmost(
        &self,
        window: WindowHandle,
        topmost: bool,
    ) -> Result<(), SimulatorError>;

    /// Moves the OS cursor to a screen coordinate.
    fn move_cursor(&self, x: i32, y: i32) -> Result<(), SimulatorError>;

    /// Presses or releases the left mouse button at the current cursor
    /// position (global injection).
    fn send_mouse_button(&self, down: bool) -> Result<(), SimulatorError>;

    /// Posts a mouse-move message at a window-client coordinate.
    fn post_mouse_move(&self, window: WindowHandle, x: u32, y: u32)
        -> Result<(), SimulatorError>;

    /// Posts a button-down/up message at a window-client coordinate.
    fn post_mouse_button(
        &self,
        window: WindowHandle,
        down: bool,
        x: u32,
        y: u32,
    ) -> Result<(), SimulatorError>;

    /// Injects a global key-down/up event.
    fn send_key(&self, key: Key, down: bool) -> Result<(), SimulatorError>;

    /// Posts a key-down/up message to a window.
    fn post_key(&self, window: WindowHandle, key: Key, down: bool)
        -> Result<(), SimulatorError>;

    /// Injects a Unicode character event.
    fn send_char(&self, ch: char) -> Result<(), SimulatorError>;

    /// Posts a character message to a window.
    fn post_char(&self, window: WindowHandle, ch: char) -> Result<(), SimulatorError>;

    /// Captures the screen region starting at `(x, y)` with the dimensions of
    /// `out` into `out`.
    fn capture_screen_region(
        &self,
        x: i32,
        y: i32,
        out: &mut RgbaImage,
    ) -> Result<(), SimulatorError>;

    /// Captures the window's own rendering surface into `out`, whose
    /// dimensions must match the window's client size.
    fn capture_window(
        &self,
        window: WindowHandle,
        out: &mut RgbaImage,
    ) -> Result<(), SimulatorError>;
}

/// Creates the native backend for the current platform.
pub fn create_native_api() -> Result<Box<dyn NativeApi>, SimulatorError> {
    #[cfg(target_os = "windows")]
    {
        Ok(Box::new(windows::WindowsApi::new()?))
    }
    #[cfg(not(target_os = "windows"))]
    {
        Err(SimulatorError::UnsupportedPlatform(
            "no native automation backend for this OS".into(),
        ))
    }
}
