//! Common data types shared by the scaling, capture, provider and action
//! layers.

use serde::{Deserialize, Serialize};

/// A 2D point, either in reference (design) space or in window-client space
/// depending on context. Kept floating point until the final conversion to a
/// pixel index (see [`crate::scaling`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Client-area size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect_ratio(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

/// Snapshot of the target window's geometry, captured atomically per query.
///
/// Never cached across operations: the window can move, resize or minimize
/// between any two actions, so every geometry-dependent operation re-queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPosition {
    /// Top-left corner of the client area, in screen coordinates.
    pub origin: (i32, i32),
    /// Client-area size.
    pub size: Size,
    /// Derived from the window state at snapshot time.
    pub is_minimized: bool,
}

impl WindowPosition {
    /// Translates a window-relative pixel position to screen coordinates.
    pub fn to_screen(&self, x: u32, y: u32) -> (i32, i32) {
        (self.origin.0 + x as i32, self.origin.1 + y as i32)
    }
}

/// An RGB color triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Fuzzy equality: true iff every channel's absolute difference is within
    /// the per-channel tolerance. Deliberately not exact because of rendering
    /// noise and anti-aliasing in the captured frames. Symmetric in
    /// `self`/`other`.
    pub fn matches(&self, other: Color, tolerance: Tolerance) -> bool {
        self.r.abs_diff(other.r) <= tolerance.r
            && self.g.abs_diff(other.g) <= tolerance.g
            && self.b.abs_diff(other.b) <= tolerance.b
    }
}

/// Per-channel tolerance for [`Color::matches`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tolerance {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Tolerance {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// The same tolerance on all three channels.
    pub const fn uniform(value: u8) -> Self {
        Self::new(value, value, value)
    }
}

/// The closed set of capabilities an action tree can require from the
/// interaction provider. Declared up front at simulator construction as the
/// union over the whole tree and enforced on every capability-gated call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub keyboard_input: bool,
    pub mouse_input: bool,
    pub capture_screenshot: bool,
}

impl Capabilities {
    pub const NONE: Capabilities = Capabilities {
        keyboard_input: false,
        mouse_input: false,
        capture_screenshot: false,
    };

    pub const KEYBOARD: Capabilities = Capabilities {
        keyboard_input: true,
        ..Self::NONE
    };

    pub const MOUSE: Capabilities = Capabilities {
        mouse_input: true,
        ..Self::NONE
    };

    pub const SCREENSHOT: Capabilities = Capabilities {
        capture_screenshot: true,
        ..Self::NONE
    };

    pub const fn union(self, other: Capabilities) -> Capabilities {
        Capabilities {
            keyboard_input: self.keyboard_input || other.keyboard_input,
            mouse_input: self.mouse_input || other.mouse_input,
            capture_screenshot: self.capture_screenshot || other.capture_screenshot,
        }
    }

    /// Whether every capability required by `other` is present in `self`.
    pub const fn contains(self, other: Capabilities) -> bool {
        (self.keyboard_input || !other.keyboard_input)
            && (self.mouse_input || !other.mouse_input)
            && (self.capture_screenshot || !other.capture_screenshot)
    }
}

/// Virtual keys the engine can press. A closed, serializable set; the
/// platform backend maps these to OS virtual-key codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Enter,
    Escape,
    Tab,
    Space,
    Backspace,
    Shift,
    Control,
    Alt,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    N,
    O,
    P,
    Q,
    R,
    S,
    T,
    U,
    V,
    W,
    X,
    Y,
    Z,
    Digit0,
    Digit1,
    Digit2,
    Digit3,
    Digit4,
    Digit5,
    Digit6,
    Digit7,
    Digit8,
    Digit9,
}

/// How input is delivered to the target window and where captures come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    /// The window must be in the foreground; input is injected globally and
    /// frames are captured from the screen at the window's location.
    Foreground,
    /// The window need not be focused; input is posted as window messages and
    /// frames are captured from the window's own surface.
    Background,
    /// Like `Background`, but additionally disables the window for real user
    /// input and forces it topmost while the run is active. Both changes are
    /// reverted on teardown.
    BackgroundExclusive,
}

impl OperatingMode {
    pub fn requires_foreground(self) -> bool {
        matches!(self, OperatingMode::Foreground)
    }

    pub fn is_background(self) -> bool {
        !self.requires_foreground()
    }
}
