//! Simple leaf actions: clicks, timed key presses, typed text and pauses.

use std::fmt;
use std::time::Duration;

use crate::errors::SimulatorError;
use crate::provider::Interaction;
use crate::scaling::{self, HorizontalAlignment};
use crate::types::{Key, Point};

/// Default hold duration for a simple click.
pub const DEFAULT_CLICK_HOLD_MS: u64 = 150;

/// Move, press, hold briefly, release at one design coordinate.
#[derive(Debug, Clone)]
pub struct ClickAction {
    pub position: Point,
    pub alignment: HorizontalAlignment,
    pub hold: Duration,
}

impl ClickAction {
    pub fn run(&self, itx: &mut dyn Interaction) -> Result<(), SimulatorError> {
        click_at(itx, self.position, self.alignment, self.hold)
    }
}

impl fmt::Display for ClickAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Click at ({}, {})", self.position.x, self.position.y)
    }
}

/// Shared click helper: scales the design point against the current window
/// geometry, then move / press / hold / release.
pub(crate) fn click_at(
    itx: &mut dyn Interaction,
    position: Point,
    alignment: HorizontalAlignment,
    hold: Duration,
) -> Result<(), SimulatorError> {
    let window = itx.window_position()?;
    let target = scaling::scale_point(window.size, position, alignment)?;
    itx.move_mouse(target)?;
    itx.press_mouse_button()?;
    itx.wait(hold)?;
    itx.release_mouse_button()
}

/// Press a key, hold it for an exact duration, release it.
#[derive(Debug, Clone)]
pub struct KeyPressAction {
    pub key: Key,
    pub hold: Duration,
}

impl KeyPressAction {
    pub fn run(&self, itx: &mut dyn Interaction) -> Result<(), SimulatorError> {
        itx.press_key(self.key)?;
        // Accurate wait: key-hold duration is gameplay-relevant.
        itx.wait_accurate(self.hold)?;
        itx.release_key(self.key)
    }
}

impl fmt::Display for KeyPressAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Press {:?} for {}ms", self.key, self.hold.as_millis())
    }
}

/// Types a chat string and submits it with Enter.
///
/// With `pause_between_chars` set, characters are written one at a time with
/// a pause in between, for effects that require per-keystroke visibility.
#[derive(Debug, Clone)]
pub struct WriteTextAction {
    pub text: String,
    pub pause_between_chars: Option<Duration>,
}

impl WriteTextAction {
    pub fn run(&self, itx: &mut dyn Interaction) -> Result<(), SimulatorError> {
        match self.pause_between_chars {
            None => itx.write_text(&self.text)?,
            Some(pause) => {
                let mut buf = [0u8; 4];
                for ch in self.text.chars() {
                    itx.write_text(ch.encode_utf8(&mut buf))?;
                    itx.wait(pause)?;
                }
            }
        }
        itx.wait(Duration::from_millis(100))?;
        itx.press_key(Key::Enter)?;
        itx.wait_accurate(Duration::from_millis(100))?;
        itx.release_key(Key::Enter)
    }
}

impl fmt::Display for WriteTextAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Write \"{}\"", self.text)
    }
}

/// Wait only.
#[derive(Debug, Clone)]
pub struct PauseAction {
    pub duration: Duration,
}

impl PauseAction {
    pub fn run(&self, itx: &mut dyn Interaction) -> Result<(), SimulatorError> {
        itx.wait(self.duration)
    }
}

impl fmt::Display for PauseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pause {}ms", self.duration.as_millis())
    }
}
