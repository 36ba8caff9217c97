//! Multi-level preset-chat menu navigation.

use std::fmt;
use std::time::Duration;

use crate::action::basic::{click_at, DEFAULT_CLICK_HOLD_MS};
use crate::errors::SimulatorError;
use crate::provider::Interaction;
use crate::scaling::HorizontalAlignment;
use crate::types::Point;

const MENU_OPEN_DELAY: Duration = Duration::from_millis(300);

/// Clicks the chat icon, then walks a cascading menu by clicking one entry
/// per level. The menu anchors to the left edge of the 4:3 region; each
/// level opens in its own fixed horizontal band while the vertical offset
/// accumulates with the chosen entry indices.
#[derive(Debug, Clone)]
pub struct SpeedchatAction {
    /// Zero-based entry index per menu level.
    item_path: Vec<u32>,
    /// Design coordinates of the chat icon.
    icon: Point,
    /// Vertical distance between adjacent menu entries, design pixels.
    item_height: f64,
    /// Horizontal click band per level, design pixels. At least as many as
    /// there are levels in `item_path`.
    level_x: Vec<f64>,
}

impl SpeedchatAction {
    pub fn new(
        item_path: Vec<u32>,
        icon: Point,
        item_height: f64,
        level_x: Vec<f64>,
    ) -> Result<Self, SimulatorError> {
        if item_path.is_empty() {
            return Err(SimulatorError::InvalidArgument(
                "a speedchat action needs at least one menu level".into(),
            ));
        }
        if level_x.len() < item_path.len() {
            return Err(SimulatorError::InvalidArgument(format!(
                "speedchat selects {} levels but only {} level bands are given",
                item_path.len(),
                level_x.len()
            )));
        }
        if item_height <= 0.0 {
            return Err(SimulatorError::InvalidArgument(
                "speedchat item height must be positive".into(),
            ));
        }
        Ok(Self {
            item_path,
            icon,
            item_height,
            level_x,
        })
    }

    pub fn run(&self, itx: &mut dyn Interaction) -> Result<(), SimulatorError> {
        let hold = Duration::from_millis(DEFAULT_CLICK_HOLD_MS);
        click_at(itx, self.icon, HorizontalAlignment::Left, hold)?;

        let mut y = self.icon.y;
        for (level, &item) in self.item_path.iter().enumerate() {
            itx.wait(MENU_OPEN_DELAY)?;
            y += (f64::from(item) + 1.0) * self.item_height;
            let target = Point::new(self.level_x[level], y);
            itx.emit(crate::events::ProgressMessage::Info {
                text: format!("speedchat: level {} entry {}", level + 1, item + 1),
            });
            click_at(itx, target, HorizontalAlignment::Left, hold)?;
        }
        Ok(())
    }
}

impl fmt::Display for SpeedchatAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path: Vec<String> = self.item_path.iter().map(|i| i.to_string()).collect();
        write!(f, "Speedchat [{}]", path.join(" > "))
    }
}
