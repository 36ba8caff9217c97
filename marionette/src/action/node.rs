//! Declarative action descriptions and the factory mapping them onto the
//! runtime tree.
//!
//! This is the contract the project-file loader has to satisfy: every leaf is
//! described by primitive, serializable parameters only, and
//! [`ActionNode::build`] performs all argument validation while converting
//! the description into [`Action`] variants. The mapping is exhaustive by
//! construction.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::action::basic::DEFAULT_CLICK_HOLD_MS;
use crate::action::{
    Action, BubbleMapping, BubbleScan, CastFinisher, ClickAction, CompoundAction,
    CompoundOrdering, FishingCastAction, FishingFlavor, KeyPressAction, LoopAction, PauseAction,
    SpeedchatAction, WriteTextAction,
};
use crate::errors::SimulatorError;
use crate::scaling::HorizontalAlignment;
use crate::types::{Key, Point};

fn default_click_hold() -> u64 {
    DEFAULT_CLICK_HOLD_MS
}

fn default_true() -> bool {
    true
}

/// One node of a declarative action tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionNode {
    Click {
        position: Point,
        #[serde(default)]
        alignment: HorizontalAlignment,
        #[serde(default = "default_click_hold")]
        hold_ms: u64,
    },
    KeyPress {
        key: Key,
        hold_ms: u64,
    },
    WriteText {
        text: String,
        #[serde(default)]
        pause_between_chars_ms: Option<u64>,
    },
    Pause {
        duration_ms: u64,
    },
    Speedchat {
        item_path: Vec<u32>,
        icon: Point,
        item_height: f64,
        level_x: Vec<f64>,
    },
    StraightFishingCast {
        flavor: FishingFlavor,
        release_point: Point,
    },
    AutomaticFishingCast {
        flavor: FishingFlavor,
        scan: BubbleScan,
        mapping: BubbleMapping,
        default_release: Point,
    },
    Compound {
        children: Vec<ActionNode>,
        ordering: CompoundOrdering,
        #[serde(default = "default_true")]
        looped: bool,
        pause_min_ms: u64,
        pause_max_ms: u64,
    },
    Loop {
        child: Box<ActionNode>,
        #[serde(default)]
        count: Option<u64>,
    },
}

impl ActionNode {
    /// Converts the description into the runtime tree, validating every
    /// parameter. Invalid arguments are reported as
    /// [`SimulatorError::InvalidArgument`] and never reach execution.
    pub fn build(self) -> Result<Action, SimulatorError> {
        match self {
            ActionNode::Click {
                position,
                alignment,
                hold_ms,
            } => Ok(Action::Click(ClickAction {
                position,
                alignment,
                hold: Duration::from_millis(hold_ms),
            })),
            ActionNode::KeyPress { key, hold_ms } => Ok(Action::KeyPress(KeyPressAction {
                key,
                hold: Duration::from_millis(hold_ms),
            })),
            ActionNode::WriteText {
                text,
                pause_between_chars_ms,
            } => Ok(Action::WriteText(WriteTextAction {
                text,
                pause_between_chars: pause_between_chars_ms.map(Duration::from_millis),
            })),
            ActionNode::Pause { duration_ms } => Ok(Action::Pause(PauseAction {
                duration: Duration::from_millis(duration_ms),
            })),
            ActionNode::Speedchat {
                item_path,
                icon,
                item_height,
                level_x,
            } => Ok(Action::Speedchat(SpeedchatAction::new(
                item_path,
                icon,
                item_height,
                level_x,
            )?)),
            ActionNode::StraightFishingCast {
                flavor,
                release_point,
            } => {
                validate_flavor(&flavor)?;
                Ok(Action::FishingCast(FishingCastAction {
                    flavor,
                    finisher: CastFinisher::Straight { release_point },
                }))
            }
            ActionNode::AutomaticFishingCast {
                flavor,
                scan,
                mapping,
                default_release,
            } => {
                validate_flavor(&flavor)?;
                if scan.step <= 0.0 {
                    return Err(SimulatorError::InvalidArgument(
                        "the bubble scan step must be positive".into(),
                    ));
                }
                if scan.max.x < scan.min.x || scan.max.y < scan.min.y {
                    return Err(SimulatorError::InvalidArgument(
                        "the bubble scan region is inverted".into(),
                    ));
                }
                Ok(Action::FishingCast(FishingCastAction {
                    flavor,
                    finisher: CastFinisher::Automatic {
                        scan,
                        mapping,
                        default_release,
                    },
                }))
            }
            ActionNode::Compound {
                children,
                ordering,
                looped,
                pause_min_ms,
                pause_max_ms,
            } => {
                let children = children
                    .into_iter()
                    .map(ActionNode::build)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Action::Compound(CompoundAction::new(
                    children,
                    ordering,
                    looped,
                    Duration::from_millis(pause_min_ms),
                    Duration::from_millis(pause_max_ms),
                )?))
            }
            ActionNode::Loop { child, count } => {
                Ok(Action::Loop(LoopAction::new(child.build()?, count)?))
            }
        }
    }
}

fn validate_flavor(flavor: &FishingFlavor) -> Result<(), SimulatorError> {
    if flavor.error_dialog_points.is_empty() {
        return Err(SimulatorError::InvalidArgument(
            "a fishing flavor needs at least one error-dialog reference point".into(),
        ));
    }
    if flavor.caught_dialog_points.is_empty() {
        return Err(SimulatorError::InvalidArgument(
            "a fishing flavor needs at least one catch-dialog reference point".into(),
        ));
    }
    if flavor.caught_min_matches == 0 || flavor.caught_min_matches > flavor.caught_dialog_points.len()
    {
        return Err(SimulatorError::InvalidArgument(format!(
            "the required catch-dialog match count ({}) must be between 1 and the \
             number of reference points ({})",
            flavor.caught_min_matches,
            flavor.caught_dialog_points.len()
        )));
    }
    Ok(())
}
