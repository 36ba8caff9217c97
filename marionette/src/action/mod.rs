//! The action model: a polymorphic tree of executable steps.
//!
//! Actions form an immutable tree built once from a declarative
//! [`ActionNode`](node::ActionNode) description. Leaves perform provider
//! operations; containers own child lists and a composition policy. Every
//! node declares the capabilities it needs up front and shares the uniform
//! synchronous run contract: suspension only ever happens through
//! [`Interaction::wait`](crate::provider::Interaction::wait).

use std::fmt;

use crate::errors::SimulatorError;
use crate::provider::Interaction;
use crate::types::Capabilities;

pub mod basic;
pub mod compound;
pub mod fishing;
pub mod node;
pub mod speedchat;

pub use basic::{ClickAction, KeyPressAction, PauseAction, WriteTextAction};
pub use compound::{CompoundAction, CompoundOrdering, LoopAction};
pub use fishing::{BubbleMapping, BubbleScan, CastFinisher, FishingCastAction, FishingFlavor};
pub use node::ActionNode;
pub use speedchat::SpeedchatAction;

/// A node of the runtime action tree. A closed set: the declarative loader
/// maps onto these variants through [`ActionNode::build`], which is where all
/// parameter validation happens.
#[derive(Debug, Clone)]
pub enum Action {
    Click(ClickAction),
    KeyPress(KeyPressAction),
    WriteText(WriteTextAction),
    Pause(PauseAction),
    Speedchat(SpeedchatAction),
    FishingCast(FishingCastAction),
    Compound(CompoundAction),
    Loop(LoopAction),
}

impl Action {
    /// Executes this action against the provider. Synchronous from the
    /// caller's perspective; errors propagate per the crate's retry taxonomy
    /// (containers are the retry boundary, leaves never catch).
    pub fn run(&self, itx: &mut dyn Interaction) -> Result<(), SimulatorError> {
        match self {
            Action::Click(a) => a.run(itx),
            Action::KeyPress(a) => a.run(itx),
            Action::WriteText(a) => a.run(itx),
            Action::Pause(a) => a.run(itx),
            Action::Speedchat(a) => a.run(itx),
            Action::FishingCast(a) => a.run(itx),
            Action::Compound(a) => a.run(itx),
            Action::Loop(a) => a.run(itx),
        }
    }

    /// The union of capabilities this subtree requires.
    pub fn required_capabilities(&self) -> Capabilities {
        match self {
            Action::Click(_) | Action::Speedchat(_) => Capabilities::MOUSE,
            Action::KeyPress(_) | Action::WriteText(_) => Capabilities::KEYBOARD,
            Action::Pause(_) => Capabilities::NONE,
            Action::FishingCast(_) => Capabilities::MOUSE.union(Capabilities::SCREENSHOT),
            Action::Compound(a) => a
                .children()
                .iter()
                .fold(Capabilities::NONE, |acc, c| acc.union(c.required_capabilities())),
            Action::Loop(a) => a.child().required_capabilities(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Click(a) => write!(f, "{a}"),
            Action::KeyPress(a) => write!(f, "{a}"),
            Action::WriteText(a) => write!(f, "{a}"),
            Action::Pause(a) => write!(f, "{a}"),
            Action::Speedchat(a) => write!(f, "{a}"),
            Action::FishingCast(a) => write!(f, "{a}"),
            Action::Compound(a) => write!(f, "{a}"),
            Action::Loop(a) => write!(f, "{a}"),
        }
    }
}
