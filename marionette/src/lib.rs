//! Scripted desktop automation for a game window.
//!
//! This crate drives synthesized mouse and keyboard input into a target
//! window to run repetitive in-game tasks (fishing, gardening, chat macros)
//! unattended. A declarative action tree is built once ([`ActionNode`]),
//! resolved against a running process, and executed by a [`Simulator`] that
//! owns the window interaction, the screenshot cache used for pixel-based
//! decisions, cancellation and the retry protocol.
//!
//! The engine is deliberately synchronous: one worker thread runs the whole
//! tree, suspension only happens through cancellable waits, and a host (GUI
//! or headless) observes progress through an ordinary channel of
//! [`ProgressMessage`]s.

pub mod action;
pub mod capture;
pub mod errors;
pub mod events;
pub mod platforms;
pub mod provider;
pub mod scaling;
pub mod simulator;
#[cfg(test)]
mod tests;
pub mod types;

pub use action::{Action, ActionNode};
pub use capture::ScreenshotContent;
pub use errors::SimulatorError;
pub use events::{InitializingState, ProgressMessage, ProgressSink};
pub use platforms::{create_native_api, NativeApi, WindowHandle};
pub use provider::{
    CancellationToken, Interaction, InteractionProvider, RetryDecision, RetryPolicy,
};
pub use scaling::{HorizontalAlignment, REFERENCE_SIZE};
pub use simulator::Simulator;
pub use types::{Capabilities, Color, Key, OperatingMode, Point, Size, Tolerance, WindowPosition};
