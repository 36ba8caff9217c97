//! Structured progress messages pushed by the engine and drained by whatever
//! hosts it (a GUI, a logger, a test harness).
//!
//! The engine never blocks on or fails because of a consumer: messages go
//! through an ordinary mpsc channel and a hung-up receiver is ignored.

use std::sync::mpsc::{channel, Receiver, Sender};

/// Sub-state reported while the provider is acquiring the target window, so
/// a UI can show the matching guidance text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializingState {
    /// Exactly one matching window was found; waiting for it to reach the
    /// foreground.
    WaitingForForeground,
    /// Several matching processes are running; waiting for the user to bring
    /// the intended window to the foreground.
    MultipleWindows,
    /// The window has been acquired.
    Finished,
}

/// One progress message from the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressMessage {
    /// The simulator run began.
    Started,
    /// The simulator run ended, for any reason.
    Stopped,
    /// Window-acquisition progress.
    Initializing(InitializingState),
    /// Free-form progress text from an action.
    Info { text: String },
    /// A container began running the child at `index`.
    ChildStarted { index: usize },
    /// The container's active child finished (successfully or not).
    ChildStopped,
}

/// Cloneable sending side of the progress channel.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: Option<Sender<ProgressMessage>>,
}

impl ProgressSink {
    /// Creates a connected sink/receiver pair.
    pub fn channel() -> (Self, Receiver<ProgressMessage>) {
        let (tx, rx) = channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops every message, for headless use.
    pub fn ignore() -> Self {
        Self { tx: None }
    }

    /// Sends a message; a missing or hung-up receiver is not an error.
    pub fn emit(&self, message: ProgressMessage) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(message);
        }
    }

    pub fn info(&self, text: impl Into<String>) {
        self.emit(ProgressMessage::Info { text: text.into() });
    }
}
