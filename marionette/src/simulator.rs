//! The orchestrator: owns one interaction provider and one root action,
//! drives initialization, the run loop, cancellation and teardown.

use std::collections::HashMap;
use std::sync::mpsc::Receiver;

use tracing::{debug, info};

use crate::action::Action;
use crate::errors::SimulatorError;
use crate::events::{ProgressMessage, ProgressSink};
use crate::platforms::NativeApi;
use crate::provider::{
    CancellationToken, Interaction, InteractionProvider, RetryDecision, RetryPolicy,
};
use crate::types::{Capabilities, Key, OperatingMode};

/// Runs an action tree against a target window.
///
/// A simulator instance is single-use: once its run ends, for any reason, it
/// cannot be restarted (the OS handles it acquired are stale). Run the
/// blocking [`Simulator::run`] on a dedicated worker thread and keep a
/// [`CancellationToken`] from [`Simulator::cancel_handle`] to stop it from
/// anywhere.
pub struct Simulator {
    provider: InteractionProvider,
    root: Action,
    token: CancellationToken,
    sink: ProgressSink,
    finished: bool,
}

impl Simulator {
    /// Creates a simulator and the receiving end of its progress channel.
    ///
    /// The required capability set is fixed here to the union of the root
    /// tree's declarations and enforced on every provider call.
    pub fn new(
        api: Box<dyn NativeApi>,
        process_name: impl Into<String>,
        mode: OperatingMode,
        root: Action,
    ) -> (Self, Receiver<ProgressMessage>) {
        let (sink, receiver) = ProgressSink::channel();
        let token = CancellationToken::new();
        let capabilities = root.required_capabilities();
        let provider = InteractionProvider::new(
            api,
            process_name,
            mode,
            capabilities,
            sink.clone(),
            token.clone(),
        );
        (
            Self {
                provider,
                root,
                token,
                sink,
                finished: false,
            },
            receiver,
        )
    }

    pub fn required_capabilities(&self) -> Capabilities {
        self.root.required_capabilities()
    }

    /// Installs the decision function consulted on recoverable failures.
    /// Defaults to [`RetryDecision::Stop`].
    pub fn set_retry_policy(
        &mut self,
        policy: impl FnMut(&SimulatorError) -> RetryDecision + Send + 'static,
    ) {
        self.provider.set_retry_policy(Box::new(policy) as RetryPolicy);
    }

    /// See [`InteractionProvider::set_key_map`].
    pub fn set_key_map(&mut self, key_map: HashMap<Key, Key>) {
        self.provider.set_key_map(key_map);
    }

    /// See [`InteractionProvider::set_allow_minimized`].
    pub fn set_allow_minimized(&mut self, allow: bool) {
        self.provider.set_allow_minimized(allow);
    }

    /// A handle for requesting cancellation from any thread.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Runs the tree to completion. Blocks the calling thread.
    ///
    /// Returns `Ok(())` both on normal completion and on cancellation
    /// (cancellation is a normal terminal signal, not a failure). On every
    /// exit path the instance is marked finished, all active interactions
    /// are force-released and window-state changes reverted, and `Stopped`
    /// is emitted, so the target window is never left with stuck keys or
    /// buttons.
    pub fn run(&mut self) -> Result<(), SimulatorError> {
        if self.finished || self.token.is_cancelled() {
            return Err(SimulatorError::Internal(
                "this simulator has already run; create a new instance".into(),
            ));
        }

        info!(action = %self.root, "simulation starting");
        self.sink.emit(ProgressMessage::Started);
        let result = self.run_inner();

        self.finished = true;
        self.token.cancel();
        self.provider.cancel_active_interactions();
        self.sink.emit(ProgressMessage::Stopped);
        info!("simulation stopped");

        match result {
            Err(e) if e.is_cancelled() => Ok(()),
            other => other,
        }
    }

    fn run_inner(&mut self) -> Result<(), SimulatorError> {
        // Initialization failures go through the same retry policy as
        // running actions; retry_or_cancel() re-runs the initialization.
        if let Err(e) = self.provider.initialize() {
            if e.is_cancelled() {
                return Err(e);
            }
            self.provider.retry_or_cancel(e)?;
        }

        loop {
            match self.root.run(&mut self.provider) {
                Ok(()) => {
                    debug!("root action completed");
                    return Ok(());
                }
                Err(e) if e.is_cancelled() => return Err(e),
                // Containers already handled their own retries; anything
                // escaping the root is offered to the policy once more so a
                // bare leaf used as the root gets the same treatment.
                Err(e) => self.provider.retry_or_cancel(e)?,
            }
        }
    }
}
