use thiserror::Error;

/// Errors raised by the simulator, the interaction provider and the actions.
///
/// The retry machinery only cares about three classes: `Cancelled` (never an
/// error, always propagated as-is), retryable failures (offered to the retry
/// policy) and everything else (propagated immediately).
#[derive(Error, Debug)]
pub enum SimulatorError {
    /// The run was cancelled. A normal terminal signal, not a failure.
    #[error("the simulation was cancelled")]
    Cancelled,

    /// No process with the configured name is currently running.
    #[error("could not find a process named \"{0}\"")]
    ProcessNotFound(String),

    /// The target window is minimized and the provider is configured to
    /// treat that as a failure.
    #[error("the target window is minimized")]
    WindowMinimized,

    /// The target window lost the foreground while running in a mode that
    /// requires it.
    #[error("the target window is no longer in the foreground")]
    WindowNotForeground,

    /// The target window's client area is narrower than the 4:3 canvas the
    /// click coordinates are authored against.
    #[error("the target window's aspect ratio is below 4:3 ({width}x{height}); please resize the window")]
    InvalidAspectRatio { width: u32, height: u32 },

    /// A recoverable OS-level failure (window vanished mid-call, an input
    /// call failed, a capture failed). Carries the failing OS call's error
    /// as a chained source when one exists, so a host can show the short
    /// message with the detail nested underneath.
    #[error("platform error: {message}")]
    Platform {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A business-rule condition detected on screen, e.g. the fishing error
    /// dialog (no bait / bucket full). Retryable so the UI can tell the user
    /// and offer to continue once they fixed it.
    #[error("{0}")]
    ActionFailed(String),

    /// A permanent configuration problem on this machine. Retrying would
    /// reproduce the identical failure, so this bypasses the retry policy.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An invalid argument supplied when building an action tree.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A contract violation inside the engine, e.g. an action invoking a
    /// capability it never declared. A defect, never a runtime condition.
    #[error("internal error: {0}")]
    Internal(String),

    /// The current OS has no native automation backend.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

impl SimulatorError {
    /// A platform failure with no underlying error object.
    pub fn platform(message: impl Into<String>) -> Self {
        SimulatorError::Platform {
            message: message.into(),
            source: None,
        }
    }

    /// A platform failure chaining the OS call's own error as its source.
    pub fn platform_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SimulatorError::Platform {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether this failure may be offered to the retry policy.
    ///
    /// Transient environment failures and detected business-rule conditions
    /// are retryable; cancellation, configuration problems and contract
    /// violations are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SimulatorError::ProcessNotFound(_)
                | SimulatorError::WindowMinimized
                | SimulatorError::WindowNotForeground
                | SimulatorError::InvalidAspectRatio { .. }
                | SimulatorError::Platform { .. }
                | SimulatorError::ActionFailed(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SimulatorError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn platform_errors_chain_their_cause() {
        let inner = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = SimulatorError::platform_source("failed to post a window message", inner);

        assert_eq!(err.to_string(), "platform error: failed to post a window message");
        let source = err.source().expect("the OS error is chained");
        assert!(source.to_string().contains("access denied"));
        assert!(err.is_retryable());
    }

    #[test]
    fn sourceless_platform_errors_have_no_chain() {
        let err = SimulatorError::platform("SendInput injected 0 of 1 events");
        assert!(err.source().is_none());
        assert!(err.is_retryable());
    }
}
