//! The capability surface actions run against, and its production
//! implementation.
//!
//! One external thread may call [`CancellationToken::cancel`] while the run
//! thread calls everything else; all other state (screenshot cache, pressed
//! keys/buttons) is owned by the run thread exclusively.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::capture::{ScreenshotCache, ScreenshotContent};
use crate::errors::SimulatorError;
use crate::events::{InitializingState, ProgressMessage, ProgressSink};
use crate::platforms::{NativeApi, WindowHandle};
use crate::scaling;
use crate::types::{Capabilities, Key, OperatingMode, Point, WindowPosition};

/// Poll interval while acquiring the target window.
const ACQUIRE_POLL: Duration = Duration::from_millis(250);
/// Upper bound on one cancellable sleep slice, so a cancellation request is
/// honored within this latency even inside a long wait.
const WAIT_SLICE: Duration = Duration::from_millis(100);
/// Accurate waits sleep this much short of the target and busy-poll the rest.
const ACCURATE_MARGIN: Duration = Duration::from_millis(5);

/// One-way cancellation flag, safely observable across threads, with a
/// cancellable sleep built on top.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

#[derive(Debug, Default)]
struct TokenInner {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    condvar: Condvar,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag and wakes every in-flight wait. Callable from any
    /// thread, any number of times.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let _unused = self.inner.lock.lock();
        self.inner.condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), SimulatorError> {
        if self.is_cancelled() {
            Err(SimulatorError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleeps for `duration`, waking early with `Cancelled` if the token is
    /// cancelled. Slept in slices of at most [`WAIT_SLICE`].
    pub fn sleep(&self, duration: Duration) -> Result<(), SimulatorError> {
        let deadline = Instant::now() + duration;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            let slice = (deadline - now).min(WAIT_SLICE);
            let guard = self
                .inner
                .lock
                .lock()
                .map_err(|_| SimulatorError::Internal("cancellation lock poisoned".into()))?;
            // Spurious wakeups just loop; the deadline governs.
            let _ = self
                .inner
                .condvar
                .wait_timeout(guard, slice)
                .map_err(|_| SimulatorError::Internal("cancellation lock poisoned".into()))?;
        }
    }
}

/// The retry policy's answer for a recoverable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    Stop,
}

/// Decision function consulted on recoverable failures; supplied by the
/// hosting layer (typically a dialog asking the user to retry or stop).
pub type RetryPolicy = Box<dyn FnMut(&SimulatorError) -> RetryDecision + Send>;

/// What actions can do. All operations check for cancellation at entry and
/// may therefore fail with [`SimulatorError::Cancelled`] at any time.
pub trait Interaction {
    /// Suspends for `duration` and marks the screenshot cache stale.
    fn wait(&mut self, duration: Duration) -> Result<(), SimulatorError>;

    /// Like [`Interaction::wait`] but with sub-10ms precision, for exact
    /// key-hold durations.
    fn wait_accurate(&mut self, duration: Duration) -> Result<(), SimulatorError> {
        self.wait(duration)
    }

    /// Re-resolves the target window's geometry. Never cached.
    fn window_position(&mut self) -> Result<WindowPosition, SimulatorError>;

    /// Current frame of the target window, captured lazily.
    fn screenshot(&mut self) -> Result<&ScreenshotContent, SimulatorError>;

    /// Moves the mouse to a window-relative position (floating point,
    /// already scaled).
    fn move_mouse(&mut self, position: Point) -> Result<(), SimulatorError>;

    /// Presses the left mouse button at the last moved-to position. A second
    /// press without an intervening release never double-fires.
    fn press_mouse_button(&mut self) -> Result<(), SimulatorError>;

    /// Releases the left mouse button; a no-op when it is not pressed.
    fn release_mouse_button(&mut self) -> Result<(), SimulatorError>;

    /// Presses `key`; pressing an already-held key never double-fires.
    fn press_key(&mut self, key: Key) -> Result<(), SimulatorError>;

    /// Releases `key`; a no-op when it is not held.
    fn release_key(&mut self, key: Key) -> Result<(), SimulatorError>;

    /// Injects a sequence of character events.
    fn write_text(&mut self, text: &str) -> Result<(), SimulatorError>;

    /// Best-effort release of every held key/button and reversal of window
    /// state side effects. Runs during teardown and retry; never fails.
    fn cancel_active_interactions(&mut self);

    /// Cancellation check for container loops.
    fn check_cancelled(&self) -> Result<(), SimulatorError>;

    /// Pushes a progress message to the host.
    fn emit(&mut self, message: ProgressMessage);

    /// Routes a failure through the retry taxonomy: cancellation and
    /// non-retryable errors propagate unchanged; otherwise the retry policy
    /// decides. `Ok(())` means "retry the failed step from its start" and
    /// guarantees the provider has re-acquired the window; `Stop` comes back
    /// as `Cancelled`.
    fn retry_or_cancel(&mut self, error: SimulatorError) -> Result<(), SimulatorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProviderState {
    Uninitialized,
    Ready,
}

/// Production [`Interaction`] implementation mediating between the action
/// tree and the native OS layer.
pub struct InteractionProvider {
    api: Box<dyn NativeApi>,
    process_name: String,
    mode: OperatingMode,
    capabilities: Capabilities,
    token: CancellationToken,
    sink: ProgressSink,
    retry_policy: RetryPolicy,
    key_map: HashMap<Key, Key>,
    allow_minimized: bool,

    state: ProviderState,
    window: Option<WindowHandle>,
    window_disabled: bool,
    window_topmost: bool,
    pressed_keys: Vec<Key>,
    mouse_button_down: bool,
    last_mouse_target: Option<(u32, u32)>,
    cache: ScreenshotCache,
}

impl InteractionProvider {
    pub fn new(
        api: Box<dyn NativeApi>,
        process_name: impl Into<String>,
        mode: OperatingMode,
        capabilities: Capabilities,
        sink: ProgressSink,
        token: CancellationToken,
    ) -> Self {
        Self {
            api,
            process_name: process_name.into(),
            mode,
            capabilities,
            token,
            sink,
            retry_policy: Box::new(|_| RetryDecision::Stop),
            key_map: HashMap::new(),
            allow_minimized: false,
            state: ProviderState::Uninitialized,
            window: None,
            window_disabled: false,
            window_topmost: false,
            pressed_keys: Vec::new(),
            mouse_button_down: false,
            last_mouse_target: None,
            cache: ScreenshotCache::new(),
        }
    }

    pub fn set_retry_policy(&mut self, policy: RetryPolicy) {
        self.retry_policy = policy;
    }

    /// Virtual-key remapping applied transparently before dispatch, e.g.
    /// arrows to WASD for a movement-key scheme.
    pub fn set_key_map(&mut self, key_map: HashMap<Key, Key>) {
        self.key_map = key_map;
    }

    /// Whether a minimized window is acceptable (default: it is a failure).
    pub fn set_allow_minimized(&mut self, allow: bool) {
        self.allow_minimized = allow;
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Locates the target process/window and, depending on the operating
    /// mode, brings it to the foreground or claims it for exclusive use.
    ///
    /// Polls every 250ms until the window situation settles, reporting the
    /// current sub-state so a UI can display matching guidance.
    pub fn initialize(&mut self) -> Result<(), SimulatorError> {
        self.token.check()?;
        debug!(process = %self.process_name, mode = ?self.mode, "acquiring target window");
        let window = self.acquire_window()?;
        self.window = Some(window);

        if self.mode == OperatingMode::BackgroundExclusive {
            self.api.set_window_enabled(window, false)?;
            self.window_disabled = true;
            self.api.set_window_topmost(window, true)?;
            self.window_topmost = true;
        }

        self.state = ProviderState::Ready;
        self.sink
            .emit(ProgressMessage::Initializing(InitializingState::Finished));
        info!(process = %self.process_name, "target window acquired");
        Ok(())
    }

    fn acquire_window(&mut self) -> Result<WindowHandle, SimulatorError> {
        loop {
            self.token.check()?;
            let windows = self.api.find_main_windows(&self.process_name)?;
            match windows.len() {
                0 => {
                    return Err(SimulatorError::ProcessNotFound(self.process_name.clone()));
                }
                1 => {
                    let window = windows[0];
                    if !self.mode.requires_foreground() {
                        return Ok(window);
                    }
                    if self.api.is_foreground(window)? {
                        return Ok(window);
                    }
                    self.api.bring_to_foreground(window)?;
                    self.sink.emit(ProgressMessage::Initializing(
                        InitializingState::WaitingForForeground,
                    ));
                    self.token.sleep(ACQUIRE_POLL)?;
                }
                _ => {
                    // Several candidates: the user picks by focusing one.
                    let mut foreground = None;
                    for &window in &windows {
                        if self.api.is_foreground(window)? {
                            foreground = Some(window);
                            break;
                        }
                    }
                    if let Some(window) = foreground {
                        return Ok(window);
                    }
                    self.sink.emit(ProgressMessage::Initializing(
                        InitializingState::MultipleWindows,
                    ));
                    self.token.sleep(ACQUIRE_POLL)?;
                }
            }
        }
    }

    fn require_capability(
        &self,
        required: Capabilities,
        name: &str,
    ) -> Result<(), SimulatorError> {
        if !self.capabilities.contains(required) {
            return Err(SimulatorError::Internal(format!(
                "the action tree never declared the {name} capability"
            )));
        }
        Ok(())
    }

    fn current_window(&self) -> Result<WindowHandle, SimulatorError> {
        if self.state != ProviderState::Ready {
            return Err(SimulatorError::Internal(
                "the provider has not been initialized".into(),
            ));
        }
        self.window
            .ok_or_else(|| SimulatorError::Internal("the provider has no window".into()))
    }

    /// Geometry query plus the per-mode validity checks.
    fn resolve_window_position(&mut self) -> Result<WindowPosition, SimulatorError> {
        let window = self.current_window()?;
        let position = self.api.window_position(window)?;
        if position.is_minimized && !self.allow_minimized {
            return Err(SimulatorError::WindowMinimized);
        }
        if self.mode.requires_foreground() && !self.api.is_foreground(window)? {
            return Err(SimulatorError::WindowNotForeground);
        }
        // The scaling layer cannot work with a narrower-than-4:3 client area,
        // so reject it here where the retry policy can ask the user to resize.
        if (position.size.aspect_ratio()) < 4.0 / 3.0 - 1e-9 {
            return Err(SimulatorError::InvalidAspectRatio {
                width: position.size.width,
                height: position.size.height,
            });
        }
        Ok(position)
    }

    fn dispatch_key(&mut self, key: Key, down: bool) -> Result<(), SimulatorError> {
        if self.mode.is_background() {
            let window = self.current_window()?;
            self.api.post_key(window, key, down)
        } else {
            self.api.send_key(key, down)
        }
    }

    fn dispatch_mouse_button(&mut self, down: bool) -> Result<(), SimulatorError> {
        if self.mode.is_background() {
            let window = self.current_window()?;
            let (x, y) = self.last_mouse_target.ok_or_else(|| {
                SimulatorError::Internal("mouse button used before any mouse move".into())
            })?;
            self.api.post_mouse_button(window, down, x, y)
        } else {
            self.api.send_mouse_button(down)
        }
    }
}

impl Interaction for InteractionProvider {
    fn wait(&mut self, duration: Duration) -> Result<(), SimulatorError> {
        self.token.check()?;
        self.cache.invalidate();
        self.token.sleep(duration)
    }

    fn wait_accurate(&mut self, duration: Duration) -> Result<(), SimulatorError> {
        self.token.check()?;
        self.cache.invalidate();
        let deadline = Instant::now() + duration;
        if duration > ACCURATE_MARGIN {
            self.token.sleep(duration - ACCURATE_MARGIN)?;
        }
        // Busy-poll the high-resolution clock for the remainder.
        while Instant::now() < deadline {
            self.token.check()?;
            std::hint::spin_loop();
        }
        Ok(())
    }

    fn window_position(&mut self) -> Result<WindowPosition, SimulatorError> {
        self.token.check()?;
        self.resolve_window_position()
    }

    fn screenshot(&mut self) -> Result<&ScreenshotContent, SimulatorError> {
        self.token.check()?;
        self.require_capability(Capabilities::SCREENSHOT, "screenshot-capture")?;
        let window = self.current_window()?;
        let position = self.resolve_window_position()?;
        self.cache
            .get_or_capture(self.api.as_ref(), window, position, self.mode)
    }

    fn move_mouse(&mut self, position: Point) -> Result<(), SimulatorError> {
        self.token.check()?;
        self.require_capability(Capabilities::MOUSE, "mouse-input")?;
        let window_position = self.resolve_window_position()?;
        let (x, y) = scaling::to_pixel(position, window_position.size);
        self.last_mouse_target = Some((x, y));
        if self.mode.is_background() {
            let window = self.current_window()?;
            self.api.post_mouse_move(window, x, y)
        } else {
            let (sx, sy) = window_position.to_screen(x, y);
            self.api.move_cursor(sx, sy)
        }
    }

    fn press_mouse_button(&mut self) -> Result<(), SimulatorError> {
        self.token.check()?;
        self.require_capability(Capabilities::MOUSE, "mouse-input")?;
        if self.mouse_button_down {
            debug!("mouse button already down; not pressing again");
            return Ok(());
        }
        self.dispatch_mouse_button(true)?;
        self.mouse_button_down = true;
        Ok(())
    }

    fn release_mouse_button(&mut self) -> Result<(), SimulatorError> {
        self.token.check()?;
        self.require_capability(Capabilities::MOUSE, "mouse-input")?;
        if !self.mouse_button_down {
            return Ok(());
        }
        self.dispatch_mouse_button(false)?;
        self.mouse_button_down = false;
        Ok(())
    }

    fn press_key(&mut self, key: Key) -> Result<(), SimulatorError> {
        self.token.check()?;
        self.require_capability(Capabilities::KEYBOARD, "keyboard-input")?;
        let key = *self.key_map.get(&key).unwrap_or(&key);
        if self.pressed_keys.contains(&key) {
            debug!(?key, "key already held; not pressing again");
            return Ok(());
        }
        self.dispatch_key(key, true)?;
        self.pressed_keys.push(key);
        Ok(())
    }

    fn release_key(&mut self, key: Key) -> Result<(), SimulatorError> {
        self.token.check()?;
        self.require_capability(Capabilities::KEYBOARD, "keyboard-input")?;
        let key = *self.key_map.get(&key).unwrap_or(&key);
        let Some(index) = self.pressed_keys.iter().position(|&k| k == key) else {
            return Ok(());
        };
        self.dispatch_key(key, false)?;
        self.pressed_keys.remove(index);
        Ok(())
    }

    fn write_text(&mut self, text: &str) -> Result<(), SimulatorError> {
        self.token.check()?;
        self.require_capability(Capabilities::KEYBOARD, "keyboard-input")?;
        if self.mode.is_background() {
            let window = self.current_window()?;
            for ch in text.chars() {
                self.api.post_char(window, ch)?;
            }
        } else {
            for ch in text.chars() {
                self.api.send_char(ch)?;
            }
        }
        Ok(())
    }

    fn cancel_active_interactions(&mut self) {
        // Teardown path: every step swallows its own errors so a failing
        // release cannot prevent the remaining releases.
        for key in std::mem::take(&mut self.pressed_keys) {
            if let Err(e) = self.dispatch_key(key, false) {
                warn!(?key, error = %e, "failed to release a held key");
            }
        }
        if self.mouse_button_down {
            self.mouse_button_down = false;
            if let Err(e) = self.dispatch_mouse_button(false) {
                warn!(error = %e, "failed to release the mouse button");
            }
        }
        if let Some(window) = self.window {
            if self.window_disabled {
                self.window_disabled = false;
                if let Err(e) = self.api.set_window_enabled(window, true) {
                    warn!(error = %e, "failed to re-enable the window");
                }
            }
            if self.window_topmost {
                self.window_topmost = false;
                if let Err(e) = self.api.set_window_topmost(window, false) {
                    warn!(error = %e, "failed to remove the forced topmost state");
                }
            }
        }
    }

    fn check_cancelled(&self) -> Result<(), SimulatorError> {
        self.token.check()
    }

    fn emit(&mut self, message: ProgressMessage) {
        self.sink.emit(message);
    }

    fn retry_or_cancel(&mut self, error: SimulatorError) -> Result<(), SimulatorError> {
        let mut error = error;
        loop {
            if error.is_cancelled() || !error.is_retryable() {
                return Err(error);
            }
            info!(error = %error, "asking the retry policy");
            match (self.retry_policy)(&error) {
                RetryDecision::Stop => return Err(SimulatorError::Cancelled),
                RetryDecision::Retry => {
                    // Release anything still held, then re-acquire the window
                    // before the caller re-runs the failed step.
                    self.cancel_active_interactions();
                    match self.initialize() {
                        Ok(()) => return Ok(()),
                        Err(e) if e.is_cancelled() => return Err(e),
                        Err(e) => error = e,
                    }
                }
            }
        }
    }
}
