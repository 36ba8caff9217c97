//! Scripted test doubles: a mock `Interaction` with a simulated clock for
//! action-level scenarios, and a mock `NativeApi` for provider/simulator
//! level tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{Rgba, RgbaImage};

use crate::capture::ScreenshotContent;
use crate::errors::SimulatorError;
use crate::events::ProgressMessage;
use crate::platforms::{NativeApi, WindowHandle};
use crate::provider::{Interaction, RetryDecision};
use crate::types::{Color, Key, Point, Size, WindowPosition};

pub fn solid_frame(size: Size, color: Color) -> RgbaImage {
    RgbaImage::from_pixel(
        size.width,
        size.height,
        Rgba([color.r, color.g, color.b, 255]),
    )
}

#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Wait(u64),
    WaitAccurate(u64),
    MoveMouse(Point),
    PressButton,
    ReleaseButton,
    KeyDown(Key),
    KeyUp(Key),
    Text(String),
    Screenshot,
}

type FrameFn = Box<dyn FnMut(usize, u64) -> RgbaImage>;

/// An `Interaction` whose clock only advances through waits, so timing
/// protocols (fishing polls, cancellation points) run instantly and
/// deterministically.
pub struct MockInteraction {
    pub window: WindowPosition,
    pub clock_ms: u64,
    pub calls: Vec<MockCall>,
    pub messages: Vec<ProgressMessage>,
    pub screenshots_taken: usize,
    pub retry_decisions: VecDeque<RetryDecision>,
    pub retries_asked: usize,
    pub reinitializations: usize,
    /// Fail this many upcoming `press_key` calls with a transient error.
    pub fail_key_presses: usize,
    pub key_press_attempts: usize,
    /// Report cancellation once `check_cancelled` has been called this often.
    pub cancel_after_checks: Option<usize>,
    pub checks_seen: std::cell::Cell<usize>,
    frame_fn: FrameFn,
    current_frame: Option<ScreenshotContent>,
}

impl MockInteraction {
    pub fn new(window_size: Size) -> Self {
        let window = WindowPosition {
            origin: (0, 0),
            size: window_size,
            is_minimized: false,
        };
        Self {
            window,
            clock_ms: 0,
            calls: Vec::new(),
            messages: Vec::new(),
            screenshots_taken: 0,
            retry_decisions: VecDeque::new(),
            retries_asked: 0,
            reinitializations: 0,
            fail_key_presses: 0,
            key_press_attempts: 0,
            cancel_after_checks: None,
            checks_seen: std::cell::Cell::new(0),
            frame_fn: Box::new(move |_, _| solid_frame(window_size, Color::new(0, 0, 0))),
            current_frame: None,
        }
    }

    /// Scripts the frame returned for the n-th screenshot (0-based) at the
    /// given simulated time.
    pub fn with_frames(mut self, frames: impl FnMut(usize, u64) -> RgbaImage + 'static) -> Self {
        self.frame_fn = Box::new(frames);
        self
    }

    pub fn child_started_indices(&self) -> Vec<usize> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                ProgressMessage::ChildStarted { index } => Some(*index),
                _ => None,
            })
            .collect()
    }

    pub fn count_calls(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.calls.iter().filter(|c| predicate(c)).count()
    }
}

impl Interaction for MockInteraction {
    fn wait(&mut self, duration: Duration) -> Result<(), SimulatorError> {
        let ms = duration.as_millis() as u64;
        self.calls.push(MockCall::Wait(ms));
        self.clock_ms += ms;
        Ok(())
    }

    fn wait_accurate(&mut self, duration: Duration) -> Result<(), SimulatorError> {
        let ms = duration.as_millis() as u64;
        self.calls.push(MockCall::WaitAccurate(ms));
        self.clock_ms += ms;
        Ok(())
    }

    fn window_position(&mut self) -> Result<WindowPosition, SimulatorError> {
        Ok(self.window)
    }

    fn screenshot(&mut self) -> Result<&ScreenshotContent, SimulatorError> {
        self.calls.push(MockCall::Screenshot);
        let index = self.screenshots_taken;
        self.screenshots_taken += 1;
        let image = (self.frame_fn)(index, self.clock_ms);
        self.current_frame = Some(ScreenshotContent::new(self.window, image)?);
        self.current_frame
            .as_ref()
            .ok_or_else(|| SimulatorError::Internal("mock frame vanished".into()))
    }

    fn move_mouse(&mut self, position: Point) -> Result<(), SimulatorError> {
        self.calls.push(MockCall::MoveMouse(position));
        Ok(())
    }

    fn press_mouse_button(&mut self) -> Result<(), SimulatorError> {
        self.calls.push(MockCall::PressButton);
        Ok(())
    }

    fn release_mouse_button(&mut self) -> Result<(), SimulatorError> {
        self.calls.push(MockCall::ReleaseButton);
        Ok(())
    }

    fn press_key(&mut self, key: Key) -> Result<(), SimulatorError> {
        self.key_press_attempts += 1;
        if self.fail_key_presses > 0 {
            self.fail_key_presses -= 1;
            return Err(SimulatorError::platform("scripted key failure"));
        }
        self.calls.push(MockCall::KeyDown(key));
        Ok(())
    }

    fn release_key(&mut self, key: Key) -> Result<(), SimulatorError> {
        self.calls.push(MockCall::KeyUp(key));
        Ok(())
    }

    fn write_text(&mut self, text: &str) -> Result<(), SimulatorError> {
        self.calls.push(MockCall::Text(text.to_string()));
        Ok(())
    }

    fn cancel_active_interactions(&mut self) {}

    fn check_cancelled(&self) -> Result<(), SimulatorError> {
        let seen = self.checks_seen.get();
        self.checks_seen.set(seen + 1);
        if let Some(limit) = self.cancel_after_checks {
            if seen >= limit {
                return Err(SimulatorError::Cancelled);
            }
        }
        Ok(())
    }

    fn emit(&mut self, message: ProgressMessage) {
        self.messages.push(message);
    }

    fn retry_or_cancel(&mut self, error: SimulatorError) -> Result<(), SimulatorError> {
        if error.is_cancelled() || !error.is_retryable() {
            return Err(error);
        }
        self.retries_asked += 1;
        match self.retry_decisions.pop_front().unwrap_or(RetryDecision::Stop) {
            RetryDecision::Stop => Err(SimulatorError::Cancelled),
            RetryDecision::Retry => {
                self.reinitializations += 1;
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    FindWindows,
    BringToForeground(WindowHandle),
    SendKey(Key, bool),
    PostKey(Key, bool),
    SendButton(bool),
    PostButton(bool, u32, u32),
    CursorMove(i32, i32),
    PostMove(u32, u32),
    SendChar(char),
    PostChar(char),
    Enable(bool),
    Topmost(bool),
    CaptureScreen,
    CaptureWindow,
}

#[derive(Debug)]
pub struct ApiState {
    pub windows: Vec<WindowHandle>,
    pub foreground: Option<WindowHandle>,
    /// `bring_to_foreground` succeeds on this mock: the window becomes
    /// foreground immediately.
    pub foreground_follows_bring: bool,
    /// Make this window foreground after the n-th `find_main_windows` call.
    pub promote_on_find: Option<(usize, WindowHandle)>,
    pub finds_seen: usize,
    pub position: WindowPosition,
    pub capture_color: Color,
    pub calls: Vec<ApiCall>,
}

/// Shared-state `NativeApi` double; tests keep a clone of the state handle.
#[derive(Clone)]
pub struct MockNativeApi {
    pub state: Arc<Mutex<ApiState>>,
}

impl MockNativeApi {
    pub fn new(window_size: Size) -> Self {
        let window = WindowHandle(1);
        Self {
            state: Arc::new(Mutex::new(ApiState {
                windows: vec![window],
                foreground: Some(window),
                foreground_follows_bring: true,
                promote_on_find: None,
                finds_seen: 0,
                position: WindowPosition {
                    origin: (100, 50),
                    size: window_size,
                    is_minimized: false,
                },
                capture_color: Color::new(20, 40, 60),
                calls: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ApiState> {
        self.state.lock().expect("mock api state poisoned")
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, predicate: impl Fn(&ApiCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| predicate(c)).count()
    }
}

impl NativeApi for MockNativeApi {
    fn find_main_windows(&self, _process_name: &str) -> Result<Vec<WindowHandle>, SimulatorError> {
        let mut state = self.lock();
        state.calls.push(ApiCall::FindWindows);
        state.finds_seen += 1;
        if let Some((on, window)) = state.promote_on_find {
            if state.finds_seen >= on {
                state.foreground = Some(window);
            }
        }
        Ok(state.windows.clone())
    }

    fn is_foreground(&self, window: WindowHandle) -> Result<bool, SimulatorError> {
        Ok(self.lock().foreground == Some(window))
    }

    fn bring_to_foreground(&self, window: WindowHandle) -> Result<(), SimulatorError> {
        let mut state = self.lock();
        state.calls.push(ApiCall::BringToForeground(window));
        if state.foreground_follows_bring {
            state.foreground = Some(window);
        }
        Ok(())
    }

    fn window_position(&self, _window: WindowHandle) -> Result<WindowPosition, SimulatorError> {
        Ok(self.lock().position)
    }

    fn set_window_enabled(
        &self,
        _window: WindowHandle,
        enabled: bool,
    ) -> Result<(), SimulatorError> {
        self.lock().calls.push(ApiCall::Enable(enabled));
        Ok(())
    }

    fn set_window_topmost(
        &self,
        _window: WindowHandle,
        topmost: bool,
    ) -> Result<(), SimulatorError> {
        self.lock().calls.push(ApiCall::Topmost(topmost));
        Ok(())
    }

    fn move_cursor(&self, x: i32, y: i32) -> Result<(), SimulatorError> {
        self.lock().calls.push(ApiCall::CursorMove(x, y));
        Ok(())
    }

    fn send_mouse_button(&self, down: bool) -> Result<(), SimulatorError> {
        self.lock().calls.push(ApiCall::SendButton(down));
        Ok(())
    }

    fn post_mouse_move(
        &self,
        _window: WindowHandle,
        x: u32,
        y: u32,
    ) -> Result<(), SimulatorError> {
        self.lock().calls.push(ApiCall::PostMove(x, y));
        Ok(())
    }

    fn post_mouse_button(
        &self,
        _window: WindowHandle,
        down: bool,
        x: u32,
        y: u32,
    ) -> Result<(), SimulatorError> {
        self.lock().calls.push(ApiCall::PostButton(down, x, y));
        Ok(())
    }

    fn send_key(&self, key: Key, down: bool) -> Result<(), SimulatorError> {
        self.lock().calls.push(ApiCall::SendKey(key, down));
        Ok(())
    }

    fn post_key(
        &self,
        _window: WindowHandle,
        key: Key,
        down: bool,
    ) -> Result<(), SimulatorError> {
        self.lock().calls.push(ApiCall::PostKey(key, down));
        Ok(())
    }

    fn send_char(&self, ch: char) -> Result<(), SimulatorError> {
        self.lock().calls.push(ApiCall::SendChar(ch));
        Ok(())
    }

    fn post_char(&self, _window: WindowHandle, ch: char) -> Result<(), SimulatorError> {
        self.lock().calls.push(ApiCall::PostChar(ch));
        Ok(())
    }

    fn capture_screen_region(
        &self,
        _x: i32,
        _y: i32,
        out: &mut RgbaImage,
    ) -> Result<(), SimulatorError> {
        let mut state = self.lock();
        state.calls.push(ApiCall::CaptureScreen);
        let color = state.capture_color;
        for pixel in out.pixels_mut() {
            pixel.0 = [color.r, color.g, color.b, 255];
        }
        Ok(())
    }

    fn capture_window(
        &self,
        _window: WindowHandle,
        out: &mut RgbaImage,
    ) -> Result<(), SimulatorError> {
        let mut state = self.lock();
        state.calls.push(ApiCall::CaptureWindow);
        let color = state.capture_color;
        for pixel in out.pixels_mut() {
            pixel.0 = [color.r, color.g, color.b, 255];
        }
        Ok(())
    }
}
