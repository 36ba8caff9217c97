use std::thread;
use std::time::{Duration, Instant};

use crate::errors::SimulatorError;
use crate::events::{InitializingState, ProgressMessage, ProgressSink};
use crate::platforms::WindowHandle;
use crate::provider::{CancellationToken, Interaction, InteractionProvider};
use crate::tests::mock::{ApiCall, MockNativeApi};
use crate::types::{Capabilities, Key, OperatingMode, Point, Size};

const WINDOW: Size = Size::new(1600, 1200);

fn provider(
    api: &MockNativeApi,
    mode: OperatingMode,
    capabilities: Capabilities,
) -> (InteractionProvider, CancellationToken) {
    let token = CancellationToken::new();
    let provider = InteractionProvider::new(
        Box::new(api.clone()),
        "toontown",
        mode,
        capabilities,
        ProgressSink::ignore(),
        token.clone(),
    );
    (provider, token)
}

fn ready_provider(
    api: &MockNativeApi,
    mode: OperatingMode,
    capabilities: Capabilities,
) -> InteractionProvider {
    let (mut p, _token) = provider(api, mode, capabilities);
    p.initialize().expect("initialization succeeds");
    p
}

#[test]
fn pressing_a_held_key_does_not_double_fire() {
    super::init_tracing();
    let api = MockNativeApi::new(WINDOW);
    let mut p = ready_provider(&api, OperatingMode::Foreground, Capabilities::KEYBOARD);

    p.press_key(Key::W).unwrap();
    p.press_key(Key::W).unwrap();
    assert_eq!(
        api.count_calls(|c| matches!(c, ApiCall::SendKey(Key::W, true))),
        1
    );

    p.release_key(Key::W).unwrap();
    p.release_key(Key::W).unwrap();
    assert_eq!(
        api.count_calls(|c| matches!(c, ApiCall::SendKey(Key::W, false))),
        1
    );
}

#[test]
fn cancel_active_interactions_releases_everything() {
    super::init_tracing();
    let api = MockNativeApi::new(WINDOW);
    let mut p = ready_provider(
        &api,
        OperatingMode::Foreground,
        Capabilities::KEYBOARD.union(Capabilities::MOUSE),
    );

    p.press_key(Key::W).unwrap();
    p.press_key(Key::Control).unwrap();
    p.move_mouse(Point::new(10.0, 10.0)).unwrap();
    p.press_mouse_button().unwrap();
    p.press_mouse_button().unwrap();
    assert_eq!(api.count_calls(|c| matches!(c, ApiCall::SendButton(true))), 1);

    p.cancel_active_interactions();
    assert_eq!(
        api.count_calls(|c| matches!(c, ApiCall::SendKey(_, false))),
        2
    );
    assert_eq!(api.count_calls(|c| matches!(c, ApiCall::SendButton(false))), 1);

    // The pressed state is empty now: pressing again goes through.
    p.press_key(Key::W).unwrap();
    assert_eq!(
        api.count_calls(|c| matches!(c, ApiCall::SendKey(Key::W, true))),
        2
    );
}

#[test]
fn key_map_is_applied_before_dispatch() {
    super::init_tracing();
    let api = MockNativeApi::new(WINDOW);
    let mut p = ready_provider(&api, OperatingMode::Foreground, Capabilities::KEYBOARD);
    p.set_key_map([(Key::Up, Key::W)].into_iter().collect());

    p.press_key(Key::Up).unwrap();
    p.release_key(Key::Up).unwrap();
    assert_eq!(
        api.count_calls(|c| matches!(c, ApiCall::SendKey(Key::W, true))),
        1
    );
    assert_eq!(api.count_calls(|c| matches!(c, ApiCall::SendKey(Key::Up, _))), 0);
}

#[test]
fn undeclared_capability_is_a_contract_error() {
    super::init_tracing();
    let api = MockNativeApi::new(WINDOW);
    let mut p = ready_provider(&api, OperatingMode::Foreground, Capabilities::KEYBOARD);

    let err = p.move_mouse(Point::new(1.0, 1.0)).expect_err("must fail");
    assert!(matches!(err, SimulatorError::Internal(_)));
    assert!(!err.is_retryable());
}

#[test]
fn cancelling_a_long_wait_unblocks_within_one_slice() {
    super::init_tracing();
    let api = MockNativeApi::new(WINDOW);
    let (mut p, token) = provider(&api, OperatingMode::Foreground, Capabilities::NONE);

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        token.cancel();
    });

    let started = Instant::now();
    let err = p.wait(Duration::from_secs(10)).expect_err("must be cancelled");
    let elapsed = started.elapsed();
    canceller.join().unwrap();

    assert!(err.is_cancelled());
    assert!(
        elapsed < Duration::from_millis(500),
        "wait took {elapsed:?} to observe cancellation"
    );
}

#[test]
fn initialization_polls_until_the_window_is_foreground() {
    super::init_tracing();
    let api = MockNativeApi::new(WINDOW);
    {
        let mut state = api.state.lock().unwrap();
        state.foreground = None;
        state.foreground_follows_bring = false;
        state.promote_on_find = Some((2, WindowHandle(1)));
    }
    let (sink, rx) = ProgressSink::channel();
    let token = CancellationToken::new();
    let mut p = InteractionProvider::new(
        Box::new(api.clone()),
        "toontown",
        OperatingMode::Foreground,
        Capabilities::NONE,
        sink,
        token,
    );
    p.initialize().expect("initialization succeeds");

    assert!(api.count_calls(|c| matches!(c, ApiCall::BringToForeground(_))) >= 1);
    let messages: Vec<ProgressMessage> = rx.try_iter().collect();
    assert!(messages
        .contains(&ProgressMessage::Initializing(InitializingState::WaitingForForeground)));
    assert_eq!(
        messages.last(),
        Some(&ProgressMessage::Initializing(InitializingState::Finished))
    );
}

#[test]
fn initialization_with_multiple_windows_waits_for_the_users_pick() {
    super::init_tracing();
    let api = MockNativeApi::new(WINDOW);
    {
        let mut state = api.state.lock().unwrap();
        state.windows = vec![WindowHandle(1), WindowHandle(2)];
        state.foreground = None;
        state.promote_on_find = Some((2, WindowHandle(2)));
    }
    let (sink, rx) = ProgressSink::channel();
    let token = CancellationToken::new();
    let mut p = InteractionProvider::new(
        Box::new(api.clone()),
        "toontown",
        OperatingMode::Background,
        Capabilities::NONE,
        sink,
        token,
    );
    p.initialize().expect("initialization succeeds");

    let messages: Vec<ProgressMessage> = rx.try_iter().collect();
    assert!(messages
        .contains(&ProgressMessage::Initializing(InitializingState::MultipleWindows)));
    assert_eq!(
        messages.last(),
        Some(&ProgressMessage::Initializing(InitializingState::Finished))
    );
}

#[test]
fn missing_process_is_a_transient_error() {
    super::init_tracing();
    let api = MockNativeApi::new(WINDOW);
    api.state.lock().unwrap().windows.clear();
    let (mut p, _token) = provider(&api, OperatingMode::Foreground, Capabilities::NONE);

    let err = p.initialize().expect_err("no window to acquire");
    assert!(matches!(err, SimulatorError::ProcessNotFound(_)));
    assert!(err.is_retryable());
}

#[test]
fn minimized_window_fails_geometry_checks() {
    super::init_tracing();
    let api = MockNativeApi::new(WINDOW);
    let mut p = ready_provider(&api, OperatingMode::Background, Capabilities::NONE);

    api.state.lock().unwrap().position.is_minimized = true;
    let err = p.window_position().expect_err("minimized is an error");
    assert!(matches!(err, SimulatorError::WindowMinimized));

    p.set_allow_minimized(true);
    p.window_position().expect("explicitly allowed");
}

#[test]
fn narrow_window_fails_geometry_checks() {
    super::init_tracing();
    let api = MockNativeApi::new(WINDOW);
    let mut p = ready_provider(&api, OperatingMode::Background, Capabilities::NONE);

    api.state.lock().unwrap().position.size = Size::new(800, 900);
    let err = p.window_position().expect_err("4:3 minimum is enforced");
    assert!(matches!(err, SimulatorError::InvalidAspectRatio { .. }));
}

#[test]
fn screenshot_bursts_reuse_one_capture_until_a_wait() {
    super::init_tracing();
    let api = MockNativeApi::new(WINDOW);
    let mut p = ready_provider(&api, OperatingMode::Foreground, Capabilities::SCREENSHOT);

    p.screenshot().unwrap();
    p.screenshot().unwrap();
    assert_eq!(api.count_calls(|c| matches!(c, ApiCall::CaptureScreen)), 1);

    p.wait(Duration::from_millis(1)).unwrap();
    p.screenshot().unwrap();
    assert_eq!(api.count_calls(|c| matches!(c, ApiCall::CaptureScreen)), 2);
}

#[test]
fn all_black_window_capture_is_a_permanent_error() {
    super::init_tracing();
    let api = MockNativeApi::new(WINDOW);
    api.state.lock().unwrap().capture_color = crate::types::Color::new(0, 0, 0);
    let mut p = ready_provider(&api, OperatingMode::Background, Capabilities::SCREENSHOT);

    let err = p.screenshot().expect_err("a black first frame must fail");
    assert!(matches!(err, SimulatorError::Configuration(_)));
    assert!(!err.is_retryable());
}

#[test]
fn exclusive_mode_claims_and_releases_the_window() {
    super::init_tracing();
    let api = MockNativeApi::new(WINDOW);
    let mut p = ready_provider(
        &api,
        OperatingMode::BackgroundExclusive,
        Capabilities::NONE,
    );
    assert_eq!(api.count_calls(|c| matches!(c, ApiCall::Enable(false))), 1);
    assert_eq!(api.count_calls(|c| matches!(c, ApiCall::Topmost(true))), 1);

    p.cancel_active_interactions();
    assert_eq!(api.count_calls(|c| matches!(c, ApiCall::Enable(true))), 1);
    assert_eq!(api.count_calls(|c| matches!(c, ApiCall::Topmost(false))), 1);
}

#[test]
fn background_mode_posts_input_to_the_window() {
    super::init_tracing();
    let api = MockNativeApi::new(WINDOW);
    let mut p = ready_provider(
        &api,
        OperatingMode::Background,
        Capabilities::KEYBOARD.union(Capabilities::MOUSE),
    );

    p.move_mouse(Point::new(100.0, 200.0)).unwrap();
    p.press_mouse_button().unwrap();
    p.release_mouse_button().unwrap();
    p.press_key(Key::D).unwrap();
    p.write_text("hi").unwrap();

    assert_eq!(api.count_calls(|c| matches!(c, ApiCall::PostMove(100, 200))), 1);
    assert_eq!(api.count_calls(|c| matches!(c, ApiCall::PostButton(true, 100, 200))), 1);
    assert_eq!(api.count_calls(|c| matches!(c, ApiCall::PostKey(Key::D, true))), 1);
    assert_eq!(api.count_calls(|c| matches!(c, ApiCall::PostChar('h'))), 1);
    assert_eq!(api.count_calls(|c| matches!(c, ApiCall::SendKey(_, _))), 0);
    assert_eq!(api.count_calls(|c| matches!(c, ApiCall::CursorMove(_, _))), 0);
}
