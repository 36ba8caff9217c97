//! Win32 implementation of [`NativeApi`].
//!
//! Process discovery walks a ToolHelp snapshot; input goes out either through
//! `SendInput` (global) or `PostMessageW` (targeted at the window, so it can
//! stay in the background); capture uses GDI, either from the screen DC or
//! from the window's own surface via `PrintWindow`.

use image::RgbaImage;
use tracing::{debug, warn};

use windows::Win32::Foundation::{CloseHandle, BOOL, HANDLE, HWND, LPARAM, POINT, RECT, WPARAM};
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC, GetDIBits,
    ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, HDC, SRCCOPY,
};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W, TH32CS_SNAPPROCESS,
};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, SetFocus, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT, KEYEVENTF_KEYUP,
    KEYEVENTF_UNICODE, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP, MOUSEINPUT, VIRTUAL_KEY,
    VK_BACK, VK_CONTROL, VK_DOWN, VK_END, VK_ESCAPE, VK_HOME, VK_LEFT, VK_MENU, VK_NEXT,
    VK_PRIOR, VK_RETURN, VK_RIGHT, VK_SHIFT, VK_SPACE, VK_TAB, VK_UP,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetClientRect, GetForegroundWindow, GetWindowTextLengthW,
    GetWindowThreadProcessId, IsIconic, IsWindowVisible, PrintWindow, SetCursorPos,
    SetForegroundWindow, SetWindowPos, EnableWindow, ClientToScreen, HWND_NOTOPMOST, HWND_TOPMOST,
    PRINT_WINDOW_FLAGS, SWP_NOMOVE, SWP_NOSIZE, WM_CHAR, WM_KEYDOWN, WM_KEYUP, WM_LBUTTONDOWN,
    WM_LBUTTONUP, WM_MOUSEMOVE,
};
use windows::Win32::UI::WindowsAndMessaging::PostMessageW;

use crate::errors::SimulatorError;
use crate::platforms::{NativeApi, WindowHandle};
use crate::types::{Key, Size, WindowPosition};

const PW_CLIENTONLY: PRINT_WINDOW_FLAGS = PRINT_WINDOW_FLAGS(1);

pub struct WindowsApi;

impl WindowsApi {
    pub fn new() -> Result<Self, SimulatorError> {
        Ok(Self)
    }
}

// RAII guard for snapshot/process handles, as in the ToolHelp walk this is
// adapted from.
struct HandleGuard(HANDLE);

impl Drop for HandleGuard {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

struct DcGuard {
    hwnd: HWND,
    hdc: HDC,
}

impl Drop for DcGuard {
    fn drop(&mut self) {
        unsafe {
            ReleaseDC(self.hwnd, self.hdc);
        }
    }
}

fn hwnd(window: WindowHandle) -> HWND {
    HWND(window.0 as isize as *mut core::ffi::c_void)
}

fn platform_err(
    context: &str,
    e: impl std::error::Error + Send + Sync + 'static,
) -> SimulatorError {
    SimulatorError::platform_source(context, e)
}

/// Collects the PIDs of every process whose executable name (without `.exe`)
/// matches `process_name` case-insensitively.
fn find_process_ids(process_name: &str) -> Result<Vec<u32>, SimulatorError> {
    let wanted = process_name.to_ascii_lowercase();
    let mut pids = Vec::new();
    unsafe {
        let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0)
            .map_err(|e| platform_err("failed to create process snapshot", e))?;
        let _guard = HandleGuard(snapshot);

        let mut entry = PROCESSENTRY32W {
            dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };
        if let Err(e) = Process32FirstW(snapshot, &mut entry) {
            return Err(platform_err("failed to read the first process entry", e));
        }
        loop {
            let name_len = entry
                .szExeFile
                .iter()
                .position(|&c| c == 0)
                .unwrap_or(entry.szExeFile.len());
            let name = String::from_utf16_lossy(&entry.szExeFile[..name_len]);
            let name = name
                .strip_suffix(".exe")
                .or_else(|| name.strip_suffix(".EXE"))
                .unwrap_or(&name);
            if name.eq_ignore_ascii_case(&wanted) {
                pids.push(entry.th32ProcessID);
            }
            if Process32NextW(snapshot, &mut entry).is_err() {
                break;
            }
        }
    }
    Ok(pids)
}

struct EnumState {
    pids: Vec<u32>,
    found: Vec<WindowHandle>,
}

unsafe extern "system" fn enum_windows_proc(window: HWND, lparam: LPARAM) -> BOOL {
    let state = &mut *(lparam.0 as *mut EnumState);
    let mut pid = 0u32;
    GetWindowThreadProcessId(window, Some(&mut pid));
    if state.pids.contains(&pid)
        && IsWindowVisible(window).as_bool()
        && GetWindowTextLengthW(window) > 0
    {
        state.found.push(WindowHandle(window.0 as usize as u64));
    }
    true.into()
}

impl NativeApi for WindowsApi {
    fn find_main_windows(&self, process_name: &str) -> Result<Vec<WindowHandle>, SimulatorError> {
        let pids = find_process_ids(process_name)?;
        if pids.is_empty() {
            return Ok(Vec::new());
        }
        let mut state = EnumState {
            pids,
            found: Vec::new(),
        };
        unsafe {
            EnumWindows(
                Some(enum_windows_proc),
                LPARAM(&mut state as *mut EnumState as isize),
            )
            .map_err(|e| platform_err("failed to enumerate windows", e))?;
        }
        debug!(
            process = process_name,
            windows = state.found.len(),
            "resolved candidate windows"
        );
        Ok(state.found)
    }

    fn is_foreground(&self, window: WindowHandle) -> Result<bool, SimulatorError> {
        unsafe { Ok(GetForegroundWindow() == hwnd(window)) }
    }

    fn bring_to_foreground(&self, window: WindowHandle) -> Result<(), SimulatorError> {
        unsafe {
            if !SetForegroundWindow(hwnd(window)).as_bool() {
                // The OS refuses this in some focus-stealing situations; the
                // caller polls until the window actually is foreground.
                warn!("SetForegroundWindow was refused");
            }
            let _ = SetFocus(hwnd(window));
        }
        Ok(())
    }

    fn window_position(&self, window: WindowHandle) -> Result<WindowPosition, SimulatorError> {
        let handle = hwnd(window);
        unsafe {
            let minimized = IsIconic(handle).as_bool();
            let mut rect = RECT::default();
            GetClientRect(handle, &mut rect)
                .map_err(|e| platform_err("failed to query the client rectangle", e))?;
            let mut origin = POINT { x: 0, y: 0 };
            if !ClientToScreen(handle, &mut origin).as_bool() {
                return Err(SimulatorError::platform(
                    "failed to translate the client origin to screen coordinates",
                ));
            }
            Ok(WindowPosition {
                origin: (origin.x, origin.y),
                size: Size::new(
                    (rect.right - rect.left).max(0) as u32,
                    (rect.bottom - rect.top).max(0) as u32,
                ),
                is_minimized: minimized,
            })
        }
    }

    fn set_window_enabled(
        &self,
        window: WindowHandle,
        enabled: bool,
    ) -> Result<(), SimulatorError> {
        unsafe {
            let _ = EnableWindow(hwnd(window), enabled);
        }
        Ok(())
    }

    fn set_window_topmost(
        &self,
        window: WindowHandle,
        topmost: bool,
    ) -> Result<(), SimulatorError> {
        unsafe {
            let order = if topmost { HWND_TOPMOST } else { HWND_NOTOPMOST };
            SetWindowPos(hwnd(window), order, 0, 0, 0, 0, SWP_NOMOVE | SWP_NOSIZE)
                .map_err(|e| platform_err("failed to change the window z-order", e))?;
        }
        Ok(())
    }

    fn move_cursor(&self, x: i32, y: i32) -> Result<(), SimulatorError> {
        unsafe {
            SetCursorPos(x, y).map_err(|e| platform_err("failed to move the cursor", e))?;
        }
        Ok(())
    }

    fn send_mouse_button(&self, down: bool) -> Result<(), SimulatorError> {
        let flags = if down {
            MOUSEEVENTF_LEFTDOWN
        } else {
            MOUSEEVENTF_LEFTUP
        };
        let input = INPUT {
            r#type: INPUT_MOUSE,
            Anonymous: INPUT_0 {
                mi: MOUSEINPUT {
                    dwFlags: flags,
                    ..Default::default()
                },
            },
        };
        send_inputs(&[input])
    }

    fn post_mouse_move(
        &self,
        window: WindowHandle,
        x: u32,
        y: u32,
    ) -> Result<(), SimulatorError> {
        post(window, WM_MOUSEMOVE, WPARAM(0), client_lparam(x, y))
    }

    fn post_mouse_button(
        &self,
        window: WindowHandle,
        down: bool,
        x: u32,
        y: u32,
    ) -> Result<(), SimulatorError> {
        let msg = if down { WM_LBUTTONDOWN } else { WM_LBUTTONUP };
        // MK_LBUTTON while the button is down.
        let wparam = WPARAM(if down { 0x0001 } else { 0 });
        post(window, msg, wparam, client_lparam(x, y))
    }

    fn send_key(&self, key: Key, down: bool) -> Result<(), SimulatorError> {
        let input = INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: virtual_key(key),
                    dwFlags: if down {
                        Default::default()
                    } else {
                        KEYEVENTF_KEYUP
                    },
                    ..Default::default()
                },
            },
        };
        send_inputs(&[input])
    }

    fn post_key(
        &self,
        window: WindowHandle,
        key: Key,
        down: bool,
    ) -> Result<(), SimulatorError> {
        let msg = if down { WM_KEYDOWN } else { WM_KEYUP };
        // Repeat count 1; bits 30/31 describe the previous/transition state.
        let lparam = if down { 0x0000_0001i64 } else { 0xC000_0001u32 as i64 };
        post(
            window,
            msg,
            WPARAM(virtual_key(key).0 as usize),
            LPARAM(lparam as isize),
        )
    }

    fn send_char(&self, ch: char) -> Result<(), SimulatorError> {
        let mut units = [0u16; 2];
        let encoded = ch.encode_utf16(&mut units);
        let mut inputs = Vec::with_capacity(encoded.len() * 2);
        for &unit in encoded.iter() {
            for up in [false, true] {
                inputs.push(INPUT {
                    r#type: INPUT_KEYBOARD,
                    Anonymous: INPUT_0 {
                        ki: KEYBDINPUT {
                            wScan: unit,
                            dwFlags: if up {
                                KEYEVENTF_UNICODE | KEYEVENTF_KEYUP
                            } else {
                                KEYEVENTF_UNICODE
                            },
                            ..Default::default()
                        },
                    },
                });
            }
        }
        send_inputs(&inputs)
    }

    fn post_char(&self, window: WindowHandle, ch: char) -> Result<(), SimulatorError> {
        let mut units = [0u16; 2];
        for &unit in ch.encode_utf16(&mut units).iter() {
            post(window, WM_CHAR, WPARAM(unit as usize), LPARAM(1))?;
        }
        Ok(())
    }

    fn capture_screen_region(
        &self,
        x: i32,
        y: i32,
        out: &mut RgbaImage,
    ) -> Result<(), SimulatorError> {
        unsafe {
            let screen_dc = GetDC(HWND::default());
            let _guard = DcGuard {
                hwnd: HWND::default(),
                hdc: screen_dc,
            };
            copy_dc_region(screen_dc, x, y, out)
        }
    }

    fn capture_window(
        &self,
        window: WindowHandle,
        out: &mut RgbaImage,
    ) -> Result<(), SimulatorError> {
        let handle = hwnd(window);
        unsafe {
            let window_dc = GetDC(handle);
            let _guard = DcGuard {
                hwnd: handle,
                hdc: window_dc,
            };
            let mem_dc = CreateCompatibleDC(window_dc);
            let bitmap =
                CreateCompatibleBitmap(window_dc, out.width() as i32, out.height() as i32);
            let previous = SelectObject(mem_dc, bitmap.into());

            let ok = PrintWindow(handle, mem_dc, PW_CLIENTONLY).as_bool();
            let result = if ok {
                read_bitmap(mem_dc, bitmap.into(), out)
            } else {
                Err(SimulatorError::platform(
                    "PrintWindow failed to render the window surface",
                ))
            };

            SelectObject(mem_dc, previous);
            let _ = DeleteObject(bitmap.into());
            let _ = DeleteDC(mem_dc);
            result
        }
    }
}

fn send_inputs(inputs: &[INPUT]) -> Result<(), SimulatorError> {
    let sent = unsafe { SendInput(inputs, std::mem::size_of::<INPUT>() as i32) };
    if sent as usize != inputs.len() {
        return Err(SimulatorError::platform(format!(
            "SendInput injected {sent} of {} events",
            inputs.len()
        )));
    }
    Ok(())
}

fn post(
    window: WindowHandle,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> Result<(), SimulatorError> {
    unsafe {
        PostMessageW(hwnd(window), msg, wparam, lparam)
            .map_err(|e| platform_err("failed to post a window message", e))
    }
}

fn client_lparam(x: u32, y: u32) -> LPARAM {
    LPARAM((((y as i32) << 16) | (x as i32 & 0xFFFF)) as isize)
}

unsafe fn copy_dc_region(
    source_dc: HDC,
    x: i32,
    y: i32,
    out: &mut RgbaImage,
) -> Result<(), SimulatorError> {
    let mem_dc = CreateCompatibleDC(source_dc);
    let bitmap = CreateCompatibleBitmap(source_dc, out.width() as i32, out.height() as i32);
    let previous = SelectObject(mem_dc, bitmap.into());

    let result = BitBlt(
        mem_dc,
        0,
        0,
        out.width() as i32,
        out.height() as i32,
        source_dc,
        x,
        y,
        SRCCOPY,
    )
    .map_err(|e| platform_err("BitBlt failed", e))
    .and_then(|_| read_bitmap(mem_dc, bitmap.into(), out));

    SelectObject(mem_dc, previous);
    let _ = DeleteObject(bitmap.into());
    let _ = DeleteDC(mem_dc);
    result
}

/// Reads a 32-bit top-down DIB out of `bitmap` into `out`, converting BGRA
/// to RGBA.
unsafe fn read_bitmap(
    dc: HDC,
    bitmap: windows::Win32::Graphics::Gdi::HGDIOBJ,
    out: &mut RgbaImage,
) -> Result<(), SimulatorError> {
    let (width, height) = (out.width(), out.height());
    let mut info = BITMAPINFO {
        bmiHeader: BITMAPINFOHEADER {
            biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
            biWidth: width as i32,
            // Negative height requests a top-down bitmap.
            biHeight: -(height as i32),
            biPlanes: 1,
            biBitCount: 32,
            biCompression: BI_RGB.0,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut raw = vec![0u8; (width * height * 4) as usize];
    let copied = GetDIBits(
        dc,
        windows::Win32::Graphics::Gdi::HBITMAP(bitmap.0),
        0,
        height,
        Some(raw.as_mut_ptr() as *mut core::ffi::c_void),
        &mut info,
        DIB_RGB_COLORS,
    );
    if copied == 0 {
        return Err(SimulatorError::platform("GetDIBits returned no scan lines"));
    }
    for (src, dst) in raw.chunks_exact(4).zip(out.pixels_mut()) {
        dst.0 = [src[2], src[1], src[0], 255];
    }
    Ok(())
}

/// Maps the engine's closed key set to Win32 virtual-key codes.
fn virtual_key(key: Key) -> VIRTUAL_KEY {
    match key {
        Key::Enter => VK_RETURN,
        Key::Escape => VK_ESCAPE,
        Key::Tab => VK_TAB,
        Key::Space => VK_SPACE,
        Key::Backspace => VK_BACK,
        Key::Shift => VK_SHIFT,
        Key::Control => VK_CONTROL,
        Key::Alt => VK_MENU,
        Key::Up => VK_UP,
        Key::Down => VK_DOWN,
        Key::Left => VK_LEFT,
        Key::Right => VK_RIGHT,
        Key::Home => VK_HOME,
        Key::End => VK_END,
        Key::PageUp => VK_PRIOR,
        Key::PageDown => VK_NEXT,
        // Letter and digit codes equal their ASCII uppercase values.
        Key::A => VIRTUAL_KEY(b'A' as u16),
        Key::B => VIRTUAL_KEY(b'B' as u16),
        Key::C => VIRTUAL_KEY(b'C' as u16),
        Key::D => VIRTUAL_KEY(b'D' as u16),
        Key::E => VIRTUAL_KEY(b'E' as u16),
        Key::F => VIRTUAL_KEY(b'F' as u16),
        Key::G => VIRTUAL_KEY(b'G' as u16),
        Key::H => VIRTUAL_KEY(b'H' as u16),
        Key::I => VIRTUAL_KEY(b'I' as u16),
        Key::J => VIRTUAL_KEY(b'J' as u16),
        Key::K => VIRTUAL_KEY(b'K' as u16),
        Key::L => VIRTUAL_KEY(b'L' as u16),
        Key::M => VIRTUAL_KEY(b'M' as u16),
        Key::N => VIRTUAL_KEY(b'N' as u16),
        Key::O => VIRTUAL_KEY(b'O' as u16),
        Key::P => VIRTUAL_KEY(b'P' as u16),
        Key::Q => VIRTUAL_KEY(b'Q' as u16),
        Key::R => VIRTUAL_KEY(b'R' as u16),
        Key::S => VIRTUAL_KEY(b'S' as u16),
        Key::T => VIRTUAL_KEY(b'T' as u16),
        Key::U => VIRTUAL_KEY(b'U' as u16),
        Key::V => VIRTUAL_KEY(b'V' as u16),
        Key::W => VIRTUAL_KEY(b'W' as u16),
        Key::X => VIRTUAL_KEY(b'X' as u16),
        Key::Y => VIRTUAL_KEY(b'Y' as u16),
        Key::Z => VIRTUAL_KEY(b'Z' as u16),
        Key::Digit0 => VIRTUAL_KEY(b'0' as u16),
        Key::Digit1 => VIRTUAL_KEY(b'1' as u16),
        Key::Digit2 => VIRTUAL_KEY(b'2' as u16),
        Key::Digit3 => VIRTUAL_KEY(b'3' as u16),
        Key::Digit4 => VIRTUAL_KEY(b'4' as u16),
        Key::Digit5 => VIRTUAL_KEY(b'5' as u16),
        Key::Digit6 => VIRTUAL_KEY(b'6' as u16),
        Key::Digit7 => VIRTUAL_KEY(b'7' as u16),
        Key::Digit8 => VIRTUAL_KEY(b'8' as u16),
        Key::Digit9 => VIRTUAL_KEY(b'9' as u16),
    }
}
