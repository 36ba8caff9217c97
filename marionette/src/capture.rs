//! Screenshot cache: one reusable pixel buffer keyed by window size.
//!
//! Dialog-detection scans issue dozens of pixel reads against a single frame,
//! so the provider must not recapture per read. A capture stays valid until
//! the next wait (the screen may have changed during any voluntary
//! suspension) and is refreshed lazily on the next read.

use image::RgbaImage;
use tracing::{debug, warn};

use crate::errors::SimulatorError;
use crate::platforms::{NativeApi, WindowHandle};
use crate::types::{Color, OperatingMode, WindowPosition};

/// An owned pixel buffer tied one-to-one to the [`WindowPosition`] it was
/// captured at. The buffer dimensions always match the position's size.
#[derive(Debug)]
pub struct ScreenshotContent {
    position: WindowPosition,
    image: RgbaImage,
}

impl ScreenshotContent {
    /// Wraps an already-captured frame. The buffer must match the position's
    /// client size.
    pub fn new(position: WindowPosition, image: RgbaImage) -> Result<Self, SimulatorError> {
        if image.width() != position.size.width || image.height() != position.size.height {
            return Err(SimulatorError::Internal(format!(
                "frame is {}x{} but the window position says {}x{}",
                image.width(),
                image.height(),
                position.size.width,
                position.size.height
            )));
        }
        Ok(Self { position, image })
    }

    /// The window geometry this frame was captured at.
    pub fn position(&self) -> WindowPosition {
        self.position
    }

    /// O(1) pixel read, window-client coordinates.
    pub fn pixel(&self, x: u32, y: u32) -> Result<Color, SimulatorError> {
        if x >= self.image.width() || y >= self.image.height() {
            return Err(SimulatorError::Internal(format!(
                "pixel read ({x}, {y}) outside a {}x{} frame",
                self.image.width(),
                self.image.height()
            )));
        }
        let p = self.image.get_pixel(x, y);
        Ok(Color::new(p.0[0], p.0[1], p.0[2]))
    }

    fn is_all_black(&self) -> bool {
        self.image
            .pixels()
            .all(|p| p.0[0] == 0 && p.0[1] == 0 && p.0[2] == 0)
    }
}

/// Holds at most one [`ScreenshotContent`], refreshed on demand.
#[derive(Debug, Default)]
pub struct ScreenshotCache {
    content: Option<ScreenshotContent>,
    stale: bool,
    window_capture_checked: bool,
}

impl ScreenshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the current capture as stale. Called after every wait.
    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    /// Returns the current frame, recapturing if none exists yet or a wait
    /// occurred since the last capture.
    ///
    /// In background modes the frame comes from the window's own surface; in
    /// foreground mode it is read from the screen at the window's location.
    /// A same-size recapture reuses the existing allocation; the buffer is
    /// only reallocated when the window size changed.
    pub fn get_or_capture(
        &mut self,
        api: &dyn NativeApi,
        window: WindowHandle,
        position: WindowPosition,
        mode: OperatingMode,
    ) -> Result<&ScreenshotContent, SimulatorError> {
        let size_changed = self
            .content
            .as_ref()
            .map(|c| c.position.size != position.size)
            .unwrap_or(true);

        if !self.stale && !size_changed && self.content.is_some() {
            // Borrow-checker friendly unwrap of the arm we just tested.
            return self
                .content
                .as_ref()
                .ok_or_else(|| SimulatorError::Internal("screenshot cache lost its frame".into()));
        }

        let mut image = match self.content.take() {
            Some(content) if !size_changed => content.image,
            _ => {
                debug!(
                    width = position.size.width,
                    height = position.size.height,
                    "allocating screenshot buffer"
                );
                RgbaImage::new(position.size.width, position.size.height)
            }
        };

        if mode.is_background() {
            api.capture_window(window, &mut image)?;
        } else {
            api.capture_screen_region(position.origin.0, position.origin.1, &mut image)?;
        }

        let content = ScreenshotContent { position, image };

        // A window-surface capture that comes back entirely black at startup
        // means this capture method does not work on this OS/GPU combination.
        // Surface a permanent error instead of silently failing every scan.
        if mode.is_background() && !self.window_capture_checked {
            self.window_capture_checked = true;
            if content.is_all_black() {
                warn!("first window-surface capture is entirely black");
                return Err(SimulatorError::Configuration(
                    "capturing the window surface produced an all-black frame; \
                     this capture method does not work on this machine, please \
                     disable background mode"
                        .into(),
                ));
            }
        }

        self.stale = false;
        self.content = Some(content);
        self.content
            .as_ref()
            .ok_or_else(|| SimulatorError::Internal("screenshot cache lost its frame".into()))
    }
}
