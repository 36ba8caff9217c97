//! Transforms between the fixed design-reference resolution and the actual
//! window's client rectangle.
//!
//! All click coordinates are authored against a 1600x1151 reference canvas
//! whose layout is 4:3-based. Real windows may be wider than 4:3 (never
//! narrower); the target application centers its fixed-layout UI inside the
//! window and lets only some elements span the full width, so every reference
//! point declares which behavior it follows via [`HorizontalAlignment`].

use serde::{Deserialize, Serialize};

use crate::errors::SimulatorError;
use crate::types::{Point, Size};

/// The reference canvas all design coordinates are authored against.
pub const REFERENCE_SIZE: Size = Size::new(1600, 1151);

const MIN_ASPECT_RATIO: f64 = 4.0 / 3.0;

/// How a reference x coordinate is placed inside a wider-than-4:3 window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizontalAlignment {
    /// Anchored to the left edge of the centered 4:3 region (offset 0).
    Left,
    /// Centered: offset by half of the extra (non-4:3) width.
    #[default]
    Center,
    /// Anchored to the right edge: offset by the full extra width.
    Right,
    /// Scaled against the full window width, for elements the target
    /// application itself stretches.
    NoAspectRatio,
}

fn check_aspect_ratio(window: Size) -> Result<(), SimulatorError> {
    // Small epsilon so e.g. 1024x768 does not fail on floating-point dust.
    if window.aspect_ratio() < MIN_ASPECT_RATIO - 1e-9 {
        return Err(SimulatorError::InvalidAspectRatio {
            width: window.width,
            height: window.height,
        });
    }
    Ok(())
}

/// Scales a reference-space point to window-client coordinates.
///
/// Vertical scaling is always linear. Horizontally, the window is treated as
/// a centered 4:3 region plus "extra" width, and the alignment decides how
/// the extra width is distributed.
pub fn scale_point(
    window: Size,
    reference: Point,
    alignment: HorizontalAlignment,
) -> Result<Point, SimulatorError> {
    check_aspect_ratio(window)?;

    let window_w = f64::from(window.width);
    let window_h = f64::from(window.height);
    let ref_w = f64::from(REFERENCE_SIZE.width);
    let ref_h = f64::from(REFERENCE_SIZE.height);

    let y = reference.y / ref_h * window_h;

    let aspect_width = window_h * MIN_ASPECT_RATIO;
    let extra = window_w - aspect_width;
    let x = match alignment {
        HorizontalAlignment::NoAspectRatio => reference.x / ref_w * window_w,
        HorizontalAlignment::Left => reference.x / ref_w * aspect_width,
        HorizontalAlignment::Center => reference.x / ref_w * aspect_width + extra / 2.0,
        HorizontalAlignment::Right => reference.x / ref_w * aspect_width + extra,
    };

    Ok(Point::new(x, y))
}

/// Inverse of [`scale_point`]: recovers the reference-space point for a
/// window-client coordinate.
pub fn unscale_point(
    window: Size,
    window_point: Point,
    alignment: HorizontalAlignment,
) -> Result<Point, SimulatorError> {
    check_aspect_ratio(window)?;

    let window_w = f64::from(window.width);
    let window_h = f64::from(window.height);
    let ref_w = f64::from(REFERENCE_SIZE.width);
    let ref_h = f64::from(REFERENCE_SIZE.height);

    let y = window_point.y / window_h * ref_h;

    let aspect_width = window_h * MIN_ASPECT_RATIO;
    let extra = window_w - aspect_width;
    let x = match alignment {
        HorizontalAlignment::NoAspectRatio => window_point.x / window_w * ref_w,
        HorizontalAlignment::Left => window_point.x / aspect_width * ref_w,
        HorizontalAlignment::Center => (window_point.x - extra / 2.0) / aspect_width * ref_w,
        HorizontalAlignment::Right => (window_point.x - extra) / aspect_width * ref_w,
    };

    Ok(Point::new(x, y))
}

/// Converts a scaled floating-point coordinate to a pixel index.
///
/// Always floors, never rounds, and clamps to the last valid index so that a
/// source coordinate equal to the reference maximum still yields an index
/// strictly less than the window dimension.
pub fn to_pixel(point: Point, window: Size) -> (u32, u32) {
    let x = (point.x.max(0.0).floor() as u32).min(window.width.saturating_sub(1));
    let y = (point.y.max(0.0).floor() as u32).min(window.height.saturating_sub(1));
    (x, y)
}
