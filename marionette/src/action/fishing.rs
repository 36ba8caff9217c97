//! The fishing-cast family: press-and-hold the cast button, detect error
//! dialogs by color, finish the cast (straight release or bubble-guided),
//! then poll for the catch dialog.
//!
//! All coordinates and colors here are per-game configuration data carried in
//! [`FishingFlavor`]; the engine only implements the protocol.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::SimulatorError;
use crate::provider::Interaction;
use crate::scaling::{self, HorizontalAlignment};
use crate::types::{Color, Point, Tolerance};

/// How long the cast button is held before the cast is finished.
const CAST_HOLD: Duration = Duration::from_millis(300);
/// Poll interval for both the bubble scan and the catch dialog.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Per-game-flavor parameters of the cast protocol. Flavors differ in dialog
/// layouts, so coordinates, required match counts and timeouts vary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FishingFlavor {
    /// Design coordinates of the cast button.
    pub cast_button: Point,
    /// Reference points sampled right after the press; when all of them
    /// match `error_dialog_color`, an error dialog is up.
    pub error_dialog_points: Vec<Point>,
    pub error_dialog_color: Color,
    /// Tight tolerance, dialogs render with little noise.
    pub error_dialog_tolerance: Tolerance,
    /// Reference points polled after the release for the catch dialog.
    pub caught_dialog_points: Vec<Point>,
    pub caught_dialog_color: Color,
    /// Looser than the error tolerance; the catch dialog is animated.
    pub caught_dialog_tolerance: Tolerance,
    /// Minimum number of `caught_dialog_points` that must match.
    pub caught_min_matches: usize,
    /// Give up polling for a catch after this long. Timing out is not an
    /// error, the cast simply ends with no catch recorded.
    pub caught_timeout_ms: u64,
}

/// Rectangular grid scanned for the fish bubble, in design coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BubbleScan {
    pub min: Point,
    pub max: Point,
    /// Grid step, design pixels.
    pub step: f64,
    pub bubble_color: Color,
    pub bubble_tolerance: Tolerance,
    /// Stop scanning after this long even if the bubble never stabilizes.
    pub timeout_ms: u64,
}

/// Non-linear map from the detected bubble position to the release point.
/// The coefficients are tuned per flavor against the live game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BubbleMapping {
    pub x_offset: f64,
    pub x_factor: f64,
    pub y_offset: f64,
    pub y_factor: f64,
    pub y_square: f64,
}

impl BubbleMapping {
    pub fn apply(&self, bubble: Point) -> Point {
        Point::new(
            self.x_offset + self.x_factor * bubble.x,
            self.y_offset + self.y_factor * bubble.y + self.y_square * bubble.y * bubble.y,
        )
    }
}

/// The flavor-specific "finish cast" step.
#[derive(Debug, Clone)]
pub enum CastFinisher {
    /// Release immediately at a fixed design point.
    Straight { release_point: Point },
    /// Scan for the bubble until it stabilizes, then release at the mapped
    /// target; fall back to `default_release` when nothing was ever found.
    Automatic {
        scan: BubbleScan,
        mapping: BubbleMapping,
        default_release: Point,
    },
}

/// One complete fishing cast.
#[derive(Debug, Clone)]
pub struct FishingCastAction {
    pub flavor: FishingFlavor,
    pub finisher: CastFinisher,
}

impl FishingCastAction {
    pub fn run(&self, itx: &mut dyn Interaction) -> Result<(), SimulatorError> {
        itx.emit(crate::events::ProgressMessage::Info {
            text: "casting the fishing rod".into(),
        });

        let window = itx.window_position()?;
        let target =
            scaling::scale_point(window.size, self.flavor.cast_button, HorizontalAlignment::Center)?;
        itx.move_mouse(target)?;
        itx.press_mouse_button()?;
        itx.wait(CAST_HOLD)?;

        self.check_error_dialog(itx)?;

        match &self.finisher {
            CastFinisher::Straight { release_point } => release_at(itx, *release_point)?,
            CastFinisher::Automatic {
                scan,
                mapping,
                default_release,
            } => {
                let bubble = self.scan_until_stable(itx, scan)?;
                let release = match bubble {
                    Some(b) => mapping.apply(b),
                    None => *default_release,
                };
                release_at(itx, release)?;
            }
        }

        self.wait_for_catch(itx)
    }

    /// Samples the flavor's reference points against the current frame; when
    /// every one of them matches the dialog color, the cast cannot proceed
    /// (no bait left, or the bucket is full).
    fn check_error_dialog(&self, itx: &mut dyn Interaction) -> Result<(), SimulatorError> {
        let flavor = &self.flavor;
        let shot = itx.screenshot()?;
        let size = shot.position().size;
        let mut all_match = !flavor.error_dialog_points.is_empty();
        for &point in &flavor.error_dialog_points {
            let scaled = scaling::scale_point(size, point, HorizontalAlignment::Center)?;
            let (x, y) = scaling::to_pixel(scaled, size);
            if !shot
                .pixel(x, y)?
                .matches(flavor.error_dialog_color, flavor.error_dialog_tolerance)
            {
                all_match = false;
                break;
            }
        }
        if all_match {
            return Err(SimulatorError::ActionFailed(
                "the game is showing a fishing error dialog (out of bait, or the \
                 bucket is full)"
                    .into(),
            ));
        }
        Ok(())
    }

    /// Repeated bubble scans, 500ms apart, until two consecutive scans agree
    /// within one grid step or the scan timeout passes. Returns the last
    /// detected bubble position, if any; a scan that comes up empty does not
    /// erase an earlier detection.
    fn scan_until_stable(
        &self,
        itx: &mut dyn Interaction,
        scan: &BubbleScan,
    ) -> Result<Option<Point>, SimulatorError> {
        let mut elapsed_ms = 0u64;
        // Previous scan's result, for the consecutive-agreement check.
        let mut previous: Option<Point> = None;
        let mut detected: Option<Point> = None;
        loop {
            let current = scan_frame(itx, scan)?;
            if let (Some(cur), Some(prev)) = (current, previous) {
                if (cur.x - prev.x).abs() <= scan.step && (cur.y - prev.y).abs() <= scan.step {
                    debug!(x = cur.x, y = cur.y, "bubble stabilized");
                    return Ok(Some(cur));
                }
            }
            if current.is_some() {
                detected = current;
            }
            previous = current;
            if elapsed_ms >= scan.timeout_ms {
                debug!(found = detected.is_some(), "bubble scan timed out");
                return Ok(detected);
            }
            itx.wait(POLL_INTERVAL)?;
            elapsed_ms += POLL_INTERVAL.as_millis() as u64;
        }
    }

    /// Polls for the catch dialog every 500ms until the flavor's minimum
    /// number of reference points match, or the flavor timeout passes.
    fn wait_for_catch(&self, itx: &mut dyn Interaction) -> Result<(), SimulatorError> {
        let flavor = &self.flavor;
        let mut elapsed_ms = 0u64;
        while elapsed_ms < flavor.caught_timeout_ms {
            itx.wait(POLL_INTERVAL)?;
            elapsed_ms += POLL_INTERVAL.as_millis() as u64;

            let shot = itx.screenshot()?;
            let size = shot.position().size;
            let mut matches = 0usize;
            for &point in &flavor.caught_dialog_points {
                let scaled = scaling::scale_point(size, point, HorizontalAlignment::Center)?;
                let (x, y) = scaling::to_pixel(scaled, size);
                if shot
                    .pixel(x, y)?
                    .matches(flavor.caught_dialog_color, flavor.caught_dialog_tolerance)
                {
                    matches += 1;
                }
            }
            if matches >= flavor.caught_min_matches {
                itx.emit(crate::events::ProgressMessage::Info {
                    text: "caught a fish".into(),
                });
                return Ok(());
            }
        }
        // No catch within the timeout; the protocol ends silently.
        debug!("catch polling timed out");
        Ok(())
    }
}

/// One pass over the scan grid against the current frame; returns the first
/// matching point in design coordinates.
fn scan_frame(
    itx: &mut dyn Interaction,
    scan: &BubbleScan,
) -> Result<Option<Point>, SimulatorError> {
    let shot = itx.screenshot()?;
    let size = shot.position().size;
    let mut y = scan.min.y;
    while y <= scan.max.y {
        let mut x = scan.min.x;
        while x <= scan.max.x {
            let scaled =
                scaling::scale_point(size, Point::new(x, y), HorizontalAlignment::Center)?;
            let (px, py) = scaling::to_pixel(scaled, size);
            if shot
                .pixel(px, py)?
                .matches(scan.bubble_color, scan.bubble_tolerance)
            {
                return Ok(Some(Point::new(x, y)));
            }
            x += scan.step;
        }
        y += scan.step;
    }
    Ok(None)
}

fn release_at(itx: &mut dyn Interaction, point: Point) -> Result<(), SimulatorError> {
    let window = itx.window_position()?;
    let target = scaling::scale_point(window.size, point, HorizontalAlignment::Center)?;
    itx.move_mouse(target)?;
    itx.release_mouse_button()
}

impl fmt::Display for FishingCastAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.finisher {
            CastFinisher::Straight { .. } => write!(f, "Fishing cast (straight)"),
            CastFinisher::Automatic { .. } => write!(f, "Fishing cast (automatic)"),
        }
    }
}
