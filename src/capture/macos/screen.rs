//! macOS screen capture using CoreGraphics
//!
//! Grabs the main display with `CGDisplayCreateImage`. Each call is a full
//! synchronous snapshot, so read latency grows with display size; the
//! recorder accounts for it as processing time.

use crate::capture::screen::DisplayInfo;
use crate::capture::source::{Frame, FrameSourceError, FrameSourceResult};
use core_graphics::display::CGDisplay;

/// Describe the main display in physical pixels
pub fn main_display() -> FrameSourceResult<DisplayInfo> {
    let display = CGDisplay::main();
    let width = display.pixels_wide() as u32;
    let height = display.pixels_high() as u32;

    if width == 0 || height == 0 {
        return Err(FrameSourceError::Unavailable(
            "Main display reports no pixels".to_string(),
        ));
    }

    Ok(DisplayInfo {
        id: display.id,
        width,
        height,
    })
}

/// Take one snapshot of the given display
pub fn capture_display(display: &DisplayInfo) -> FrameSourceResult<Frame> {
    let image = CGDisplay::new(display.id).image().ok_or_else(|| {
        FrameSourceError::Unavailable(format!(
            "Failed to capture display {}. Is screen recording permission granted?",
            display.id
        ))
    })?;

    let width = image.width() as u32;
    let height = image.height() as u32;
    let data = image.data();

    Frame::from_bgra(data.bytes(), width, height, image.bytes_per_row()).ok_or_else(|| {
        FrameSourceError::Decode(format!(
            "Unexpected screen buffer layout ({}x{}, {} bytes per row)",
            width,
            height,
            image.bytes_per_row()
        ))
    })
}
