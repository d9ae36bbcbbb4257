//! Live screen input
//!
//! Platform capture lives under `capture::<os>`; this type adapts it to
//! [`FrameSource`]. Platforms without an implementation fail at `open`.

use crate::capture::source::{Frame, FrameSource, FrameSourceError, FrameSourceResult};
use serde::Serialize;

/// Physical geometry of a display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayInfo {
    pub id: u32,
    pub width: u32,
    pub height: u32,
}

#[cfg(target_os = "macos")]
use crate::capture::macos::screen as platform;

#[cfg(not(target_os = "macos"))]
mod platform {
    use super::DisplayInfo;
    use crate::capture::source::{Frame, FrameSourceError, FrameSourceResult};

    pub fn main_display() -> FrameSourceResult<DisplayInfo> {
        Err(FrameSourceError::Unavailable(
            "Screen capture is not supported on this platform".to_string(),
        ))
    }

    pub fn capture_display(_display: &DisplayInfo) -> FrameSourceResult<Frame> {
        Err(FrameSourceError::NotOpen)
    }
}

/// Captures the main display on every read
#[derive(Debug, Default)]
pub struct ScreenSource {
    display: Option<DisplayInfo>,
}

impl ScreenSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn display(&self) -> FrameSourceResult<&DisplayInfo> {
        self.display.as_ref().ok_or(FrameSourceError::NotOpen)
    }
}

impl FrameSource for ScreenSource {
    fn open(&mut self) -> FrameSourceResult<()> {
        let main = platform::main_display()?;
        tracing::info!(
            "Screen capture opened for display {} ({}x{})",
            main.id,
            main.width,
            main.height
        );
        self.display = Some(main);
        Ok(())
    }

    fn read_frame(&mut self) -> FrameSourceResult<Frame> {
        let display = self.display()?;
        let frame = platform::capture_display(display)?;

        // Resolution changes mid-recording would break the encoder
        if frame.width() != display.width || frame.height() != display.height {
            return Err(FrameSourceError::Unavailable(format!(
                "Display {} changed size to {}x{}",
                display.id,
                frame.width(),
                frame.height()
            )));
        }
        Ok(frame)
    }

    fn sample_frame(&mut self) -> FrameSourceResult<Frame> {
        let display = self.display()?;
        Ok(Frame::blank(display.width, display.height))
    }

    fn width(&self) -> u32 {
        self.display.map_or(0, |d| d.width)
    }

    fn height(&self) -> u32 {
        self.display.map_or(0, |d| d.height)
    }

    fn close(&mut self) {
        // Nothing held between snapshots
        self.display = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unopened_screen_reports_no_size() {
        let mut source = ScreenSource::new();
        assert_eq!((source.width(), source.height()), (0, 0));
        assert!(matches!(source.read_frame(), Err(FrameSourceError::NotOpen)));
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_open_fails_without_platform_support() {
        let mut source = ScreenSource::new();
        assert!(matches!(source.open(), Err(FrameSourceError::Unavailable(_))));
    }
}
