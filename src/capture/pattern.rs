//! Synthetic clock-driven input
//!
//! Renders the time elapsed since `open` as a row of black/white bars (one bar
//! per bit, least significant bit on the left). Paired with a fake clock this
//! gives reproducible recordings whose frames can be checked after decoding.

use crate::capture::source::{Frame, FrameSource, FrameSourceError, FrameSourceResult};
use crate::clock::Clock;
use image::{Rgb, RgbImage};
use std::sync::Arc;

/// Number of bits rendered; enough for ~49 days of elapsed milliseconds
pub const PATTERN_BITS: u32 = 32;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

pub struct TestPatternSource {
    width: u32,
    height: u32,
    clock: Arc<dyn Clock>,
    started_at: Option<u64>,
}

impl TestPatternSource {
    /// `width` must be at least [`PATTERN_BITS`] so every bit gets a column
    pub fn new(width: u32, height: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            width,
            height,
            clock,
            started_at: None,
        }
    }

    fn render(&self, elapsed_ms: u64) -> Frame {
        let bar = (self.width / PATTERN_BITS).max(1);
        let image = RgbImage::from_fn(self.width, self.height, |x, _| {
            let bit = x / bar;
            if bit < PATTERN_BITS && (elapsed_ms >> bit) & 1 == 1 {
                WHITE
            } else {
                BLACK
            }
        });
        Frame::from_rgb(image)
    }
}

/// Recover the elapsed milliseconds drawn by [`TestPatternSource`]
pub fn decode_pattern(frame: &Frame) -> Option<u64> {
    let bar = (frame.width() / PATTERN_BITS).max(1);
    if frame.width() < PATTERN_BITS || frame.height() == 0 {
        return None;
    }

    let y = frame.height() / 2;
    let mut value = 0u64;
    for bit in 0..PATTERN_BITS {
        let x = bit * bar + bar / 2;
        let Rgb([r, g, b]) = *frame.image().get_pixel(x, y);
        let luma = (u32::from(r) + u32::from(g) + u32::from(b)) / 3;
        if luma > 127 {
            value |= 1 << bit;
        }
    }
    Some(value)
}

impl FrameSource for TestPatternSource {
    fn open(&mut self) -> FrameSourceResult<()> {
        if self.width < PATTERN_BITS || self.height == 0 {
            return Err(FrameSourceError::Unavailable(format!(
                "Test pattern needs at least {}x1 pixels, got {}x{}",
                PATTERN_BITS, self.width, self.height
            )));
        }
        self.started_at = Some(self.clock.now());
        Ok(())
    }

    fn read_frame(&mut self) -> FrameSourceResult<Frame> {
        let started_at = self.started_at.ok_or(FrameSourceError::NotOpen)?;
        let elapsed_ms = self.clock.now().saturating_sub(started_at) / 1_000_000;
        Ok(self.render(elapsed_ms))
    }

    fn sample_frame(&mut self) -> FrameSourceResult<Frame> {
        self.started_at.ok_or(FrameSourceError::NotOpen)?;
        Ok(self.render(0))
    }

    fn width(&self) -> u32 {
        self.started_at.map_or(0, |_| self.width)
    }

    fn height(&self) -> u32 {
        self.started_at.map_or(0, |_| self.height)
    }

    fn close(&mut self) {
        self.started_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::recorder::stop::StopSignal;

    #[test]
    fn test_pattern_encodes_elapsed_time() {
        let clock = Arc::new(FakeClock::new());
        let mut source = TestPatternSource::new(320, 8, clock.clone());
        source.open().unwrap();

        clock.sleep_until(clock.peek() + 1_234_000_000, &StopSignal::new());
        let frame = source.read_frame().unwrap();

        assert_eq!(decode_pattern(&frame), Some(1234));
    }

    #[test]
    fn test_sample_is_time_zero() {
        let clock = Arc::new(FakeClock::new());
        let mut source = TestPatternSource::new(64, 4, clock);
        source.open().unwrap();
        let sample = source.sample_frame().unwrap();
        assert_eq!(decode_pattern(&sample), Some(0));
        assert_eq!((sample.width(), sample.height()), (64, 4));
    }

    #[test]
    fn test_too_narrow_fails_open() {
        let mut source = TestPatternSource::new(8, 8, Arc::new(FakeClock::new()));
        assert!(matches!(source.open(), Err(FrameSourceError::Unavailable(_))));
    }

    #[test]
    fn test_read_before_open_fails() {
        let mut source = TestPatternSource::new(64, 4, Arc::new(FakeClock::new()));
        assert!(matches!(source.read_frame(), Err(FrameSourceError::NotOpen)));
        assert!(matches!(source.sample_frame(), Err(FrameSourceError::NotOpen)));
    }

    #[test]
    fn test_size_known_only_while_open() {
        let mut source = TestPatternSource::new(64, 4, Arc::new(FakeClock::new()));
        assert_eq!((source.width(), source.height()), (0, 0));

        source.open().unwrap();
        assert_eq!((source.width(), source.height()), (64, 4));

        source.close();
        assert_eq!((source.width(), source.height()), (0, 0));
    }
}
