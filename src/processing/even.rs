//! Even-dimension cropping
//!
//! yuv420p encoders reject odd widths and heights. Odd edges are cropped by a
//! single pixel column/row from the right/bottom.

use crate::capture::source::{Frame, FrameSource, FrameSourceResult};
use image::imageops;

fn round_down_even(value: u32) -> u32 {
    value & !1
}

pub struct EnsureEvenDimensions<S> {
    inner: S,
}

impl<S: FrameSource> EnsureEvenDimensions<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    fn process(&self, frame: Frame) -> Frame {
        let width = round_down_even(frame.width());
        let height = round_down_even(frame.height());
        if width == frame.width() && height == frame.height() {
            return frame;
        }
        Frame::from_rgb(imageops::crop_imm(frame.image(), 0, 0, width, height).to_image())
    }
}

impl<S: FrameSource> FrameSource for EnsureEvenDimensions<S> {
    fn open(&mut self) -> FrameSourceResult<()> {
        self.inner.open()?;
        if self.inner.width() % 2 == 1 || self.inner.height() % 2 == 1 {
            tracing::debug!(
                "Cropping {}x{} to {}x{}",
                self.inner.width(),
                self.inner.height(),
                self.width(),
                self.height()
            );
        }
        Ok(())
    }

    fn read_frame(&mut self) -> FrameSourceResult<Frame> {
        let frame = self.inner.read_frame()?;
        Ok(self.process(frame))
    }

    fn sample_frame(&mut self) -> FrameSourceResult<Frame> {
        let frame = self.inner.sample_frame()?;
        Ok(self.process(frame))
    }

    fn width(&self) -> u32 {
        round_down_even(self.inner.width())
    }

    fn height(&self) -> u32 {
        round_down_even(self.inner.height())
    }

    fn close(&mut self) {
        self.inner.close();
    }
}
