//! Frame source transformations
//!
//! Decorators that wrap any [`FrameSource`](crate::capture::FrameSource) and
//! adjust the frames it produces: downscaling to a quality tier, scaling to an
//! explicit size, cropping to even dimensions, and fault injection for tests.

pub mod even;
pub mod faults;
pub mod resolution;
pub mod scale;

pub use even::EnsureEvenDimensions;
pub use faults::{ErrorProneSource, FreezeHandle, FreezingSource};
pub use resolution::{can_support, max_resolution_for, ImageResolution, QualityHint};
pub use scale::{ScaleToQuality, ScaleToSize};

#[cfg(test)]
pub(crate) mod testing {
    use crate::capture::source::{Frame, FrameSource, FrameSourceError, FrameSourceResult};
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Fixed-size source filled with one colour
    pub struct SolidSource {
        width: u32,
        height: u32,
        open: bool,
        opened: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
    }

    impl SolidSource {
        pub const COLOUR: Rgb<u8> = Rgb([200, 40, 90]);

        pub fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                open: false,
                opened: Arc::default(),
                closed: Arc::default(),
            }
        }

        pub fn open_count(&self) -> Arc<AtomicUsize> {
            self.opened.clone()
        }

        pub fn close_count(&self) -> Arc<AtomicUsize> {
            self.closed.clone()
        }

        fn frame(&self) -> Frame {
            Frame::from_rgb(RgbImage::from_pixel(self.width, self.height, Self::COLOUR))
        }
    }

    impl FrameSource for SolidSource {
        fn open(&mut self) -> FrameSourceResult<()> {
            self.open = true;
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn read_frame(&mut self) -> FrameSourceResult<Frame> {
            if !self.open {
                return Err(FrameSourceError::NotOpen);
            }
            Ok(self.frame())
        }

        fn sample_frame(&mut self) -> FrameSourceResult<Frame> {
            Ok(self.frame())
        }

        fn width(&self) -> u32 {
            if self.open {
                self.width
            } else {
                0
            }
        }

        fn height(&self) -> u32 {
            if self.open {
                self.height
            } else {
                0
            }
        }

        fn close(&mut self) {
            self.open = false;
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
