//! Resampling decorators
//!
//! Both wrappers open the inner source first: the scale factor depends on the
//! inner dimensions, which are only known once it is open.

use crate::capture::source::{Frame, FrameSource, FrameSourceResult};
use crate::processing::resolution::{can_support, max_resolution_for, ImageResolution, QualityHint};
use image::imageops::{self, FilterType};

/// Bicubic-equivalent resample of a whole frame
fn resample(frame: &Frame, target: ImageResolution) -> Frame {
    Frame::from_rgb(imageops::resize(
        frame.image(),
        target.width,
        target.height,
        FilterType::CatmullRom,
    ))
}

fn source_resolution<S: FrameSource>(source: &S) -> ImageResolution {
    ImageResolution::new(source.width(), source.height())
}

/// Scales large sources down to the best standard resolution for a quality tier.
///
/// Sources already within budget, or with an aspect ratio that has no standard
/// resolutions, pass through at their native size.
pub struct ScaleToQuality<S> {
    inner: S,
    hint: QualityHint,
    /// Set when frames need to be scaled down
    target: Option<ImageResolution>,
    output: Option<ImageResolution>,
}

impl<S: FrameSource> ScaleToQuality<S> {
    pub fn new(hint: QualityHint, inner: S) -> Self {
        Self {
            inner,
            hint,
            target: None,
            output: None,
        }
    }

    fn process(&self, frame: Frame) -> Frame {
        match self.target {
            Some(target) if frame.pixel_count() > target.pixel_count() => resample(&frame, target),
            _ => frame,
        }
    }
}

impl<S: FrameSource> FrameSource for ScaleToQuality<S> {
    fn open(&mut self) -> FrameSourceResult<()> {
        self.inner.open()?;

        let source = source_resolution(&self.inner);
        let max = if can_support(source.ratio()) {
            max_resolution_for(source.ratio(), self.hint).unwrap_or(source)
        } else {
            source
        };

        if source.pixel_count() > max.pixel_count() {
            tracing::info!("Scaling {} down to {} ({:?} quality)", source, max, self.hint);
            self.target = Some(max);
            self.output = Some(max);
        } else {
            tracing::debug!("Keeping native resolution {}", source);
            self.target = None;
            self.output = Some(source);
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
        self.output.map_or(0, |r| r.width)
    }

    fn height(&self) -> u32 {
        self.output.map_or(0, |r| r.height)
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

/// Scales every frame to an explicit size
pub struct ScaleToSize<S> {
    inner: S,
    target: ImageResolution,
    output: Option<ImageResolution>,
}

impl<S: FrameSource> ScaleToSize<S> {
    pub fn new(inner: S, width: u32, height: u32) -> Self {
        Self {
            inner,
            target: ImageResolution::new(width, height),
            output: None,
        }
    }

    fn process(&self, frame: Frame) -> Frame {
        if frame.pixel_count() != self.target.pixel_count() {
            resample(&frame, self.target)
        } else {
            frame
        }
    }
}

impl<S: FrameSource> FrameSource for ScaleToSize<S> {
    fn open(&mut self) -> FrameSourceResult<()> {
        self.inner.open()?;

        let source = source_resolution(&self.inner);
        self.output = if source.pixel_count() != self.target.pixel_count() {
            tracing::info!("Scaling {} to {}", source, self.target);
            Some(self.target)
        } else {
            Some(source)
        };
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
        self.output.map_or(0, |r| r.width)
    }

    fn height(&self) -> u32 {
        self.output.map_or(0, |r| r.height)
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::testing::SolidSource;

    #[test]
    fn test_large_screen_scaled_down() {
        let mut source = ScaleToQuality::new(QualityHint::Low, SolidSource::new(3840, 2160));
        source.open().unwrap();

        assert_eq!((source.width(), source.height()), (1280, 720));
        let frame = source.read_frame().unwrap();
        assert_eq!((frame.width(), frame.height()), (1280, 720));
        let sample = source.sample_frame().unwrap();
        assert_eq!((sample.width(), sample.height()), (1280, 720));
    }

    #[test]
    fn test_small_source_passes_through() {
        let mut source = ScaleToQuality::new(QualityHint::High, SolidSource::new(640, 480));
        source.open().unwrap();

        assert_eq!((source.width(), source.height()), (640, 480));
        assert_eq!(source.read_frame().unwrap().width(), 640);
    }

    #[test]
    fn test_unsupported_ratio_keeps_native_size() {
        let mut source = ScaleToQuality::new(QualityHint::Low, SolidSource::new(2000, 2000));
        source.open().unwrap();

        assert_eq!((source.width(), source.height()), (2000, 2000));
        assert_eq!(source.read_frame().unwrap().height(), 2000);
    }

    #[test]
    fn test_resample_keeps_colour() {
        let mut source = ScaleToQuality::new(QualityHint::Low, SolidSource::new(1920, 1080));
        source.open().unwrap();
        let frame = source.read_frame().unwrap();
        let pixel = frame.image().get_pixel(10, 10);
        for (got, want) in pixel.0.iter().zip(SolidSource::COLOUR.0) {
            assert!(got.abs_diff(want) <= 1, "{:?} drifted from {:?}", pixel, SolidSource::COLOUR);
        }
    }

    #[test]
    fn test_scale_to_custom_size() {
        let mut source = ScaleToSize::new(SolidSource::new(300, 150), 200, 100);
        source.open().unwrap();

        assert_eq!((source.width(), source.height()), (200, 100));
        let frame = source.read_frame().unwrap();
        assert_eq!((frame.width(), frame.height()), (200, 100));
    }

    #[test]
    fn test_scale_up_to_custom_size() {
        let mut source = ScaleToSize::new(SolidSource::new(100, 50), 300, 150);
        source.open().unwrap();
        assert_eq!(source.read_frame().unwrap().width(), 300);
    }

    #[test]
    fn test_same_size_is_untouched() {
        let inner = SolidSource::new(64, 32);
        let mut source = ScaleToSize::new(inner, 64, 32);
        source.open().unwrap();
        assert_eq!((source.width(), source.height()), (64, 32));
    }

    #[test]
    fn test_inner_opened_before_measuring() {
        let inner = SolidSource::new(3840, 2160);
        let opened = inner.open_count();
        let mut source = ScaleToSize::new(inner, 640, 360);
        assert_eq!((source.width(), source.height()), (0, 0));
        source.open().unwrap();
        assert_eq!(opened.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!((source.width(), source.height()), (640, 360));
    }
}
