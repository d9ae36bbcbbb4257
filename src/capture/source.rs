//! Frame source trait
//!
//! Defines the interface shared by every producer of still frames (screen,
//! image file, video file) and by the processing decorators that wrap them.

use image::RgbImage;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while acquiring frames
#[derive(Error, Debug)]
pub enum FrameSourceError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Source not open")]
    NotOpen,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("End of stream")]
    EndOfStream,

    #[error("Source crashed: {0}")]
    Crashed(String),

    #[error("Read interrupted: {0}")]
    Interrupted(String),
}

/// Result type for frame source operations
pub type FrameSourceResult<T> = Result<T, FrameSourceError>;

/// Pixel layout of a [`Frame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed 8-bit R, G, B
    Rgb24,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb24 => 3,
        }
    }

    /// Name understood by ffmpeg's `-pixel_format`
    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            PixelFormat::Rgb24 => "rgb24",
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.ffmpeg_name())
    }
}

/// An immutable raster handed from a source to the encoder.
///
/// Cloning is cheap: the pixels live behind an `Arc`, so a source can hand out
/// the same frame repeatedly without copying it.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<RgbImage>,
}

impl Frame {
    pub fn from_rgb(image: RgbImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    /// A black frame, used as the zero-cost sample for live sources
    pub fn blank(width: u32, height: u32) -> Self {
        Self::from_rgb(RgbImage::new(width, height))
    }

    /// Convert a BGRA buffer (rows may be padded) into a frame
    pub fn from_bgra(data: &[u8], width: u32, height: u32, bytes_per_row: usize) -> Option<Self> {
        let row_len = width as usize * 4;
        if bytes_per_row < row_len || data.len() < bytes_per_row * height as usize {
            return None;
        }

        let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
        for row in data.chunks(bytes_per_row).take(height as usize) {
            for px in row[..row_len].chunks_exact(4) {
                rgb.extend_from_slice(&[px[2], px[1], px[0]]);
            }
        }
        RgbImage::from_raw(width, height, rgb).map(Self::from_rgb)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    pub fn pixel_format(&self) -> PixelFormat {
        PixelFormat::Rgb24
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Packed pixel bytes, row-major, no padding
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }
}

/// A producer of frames.
///
/// Lifecycle: `open` once, any number of `read_frame`/`sample_frame` calls,
/// then `close`. `width`/`height` are only meaningful after `open` returns and
/// always describe the frames this source hands out.
pub trait FrameSource: Send {
    /// Acquire the underlying device, file or buffer
    fn open(&mut self) -> FrameSourceResult<()>;

    /// Produce the next frame. Live sources may block for a source-dependent time.
    fn read_frame(&mut self) -> FrameSourceResult<Frame>;

    /// A frame with the same layout as `read_frame`, for encoder setup
    fn sample_frame(&mut self) -> FrameSourceResult<Frame>;

    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Release resources. Best effort; failures are logged, not returned.
    fn close(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn open(&mut self) -> FrameSourceResult<()> {
        (**self).open()
    }

    fn read_frame(&mut self) -> FrameSourceResult<Frame> {
        (**self).read_frame()
    }

    fn sample_frame(&mut self) -> FrameSourceResult<Frame> {
        (**self).sample_frame()
    }

    fn width(&self) -> u32 {
        (**self).width()
    }

    fn height(&self) -> u32 {
        (**self).height()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_frame_dimensions() {
        let frame = Frame::blank(4, 2);
        assert_eq!(frame.width(), 4);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.pixel_count(), 8);
        assert_eq!(frame.as_bytes().len(), 4 * 2 * 3);
    }

    #[test]
    fn test_from_bgra_swaps_channels_and_drops_padding() {
        // 2x1 image, rows padded to 12 bytes
        let data = [
            10, 20, 30, 255, 40, 50, 60, 255, 0, 0, 0, 0,
        ];
        let frame = Frame::from_bgra(&data, 2, 1, 12).unwrap();
        assert_eq!(frame.as_bytes(), &[30, 20, 10, 60, 50, 40]);
    }

    #[test]
    fn test_from_bgra_rejects_short_buffer() {
        assert!(Frame::from_bgra(&[0; 7], 2, 1, 8).is_none());
        assert!(Frame::from_bgra(&[0; 8], 2, 1, 4).is_none());
    }

    #[test]
    fn test_clone_shares_pixels() {
        let frame = Frame::blank(8, 8);
        let copy = frame.clone();
        assert!(std::ptr::eq(frame.as_bytes().as_ptr(), copy.as_bytes().as_ptr()));
    }
}
