//! Static image input
//!
//! Decodes a single image at `open` and hands it out on every read. Useful for
//! exercising the encoder and the scaling pipeline with known content.

use crate::capture::source::{Frame, FrameSource, FrameSourceError, FrameSourceResult};
use std::path::{Path, PathBuf};

pub struct StaticImageSource {
    path: PathBuf,
    frame: Option<Frame>,
}

impl StaticImageSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            frame: None,
        }
    }

    fn frame(&self) -> FrameSourceResult<Frame> {
        self.frame.clone().ok_or(FrameSourceError::NotOpen)
    }
}

impl FrameSource for StaticImageSource {
    fn open(&mut self) -> FrameSourceResult<()> {
        let image = image::open(&self.path)?.into_rgb8();
        tracing::info!(
            "Loaded static image {:?} ({}x{})",
            self.path,
            image.width(),
            image.height()
        );
        self.frame = Some(Frame::from_rgb(image));
        Ok(())
    }

    fn read_frame(&mut self) -> FrameSourceResult<Frame> {
        self.frame()
    }

    fn sample_frame(&mut self) -> FrameSourceResult<Frame> {
        self.frame()
    }

    fn width(&self) -> u32 {
        self.frame.as_ref().map_or(0, Frame::width)
    }

    fn height(&self) -> u32 {
        self.frame.as_ref().map_or(0, Frame::height)
    }

    fn close(&mut self) {
        self.frame = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_reads_same_image_every_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("still.png");
        RgbImage::from_pixel(6, 4, Rgb([200, 10, 10])).save(&path).unwrap();

        let mut source = StaticImageSource::new(&path);
        source.open().unwrap();
        assert_eq!((source.width(), source.height()), (6, 4));

        let first = source.read_frame().unwrap();
        let second = source.read_frame().unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
        assert_eq!(first.image().get_pixel(0, 0), &Rgb([200, 10, 10]));

        source.close();
        assert!(matches!(source.read_frame(), Err(FrameSourceError::NotOpen)));
    }

    #[test]
    fn test_missing_file_fails_open() {
        let mut source = StaticImageSource::new("/definitely/not/here.png");
        assert!(source.open().is_err());
    }
}
