//! Media codec adapters
//!
//! The recorder does not encode anything itself. It drives a [`MediaWriter`]
//! obtained from a [`MediaCodec`]: configure one video stream, open, push
//! frames in index order, flush, close. Pixel conversion, encoding and
//! container muxing all happen behind that interface.

pub mod ffmpeg;
pub mod memory;
pub mod probe;

use crate::capture::source::{Frame, PixelFormat};
use crate::recorder::rate::Rate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub use ffmpeg::{FfmpegCodec, FfmpegSettings};
pub use memory::{MemoryCodec, MemoryLog, WriterEvent};
pub use probe::{probe_media, MediaInfo};

/// Errors raised by a codec or writer
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Writer not open")]
    NotOpen,

    #[error("Frame {got} submitted out of order, expected {expected}")]
    OutOfOrder { expected: u64, got: u64 },
}

/// Result type for codec operations
pub type MediaResult<T> = Result<T, MediaError>;

/// Containers that support fragmented writing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    #[default]
    Mp4,
    Mov,
}

impl ContainerFormat {
    /// Muxer name as ffmpeg knows it
    pub fn muxer_name(self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Mov => "mov",
        }
    }
}

impl std::fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.muxer_name())
    }
}

/// Geometry and timing of the single video stream a writer produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoStreamConfig {
    pub width: u32,
    pub height: u32,
    /// Layout of the frames that will be submitted
    pub pixel_format: PixelFormat,
    /// Spacing between consecutive frames in the produced media
    pub time_base: Rate,
}

impl VideoStreamConfig {
    /// Size in bytes of one submitted frame
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * self.pixel_format.bytes_per_pixel()
    }

    pub(crate) fn check_frame(&self, frame: &Frame) -> MediaResult<()> {
        if frame.width() != self.width
            || frame.height() != self.height
            || frame.pixel_format() != self.pixel_format
        {
            return Err(MediaError::InvalidConfiguration(format!(
                "Frame is {}x{} {}, stream expects {}x{} {}",
                frame.width(),
                frame.height(),
                frame.pixel_format(),
                self.width,
                self.height,
                self.pixel_format
            )));
        }
        Ok(())
    }
}

/// Factory for writers; one writer per destination
pub trait MediaCodec: Send + Sync {
    /// Prepare a writer for `destination` with segment-fragmented output.
    ///
    /// Nothing is written to disk until [`MediaWriter::open`].
    fn create_writer(
        &self,
        destination: &Path,
        container: ContainerFormat,
        fragment_duration: Duration,
    ) -> MediaResult<Box<dyn MediaWriter>>;
}

/// One open output container with one video stream
pub trait MediaWriter: Send {
    fn configure_video_stream(&mut self, config: VideoStreamConfig) -> MediaResult<()>;

    /// Open the container for writing. Requires a configured stream.
    fn open(&mut self) -> MediaResult<()>;

    /// Convert, encode and mux one frame. `index` must follow the previous one.
    fn encode_and_write(&mut self, frame: &Frame, index: u64) -> MediaResult<()>;

    /// Drain buffered encoder state into the container.
    ///
    /// Every encoded frame is on disk when this returns. No frames can be
    /// written afterwards.
    fn flush(&mut self) -> MediaResult<()>;

    /// Finalize and release the container
    fn close(&mut self) -> MediaResult<()>;
}
