//! Frame sources
//!
//! This module provides the frame source trait and the sources that feed a
//! recording: the live screen, a video file, a static image, and a synthetic
//! test pattern.

pub mod image_file;
pub mod pattern;
pub mod screen;
pub mod source;
pub mod video_file;

#[cfg(target_os = "macos")]
pub mod macos;

pub use image_file::StaticImageSource;
pub use pattern::{decode_pattern, TestPatternSource};
pub use screen::{DisplayInfo, ScreenSource};
pub use source::{Frame, FrameSource, FrameSourceError, FrameSourceResult, PixelFormat};
pub use video_file::VideoFileSource;
