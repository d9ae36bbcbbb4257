//! macOS capture implementations
//!
//! Uses CoreGraphics for screen capture.

pub mod screen;

pub use screen::*;
