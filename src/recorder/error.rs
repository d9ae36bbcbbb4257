//! Recorder errors

use crate::capture::source::FrameSourceError;
use crate::encode::MediaError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during recording
#[derive(Error, Debug)]
pub enum RecordingError {
    /// The frame source could not be opened or primed
    #[error("Frame source error: {0}")]
    Source(#[from] FrameSourceError),

    /// The writer could not be created, configured or opened
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    /// Creating or removing the lock artifact failed
    #[error("Lock artifact {path:?}: {source}")]
    ResilienceProtocol {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The capture loop was aborted; frames written before the failure are kept
    #[error("Recording failed after {frames_written} frames: {source}")]
    Fatal {
        frames_written: u64,
        #[source]
        source: MediaError,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A blocking recording task panicked or was cancelled
    #[error("Recording task failed: {0}")]
    Task(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for recording operations
pub type RecordingResult<T> = Result<T, RecordingError>;

impl RecordingError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, RecordingError::Fatal { .. })
    }
}
