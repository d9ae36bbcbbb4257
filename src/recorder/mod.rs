//! Recording scheduler
//!
//! [`VideoRecorder`] runs the paced capture loop; the surrounding modules
//! provide its rates, cancellation, lock artifact, metrics and configuration.
//! [`channel`] wraps it for async callers.

pub mod channel;
pub mod error;
pub mod lock;
pub mod metrics;
pub mod options;
pub mod rate;
pub mod stop;
pub mod video;

pub use channel::{RecordingChannel, SourceFactory, TimelapseChannel, TimelapseConfig};
pub use error::{RecordingError, RecordingResult};
pub use lock::LockArtifact;
pub use metrics::{MetricsCollector, MetricsSnapshot, RecordingListener};
pub use options::RecorderOptions;
pub use rate::Rate;
pub use stop::{stop_on_ctrl_c, stop_when, StopHandle, StopSignal};
pub use video::{RecorderState, RecordingSummary, StopReason, VideoRecorder, VideoRecorderBuilder};
