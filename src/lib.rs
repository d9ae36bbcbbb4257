//! Screen Timelapse - paced screen recording with crash-resilient output.
//!
//! A [`VideoRecorder`] samples a [`FrameSource`] at a capture rate and writes
//! the frames at a faster output rate, producing a time-lapse. Output is
//! written in fragments next to a lock artifact, so a killed recording still
//! leaves a playable file.

pub mod capture;
pub mod clock;
pub mod encode;
pub mod processing;
pub mod recorder;

pub use capture::{Frame, FrameSource, FrameSourceError};
pub use clock::{Clock, FakeClock, SystemClock};
pub use recorder::{RecordingError, RecordingSummary, StopHandle, VideoRecorder};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the default tracing subscriber.
///
/// Honours `RUST_LOG`; otherwise logs this crate at debug level. Safe to call
/// more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "screen_timelapse=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
