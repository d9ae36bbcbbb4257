//! Recording metrics
//!
//! The recorder reports every frame's start and end time to a
//! [`RecordingListener`]. [`MetricsCollector`] turns those into a load ratio:
//! time spent reading and encoding a frame divided by the capture interval. A
//! ratio at or above 1 means the pipeline cannot keep up with the capture rate.

use crate::recorder::rate::Rate;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Observer of a recording's progress. Timestamps come from the recorder's clock.
pub trait RecordingListener: Send + Sync {
    fn on_recording_start(&self, destination: &Path, capture_rate: Rate, output_rate: Rate);

    fn on_frame_start(&self, timestamp: u64, frame_index: u64);

    fn on_frame_end(&self, timestamp: u64, frame_index: u64);

    fn on_recording_end(&self);
}

/// Point-in-time view of a [`MetricsCollector`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub destination: Option<PathBuf>,
    pub capture_rate: Option<Rate>,
    pub output_rate: Option<Rate>,
    pub frames_processed: u64,
    /// Load of the most recent frame
    pub rendering_ratio: f64,
    pub max_rendering_ratio: f64,
    pub is_recording: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl MetricsSnapshot {
    /// Whether any frame so far took longer than its interval
    pub fn is_overloaded(&self) -> bool {
        self.max_rendering_ratio >= 1.0
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fps = self.capture_rate.map_or(0.0, |rate| rate.frames_per_second());
        write!(
            f,
            "Recorded {} frames at {:.2} fps with a load of {:.2}",
            self.frames_processed, fps, self.rendering_ratio
        )
    }
}

#[derive(Debug, Default)]
struct MetricsState {
    destination: Option<PathBuf>,
    capture_rate: Option<Rate>,
    output_rate: Option<Rate>,
    frame_started_at: Option<(u64, u64)>,
    frames_processed: u64,
    rendering_ratio: f64,
    max_rendering_ratio: f64,
    is_recording: bool,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

/// Default listener: keeps the latest load figures for reporting
#[derive(Debug, Default)]
pub struct MetricsCollector {
    state: Mutex<MetricsState>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.lock();
        MetricsSnapshot {
            destination: state.destination.clone(),
            capture_rate: state.capture_rate,
            output_rate: state.output_rate,
            frames_processed: state.frames_processed,
            rendering_ratio: state.rendering_ratio,
            max_rendering_ratio: state.max_rendering_ratio,
            is_recording: state.is_recording,
            started_at: state.started_at,
            ended_at: state.ended_at,
        }
    }

    pub fn rendering_ratio(&self) -> f64 {
        self.state.lock().rendering_ratio
    }

    pub fn frames_processed(&self) -> u64 {
        self.state.lock().frames_processed
    }
}

impl RecordingListener for MetricsCollector {
    fn on_recording_start(&self, destination: &Path, capture_rate: Rate, output_rate: Rate) {
        let mut state = self.state.lock();
        *state = MetricsState {
            destination: Some(destination.to_path_buf()),
            capture_rate: Some(capture_rate),
            output_rate: Some(output_rate),
            is_recording: true,
            started_at: Some(Utc::now()),
            ..MetricsState::default()
        };
        tracing::info!(
            "Recording {:?}: capture every {}s, output every {}s",
            destination,
            capture_rate,
            output_rate
        );
    }

    fn on_frame_start(&self, timestamp: u64, frame_index: u64) {
        self.state.lock().frame_started_at = Some((frame_index, timestamp));
    }

    fn on_frame_end(&self, timestamp: u64, frame_index: u64) {
        let mut state = self.state.lock();
        let Some((started_index, started_at)) = state.frame_started_at.take() else {
            tracing::warn!("Frame {} ended without a start", frame_index);
            return;
        };
        if started_index != frame_index {
            tracing::warn!(
                "Frame {} ended but frame {} was started",
                frame_index,
                started_index
            );
            return;
        }

        let interval = state
            .capture_rate
            .map_or(0, |rate| rate.interval_nanos())
            .max(1);
        let ratio = timestamp.saturating_sub(started_at) as f64 / interval as f64;

        state.rendering_ratio = ratio;
        state.max_rendering_ratio = state.max_rendering_ratio.max(ratio);
        state.frames_processed = frame_index + 1;
        tracing::debug!("Frame {} load {:.3}", frame_index, ratio);
    }

    fn on_recording_end(&self) {
        let mut state = self.state.lock();
        state.is_recording = false;
        state.ended_at = Some(Utc::now());
        tracing::info!(
            "Recording ended after {} frames (peak load {:.2})",
            state.frames_processed,
            state.max_rendering_ratio
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> MetricsCollector {
        let metrics = MetricsCollector::new();
        let capture = Rate::per_second(5).unwrap();
        metrics.on_recording_start(Path::new("rec.mp4"), capture, capture.sped_up(4).unwrap());
        metrics
    }

    #[test]
    fn test_ratio_is_processing_over_interval() {
        let metrics = started();
        metrics.on_frame_start(1_000, 0);
        metrics.on_frame_end(1_000 + 50_000_000, 0);

        assert!((metrics.rendering_ratio() - 0.25).abs() < 1e-9);
        assert_eq!(metrics.frames_processed(), 1);
    }

    #[test]
    fn test_tracks_peak_and_count() {
        let metrics = started();
        metrics.on_frame_start(0, 0);
        metrics.on_frame_end(300_000_000, 0);
        metrics.on_frame_start(400_000_000, 1);
        metrics.on_frame_end(420_000_000, 1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames_processed, 2);
        assert!((snapshot.rendering_ratio - 0.1).abs() < 1e-9);
        assert!((snapshot.max_rendering_ratio - 1.5).abs() < 1e-9);
        assert!(snapshot.is_overloaded());
    }

    #[test]
    fn test_lifecycle_flags() {
        let metrics = started();
        let snapshot = metrics.snapshot();
        assert!(snapshot.is_recording);
        assert!(snapshot.started_at.is_some());
        assert_eq!(snapshot.output_rate, Rate::new(1, 20));

        metrics.on_recording_end();
        let snapshot = metrics.snapshot();
        assert!(!snapshot.is_recording);
        assert!(snapshot.ended_at.is_some());
    }

    #[test]
    fn test_restart_resets_counters() {
        let metrics = started();
        metrics.on_frame_start(0, 0);
        metrics.on_frame_end(10, 0);
        metrics.on_recording_end();

        let capture = Rate::per_second(1).unwrap();
        metrics.on_recording_start(Path::new("other.mp4"), capture, capture);
        assert_eq!(metrics.frames_processed(), 0);
        assert_eq!(metrics.snapshot().destination, Some(PathBuf::from("other.mp4")));
    }

    #[test]
    fn test_mismatched_end_is_ignored() {
        let metrics = started();
        metrics.on_frame_start(0, 3);
        metrics.on_frame_end(100, 4);
        assert_eq!(metrics.frames_processed(), 0);
    }

    #[test]
    fn test_display_line() {
        let metrics = started();
        metrics.on_frame_start(0, 0);
        metrics.on_frame_end(100_000_000, 0);
        assert_eq!(
            metrics.snapshot().to_string(),
            "Recorded 1 frames at 5.00 fps with a load of 0.50"
        );
    }
}
