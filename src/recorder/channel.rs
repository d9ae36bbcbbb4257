//! Recording channel trait
//!
//! Async facade over the blocking recorder. A channel owns one capture source
//! and writes one file per session into an output directory.

use crate::capture::source::{FrameSource, FrameSourceResult};
use crate::clock::Clock;
use crate::encode::{FfmpegCodec, MediaCodec};
use crate::recorder::error::{RecordingError, RecordingResult};
use crate::recorder::metrics::{MetricsCollector, MetricsSnapshot};
use crate::recorder::options::{duration_millis, RecorderOptions};
use crate::recorder::stop::StopHandle;
use crate::recorder::video::{RecordingSummary, VideoRecorder};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};

/// Interval between progress log lines while recording
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Trait for recording channels
///
/// Channels are created idle, initialized once per session with an output
/// directory, then started and stopped.
#[async_trait]
pub trait RecordingChannel: Send + Sync {
    /// Get the channel identifier (e.g., "timelapse")
    fn id(&self) -> &str;

    /// Prepare the session's output in `output_dir`
    async fn initialize(&mut self, output_dir: &Path, session_index: usize) -> RecordingResult<()>;

    /// Start recording
    async fn start(&mut self) -> RecordingResult<()>;

    /// Stop recording and wait for the output to be closed
    async fn stop(&mut self) -> RecordingResult<()>;

    /// Check if the channel is currently recording
    fn is_recording(&self) -> bool;

    /// Get output files created by this channel
    fn output_files(&self) -> Vec<String>;
}

/// Capture cadence of a time-lapse channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelapseConfig {
    pub snaps_per_second: u32,
    pub speed_up_factor: u32,
    /// Capture time after which the recording ends by itself, as milliseconds
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

/// Creates the frame source for each session
pub type SourceFactory = Box<dyn FnMut() -> FrameSourceResult<Box<dyn FrameSource>> + Send>;

type Recorder = VideoRecorder<Box<dyn FrameSource>>;

fn task_error(e: JoinError) -> RecordingError {
    RecordingError::Task(e.to_string())
}

/// Time-lapse recording channel
pub struct TimelapseChannel {
    id: String,
    config: TimelapseConfig,
    factory: Mutex<SourceFactory>,
    clock: Option<Arc<dyn Clock>>,
    codec: Arc<dyn MediaCodec>,
    options: RecorderOptions,
    metrics: Arc<MetricsCollector>,
    /// Opened recorder waiting for `start`
    recorder: Mutex<Option<Recorder>>,
    stop_handle: Option<StopHandle>,
    task: Option<JoinHandle<RecordingResult<RecordingSummary>>>,
    progress: Option<JoinHandle<()>>,
    output_files: Vec<PathBuf>,
    summary: Option<RecordingSummary>,
}

impl TimelapseChannel {
    pub fn new(id: impl Into<String>, config: TimelapseConfig, factory: SourceFactory) -> Self {
        Self {
            id: id.into(),
            config,
            factory: Mutex::new(factory),
            clock: None,
            codec: Arc::new(FfmpegCodec::default()),
            options: RecorderOptions::default(),
            metrics: Arc::new(MetricsCollector::new()),
            recorder: Mutex::new(None),
            stop_handle: None,
            task: None,
            progress: None,
            output_files: Vec::new(),
            summary: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn MediaCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_options(mut self, options: RecorderOptions) -> Self {
        self.options = options;
        self
    }

    /// Output path for a session
    pub fn output_path(output_dir: &Path, session_index: usize) -> PathBuf {
        output_dir.join(format!("recording-{}.mp4", session_index))
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Handle for stopping the running session without awaiting it
    pub fn stop_handle(&self) -> Option<StopHandle> {
        self.stop_handle.clone()
    }

    /// Summary of the last finished session
    pub fn summary(&self) -> Option<&RecordingSummary> {
        self.summary.as_ref()
    }

    /// Wait for the running session to end on its own
    pub async fn wait(&mut self) -> RecordingResult<RecordingSummary> {
        let task = self
            .task
            .take()
            .ok_or_else(|| RecordingError::InvalidState("Not recording".to_string()))?;

        let result = task.await.map_err(task_error).and_then(|r| r);
        if let Some(progress) = self.progress.take() {
            progress.abort();
        }
        self.stop_handle = None;

        match &result {
            Ok(summary) => {
                tracing::info!("{} ({:?})", self.metrics.snapshot(), summary.reason);
                self.summary = Some(summary.clone());
            }
            Err(e) => tracing::error!("Channel {} failed: {}", self.id, e),
        }
        result
    }

    /// Log progress until `finished` closes, which happens when the recording task ends
    fn spawn_progress(&mut self, mut finished: watch::Receiver<()>) {
        let metrics = self.metrics.clone();
        let id = self.id.clone();
        self.progress = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(PROGRESS_INTERVAL);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let snapshot = metrics.snapshot();
                        if snapshot.is_recording {
                            tracing::info!("[{}] {}", id, snapshot);
                        }
                    }
                    changed = finished.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("[{}] Progress reporting ended", id);
        }));
    }
}

impl Drop for TimelapseChannel {
    fn drop(&mut self) {
        // Nobody could stop or await the session after this
        if let Some(task) = &self.task {
            if !task.is_finished() {
                tracing::warn!("Channel {} dropped while recording, stopping", self.id);
                if let Some(handle) = &self.stop_handle {
                    handle.stop();
                }
            }
        }
        if let Some(progress) = self.progress.take() {
            progress.abort();
        }
    }
}

#[async_trait]
impl RecordingChannel for TimelapseChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn initialize(&mut self, output_dir: &Path, session_index: usize) -> RecordingResult<()> {
        if self.task.is_some() {
            return Err(RecordingError::InvalidState("Already recording".to_string()));
        }

        tokio::fs::create_dir_all(output_dir).await?;
        let destination = Self::output_path(output_dir, session_index);

        let source = (self.factory.get_mut())()?;
        let mut builder = VideoRecorder::builder(source)
            .listener(self.metrics.clone())
            .codec(self.codec.clone())
            .options(self.options.clone());
        if let Some(clock) = &self.clock {
            builder = builder.clock(clock.clone());
        }
        let mut recorder = builder.build();

        let snaps = self.config.snaps_per_second;
        let speed_up = self.config.speed_up_factor;
        let path = destination.clone();
        let (recorder, opened) = tokio::task::spawn_blocking(move || {
            let opened = recorder.open(&path, snaps, speed_up);
            (recorder, opened)
        })
        .await
        .map_err(task_error)?;
        opened?;

        tracing::info!("Channel {} initialized: {:?}", self.id, destination);
        self.stop_handle = Some(recorder.stop_handle());
        *self.recorder.get_mut() = Some(recorder);
        self.output_files.push(destination);
        Ok(())
    }

    async fn start(&mut self) -> RecordingResult<()> {
        let mut recorder = self
            .recorder
            .get_mut()
            .take()
            .ok_or_else(|| RecordingError::InvalidState("Channel not initialized".to_string()))?;

        let duration = self.config.duration;
        let id = self.id.clone();
        let (finished_tx, finished_rx) = watch::channel(());
        self.task = Some(tokio::task::spawn_blocking(move || {
            // Dropped when the task ends, which ends progress reporting
            let _finished = finished_tx;
            let recorded = recorder.start(duration);
            if let Err(e) = recorder.close() {
                // The recording itself is intact; only cleanup failed
                tracing::warn!("Channel {} closed with error: {}", id, e);
            }
            recorded
        }));
        self.spawn_progress(finished_rx);

        tracing::info!("Channel {} started", self.id);
        Ok(())
    }

    async fn stop(&mut self) -> RecordingResult<()> {
        let handle = self
            .stop_handle
            .clone()
            .ok_or_else(|| RecordingError::InvalidState("Not recording".to_string()))?;
        if self.task.is_none() {
            return Err(RecordingError::InvalidState("Not recording".to_string()));
        }

        handle.stop();
        self.wait().await.map(|_| ())
    }

    fn is_recording(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn output_files(&self) -> Vec<String> {
        self.output_files
            .iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::source::FrameSourceError;
    use crate::clock::FakeClock;
    use crate::encode::{MemoryCodec, WriterEvent};
    use crate::processing::testing::SolidSource;
    use crate::processing::FreezingSource;
    use crate::recorder::lock::LockArtifact;
    use crate::recorder::video::StopReason;
    use std::time::Instant;

    fn config(duration: Duration) -> TimelapseConfig {
        TimelapseConfig {
            snaps_per_second: 5,
            speed_up_factor: 4,
            duration,
        }
    }

    fn once(source: impl FrameSource + 'static) -> SourceFactory {
        let mut slot: Option<Box<dyn FrameSource>> = Some(Box::new(source));
        Box::new(move || {
            slot.take()
                .ok_or_else(|| FrameSourceError::Unavailable("Source already used".to_string()))
        })
    }

    fn channel(duration: Duration, factory: SourceFactory, codec: MemoryCodec) -> TimelapseChannel {
        TimelapseChannel::new("timelapse", config(duration), factory)
            .with_clock(Arc::new(FakeClock::new()))
            .with_codec(Arc::new(codec))
    }

    #[test]
    fn test_config_duration_in_millis() {
        let config: TimelapseConfig = serde_json::from_str(
            r#"{"snapsPerSecond": 2, "speedUpFactor": 30, "duration": 90000}"#,
        )
        .unwrap();
        assert_eq!(config.duration, Duration::from_secs(90));

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["duration"], 90_000);
        assert_eq!(json["speedUpFactor"], 30);
    }

    #[tokio::test]
    async fn test_records_session_to_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let codec = MemoryCodec::new();
        let log = codec.log();
        let mut channel = channel(Duration::from_secs(12), once(SolidSource::new(8, 8)), codec);

        channel.initialize(dir.path(), 2).await.unwrap();
        let expected = dir.path().join("recording-2.mp4");
        assert_eq!(
            channel.output_files(),
            vec![expected.to_string_lossy().into_owned()]
        );
        assert!(LockArtifact::path_for(&expected, ".lock").exists());

        channel.start().await.unwrap();
        let summary = channel.wait().await.unwrap();

        assert_eq!(summary.frames_written, 60);
        assert_eq!(summary.reason, StopReason::Completed);
        assert_eq!(log.frames_written(), 60);
        assert!(!channel.is_recording());
        assert_eq!(channel.summary(), Some(&summary));
        assert_eq!(channel.metrics().frames_processed, 60);
        assert!(!LockArtifact::path_for(&expected, ".lock").exists());
    }

    #[tokio::test]
    async fn test_stop_releases_frozen_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = FreezingSource::new(2, SolidSource::new(8, 8));
        let freeze = source.handle();
        let mut channel = channel(Duration::from_secs(3600), once(source), MemoryCodec::new());

        channel.initialize(dir.path(), 0).await.unwrap();
        channel.start().await.unwrap();

        let waiter = freeze.clone();
        let frozen = tokio::task::spawn_blocking(move || {
            waiter.wait_until_frozen(Duration::from_secs(10))
        })
        .await
        .unwrap();
        assert!(frozen);
        assert!(channel.is_recording());

        channel.stop_handle().unwrap().stop();
        freeze.thaw();
        channel.stop().await.unwrap();

        let summary = channel.summary().unwrap();
        assert_eq!(summary.reason, StopReason::Stopped);
        assert_eq!(summary.frames_written, 2);
        assert!(!channel.is_recording());
    }

    #[tokio::test]
    async fn test_dropping_channel_stops_recording() {
        let dir = tempfile::tempdir().unwrap();
        let codec = MemoryCodec::new();
        let log = codec.log();
        // Real clock: the session would otherwise run for an hour
        let mut channel = TimelapseChannel::new(
            "timelapse",
            config(Duration::from_secs(3600)),
            once(SolidSource::new(8, 8)),
        )
        .with_codec(Arc::new(codec));

        channel.initialize(dir.path(), 0).await.unwrap();
        let lock = LockArtifact::path_for(&dir.path().join("recording-0.mp4"), ".lock");
        channel.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        drop(channel);

        let deadline = Instant::now() + Duration::from_secs(10);
        while (!log.contains(&WriterEvent::Closed) || lock.exists()) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(log.contains(&WriterEvent::Closed));
        assert!(log.contains(&WriterEvent::Flushed));
        assert!(!lock.exists());

        let frames = log.frames_written();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(log.frames_written(), frames);
        assert!(frames < 10, "{} frames", frames);
    }

    #[tokio::test]
    async fn test_progress_ends_with_recording() {
        let dir = tempfile::tempdir().unwrap();
        let mut channel = channel(Duration::from_secs(12), once(SolidSource::new(8, 8)), MemoryCodec::new());

        channel.initialize(dir.path(), 0).await.unwrap();
        channel.start().await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while !channel.progress.as_ref().unwrap().is_finished() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(channel.progress.as_ref().unwrap().is_finished());
        assert_eq!(channel.wait().await.unwrap().frames_written, 60);
    }

    #[tokio::test]
    async fn test_start_requires_initialize() {
        let mut channel = channel(Duration::from_secs(1), once(SolidSource::new(8, 8)), MemoryCodec::new());
        assert!(matches!(
            channel.start().await,
            Err(RecordingError::InvalidState(_))
        ));
        assert!(matches!(
            channel.stop().await,
            Err(RecordingError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_factory_failure_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let factory: SourceFactory = Box::new(|| -> FrameSourceResult<Box<dyn FrameSource>> {
            Err(FrameSourceError::Unavailable("no display".to_string()))
        });
        let mut channel = channel(Duration::from_secs(1), factory, MemoryCodec::new());

        let err = channel.initialize(dir.path(), 0).await.unwrap_err();
        assert!(matches!(err, RecordingError::Source(_)));
        assert!(channel.output_files().is_empty());
    }

    #[tokio::test]
    async fn test_open_failure_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let mut channel = channel(
            Duration::from_secs(1),
            once(SolidSource::new(8, 8)),
            MemoryCodec::new().failing_open(),
        );

        let err = channel.initialize(dir.path(), 0).await.unwrap_err();
        assert!(matches!(err, RecordingError::Media(_)));
        assert!(!LockArtifact::path_for(&dir.path().join("recording-0.mp4"), ".lock").exists());
    }
}
