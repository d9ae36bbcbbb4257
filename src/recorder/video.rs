//! Time-lapse video recorder
//!
//! Pulls frames from a [`FrameSource`] at the capture rate and hands them to a
//! [`MediaWriter`] whose time base is the output rate, so playback runs
//! `speed_up_factor` times faster than real time.
//!
//! Crash resilience comes from two things set up in `open`: the container is
//! written in fragments of bounded duration, and a lock artifact next to the
//! destination marks the recording as in progress until `close` removes it.

use crate::capture::source::FrameSource;
use crate::clock::{Clock, SystemClock, Wake};
use crate::encode::{FfmpegCodec, MediaCodec, MediaWriter, VideoStreamConfig};
use crate::recorder::error::{RecordingError, RecordingResult};
use crate::recorder::lock::LockArtifact;
use crate::recorder::metrics::{MetricsCollector, RecordingListener};
use crate::recorder::options::RecorderOptions;
use crate::recorder::rate::Rate;
use crate::recorder::stop::{StopHandle, StopSignal};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle of a [`VideoRecorder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    Idle,
    Opened,
    Recording,
    Stopping,
    Closed,
}

/// Why the capture loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    /// Every frame for the requested duration was written
    Completed,
    /// A stop was requested
    Stopped,
    /// The frame source failed; frames before the failure were kept
    SourceFailed,
}

/// Outcome of a recording that ended without a fatal error
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSummary {
    pub destination: PathBuf,
    pub frames_written: u64,
    pub reason: StopReason,
    pub capture_rate: Rate,
    pub output_rate: Rate,
}

impl RecordingSummary {
    /// Playback length of the written frames
    pub fn media_duration(&self) -> Duration {
        Duration::from_nanos(self.frames_written * self.output_rate.interval_nanos())
    }
}

/// Resources held between `open` and `close`
struct Session {
    destination: PathBuf,
    capture_rate: Rate,
    output_rate: Rate,
    writer: Box<dyn MediaWriter>,
    lock: Option<LockArtifact>,
    frames_written: u64,
}

pub struct VideoRecorderBuilder<S: FrameSource> {
    source: S,
    clock: Option<Arc<dyn Clock>>,
    listener: Option<Arc<dyn RecordingListener>>,
    codec: Option<Arc<dyn MediaCodec>>,
    options: RecorderOptions,
}

impl<S: FrameSource> VideoRecorderBuilder<S> {
    /// Time source for pacing. Default: [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Progress observer. Default: a fresh [`MetricsCollector`].
    pub fn listener(mut self, listener: Arc<dyn RecordingListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Writer factory. Default: [`FfmpegCodec`] with default settings.
    pub fn codec(mut self, codec: Arc<dyn MediaCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn options(mut self, options: RecorderOptions) -> Self {
        self.options = options;
        self
    }

    /// Maximum fragment length. Default: 5 minutes.
    pub fn fragmentation(mut self, fragment_duration: Duration) -> Self {
        self.options.fragment_duration = fragment_duration;
        self
    }

    pub fn build(self) -> VideoRecorder<S> {
        VideoRecorder {
            source: self.source,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock::new())),
            listener: self
                .listener
                .unwrap_or_else(|| Arc::new(MetricsCollector::new())),
            codec: self
                .codec
                .unwrap_or_else(|| Arc::new(FfmpegCodec::default())),
            options: self.options,
            signal: StopSignal::new(),
            state: RecorderState::Idle,
            session: None,
        }
    }
}

/// Paced frame capture into a fragmented container.
///
/// `open`, `start` and `close` must be called in sequence from one thread.
/// Stopping from elsewhere goes through [`VideoRecorder::stop_handle`].
pub struct VideoRecorder<S: FrameSource> {
    source: S,
    clock: Arc<dyn Clock>,
    listener: Arc<dyn RecordingListener>,
    codec: Arc<dyn MediaCodec>,
    options: RecorderOptions,
    signal: StopSignal,
    state: RecorderState,
    session: Option<Session>,
}

impl<S: FrameSource> VideoRecorder<S> {
    pub fn builder(source: S) -> VideoRecorderBuilder<S> {
        VideoRecorderBuilder {
            source,
            clock: None,
            listener: None,
            codec: None,
            options: RecorderOptions::default(),
        }
    }

    /// Recorder with every default: system clock, ffmpeg, 5 minute fragments
    pub fn new(source: S) -> Self {
        Self::builder(source).build()
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn options(&self) -> &RecorderOptions {
        &self.options
    }

    pub fn destination(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.destination.as_path())
    }

    /// Where the lock artifact for the current session lives
    pub fn lock_path(&self) -> Option<PathBuf> {
        self.session
            .as_ref()
            .map(|s| LockArtifact::path_for(&s.destination, &self.options.lock_suffix))
    }

    pub fn frames_written(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.frames_written)
    }

    /// Cloneable handle that stops this recorder from any thread
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(self.signal.clone())
    }

    /// Finish after the frame in flight. Calling it again has no further effect.
    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    /// Open with `snaps_per_second` captures per second, played back
    /// `speed_up_factor` times faster.
    pub fn open(
        &mut self,
        destination: impl AsRef<Path>,
        snaps_per_second: u32,
        speed_up_factor: u32,
    ) -> RecordingResult<()> {
        let capture_rate = Rate::per_second(snaps_per_second).ok_or_else(|| {
            RecordingError::Configuration("Snaps per second must be at least 1".to_string())
        })?;
        self.open_with_rate(destination, capture_rate, speed_up_factor)
    }

    /// Like [`VideoRecorder::open`], for capture intervals that are not a whole
    /// fraction of a second
    pub fn open_with_rate(
        &mut self,
        destination: impl AsRef<Path>,
        capture_rate: Rate,
        speed_up_factor: u32,
    ) -> RecordingResult<()> {
        if self.state != RecorderState::Idle {
            return Err(RecordingError::InvalidState(format!(
                "Cannot open a recorder that is {:?}",
                self.state
            )));
        }
        if speed_up_factor == 0 {
            return Err(RecordingError::Configuration(
                "Speed-up factor must be at least 1".to_string(),
            ));
        }
        let output_rate = capture_rate.sped_up(speed_up_factor).ok_or_else(|| {
            RecordingError::Configuration(format!(
                "Speed-up factor {} is too large for capture rate {}",
                speed_up_factor, capture_rate
            ))
        })?;
        self.options.validate()?;

        let destination = destination.as_ref().to_path_buf();
        self.signal.reset();

        self.source.open()?;
        match self.open_session(&destination, capture_rate, output_rate) {
            Ok(session) => {
                tracing::info!(
                    "Opened recording {:?} ({}x{}, capture {}s, output {}s)",
                    destination,
                    self.source.width(),
                    self.source.height(),
                    capture_rate,
                    output_rate
                );
                self.session = Some(session);
                self.state = RecorderState::Opened;
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to open recording {:?}: {}", destination, e);
                self.source.close();
                Err(e)
            }
        }
    }

    /// Everything after the source is open. On error nothing is left behind
    /// except the source, which the caller closes.
    fn open_session(
        &mut self,
        destination: &Path,
        capture_rate: Rate,
        output_rate: Rate,
    ) -> RecordingResult<Session> {
        let sample = self.source.sample_frame()?;

        let mut writer = self.codec.create_writer(
            destination,
            self.options.container,
            self.options.fragment_duration,
        )?;
        writer.configure_video_stream(VideoStreamConfig {
            width: sample.width(),
            height: sample.height(),
            pixel_format: sample.pixel_format(),
            time_base: output_rate,
        })?;

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let lock = LockArtifact::create(destination, &self.options.lock_suffix)?;
        if let Err(e) = writer.open() {
            if let Err(close_err) = writer.close() {
                tracing::warn!("Failed to release writer: {}", close_err);
            }
            if let Err(lock_err) = lock.remove() {
                tracing::error!("{}", lock_err);
            }
            return Err(e.into());
        }

        Ok(Session {
            destination: destination.to_path_buf(),
            capture_rate,
            output_rate,
            writer,
            lock: Some(lock),
            frames_written: 0,
        })
    }

    /// Record for `duration` of capture time, or until stopped.
    ///
    /// A failing frame source ends the recording early but is not an error.
    /// Codec failures abort the loop and are returned as
    /// [`RecordingError::Fatal`] after the writer has been flushed.
    pub fn start(&mut self, duration: Duration) -> RecordingResult<RecordingSummary> {
        if self.state != RecorderState::Opened {
            return Err(RecordingError::InvalidState(format!(
                "Cannot start a recorder that is {:?}",
                self.state
            )));
        }
        let Self {
            source,
            clock,
            listener,
            signal,
            session,
            state,
            ..
        } = self;
        let Some(session) = session.as_mut() else {
            return Err(RecordingError::InvalidState(
                "Recorder has no open session".to_string(),
            ));
        };

        *state = RecorderState::Recording;
        listener.on_recording_start(&session.destination, session.capture_rate, session.output_rate);
        tracing::info!("Recording started for {:?}", duration);

        let mut outcome = capture_loop(
            source,
            &**clock,
            &**listener,
            signal,
            session,
            duration,
        );

        *state = RecorderState::Stopping;
        match session.writer.flush() {
            Ok(()) => tracing::info!("Flushed {} frames", session.frames_written),
            Err(e) if outcome.is_ok() => {
                outcome = Err(RecordingError::Fatal {
                    frames_written: session.frames_written,
                    source: e,
                });
            }
            Err(e) => tracing::error!("Flush after failed recording also failed: {}", e),
        }
        listener.on_recording_end();

        let reason = outcome?;
        tracing::info!(
            "Recording finished ({:?}) with {} frames",
            reason,
            session.frames_written
        );
        Ok(RecordingSummary {
            destination: session.destination.clone(),
            frames_written: session.frames_written,
            reason,
            capture_rate: session.capture_rate,
            output_rate: session.output_rate,
        })
    }

    /// Same as [`VideoRecorder::start`]
    pub fn record(&mut self, duration: Duration) -> RecordingResult<RecordingSummary> {
        self.start(duration)
    }

    /// Release the source and the container, then remove the lock artifact.
    ///
    /// Every step runs even if an earlier one fails; the first failure is returned.
    pub fn close(&mut self) -> RecordingResult<()> {
        match self.state {
            RecorderState::Idle | RecorderState::Closed => return Ok(()),
            RecorderState::Recording => {
                return Err(RecordingError::InvalidState(
                    "Cannot close while recording".to_string(),
                ))
            }
            RecorderState::Opened | RecorderState::Stopping => {}
        }

        let mut first_error: Option<RecordingError> = None;
        self.source.close();

        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.writer.close() {
                tracing::error!("Failed to close {:?}: {}", session.destination, e);
                first_error.get_or_insert(e.into());
            }
            if let Some(lock) = session.lock.take() {
                if let Err(e) = lock.remove() {
                    tracing::error!("{}", e);
                    first_error.get_or_insert(e);
                }
            }
            tracing::info!("Closed recording {:?}", session.destination);
        }

        self.state = RecorderState::Closed;
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<S: FrameSource> Drop for VideoRecorder<S> {
    fn drop(&mut self) {
        if matches!(self.state, RecorderState::Opened | RecorderState::Stopping) {
            if let Err(e) = self.close() {
                tracing::error!("Failed to close recorder on drop: {}", e);
            }
        }
    }
}

fn capture_loop<S: FrameSource>(
    source: &mut S,
    clock: &dyn Clock,
    listener: &dyn RecordingListener,
    signal: &StopSignal,
    session: &mut Session,
    duration: Duration,
) -> RecordingResult<StopReason> {
    let total_frames = session.capture_rate.frames_in(duration);
    let interval = session.capture_rate.interval_nanos();
    tracing::debug!("Capturing {} frames every {} ns", total_frames, interval);

    let mut index = 0u64;
    loop {
        if signal.is_requested() {
            return Ok(StopReason::Stopped);
        }
        if index >= total_frames {
            return Ok(StopReason::Completed);
        }

        let frame_start = clock.now();
        listener.on_frame_start(frame_start, index);

        let frame = match source.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Failed to read frame {}: {}", index, e);
                return Ok(if signal.is_requested() {
                    StopReason::Stopped
                } else {
                    StopReason::SourceFailed
                });
            }
        };

        if let Err(e) = session.writer.encode_and_write(&frame, index) {
            tracing::error!("Failed to write frame {}: {}", index, e);
            return Err(RecordingError::Fatal {
                frames_written: session.frames_written,
                source: e,
            });
        }
        session.frames_written = index + 1;
        listener.on_frame_end(clock.now(), index);

        if clock.sleep_until(frame_start.saturating_add(interval), signal) == Wake::Interrupted {
            tracing::info!("Sleep after frame {} interrupted", index);
        }

        index += 1;
    }
}
