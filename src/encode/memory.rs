//! In-memory writer
//!
//! Records every call the recorder makes instead of producing media. Tests
//! inspect the shared [`MemoryLog`] to check frame order, time base, and the
//! open/flush/close sequence. Failures can be injected at open or at a given
//! frame index.

use crate::capture::source::Frame;
use crate::encode::{
    ContainerFormat, MediaCodec, MediaError, MediaResult, MediaWriter, VideoStreamConfig,
};
use parking_lot::Mutex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// One observed writer call
#[derive(Debug, Clone, PartialEq)]
pub enum WriterEvent {
    Created {
        destination: PathBuf,
        container: ContainerFormat,
        fragment_duration: Duration,
    },
    Configured(VideoStreamConfig),
    /// `lock_present` tells whether the lock artifact existed at open time
    Opened { lock_present: bool },
    Frame { index: u64, width: u32, height: u32 },
    Flushed,
    Closed,
}

/// Shared, append-only record of writer calls
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    events: Arc<Mutex<Vec<WriterEvent>>>,
}

impl MemoryLog {
    fn push(&self, event: WriterEvent) {
        self.events.lock().push(event);
    }

    pub fn events(&self) -> Vec<WriterEvent> {
        self.events.lock().clone()
    }

    /// Indices of every frame written, in submission order
    pub fn frame_indices(&self) -> Vec<u64> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                WriterEvent::Frame { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }

    pub fn frames_written(&self) -> usize {
        self.frame_indices().len()
    }

    /// Last configured stream, if any
    pub fn stream(&self) -> Option<VideoStreamConfig> {
        self.events.lock().iter().rev().find_map(|event| match event {
            WriterEvent::Configured(config) => Some(*config),
            _ => None,
        })
    }

    /// Playback length implied by the frames written and the stream time base
    pub fn media_duration(&self) -> Option<Duration> {
        let stream = self.stream()?;
        let frames = self.frames_written() as u64;
        Some(Duration::from_nanos(frames * stream.time_base.interval_nanos()))
    }

    pub fn contains(&self, wanted: &WriterEvent) -> bool {
        self.events.lock().iter().any(|event| event == wanted)
    }
}

/// Codec whose writers only log
#[derive(Debug, Clone)]
pub struct MemoryCodec {
    log: MemoryLog,
    lock_suffix: String,
    fail_open: bool,
    fail_encode_at: Option<u64>,
}

impl Default for MemoryCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCodec {
    pub fn new() -> Self {
        Self {
            log: MemoryLog::default(),
            lock_suffix: ".lock".to_string(),
            fail_open: false,
            fail_encode_at: None,
        }
    }

    /// Suffix used to look for the lock artifact when a writer opens
    pub fn with_lock_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.lock_suffix = suffix.into();
        self
    }

    /// Make every writer fail to open
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Make writers fail when asked to encode frame `index`
    pub fn failing_encode_at(mut self, index: u64) -> Self {
        self.fail_encode_at = Some(index);
        self
    }

    pub fn log(&self) -> MemoryLog {
        self.log.clone()
    }
}

impl MediaCodec for MemoryCodec {
    fn create_writer(
        &self,
        destination: &Path,
        container: ContainerFormat,
        fragment_duration: Duration,
    ) -> MediaResult<Box<dyn MediaWriter>> {
        self.log.push(WriterEvent::Created {
            destination: destination.to_path_buf(),
            container,
            fragment_duration,
        });

        let mut lock_path = OsString::from(destination.as_os_str());
        lock_path.push(&self.lock_suffix);

        Ok(Box::new(MemoryWriter {
            log: self.log.clone(),
            destination: destination.to_path_buf(),
            lock_path: PathBuf::from(lock_path),
            fail_open: self.fail_open,
            fail_encode_at: self.fail_encode_at,
            stream: None,
            open: false,
            flushed: false,
        }))
    }
}

struct MemoryWriter {
    log: MemoryLog,
    destination: PathBuf,
    lock_path: PathBuf,
    fail_open: bool,
    fail_encode_at: Option<u64>,
    stream: Option<VideoStreamConfig>,
    open: bool,
    flushed: bool,
}

impl MediaWriter for MemoryWriter {
    fn configure_video_stream(&mut self, config: VideoStreamConfig) -> MediaResult<()> {
        self.log.push(WriterEvent::Configured(config));
        self.stream = Some(config);
        Ok(())
    }

    fn open(&mut self) -> MediaResult<()> {
        if self.stream.is_none() {
            return Err(MediaError::InvalidConfiguration(
                "Video stream not configured".to_string(),
            ));
        }
        if self.fail_open {
            return Err(MediaError::Ffmpeg("Injected open failure".to_string()));
        }

        // Touch the destination so the on-disk layout matches a real writer
        std::fs::write(&self.destination, [])?;
        self.log.push(WriterEvent::Opened {
            lock_present: self.lock_path.exists(),
        });
        self.open = true;
        Ok(())
    }

    fn encode_and_write(&mut self, frame: &Frame, index: u64) -> MediaResult<()> {
        if !self.open || self.flushed {
            return Err(MediaError::NotOpen);
        }
        if let Some(stream) = &self.stream {
            stream.check_frame(frame)?;
        }
        if self.fail_encode_at == Some(index) {
            return Err(MediaError::Ffmpeg(format!(
                "Injected encode failure at frame {}",
                index
            )));
        }

        self.log.push(WriterEvent::Frame {
            index,
            width: frame.width(),
            height: frame.height(),
        });
        Ok(())
    }

    fn flush(&mut self) -> MediaResult<()> {
        if !self.open {
            return Err(MediaError::NotOpen);
        }
        self.flushed = true;
        self.log.push(WriterEvent::Flushed);
        Ok(())
    }

    fn close(&mut self) -> MediaResult<()> {
        if self.open {
            self.open = false;
            self.log.push(WriterEvent::Closed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::source::PixelFormat;
    use crate::recorder::rate::Rate;

    fn stream() -> VideoStreamConfig {
        VideoStreamConfig {
            width: 4,
            height: 4,
            pixel_format: PixelFormat::Rgb24,
            time_base: Rate::per_second(10).unwrap(),
        }
    }

    #[test]
    fn test_records_call_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("rec.mp4");
        let codec = MemoryCodec::new();
        let log = codec.log();

        let mut writer = codec
            .create_writer(&destination, ContainerFormat::Mp4, Duration::from_secs(2))
            .unwrap();
        writer.configure_video_stream(stream()).unwrap();
        writer.open().unwrap();
        writer.encode_and_write(&Frame::blank(4, 4), 0).unwrap();
        writer.encode_and_write(&Frame::blank(4, 4), 1).unwrap();
        writer.flush().unwrap();
        assert!(matches!(
            writer.encode_and_write(&Frame::blank(4, 4), 2),
            Err(MediaError::NotOpen)
        ));
        writer.close().unwrap();

        assert_eq!(log.frame_indices(), vec![0, 1]);
        assert_eq!(log.media_duration(), Some(Duration::from_millis(200)));
        assert!(log.contains(&WriterEvent::Opened {
            lock_present: false
        }));
        assert_eq!(log.events().last(), Some(&WriterEvent::Closed));
        assert!(destination.exists());
    }

    #[test]
    fn test_sees_lock_artifact_at_open() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("rec.mp4");
        std::fs::write(dir.path().join("rec.mp4.lock"), []).unwrap();

        let codec = MemoryCodec::new();
        let mut writer = codec
            .create_writer(&destination, ContainerFormat::Mp4, Duration::from_secs(2))
            .unwrap();
        writer.configure_video_stream(stream()).unwrap();
        writer.open().unwrap();

        assert!(codec.log().contains(&WriterEvent::Opened { lock_present: true }));
    }

    #[test]
    fn test_injected_failures() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("rec.mp4");

        let codec = MemoryCodec::new().failing_encode_at(1);
        let mut writer = codec
            .create_writer(&destination, ContainerFormat::Mp4, Duration::from_secs(2))
            .unwrap();
        writer.configure_video_stream(stream()).unwrap();
        writer.open().unwrap();
        assert!(writer.encode_and_write(&Frame::blank(4, 4), 0).is_ok());
        assert!(writer.encode_and_write(&Frame::blank(4, 4), 1).is_err());

        let codec = MemoryCodec::new().failing_open();
        let mut writer = codec
            .create_writer(&destination, ContainerFormat::Mp4, Duration::from_secs(2))
            .unwrap();
        writer.configure_video_stream(stream()).unwrap();
        assert!(writer.open().is_err());
    }
}
