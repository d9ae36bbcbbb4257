//! Video file input
//!
//! Decodes a media file with ffmpeg and plays it back against the injected
//! clock: each read returns the frame whose presentation time matches the time
//! elapsed since `open`. With a fake clock this turns a reference video into a
//! deterministic "screen".

use crate::capture::source::{Frame, FrameSource, FrameSourceError, FrameSourceResult};
use crate::clock::Clock;
use crate::encode::ffmpeg::FfmpegSettings;
use crate::encode::probe::{probe_media, MediaInfo};
use image::RgbImage;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Arc;

struct Decoder {
    process: Child,
    stdout: ChildStdout,
}

pub struct VideoFileSource {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    settings: FfmpegSettings,
    info: Option<MediaInfo>,
    decoder: Option<Decoder>,
    started_at: u64,
    /// Index of the next frame the decoder will produce
    next_index: u64,
    current: Option<Frame>,
}

impl VideoFileSource {
    pub fn new(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Self {
        Self::with_settings(path, clock, FfmpegSettings::default())
    }

    pub fn with_settings(
        path: impl AsRef<Path>,
        clock: Arc<dyn Clock>,
        settings: FfmpegSettings,
    ) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            clock,
            settings,
            info: None,
            decoder: None,
            started_at: 0,
            next_index: 0,
            current: None,
        }
    }

    fn info(&self) -> FrameSourceResult<&MediaInfo> {
        self.info.as_ref().ok_or(FrameSourceError::NotOpen)
    }

    fn decode_next(&mut self) -> FrameSourceResult<Frame> {
        let (width, height) = {
            let info = self.info()?;
            (info.width, info.height)
        };
        let decoder = self.decoder.as_mut().ok_or(FrameSourceError::NotOpen)?;

        let mut buffer = vec![0u8; width as usize * height as usize * 3];
        decoder.stdout.read_exact(&mut buffer).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => FrameSourceError::EndOfStream,
            _ => FrameSourceError::Io(e),
        })?;
        self.next_index += 1;

        RgbImage::from_raw(width, height, buffer)
            .map(Frame::from_rgb)
            .ok_or_else(|| FrameSourceError::Decode("Decoded frame has the wrong size".to_string()))
    }

    /// Frame index that should be on screen at the current clock time
    fn due_index(&self, frame_rate: f64) -> u64 {
        let elapsed_secs = self.clock.now().saturating_sub(self.started_at) as f64 / 1e9;
        (elapsed_secs * frame_rate).floor() as u64
    }
}

impl FrameSource for VideoFileSource {
    fn open(&mut self) -> FrameSourceResult<()> {
        let info = probe_media(&self.settings.probe_binary, &self.path)
            .map_err(|e| FrameSourceError::Unavailable(format!("{:#}", e)))?;

        let mut process = Command::new(&self.settings.binary)
            .args(["-v", "error", "-i"])
            .arg(&self.path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| FrameSourceError::Unavailable(format!("Failed to start ffmpeg: {}", e)))?;

        let stdout = process.stdout.take().ok_or_else(|| {
            FrameSourceError::Unavailable("ffmpeg decoder has no output pipe".to_string())
        })?;

        tracing::info!(
            "Opened video file {:?} ({}x{} @ {:.2} fps, {:.1}s)",
            self.path,
            info.width,
            info.height,
            info.frame_rate,
            info.duration.as_secs_f64()
        );

        self.info = Some(info);
        self.decoder = Some(Decoder { process, stdout });
        self.next_index = 0;
        self.current = None;
        self.started_at = self.clock.now();
        Ok(())
    }

    fn read_frame(&mut self) -> FrameSourceResult<Frame> {
        let due = self.due_index(self.info()?.frame_rate);

        while self.current.is_none() || self.next_index <= due {
            let frame = self.decode_next()?;
            self.current = Some(frame);
        }

        self.current.clone().ok_or(FrameSourceError::EndOfStream)
    }

    fn sample_frame(&mut self) -> FrameSourceResult<Frame> {
        let info = self.info()?;
        Ok(Frame::blank(info.width, info.height))
    }

    fn width(&self) -> u32 {
        self.info.as_ref().map_or(0, |info| info.width)
    }

    fn height(&self) -> u32 {
        self.info.as_ref().map_or(0, |info| info.height)
    }

    fn close(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            if let Err(e) = decoder.process.kill() {
                // Already exited at end of stream
                tracing::debug!("ffmpeg decoder kill: {}", e);
            }
            let _ = decoder.process.wait();
        }
        self.current = None;
    }
}

impl Drop for VideoFileSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    #[test]
    fn test_missing_file_fails_open() {
        let mut source = VideoFileSource::new("/no/such/video.mp4", Arc::new(FakeClock::new()));
        assert!(matches!(source.open(), Err(FrameSourceError::Unavailable(_))));
        assert_eq!((source.width(), source.height()), (0, 0));
    }

    #[test]
    fn test_read_before_open_fails() {
        let mut source = VideoFileSource::new("video.mp4", Arc::new(FakeClock::new()));
        assert!(matches!(source.read_frame(), Err(FrameSourceError::NotOpen)));
        assert!(matches!(source.sample_frame(), Err(FrameSourceError::NotOpen)));
    }
}
