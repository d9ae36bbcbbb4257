//! FFmpeg-backed writer
//!
//! Raw frames are piped into an `ffmpeg` child process that encodes them and
//! writes a fragmented MP4/MOV. With `frag_keyframe` + `empty_moov` each
//! fragment carries its own metadata, so a file cut short by a kill is still
//! decodable up to the last complete fragment.

use crate::capture::source::Frame;
use crate::encode::{
    ContainerFormat, MediaCodec, MediaError, MediaResult, MediaWriter, VideoStreamConfig,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, Command, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;

/// Trailing stderr lines kept for error reports
const STDERR_TAIL_LINES: usize = 20;

/// How ffmpeg is invoked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FfmpegSettings {
    /// ffmpeg executable
    pub binary: PathBuf,
    /// ffprobe executable, used to read media back
    pub probe_binary: PathBuf,
    pub video_codec: String,
    pub preset: String,
    pub tune: Option<String>,
    /// Quality (lower = better, 23 is the x264 default)
    pub crf: u8,
    /// Pixel format of the encoded stream
    pub output_pixel_format: String,
}

impl Default for FfmpegSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
            probe_binary: PathBuf::from("ffprobe"),
            video_codec: "libx264".to_string(),
            preset: "ultrafast".to_string(),
            tune: Some("zerolatency".to_string()),
            crf: 23,
            output_pixel_format: "yuv420p".to_string(),
        }
    }
}

impl FfmpegSettings {
    /// Check that the ffmpeg binary can be executed
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

/// Codec that spawns one ffmpeg process per writer
#[derive(Debug, Clone, Default)]
pub struct FfmpegCodec {
    settings: FfmpegSettings,
}

impl FfmpegCodec {
    pub fn new(settings: FfmpegSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &FfmpegSettings {
        &self.settings
    }
}

impl MediaCodec for FfmpegCodec {
    fn create_writer(
        &self,
        destination: &Path,
        container: ContainerFormat,
        fragment_duration: Duration,
    ) -> MediaResult<Box<dyn MediaWriter>> {
        if fragment_duration.is_zero() {
            return Err(MediaError::InvalidConfiguration(
                "Fragment duration must be positive".to_string(),
            ));
        }

        Ok(Box::new(FfmpegWriter {
            settings: self.settings.clone(),
            destination: destination.to_path_buf(),
            container,
            fragment_duration,
            stream: None,
            process: None,
            stderr_tail: None,
            frames_written: 0,
        }))
    }
}

struct FfmpegWriter {
    settings: FfmpegSettings,
    destination: PathBuf,
    container: ContainerFormat,
    fragment_duration: Duration,
    stream: Option<VideoStreamConfig>,
    process: Option<Child>,
    /// Drains ffmpeg's stderr so the pipe never fills; yields the last lines
    stderr_tail: Option<JoinHandle<String>>,
    frames_written: u64,
}

/// Build the ffmpeg command line for a fragmented recording
pub fn build_args(
    settings: &FfmpegSettings,
    stream: &VideoStreamConfig,
    container: ContainerFormat,
    fragment_duration: Duration,
    destination: &Path,
) -> Vec<String> {
    let fragment_secs = fragment_duration.as_secs_f64();
    let mut args = vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        // Input: raw frames from stdin, spaced by the output time base
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pixel_format".to_string(),
        stream.pixel_format.ffmpeg_name().to_string(),
        "-video_size".to_string(),
        format!("{}x{}", stream.width, stream.height),
        "-framerate".to_string(),
        stream.time_base.ffmpeg_frame_rate(),
        "-i".to_string(),
        "-".to_string(),
        "-c:v".to_string(),
        settings.video_codec.clone(),
        "-preset".to_string(),
        settings.preset.clone(),
    ];

    if let Some(tune) = &settings.tune {
        args.extend(["-tune".to_string(), tune.clone()]);
    }

    args.extend([
        "-pix_fmt".to_string(),
        settings.output_pixel_format.clone(),
        "-crf".to_string(),
        settings.crf.to_string(),
        // A key frame at every fragment boundary so fragments can close on time
        "-force_key_frames".to_string(),
        format!("expr:gte(t,n_forced*{})", fragment_secs),
        "-f".to_string(),
        container.muxer_name().to_string(),
        "-movflags".to_string(),
        "+frag_keyframe+empty_moov+default_base_moof".to_string(),
        "-frag_duration".to_string(),
        fragment_duration.as_micros().to_string(),
        // Completed fragments reach the disk immediately, not when the buffer fills
        "-flush_packets".to_string(),
        "1".to_string(),
        destination.to_string_lossy().to_string(),
    ]);

    args
}

/// Log ffmpeg diagnostics as they arrive and keep the tail for error reports
fn drain_stderr(stderr: ChildStderr) -> std::io::Result<JoinHandle<String>> {
    std::thread::Builder::new()
        .name("ffmpeg-stderr".to_string())
        .spawn(move || {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                tracing::debug!("ffmpeg: {}", line);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Vec::from(tail).join("\n")
        })
}

impl FfmpegWriter {
    fn stdin(&mut self) -> MediaResult<&mut std::process::ChildStdin> {
        self.process
            .as_mut()
            .and_then(|process| process.stdin.as_mut())
            .ok_or(MediaError::NotOpen)
    }

    fn stderr_output(&mut self) -> String {
        self.stderr_tail
            .take()
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default()
    }

    /// Close stdin and wait for ffmpeg to write out everything it holds
    fn finish(&mut self) -> MediaResult<()> {
        let mut process = self.process.take().ok_or(MediaError::NotOpen)?;

        // EOF makes ffmpeg drain the encoder and write the last fragment
        drop(process.stdin.take());
        let status = process.wait()?;
        let stderr = self.stderr_output();
        if !status.success() {
            tracing::warn!("FFmpeg exited with status {}: {}", status, stderr);
            return Err(MediaError::Ffmpeg(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }

        tracing::info!(
            "FFmpeg finished: {} frames written to {:?}",
            self.frames_written,
            self.destination
        );
        Ok(())
    }
}

impl MediaWriter for FfmpegWriter {
    fn configure_video_stream(&mut self, config: VideoStreamConfig) -> MediaResult<()> {
        if self.process.is_some() {
            return Err(MediaError::InvalidConfiguration(
                "Stream cannot change after open".to_string(),
            ));
        }
        // yuv420p needs even dimensions
        if config.width == 0 || config.height == 0 || config.width % 2 != 0 || config.height % 2 != 0 {
            return Err(MediaError::InvalidConfiguration(format!(
                "Video size {}x{} must be even and non-zero",
                config.width, config.height
            )));
        }
        self.stream = Some(config);
        Ok(())
    }

    fn open(&mut self) -> MediaResult<()> {
        let stream = self.stream.ok_or_else(|| {
            MediaError::InvalidConfiguration("Video stream not configured".to_string())
        })?;

        if let Some(parent) = self.destination.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let args = build_args(
            &self.settings,
            &stream,
            self.container,
            self.fragment_duration,
            &self.destination,
        );

        let mut process = Command::new(&self.settings.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MediaError::Ffmpeg(format!("Failed to start ffmpeg: {}", e)))?;

        if let Some(stderr) = process.stderr.take() {
            match drain_stderr(stderr) {
                Ok(reader) => self.stderr_tail = Some(reader),
                Err(e) => {
                    let _ = process.kill();
                    let _ = process.wait();
                    return Err(e.into());
                }
            }
        }

        if let Some(status) = process.try_wait()? {
            let stderr = self.stderr_output();
            return Err(MediaError::Ffmpeg(format!(
                "ffmpeg exited immediately with status {}: {}",
                status,
                stderr.trim()
            )));
        }

        tracing::info!(
            "Started FFmpeg encoder: {}x{} @ {} fps, {}s fragments to {:?}",
            stream.width,
            stream.height,
            stream.time_base.ffmpeg_frame_rate(),
            self.fragment_duration.as_secs_f64(),
            self.destination
        );

        self.process = Some(process);
        self.frames_written = 0;
        Ok(())
    }

    fn encode_and_write(&mut self, frame: &Frame, index: u64) -> MediaResult<()> {
        let stream = self.stream.ok_or(MediaError::NotOpen)?;
        if index != self.frames_written {
            return Err(MediaError::OutOfOrder {
                expected: self.frames_written,
                got: index,
            });
        }
        stream.check_frame(frame)?;

        self.stdin()?.write_all(frame.as_bytes()).map_err(|e| {
            MediaError::Ffmpeg(format!("Failed to pipe frame {} to ffmpeg: {}", index, e))
        })?;
        self.frames_written += 1;
        Ok(())
    }

    fn flush(&mut self) -> MediaResult<()> {
        tracing::info!("Flushing remaining frames");
        self.finish()
    }

    fn close(&mut self) -> MediaResult<()> {
        if self.process.is_none() {
            // Flushed already; its outcome was reported there
            tracing::debug!("FFmpeg writer for {:?} already finalized", self.destination);
            return Ok(());
        }
        self.finish()
    }
}

impl Drop for FfmpegWriter {
    fn drop(&mut self) {
        if let Some(mut process) = self.process.take() {
            tracing::warn!("FFmpeg writer dropped while open, finalizing {:?}", self.destination);
            drop(process.stdin.take());
            let _ = process.wait();
            self.stderr_output();
        }
    }
}
