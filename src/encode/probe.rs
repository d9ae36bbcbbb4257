//! Read media back with ffprobe
//!
//! Used to open video files as frame sources and to check what a recording
//! actually produced (frame rate, duration, frame count).

use anyhow::{bail, Context};
use serde::Deserialize;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// What ffprobe reports about the first video stream of a file
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub duration: Duration,
    /// Only filled in when frames were counted
    pub frame_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
    nb_frames: Option<String>,
    nb_read_frames: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parse ffprobe's `num/den` rate notation
fn parse_ratio(value: &str) -> Option<f64> {
    let (num, den) = value.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    (den != 0.0 && num != 0.0).then(|| num / den)
}

fn parse_seconds(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}

fn parse_probe(json: &[u8]) -> anyhow::Result<MediaInfo> {
    let output: ProbeOutput =
        serde_json::from_slice(json).context("ffprobe produced unreadable JSON")?;

    let Some(stream) = output.streams.into_iter().next() else {
        bail!("No video stream found");
    };

    let width = stream.width.context("Video stream has no width")?;
    let height = stream.height.context("Video stream has no height")?;

    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_ratio)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_ratio))
        .context("Video stream has no frame rate")?;

    // Fragmented files often carry no per-stream duration
    let duration = stream
        .duration
        .as_deref()
        .and_then(parse_seconds)
        .or_else(|| {
            output
                .format
                .as_ref()
                .and_then(|f| f.duration.as_deref())
                .and_then(parse_seconds)
        })
        .unwrap_or_default();

    let frame_count = stream
        .nb_read_frames
        .as_deref()
        .or(stream.nb_frames.as_deref())
        .and_then(|n| n.trim().parse().ok());

    Ok(MediaInfo {
        width,
        height,
        frame_rate,
        duration,
        frame_count,
    })
}

fn run_probe(ffprobe: &Path, path: &Path, count_frames: bool) -> anyhow::Result<MediaInfo> {
    let mut command = Command::new(ffprobe);
    command.args(["-v", "error", "-select_streams", "v:0"]);
    if count_frames {
        command.arg("-count_frames");
    }
    command
        .args([
            "-show_entries",
            "stream=width,height,r_frame_rate,avg_frame_rate,duration,nb_frames,nb_read_frames:format=duration",
            "-of",
            "json",
        ])
        .arg(path);

    let output = command
        .output()
        .with_context(|| format!("Failed to run {:?}", ffprobe))?;
    if !output.status.success() {
        bail!(
            "ffprobe failed on {:?}: {}",
            path,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    parse_probe(&output.stdout).with_context(|| format!("Failed to probe {:?}", path))
}

/// Probe stream geometry, rate and duration without decoding the file
pub fn probe_media(ffprobe: &Path, path: &Path) -> anyhow::Result<MediaInfo> {
    run_probe(ffprobe, path, false)
}

/// Like [`probe_media`], but decodes every frame to get an exact count
pub fn probe_media_counting_frames(ffprobe: &Path, path: &Path) -> anyhow::Result<MediaInfo> {
    run_probe(ffprobe, path, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ratio() {
        assert_eq!(parse_ratio("20/1"), Some(20.0));
        assert_eq!(parse_ratio("30000/1001").map(|r| (r * 100.0).round()), Some(2997.0));
        assert_eq!(parse_ratio("0/0"), None);
        assert_eq!(parse_ratio("abc"), None);
    }

    #[test]
    fn test_parse_probe_prefers_stream_values() {
        let json = br#"{
            "streams": [{
                "width": 300, "height": 150,
                "r_frame_rate": "20/1", "avg_frame_rate": "20/1",
                "duration": "3.000000", "nb_read_frames": "60"
            }],
            "format": {"duration": "3.050000"}
        }"#;
        let info = parse_probe(json).unwrap();
        assert_eq!((info.width, info.height), (300, 150));
        assert!((info.frame_rate - 20.0).abs() < 0.01);
        assert_eq!(info.duration, Duration::from_secs(3));
        assert_eq!(info.frame_count, Some(60));
    }

    #[test]
    fn test_parse_probe_falls_back_to_format_duration() {
        let json = br#"{
            "streams": [{"width": 64, "height": 32, "r_frame_rate": "5/1", "avg_frame_rate": "0/0"}],
            "format": {"duration": "2.000000"}
        }"#;
        let info = parse_probe(json).unwrap();
        assert!((info.frame_rate - 5.0).abs() < 0.01);
        assert_eq!(info.duration, Duration::from_secs(2));
        assert_eq!(info.frame_count, None);
    }

    #[test]
    fn test_parse_probe_without_streams_fails() {
        let err = parse_probe(br#"{"streams": []}"#).unwrap_err();
        assert!(err.to_string().contains("No video stream"));
    }
}
