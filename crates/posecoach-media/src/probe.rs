//! Stream metadata via FFprobe.

use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::require;
use crate::error::{MediaError, MediaResult, Tool};

/// Frame rate used when a video's rate cannot be determined.
pub const DEFAULT_FPS: f64 = 30.0;

const SHOW_ENTRIES: &str = "stream=codec_name,width,height,avg_frame_rate,r_frame_rate,nb_frames:format=duration";

/// First video stream of a file.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Seconds, 0 when the container does not say
    pub duration: f64,
    pub frame_count: Option<u64>,
    pub codec: String,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeReport {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: ProbeFormat,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
}

/// Read the first video stream's metadata.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(MediaError::MissingFile(path.to_path_buf()));
    }
    require(Tool::Ffprobe)?;

    let output = Command::new(Tool::Ffprobe.binary())
        .args(["-v", "error", "-select_streams", "v:0", "-show_entries", SHOW_ENTRIES, "-of", "json"])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::ToolFailed {
            tool: Tool::Ffprobe,
            message: "could not read stream metadata".to_string(),
            stderr: Some(String::from_utf8_lossy(&output.stderr).into_owned()),
            exit_code: output.status.code(),
        });
    }

    parse_report(&output.stdout)
}

fn parse_report(json: &[u8]) -> MediaResult<VideoInfo> {
    let report: ProbeReport = serde_json::from_slice(json)?;
    let stream = report
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| MediaError::InvalidVideo("no video stream".to_string()))?;

    // avg_frame_rate is 0/0 for some streams; fall back to the base rate
    let fps = [stream.avg_frame_rate.as_deref(), stream.r_frame_rate.as_deref()]
        .into_iter()
        .flatten()
        .find_map(frame_rate)
        .unwrap_or(DEFAULT_FPS);

    Ok(VideoInfo {
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
        fps,
        duration: report.format.duration.and_then(|d| d.parse().ok()).unwrap_or(0.0),
        frame_count: stream.nb_frames.and_then(|n| n.parse().ok()),
        codec: stream.codec_name.unwrap_or_default(),
    })
}

/// `"30000/1001"` or `"25"` as frames per second; non-positive rates are `None`.
fn frame_rate(raw: &str) -> Option<f64> {
    let fps = match raw.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num.parse::<f64>().ok()? / den
        }
        None => raw.parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rate() {
        assert_eq!(frame_rate("25/1"), Some(25.0));
        assert!((frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(frame_rate("24"), Some(24.0));
        assert_eq!(frame_rate("0/0"), None);
        assert_eq!(frame_rate("0/1"), None);
        assert_eq!(frame_rate("n/a"), None);
    }

    #[test]
    fn test_parse_report_falls_back_to_base_rate() {
        let json = br#"{
            "programs": [],
            "streams": [
                {"codec_name": "h264", "width": 1280, "height": 720,
                 "avg_frame_rate": "0/0", "r_frame_rate": "25/1", "nb_frames": "100"}
            ],
            "format": {"duration": "4.000000"}
        }"#;

        let info = parse_report(json).unwrap();
        assert_eq!((info.width, info.height), (1280, 720));
        assert_eq!(info.fps, 25.0);
        assert_eq!(info.frame_count, Some(100));
        assert_eq!(info.duration, 4.0);
        assert_eq!(info.codec, "h264");
    }

    #[test]
    fn test_audio_only_file() {
        let json = br#"{"streams": [], "format": {"duration": "3.0"}}"#;
        assert!(matches!(parse_report(json), Err(MediaError::InvalidVideo(_))));
    }

    #[test]
    fn test_unknown_rate_uses_default() {
        let json = br#"{"streams": [{"codec_name": "vp9"}]}"#;
        assert_eq!(parse_report(json).unwrap().fps, DEFAULT_FPS);
    }
}
