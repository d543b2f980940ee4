//! Raw frame decoding.
//!
//! Frames are decoded with FFmpeg straight to RGB24 at the tile size the
//! comparison video uses, so landmark coordinates (normalized to the source
//! frame) map directly onto them.

use image::RgbImage;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::command::require;
use crate::error::{MediaError, MediaResult, Tool};

/// Decode up to `max_frames` frames of `path`, scaled to `width`x`height`.
pub async fn decode_frames(
    path: impl AsRef<Path>,
    width: u32,
    height: u32,
    max_frames: usize,
) -> MediaResult<Vec<RgbImage>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(MediaError::MissingFile(path.to_path_buf()));
    }
    require(Tool::Ffmpeg)?;

    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error", "-i"])
        .arg(path)
        .args([
            "-vf",
            &format!("scale={}:{}", width, height),
            "-frames:v",
            &max_frames.to_string(),
            "-pix_fmt",
            "rgb24",
            "-f",
            "rawvideo",
            "-",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::ffmpeg(
            "frame decoding failed",
            Some(String::from_utf8_lossy(&output.stderr).to_string()),
            output.status.code(),
        ));
    }

    let frames = split_raw_frames(output.stdout, width, height)?;
    debug!(
        path = %path.display(),
        frames = frames.len(),
        "Decoded {}x{} frames",
        width,
        height
    );
    Ok(frames)
}

/// Split a packed RGB24 buffer into frames. A trailing partial frame is dropped.
pub fn split_raw_frames(buffer: Vec<u8>, width: u32, height: u32) -> MediaResult<Vec<RgbImage>> {
    let frame_len = (width as usize) * (height as usize) * 3;
    if frame_len == 0 {
        return Err(MediaError::internal("Frame size must be non-zero"));
    }

    buffer
        .chunks_exact(frame_len)
        .map(|chunk| {
            RgbImage::from_raw(width, height, chunk.to_vec())
                .ok_or_else(|| MediaError::internal("Failed to create image buffer"))
        })
        .collect()
}

/// Pick the decoded frames at `indices`, in order.
pub fn select_frames(frames: &[RgbImage], indices: &[u32]) -> MediaResult<Vec<RgbImage>> {
    indices
        .iter()
        .map(|&i| {
            frames.get(i as usize).cloned().ok_or_else(|| {
                MediaError::InvalidVideo(format!(
                    "frame {} requested but only {} frames were decoded",
                    i,
                    frames.len()
                ))
            })
        })
        .collect()
}
