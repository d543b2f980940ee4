//! MP4 encoding of in-memory frames.

use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// H.264 settings for the comparison video.
#[derive(Debug, Clone)]
pub struct EncoderSettings {
    pub codec: String,
    pub preset: String,
    pub crf: u8,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            crf: 23,
        }
    }
}

/// Pipes RGB frames through FFmpeg into an MP4 file and returns its bytes.
#[derive(Debug, Clone)]
pub struct Mp4Encoder {
    work_dir: PathBuf,
    settings: EncoderSettings,
    runner: FfmpegRunner,
}

impl Mp4Encoder {
    pub fn new(work_dir: impl AsRef<Path>) -> Self {
        Self {
            work_dir: work_dir.as_ref().to_path_buf(),
            settings: EncoderSettings::default(),
            runner: FfmpegRunner::new(),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.runner = self.runner.with_timeout(secs);
        self
    }

    /// Encode `frames` at `fps`. Every frame must be `width`x`height`.
    pub async fn encode(&self, frames: &[RgbImage], fps: f64, width: u32, height: u32) -> MediaResult<Vec<u8>> {
        if frames.is_empty() {
            return Ok(Vec::new());
        }
        for frame in frames {
            let (w, h) = frame.dimensions();
            if (w, h) != (width, height) {
                return Err(MediaError::FrameSize {
                    width,
                    height,
                    actual_width: w,
                    actual_height: h,
                });
            }
        }

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let output = tempfile::Builder::new()
            .prefix("comparison-")
            .suffix(".mp4")
            .tempfile_in(&self.work_dir)?;

        let cmd = FfmpegCommand::raw_rgb_input(output.path(), width, height, fps)
            .video_codec(self.settings.codec.clone())
            .preset(self.settings.preset.clone())
            .crf(self.settings.crf)
            .pixel_format("yuv420p")
            .faststart();

        let total = frames.len() as u64;
        let chunks: Vec<&[u8]> = frames.iter().map(|f| f.as_raw().as_slice()).collect();
        self.runner
            .run_with_stdin(&cmd, &chunks, move |progress| {
                debug!(
                    frame = progress.frame,
                    total,
                    "Encoding {:.0}%",
                    progress.frame_percentage(total)
                );
            })
            .await?;

        let bytes = tokio::fs::read(output.path()).await?;
        info!(frames = total, bytes = bytes.len(), fps, "Encoded comparison video");
        Ok(bytes)
    }
}
