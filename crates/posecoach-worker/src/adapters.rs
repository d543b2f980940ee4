//! Production implementations of the pipeline collaborators.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use image::RgbImage;
use posecoach_media::{decode_frames, probe_video, select_frames, Mp4Encoder, PdfReportRenderer, TileSize};
use posecoach_ml_client::PoseClient;
use posecoach_models::{ComparisonReport, LandmarkFrame, PoseSequence};
use posecoach_storage::R2Client;
use tracing::{debug, warn};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::feedback::GeminiFeedback;
use crate::services::{
    ExtractedPose, FrameRenderer, ObjectStore, PipelineServices, PoseExtractor, ReportRenderer, VideoEncoder,
};

/// Landmarks from the pose service, frames from FFmpeg.
#[derive(Clone)]
pub struct PoseServiceExtractor {
    client: PoseClient,
    tile: TileSize,
}

impl PoseServiceExtractor {
    /// Frames are decoded at `tile` size, ready for composition.
    pub fn new(client: PoseClient, tile: TileSize) -> Self {
        Self { client, tile }
    }
}

#[async_trait]
impl PoseExtractor for PoseServiceExtractor {
    async fn extract(&self, video_path: &Path, max_frames: u32) -> WorkerResult<ExtractedPose> {
        let extraction = self.client.extract(video_path, max_frames).await?;
        if extraction.sequence.is_empty() {
            return Ok(ExtractedPose {
                fps: extraction.fps,
                ..ExtractedPose::default()
            });
        }

        let decoded = decode_frames(video_path, self.tile.width, self.tile.height, max_frames as usize).await?;

        // landmarks the decoder has no picture for cannot be drawn or compared
        let decoded_len = decoded.len();
        let (kept, dropped): (Vec<LandmarkFrame>, Vec<LandmarkFrame>) = extraction
            .sequence
            .iter()
            .cloned()
            .partition(|f| (f.frame_index as usize) < decoded_len);
        if !dropped.is_empty() {
            warn!(
                path = %video_path.display(),
                dropped = dropped.len(),
                decoded = decoded_len,
                "Dropping landmark frames beyond the decoded frames"
            );
        }

        let sequence = PoseSequence::new(kept);
        let frames = select_frames(&decoded, &sequence.frame_indices())?;

        let fps = match extraction.fps {
            Some(fps) => Some(fps),
            None => match probe_video(video_path).await {
                Ok(info) => Some(info.fps),
                Err(e) => {
                    debug!(path = %video_path.display(), error = %e, "Frame rate probe failed");
                    None
                }
            },
        };

        Ok(ExtractedPose { frames, sequence, fps })
    }
}

/// Skeleton overlay: green joints, red connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkeletonRenderer;

impl FrameRenderer for SkeletonRenderer {
    fn annotate(&self, frame: &RgbImage, landmarks: &LandmarkFrame) -> RgbImage {
        posecoach_media::annotate(frame, landmarks)
    }
}

/// H.264 encoding through FFmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegVideoEncoder {
    encoder: Mp4Encoder,
}

impl FfmpegVideoEncoder {
    pub fn new(encoder: Mp4Encoder) -> Self {
        Self { encoder }
    }
}

#[async_trait]
impl VideoEncoder for FfmpegVideoEncoder {
    async fn encode(&self, frames: &[RgbImage], fps: f64, width: u32, height: u32) -> WorkerResult<Vec<u8>> {
        Ok(self.encoder.encode(frames, fps, width, height).await?)
    }
}

/// Cloudflare R2 object storage.
#[derive(Clone)]
pub struct R2ObjectStore {
    client: R2Client,
}

impl R2ObjectStore {
    pub fn new(client: R2Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for R2ObjectStore {
    async fn get(&self, key: &str) -> WorkerResult<Vec<u8>> {
        Ok(self.client.download_bytes(key).await?)
    }

    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> WorkerResult<String> {
        Ok(self.client.put_artifact(key, data, content_type).await?)
    }

    async fn exists(&self, key: &str) -> WorkerResult<bool> {
        Ok(self.client.exists(key).await?)
    }

    async fn download_to(&self, key: &str, dest: &Path) -> WorkerResult<u64> {
        Ok(self.client.download_file(key, dest).await?)
    }
}

/// PDF reports via printpdf.
#[derive(Debug, Clone, Default)]
pub struct PdfReports {
    renderer: PdfReportRenderer,
}

impl ReportRenderer for PdfReports {
    fn render(&self, report: &ComparisonReport) -> WorkerResult<Vec<u8>> {
        Ok(self.renderer.render(report)?)
    }
}

/// Build the production services from environment configuration.
pub async fn production_services(config: &WorkerConfig) -> WorkerResult<PipelineServices> {
    let pose_client = PoseClient::from_env()?;
    let storage = R2Client::from_env()?;
    let feedback = GeminiFeedback::from_env()?;
    let encoder = Mp4Encoder::new(&config.work_dir).with_timeout(config.stage_timeout.as_secs());

    Ok(PipelineServices {
        poses: Arc::new(PoseServiceExtractor::new(pose_client, config.tile)),
        renderer: Arc::new(SkeletonRenderer),
        encoder: Arc::new(FfmpegVideoEncoder::new(encoder)),
        storage: Arc::new(R2ObjectStore::new(storage)),
        feedback: Arc::new(feedback),
        reports: Arc::new(PdfReports::default()),
    })
}
