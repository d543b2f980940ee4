//! Collaborators of the comparison pipeline.
//!
//! Each external system the worker talks to sits behind a trait so the
//! pipeline can be driven with in-memory fakes. Production adapters live
//! in [`crate::adapters`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use image::RgbImage;
use posecoach_models::{ComparisonReport, Joint, LandmarkFrame, PoseSequence};

use crate::error::WorkerResult;

/// Decoded frames of a video and the landmarks detected on them.
///
/// `frames[i]` is the picture `sequence[i]` was detected on.
#[derive(Debug, Clone, Default)]
pub struct ExtractedPose {
    pub frames: Vec<RgbImage>,
    pub sequence: PoseSequence,
    /// Source frame rate, when known
    pub fps: Option<f64>,
}

impl ExtractedPose {
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

#[async_trait]
pub trait PoseExtractor: Send + Sync {
    /// Landmarks and frames for up to `max_frames` frames of a local video.
    async fn extract(&self, video_path: &Path, max_frames: u32) -> WorkerResult<ExtractedPose>;
}

pub trait FrameRenderer: Send + Sync {
    /// Draw the skeleton of `landmarks` over `frame`.
    fn annotate(&self, frame: &RgbImage, landmarks: &LandmarkFrame) -> RgbImage;
}

#[async_trait]
pub trait VideoEncoder: Send + Sync {
    /// Encode equally sized frames to MP4 bytes.
    async fn encode(&self, frames: &[RgbImage], fps: f64, width: u32, height: u32) -> WorkerResult<Vec<u8>>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &str) -> WorkerResult<Vec<u8>>;

    /// Store an object and return the locator persisted on the job.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> WorkerResult<String>;

    async fn exists(&self, key: &str) -> WorkerResult<bool>;

    /// Download an object to a local file.
    async fn download_to(&self, key: &str, dest: &Path) -> WorkerResult<u64> {
        let data = self.get(key).await?;
        let len = data.len() as u64;
        tokio::fs::write(dest, data).await?;
        Ok(len)
    }
}

#[async_trait]
pub trait FeedbackGenerator: Send + Sync {
    async fn generate(&self, per_joint_average_error: &BTreeMap<Joint, f64>) -> WorkerResult<String>;
}

pub trait ReportRenderer: Send + Sync {
    fn render(&self, report: &ComparisonReport) -> WorkerResult<Vec<u8>>;
}

/// Service handles injected into the worker loop.
#[derive(Clone)]
pub struct PipelineServices {
    pub poses: Arc<dyn PoseExtractor>,
    pub renderer: Arc<dyn FrameRenderer>,
    pub encoder: Arc<dyn VideoEncoder>,
    pub storage: Arc<dyn ObjectStore>,
    pub feedback: Arc<dyn FeedbackGenerator>,
    pub reports: Arc<dyn ReportRenderer>,
}
