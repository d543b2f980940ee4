//! Artifact generation: comparison video, feedback and PDF report.
//!
//! The video is best effort. Any failure while composing, encoding or
//! uploading it degrades the job to a report with a "video unavailable"
//! placeholder. Feedback and report failures fail the job.

use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;
use posecoach_analysis::AlignmentPlan;
use posecoach_media::{side_by_side, TileSize};
use posecoach_models::{ComparisonReport, ComparisonResult, JobOutcome, VideoLink};
use posecoach_storage::{comparison_video_key, report_key, REPORT_CONTENT_TYPE, VIDEO_CONTENT_TYPE};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::services::{ExtractedPose, FrameRenderer, PipelineServices};
use crate::stage::run_stage;

/// Locators and text produced for a job.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactOutcome {
    /// Absent when the video stage degraded
    pub video_url: Option<String>,
    pub report_url: String,
    pub feedback: String,
    /// Why the video is missing
    pub video_failure: Option<String>,
}

impl ArtifactOutcome {
    pub fn is_degraded(&self) -> bool {
        self.video_failure.is_some()
    }

    /// Fields persisted on the `done` transition.
    pub fn into_job_outcome(self) -> JobOutcome {
        JobOutcome {
            video_url: self.video_url,
            report_url: self.report_url,
            feedback: self.feedback,
        }
    }
}

/// Inputs of one artifact run.
pub struct ArtifactRequest<'a> {
    pub job_id: &'a str,
    pub student: &'a str,
    pub reference: Arc<ExtractedPose>,
    pub execution: Arc<ExtractedPose>,
    /// The plan the comparison was computed on
    pub plan: &'a AlignmentPlan,
    pub comparison: &'a ComparisonResult,
    pub fps: f64,
}

pub struct ArtifactCoordinator<'a> {
    services: &'a PipelineServices,
    tile: TileSize,
    stage_timeout: Duration,
}

impl<'a> ArtifactCoordinator<'a> {
    pub fn new(services: &'a PipelineServices, tile: TileSize, stage_timeout: Duration) -> Self {
        Self {
            services,
            tile,
            stage_timeout,
        }
    }

    pub async fn generate(&self, request: &ArtifactRequest<'_>, logger: &JobLogger) -> WorkerResult<ArtifactOutcome> {
        let (video, video_failure) = match self.produce_video(request).await {
            Ok(url) => {
                logger.stage("video", "comparison video uploaded");
                (VideoLink::Available { url }, None)
            }
            Err(e) => {
                logger.degraded("video", format_args!("comparison video unavailable: {}", e));
                metrics::record_degraded_video();
                (VideoLink::Unavailable, Some(e.to_string()))
            }
        };

        let feedback = run_stage(
            "feedback",
            self.stage_timeout,
            self.services
                .feedback
                .generate(&request.comparison.per_joint_average_error),
        )
        .await?;

        let report = ComparisonReport {
            student: request.student.to_string(),
            overall_average_error: request.comparison.overall_average_error,
            insights: request.comparison.ranked_insights.clone(),
            feedback: (!feedback.trim().is_empty()).then(|| feedback.clone()),
            video: video.clone(),
        };

        let reports = self.services.reports.clone();
        let pdf = run_stage("report_render", self.stage_timeout, async move {
            tokio::task::spawn_blocking(move || reports.render(&report))
                .await
                .map_err(|e| WorkerError::internal(format!("report task failed: {}", e)))?
        })
        .await?;

        let report_url = run_stage(
            "report_upload",
            self.stage_timeout,
            self.services
                .storage
                .put(&report_key(request.student, request.job_id), pdf, REPORT_CONTENT_TYPE),
        )
        .await?;
        logger.stage("report_upload", "report uploaded");

        Ok(ArtifactOutcome {
            video_url: video.url().map(str::to_string),
            report_url,
            feedback,
            video_failure,
        })
    }

    async fn produce_video(&self, request: &ArtifactRequest<'_>) -> WorkerResult<String> {
        let frames = self.compose_frames(request).await?;
        let (width, height) = self.tile.combined();

        let bytes = run_stage(
            "video_encode",
            self.stage_timeout,
            self.services.encoder.encode(&frames, request.fps, width, height),
        )
        .await?;
        if bytes.is_empty() {
            return Err(WorkerError::video_unavailable("encoder produced no output"));
        }

        run_stage(
            "video_upload",
            self.stage_timeout,
            self.services
                .storage
                .put(
                    &comparison_video_key(request.student, request.job_id),
                    bytes,
                    VIDEO_CONTENT_TYPE,
                ),
        )
        .await
    }

    /// Annotate and tile frames on the blocking pool.
    async fn compose_frames(&self, request: &ArtifactRequest<'_>) -> WorkerResult<Vec<RgbImage>> {
        let renderer = self.services.renderer.clone();
        let reference = request.reference.clone();
        let execution = request.execution.clone();
        let plan = request.plan.clone();
        let tile = self.tile;

        run_stage("video_compose", self.stage_timeout, async move {
            tokio::task::spawn_blocking(move || {
                compose(renderer.as_ref(), &reference, &execution, &plan, tile)
            })
            .await
            .map_err(|e| WorkerError::internal(format!("compose task failed: {}", e)))?
        })
        .await
    }
}

/// One annotated side-by-side frame per plan step.
fn compose(
    renderer: &dyn FrameRenderer,
    reference: &ExtractedPose,
    execution: &ExtractedPose,
    plan: &AlignmentPlan,
    tile: TileSize,
) -> WorkerResult<Vec<RgbImage>> {
    plan.iter()
        .enumerate()
        .map(|(step, pair)| {
            let left = annotated(renderer, reference, pair.reference_index);
            let right = annotated(renderer, execution, pair.execution_index);
            match (left, right) {
                (Some(left), Some(right)) => Ok(side_by_side(&left, &right, tile)),
                _ => Err(WorkerError::video_unavailable(format!(
                    "no frame for alignment step {}",
                    step
                ))),
            }
        })
        .collect()
}

fn annotated(renderer: &dyn FrameRenderer, pose: &ExtractedPose, index: usize) -> Option<RgbImage> {
    let frame = pose.frames.get(index)?;
    let landmarks = pose.sequence.get(index)?;
    Some(renderer.annotate(frame, landmarks))
}
