//! Comparison pipeline for a single job.
//!
//! Resolve inputs, download, extract landmarks, align, compare, then hand
//! off to the artifact coordinator. Every failure comes back as a
//! [`WorkerError`] for the loop to turn into the terminal write.

use std::path::Path;
use std::sync::Arc;

use posecoach_analysis::{align, AlignmentPlan, ComparisonEngine};
use posecoach_models::{extract_key_from_locator, ComparisonJob, ComparisonResult};

use crate::artifacts::{ArtifactCoordinator, ArtifactOutcome, ArtifactRequest};
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::services::{ExtractedPose, PipelineServices};
use crate::stage::run_stage;

/// Share of padded alignment steps above which a warning is logged.
pub const PADDED_WARNING_RATIO: f64 = 0.25;

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct ProcessedJob {
    pub plan: AlignmentPlan,
    pub comparison: ComparisonResult,
    pub artifacts: ArtifactOutcome,
}

/// Storage key of a job input locator.
pub fn resolve_input(side: &str, locator: &str) -> WorkerResult<String> {
    extract_key_from_locator(locator)
        .map_err(|e| WorkerError::invalid_input(format!("{} video locator: {}", side, e)))
}

/// Run the full comparison for `job`.
pub async fn process_job(
    services: &PipelineServices,
    config: &WorkerConfig,
    job: &ComparisonJob,
) -> WorkerResult<ProcessedJob> {
    let logger = JobLogger::new(job);
    logger.started();

    let reference_key = resolve_input("reference", &job.ref_path)?;
    let execution_key = resolve_input("execution", &job.exec_path)?;

    for (side, key) in [("reference", &reference_key), ("execution", &execution_key)] {
        let exists = run_stage("input_check", config.stage_timeout, services.storage.exists(key)).await?;
        if !exists {
            return Err(WorkerError::invalid_input(format!(
                "{} video not found in storage: {}",
                side, key
            )));
        }
    }

    // removed on drop, whatever the outcome
    tokio::fs::create_dir_all(&config.work_dir).await?;
    let work_dir = tempfile::Builder::new()
        .prefix(&format!("job-{}-", job.id))
        .tempdir_in(&config.work_dir)?;

    let reference_path = work_dir.path().join("reference.mp4");
    let execution_path = work_dir.path().join("execution.mp4");
    download(services, config, &reference_key, &reference_path).await?;
    download(services, config, &execution_key, &execution_path).await?;
    logger.stage("download", "inputs downloaded");

    let reference = extract(services, config, &reference_path).await?;
    let execution = extract(services, config, &execution_path).await?;
    logger.stage(
        "pose_extraction",
        format_args!(
            "landmarks extracted (reference: {} frames, execution: {} frames)",
            reference.sequence.len(),
            execution.sequence.len()
        ),
    );

    let plan = align(reference.sequence.len(), execution.sequence.len())?;
    if plan.padded_ratio() > PADDED_WARNING_RATIO {
        logger.degraded(
            "alignment",
            format_args!("{} of {} alignment steps hold a clamped frame", plan.padded_steps(), plan.len()),
        );
    }

    let comparison =
        ComparisonEngine::new(config.comparison.clone()).compare(&reference.sequence, &execution.sequence, &plan)?;
    logger.stage(
        "comparison",
        format_args!(
            "overall average error {:.2} over {} samples",
            comparison.overall_average_error, comparison.sample_count
        ),
    );

    let fps = reference.fps.unwrap_or(config.output_fps);
    let request = ArtifactRequest {
        job_id: job.id.as_str(),
        student: &job.student,
        reference: Arc::new(reference),
        execution: Arc::new(execution),
        plan: &plan,
        comparison: &comparison,
        fps,
    };
    let artifacts = ArtifactCoordinator::new(services, config.tile, config.stage_timeout)
        .generate(&request, &logger)
        .await?;

    logger.finished(if artifacts.is_degraded() {
        "report ready, comparison video unavailable"
    } else {
        "video and report ready"
    });

    Ok(ProcessedJob {
        plan,
        comparison,
        artifacts,
    })
}

async fn download(services: &PipelineServices, config: &WorkerConfig, key: &str, dest: &Path) -> WorkerResult<()> {
    run_stage("download", config.stage_timeout, services.storage.download_to(key, dest)).await?;
    Ok(())
}

async fn extract(services: &PipelineServices, config: &WorkerConfig, path: &Path) -> WorkerResult<ExtractedPose> {
    let pose = run_stage(
        "pose_extraction",
        config.stage_timeout,
        services.poses.extract(path, config.max_frames),
    )
    .await?;

    if !pose.is_empty() && pose.frames.len() != pose.sequence.len() {
        return Err(WorkerError::internal(format!(
            "extractor returned {} frames for {} landmark frames",
            pose.frames.len(),
            pose.sequence.len()
        )));
    }
    Ok(pose)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_input() {
        assert_eq!(
            resolve_input("reference", "https://cdn.example.com/uploads/ref.mp4?sig=1").unwrap(),
            "ref.mp4"
        );
        assert_eq!(resolve_input("reference", "ref.mp4").unwrap(), "ref.mp4");

        let err = resolve_input("execution", "  ").unwrap_err();
        assert!(matches!(err, WorkerError::InvalidInput(ref m) if m.starts_with("execution video locator")));
    }
}
