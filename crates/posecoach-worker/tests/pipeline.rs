mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use image::RgbImage;
use posecoach_models::{ComparisonJob, JobId, LandmarkFrame, VideoLink};
use posecoach_worker::{process_job, ErrorKind, FrameRenderer, WorkerError};

fn job() -> ComparisonJob {
    ComparisonJob::new("Ana Souza", "user-1", "https://cdn.test/uploads/ref.mp4", "exec.mp4")
        .with_id(JobId::from_string("job-1"))
}

/// Blocks the calling thread on every frame.
struct SlowRenderer(Duration);

impl FrameRenderer for SlowRenderer {
    fn annotate(&self, frame: &RgbImage, _landmarks: &LandmarkFrame) -> RgbImage {
        std::thread::sleep(self.0);
        frame.clone()
    }
}

#[tokio::test]
async fn test_unequal_lengths_clamp_the_shorter_execution() {
    let work = tempfile::tempdir().unwrap();
    // the first six execution frames match the reference exactly
    let h = harness(
        FakePoses::new(pose(10, 0.01), pose(6, 0.01)),
        FakeEncoder::new(b"mp4"),
        FakeStore::with_inputs(),
        FakeFeedback::ok(),
    );

    let processed = process_job(&h.services, &config(work.path()), &job()).await.unwrap();

    assert_eq!(processed.plan.len(), 10);
    for step in 0..6 {
        let error = processed.comparison.step_average_error[step].unwrap();
        assert!(error.abs() < 1e-9, "step {} error {}", step, error);
    }
    for step in 6..10 {
        let pair = processed.plan.get(step).unwrap();
        assert_eq!(pair.reference_index, step);
        assert_eq!(pair.execution_index, 5);
        assert!(processed.comparison.step_average_error[step].unwrap() > 0.0);
    }

    // one combined frame per step, at the reference frame rate
    let calls = h.encoder.calls.lock().unwrap().clone();
    assert_eq!(calls, vec![(10, 25.0, 16, 4)]);
}

#[tokio::test]
async fn test_success_uploads_video_and_report() {
    let work = tempfile::tempdir().unwrap();
    let h = harness(
        FakePoses::new(pose(4, 0.0), pose(4, 0.02)),
        FakeEncoder::new(b"mp4"),
        FakeStore::with_inputs(),
        FakeFeedback::ok(),
    );

    let processed = process_job(&h.services, &config(work.path()), &job()).await.unwrap();
    let artifacts = processed.artifacts;

    assert_eq!(
        artifacts.video_url.as_deref(),
        Some("https://cdn.test/comparisons/ana_souza_job-1_comparison.mp4")
    );
    assert_eq!(artifacts.report_url, "https://cdn.test/reports/ana_souza_job-1_report.pdf");
    assert_eq!(artifacts.feedback, "Focus on 33 joints.");
    assert!(!artifacts.is_degraded());

    let rendered = h.reports.rendered.lock().unwrap().clone();
    assert_eq!(rendered.len(), 1);
    assert_eq!(rendered[0].student, "Ana Souza");
    assert_eq!(rendered[0].video.url(), artifacts.video_url.as_deref());
    assert!(!rendered[0].insights.is_empty());

    // work directories are cleaned up
    assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_empty_sequence_fails_without_storage_writes() {
    let work = tempfile::tempdir().unwrap();
    let h = harness(
        FakePoses::new(pose(8, 0.0), pose(0, 0.0)),
        FakeEncoder::new(b"mp4"),
        FakeStore::with_inputs(),
        FakeFeedback::ok(),
    );

    let err = process_job(&h.services, &config(work.path()), &job()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InputValidation);
    assert_eq!(err.to_string(), "The execution landmark sequence is empty");
    assert!(h.store.put_keys().is_empty());
    assert!(h.encoder.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_encoder_output_degrades_to_placeholder() {
    let work = tempfile::tempdir().unwrap();
    let h = harness(
        FakePoses::new(pose(5, 0.0), pose(5, 0.01)),
        FakeEncoder::new(b""),
        FakeStore::with_inputs(),
        FakeFeedback::ok(),
    );

    let processed = process_job(&h.services, &config(work.path()), &job()).await.unwrap();

    assert!(processed.artifacts.video_url.is_none());
    assert!(processed.artifacts.is_degraded());
    assert_eq!(h.store.put_keys(), vec!["reports/ana_souza_job-1_report.pdf".to_string()]);

    let rendered = h.reports.rendered.lock().unwrap().clone();
    assert_eq!(rendered[0].video, VideoLink::Unavailable);
}

#[tokio::test]
async fn test_missing_input_object() {
    let work = tempfile::tempdir().unwrap();
    let h = harness(
        FakePoses::new(pose(2, 0.0), pose(2, 0.0)),
        FakeEncoder::new(b"mp4"),
        FakeStore::empty(),
        FakeFeedback::ok(),
    );

    let err = process_job(&h.services, &config(work.path()), &job()).await.unwrap_err();
    assert!(matches!(err, WorkerError::InvalidInput(ref m) if m == "reference video not found in storage: ref.mp4"));
}

#[tokio::test]
async fn test_invalid_locator() {
    let work = tempfile::tempdir().unwrap();
    let h = harness(
        FakePoses::new(pose(2, 0.0), pose(2, 0.0)),
        FakeEncoder::new(b"mp4"),
        FakeStore::with_inputs(),
        FakeFeedback::ok(),
    );
    let mut job = job();
    job.exec_path = String::new();

    let err = process_job(&h.services, &config(work.path()), &job).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InputValidation);
}

#[tokio::test]
async fn test_feedback_failure_fails_the_job() {
    let work = tempfile::tempdir().unwrap();
    let h = harness(
        FakePoses::new(pose(3, 0.0), pose(3, 0.01)),
        FakeEncoder::new(b"mp4"),
        FakeStore::with_inputs(),
        FakeFeedback::failing(),
    );

    let err = process_job(&h.services, &config(work.path()), &job()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(!h.store.put_keys().contains(&"reports/ana_souza_job-1_report.pdf".to_string()));
    assert!(h.reports.rendered.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_slow_frame_composition_hits_the_stage_deadline() {
    let work = tempfile::tempdir().unwrap();
    let mut h = harness(
        FakePoses::new(pose(5, 0.0), pose(5, 0.01)),
        FakeEncoder::new(b"mp4"),
        FakeStore::with_inputs(),
        FakeFeedback::ok(),
    );
    h.services.renderer = Arc::new(SlowRenderer(Duration::from_millis(100)));
    let mut config = config(work.path());
    config.stage_timeout = Duration::from_millis(300);

    let processed = process_job(&h.services, &config, &job()).await.unwrap();

    let failure = processed.artifacts.video_failure.clone().unwrap();
    assert!(failure.contains("video_compose"), "{}", failure);
    assert!(processed.artifacts.video_url.is_none());
    assert!(h.encoder.calls.lock().unwrap().is_empty());
    assert_eq!(h.store.put_keys(), vec!["reports/ana_souza_job-1_report.pdf".to_string()]);
}
