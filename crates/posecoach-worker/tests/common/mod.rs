//! In-memory collaborators for driving the pipeline in tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::{Rgb, RgbImage};
use posecoach_firestore::{FirestoreError, StoredJob};
use posecoach_media::TileSize;
use posecoach_ml_client::MlError;
use posecoach_models::{ComparisonReport, JobId, Joint, Landmark, LandmarkFrame, PoseSequence, TerminalUpdate};
use posecoach_queue::{JobStore, MemoryJobStore, QueueError, QueueResult};
use posecoach_worker::{
    ExtractedPose, FeedbackGenerator, FrameRenderer, ObjectStore, PipelineServices, PoseExtractor, ReportRenderer,
    VideoEncoder, WorkerConfig, WorkerError, WorkerResult,
};

pub const REFERENCE_BYTES: &[u8] = b"reference-video";
pub const EXECUTION_BYTES: &[u8] = b"execution-video";
pub const TILE: TileSize = TileSize { width: 8, height: 4 };

/// A full-body frame with every joint visible, shifted by `offset` on x.
pub fn body_frame(index: u32, offset: f64) -> LandmarkFrame {
    let mut frame = LandmarkFrame::new(index);
    for joint in Joint::ALL {
        let i = joint.index() as f64;
        frame = frame.with_landmark(
            joint,
            Landmark::new(0.3 + offset + (i * 0.37).sin() * 0.2, 0.1 + i * 0.025, (i * 0.11).cos() * 0.1, 0.95),
        );
    }
    frame
}

/// `len` frames drifting right by `step` per frame.
pub fn pose(len: u32, step: f64) -> ExtractedPose {
    let sequence = PoseSequence::new((0..len).map(|i| body_frame(i, i as f64 * step)).collect());
    ExtractedPose {
        frames: (0..len).map(|_| RgbImage::from_pixel(TILE.width, TILE.height, Rgb([10, 10, 10]))).collect(),
        sequence,
        fps: Some(25.0),
    }
}

pub fn config(work_dir: &Path) -> WorkerConfig {
    WorkerConfig {
        worker_id: "worker-test".to_string(),
        poll_interval: Duration::from_millis(10),
        job_timeout: Duration::from_secs(30),
        stage_timeout: Duration::from_secs(10),
        work_dir: work_dir.to_path_buf(),
        tile: TILE,
        ..WorkerConfig::default()
    }
}

/// Poses keyed by the content of the downloaded file.
#[derive(Default)]
pub struct FakePoses {
    by_content: HashMap<Vec<u8>, ExtractedPose>,
    fail: bool,
}

impl FakePoses {
    pub fn new(reference: ExtractedPose, execution: ExtractedPose) -> Self {
        let mut by_content = HashMap::new();
        by_content.insert(REFERENCE_BYTES.to_vec(), reference);
        by_content.insert(EXECUTION_BYTES.to_vec(), execution);
        Self { by_content, fail: false }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl PoseExtractor for FakePoses {
    async fn extract(&self, video_path: &Path, _max_frames: u32) -> WorkerResult<ExtractedPose> {
        if self.fail {
            return Err(MlError::ServiceUnavailable("pose service returned 503".into()).into());
        }
        let content = tokio::fs::read(video_path).await?;
        Ok(self.by_content.get(&content).cloned().unwrap_or_default())
    }
}

pub struct PassthroughRenderer;

impl FrameRenderer for PassthroughRenderer {
    fn annotate(&self, frame: &RgbImage, _landmarks: &LandmarkFrame) -> RgbImage {
        frame.clone()
    }
}

/// Returns fixed bytes and remembers what it was asked to encode.
pub struct FakeEncoder {
    output: Vec<u8>,
    pub calls: Mutex<Vec<(usize, f64, u32, u32)>>,
}

impl FakeEncoder {
    pub fn new(output: &[u8]) -> Self {
        Self {
            output: output.to_vec(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VideoEncoder for FakeEncoder {
    async fn encode(&self, frames: &[RgbImage], fps: f64, width: u32, height: u32) -> WorkerResult<Vec<u8>> {
        for frame in frames {
            assert_eq!(frame.dimensions(), (width, height));
        }
        self.calls.lock().unwrap().push((frames.len(), fps, width, height));
        Ok(self.output.clone())
    }
}

/// Object store with the two job inputs preloaded.
pub struct FakeStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    pub puts: Mutex<Vec<(String, String)>>,
}

impl FakeStore {
    pub fn with_inputs() -> Self {
        let mut objects = BTreeMap::new();
        objects.insert("ref.mp4".to_string(), REFERENCE_BYTES.to_vec());
        objects.insert("exec.mp4".to_string(), EXECUTION_BYTES.to_vec());
        Self {
            objects: Mutex::new(objects),
            puts: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            puts: Mutex::new(Vec::new()),
        }
    }

    pub fn put_keys(&self) -> Vec<String> {
        self.puts.lock().unwrap().iter().map(|(k, _)| k.clone()).collect()
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn get(&self, key: &str) -> WorkerResult<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| posecoach_storage::StorageError::missing(key).into())
    }

    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> WorkerResult<String> {
        self.objects.lock().unwrap().insert(key.to_string(), data);
        self.puts
            .lock()
            .unwrap()
            .push((key.to_string(), content_type.to_string()));
        Ok(format!("https://cdn.test/{}", key))
    }

    async fn exists(&self, key: &str) -> WorkerResult<bool> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }
}

pub struct FakeFeedback {
    fail: bool,
}

impl FakeFeedback {
    pub fn ok() -> Self {
        Self { fail: false }
    }

    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl FeedbackGenerator for FakeFeedback {
    async fn generate(&self, per_joint_average_error: &BTreeMap<Joint, f64>) -> WorkerResult<String> {
        if self.fail {
            return Err(WorkerError::feedback_failed("Gemini API returned 500"));
        }
        Ok(format!("Focus on {} joints.", per_joint_average_error.len()))
    }
}

/// Records every report it renders.
#[derive(Default)]
pub struct FakeReports {
    pub rendered: Mutex<Vec<ComparisonReport>>,
}

impl ReportRenderer for FakeReports {
    fn render(&self, report: &ComparisonReport) -> WorkerResult<Vec<u8>> {
        self.rendered.lock().unwrap().push(report.clone());
        Ok(b"%PDF-1.3 fake".to_vec())
    }
}

/// Handles on the fakes behind a [`PipelineServices`].
pub struct Harness {
    pub store: Arc<FakeStore>,
    pub encoder: Arc<FakeEncoder>,
    pub reports: Arc<FakeReports>,
    pub services: PipelineServices,
}

pub fn harness(poses: FakePoses, encoder: FakeEncoder, store: FakeStore, feedback: FakeFeedback) -> Harness {
    let store = Arc::new(store);
    let encoder = Arc::new(encoder);
    let reports = Arc::new(FakeReports::default());

    let services = PipelineServices {
        poses: Arc::new(poses),
        renderer: Arc::new(PassthroughRenderer),
        encoder: encoder.clone(),
        storage: store.clone(),
        feedback: Arc::new(feedback),
        reports: reports.clone(),
    };

    Harness {
        store,
        encoder,
        reports,
        services,
    }
}

/// Memory job store whose terminal writes fail with a 503 `failures` times.
pub struct FlakyFinishStore {
    pub inner: MemoryJobStore,
    failures: AtomicU32,
}

impl FlakyFinishStore {
    pub fn new(failures: u32) -> Self {
        Self {
            inner: MemoryJobStore::new(),
            failures: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl JobStore for FlakyFinishStore {
    async fn find_pending(&self, limit: u32, offset: u32) -> QueueResult<Vec<StoredJob>> {
        self.inner.find_pending(limit, offset).await
    }

    async fn claim(&self, stored: &StoredJob, worker_id: &str, at: DateTime<Utc>) -> QueueResult<Option<StoredJob>> {
        self.inner.claim(stored, worker_id, at).await
    }

    async fn claim_unconditionally(
        &self,
        stored: &StoredJob,
        worker_id: &str,
        at: DateTime<Utc>,
    ) -> QueueResult<StoredJob> {
        self.inner.claim_unconditionally(stored, worker_id, at).await
    }

    async fn finish(&self, job_id: &JobId, update: &TerminalUpdate, at: DateTime<Utc>) -> QueueResult<()> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(QueueError::from(FirestoreError::from_http_status(503, "unavailable")));
        }
        self.inner.finish(job_id, update, at).await
    }
}
