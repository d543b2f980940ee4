//! Job-scoped structured logging.
//!
//! Every event carries the job ID and student so a single comparison can be
//! followed through the JSON log stream.

use std::fmt::Display;
use std::time::{Duration, Instant};

use posecoach_models::ComparisonJob;
use tracing::{error, info, warn, Span};

use crate::error::WorkerError;

#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    student: String,
    started: Instant,
}

impl JobLogger {
    pub fn new(job: &ComparisonJob) -> Self {
        Self {
            job_id: job.id.to_string(),
            student: job.student.clone(),
            started: Instant::now(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Span wrapping the whole run of one job.
    pub fn span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, student = %self.student)
    }

    pub fn started(&self) {
        info!(job_id = %self.job_id, student = %self.student, "Comparison started");
    }

    /// A pipeline stage finished.
    pub fn stage(&self, stage: &'static str, detail: impl Display) {
        info!(
            job_id = %self.job_id,
            stage,
            elapsed_ms = self.elapsed().as_millis() as u64,
            "{}", detail
        );
    }

    /// Something went wrong that the job survives.
    pub fn degraded(&self, stage: &'static str, reason: impl Display) {
        warn!(job_id = %self.job_id, stage, "{}", reason);
    }

    pub fn failed(&self, err: &WorkerError) {
        error!(
            job_id = %self.job_id,
            kind = %err.kind(),
            elapsed_ms = self.elapsed().as_millis() as u64,
            "Comparison failed: {}", err
        );
    }

    pub fn finished(&self, summary: impl Display) {
        info!(
            job_id = %self.job_id,
            student = %self.student,
            elapsed_ms = self.elapsed().as_millis() as u64,
            "Comparison finished: {}", summary
        );
    }
}
