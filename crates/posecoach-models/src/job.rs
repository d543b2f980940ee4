//! Comparison job records and their lifecycle.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a job (the queue document ID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persisted job status.
///
/// There is no in-progress value: a job being worked on stays `Pending`
/// and carries claim bookkeeping instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for (or held by) a worker
    #[default]
    Pending,
    /// Artifacts produced and persisted
    Done,
    /// Processing failed
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    /// Only `pending -> done` and `pending -> error` are legal.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Done) | (JobStatus::Pending, JobStatus::Error)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "done" => Ok(JobStatus::Done),
            "error" => Ok(JobStatus::Error),
            other => Err(TransitionError::UnknownStatus(other.to_string())),
        }
    }
}

/// Errors raised by the lifecycle state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("illegal status transition {from} -> {to}")]
    Illegal { from: JobStatus, to: JobStatus },

    #[error("unknown job status: {0}")]
    UnknownStatus(String),
}

/// Result fields written on the `done` transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    /// Absent when the video stage degraded
    pub video_url: Option<String>,
    pub report_url: String,
    pub feedback: String,
}

/// A terminal update, applied as a single document write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalUpdate {
    Done(JobOutcome),
    Error { message: String },
}

impl TerminalUpdate {
    pub fn status(&self) -> JobStatus {
        match self {
            TerminalUpdate::Done(_) => JobStatus::Done,
            TerminalUpdate::Error { .. } => JobStatus::Error,
        }
    }
}

/// A comparison job: one reference/execution video pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonJob {
    pub id: JobId,

    /// Student display name
    pub student: String,

    /// Owning user ID
    pub user: String,

    /// Storage locator of the reference video (URL or bare key)
    pub ref_path: String,

    /// Storage locator of the student's execution video
    pub exec_path: String,

    #[serde(default)]
    pub status: JobStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Worker currently holding the job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
}

impl ComparisonJob {
    /// Create a new pending job.
    pub fn new(
        student: impl Into<String>,
        user: impl Into<String>,
        ref_path: impl Into<String>,
        exec_path: impl Into<String>,
    ) -> Self {
        Self {
            id: JobId::new(),
            student: student.into(),
            user: user.into(),
            ref_path: ref_path.into(),
            exec_path: exec_path.into(),
            status: JobStatus::Pending,
            video_url: None,
            report_url: None,
            feedback: None,
            error_message: None,
            processed_at: None,
            created_at: Some(Utc::now()),
            claimed_by: None,
            claimed_at: None,
        }
    }

    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = id;
        self
    }

    /// Whether `worker_id` may claim this job at `now`.
    ///
    /// A pending job is claimable when it is unclaimed, already claimed by
    /// `worker_id` (a terminal write that never landed), or holding a claim
    /// older than `lease`.
    pub fn is_claimable_by(&self, worker_id: &str, now: DateTime<Utc>, lease: Duration) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        if self.claimed_by.as_deref() == Some(worker_id) {
            return true;
        }
        match self.claimed_at {
            None => true,
            Some(at) => now - at >= lease,
        }
    }

    /// Record a claim by `worker_id`.
    pub fn claim(&mut self, worker_id: impl Into<String>, at: DateTime<Utc>) {
        self.claimed_by = Some(worker_id.into());
        self.claimed_at = Some(at);
    }

    /// Apply a terminal update in place.
    ///
    /// `error` never carries result fields and `done` never carries an
    /// error message.
    pub fn apply(&mut self, update: &TerminalUpdate, at: DateTime<Utc>) -> Result<(), TransitionError> {
        let next = update.status();
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::Illegal {
                from: self.status,
                to: next,
            });
        }

        match update {
            TerminalUpdate::Done(outcome) => {
                self.video_url = outcome.video_url.clone();
                self.report_url = Some(outcome.report_url.clone());
                self.feedback = Some(outcome.feedback.clone());
                self.error_message = None;
            }
            TerminalUpdate::Error { message } => {
                self.error_message = Some(message.clone());
            }
        }
        self.status = next;
        self.processed_at = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> ComparisonJob {
        ComparisonJob::new("Ana", "user-1", "https://cdn/ref.mp4", "exec.mp4")
    }

    #[test]
    fn test_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Done));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Error));
        assert!(!JobStatus::Done.can_transition_to(JobStatus::Error));
        assert!(!JobStatus::Error.can_transition_to(JobStatus::Done));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Pending));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("done".parse::<JobStatus>().unwrap(), JobStatus::Done);
        assert!("processing".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_apply_done() {
        let mut job = job();
        let at = Utc::now();
        job.apply(
            &TerminalUpdate::Done(JobOutcome {
                video_url: None,
                report_url: "reports/ana_report.pdf".into(),
                feedback: "Keep going".into(),
            }),
            at,
        )
        .unwrap();

        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.processed_at, Some(at));
        assert!(job.video_url.is_none());
        assert!(job.error_message.is_none());
    }

    #[test]
    fn test_apply_error_is_final() {
        let mut job = job();
        job.apply(&TerminalUpdate::Error { message: "boom".into() }, Utc::now())
            .unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert!(job.report_url.is_none());

        let again = job.apply(&TerminalUpdate::Error { message: "x".into() }, Utc::now());
        assert!(matches!(again, Err(TransitionError::Illegal { .. })));
    }

    #[test]
    fn test_claim_lease() {
        let now = Utc::now();
        let lease = Duration::seconds(60);
        let mut job = job();
        assert!(job.is_claimable_by("worker-b", now, lease));

        job.claim("worker-a", now - Duration::seconds(10));
        assert!(!job.is_claimable_by("worker-b", now, lease));

        job.claim("worker-a", now - Duration::seconds(61));
        assert!(job.is_claimable_by("worker-b", now, lease));
    }

    #[test]
    fn test_own_live_claim_is_claimable() {
        let now = Utc::now();
        let mut job = job();
        job.claim("worker-a", now - Duration::seconds(5));

        assert!(job.is_claimable_by("worker-a", now, Duration::seconds(3660)));

        job.status = JobStatus::Done;
        assert!(!job.is_claimable_by("worker-a", now, Duration::seconds(3660)));
    }

    #[test]
    fn test_serde_field_names() {
        let value = serde_json::to_value(job()).unwrap();
        assert_eq!(value["status"], "pending");
        assert_eq!(value["student"], "Ana");
        assert!(value.get("video_url").is_none());
    }
}
