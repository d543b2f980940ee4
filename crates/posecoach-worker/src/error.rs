//! Worker error types.

use std::fmt;

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// How a failure is handled at the job boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad job input; the job fails without retry
    InputValidation,
    /// A collaborator or deadline failed; the job fails with the message
    Transport,
    /// The comparison video failed; the job still completes
    PartialArtifact,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InputValidation => "input_validation",
            ErrorKind::Transport => "transport",
            ErrorKind::PartialArtifact => "partial_artifact",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Comparison video unavailable: {0}")]
    VideoUnavailable(String),

    #[error("Feedback generation failed: {0}")]
    FeedbackFailed(String),

    #[error("{stage} timed out after {secs} seconds")]
    Timeout { stage: String, secs: u64 },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Analysis(#[from] posecoach_analysis::AnalysisError),

    #[error("Storage error: {0}")]
    Storage(#[from] posecoach_storage::StorageError),

    #[error("Firestore error: {0}")]
    Firestore(#[from] posecoach_firestore::FirestoreError),

    #[error("Media error: {0}")]
    Media(#[from] posecoach_media::MediaError),

    #[error("Pose service error: {0}")]
    Pose(#[from] posecoach_ml_client::MlError),

    #[error("Queue error: {0}")]
    Queue(#[from] posecoach_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn video_unavailable(msg: impl Into<String>) -> Self {
        Self::VideoUnavailable(msg.into())
    }

    pub fn feedback_failed(msg: impl Into<String>) -> Self {
        Self::FeedbackFailed(msg.into())
    }

    pub fn timeout(stage: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            stage: stage.into(),
            secs,
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Classify the error for the terminal write and metrics.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkerError::InvalidInput(_) | WorkerError::Analysis(_) => ErrorKind::InputValidation,
            WorkerError::VideoUnavailable(_) => ErrorKind::PartialArtifact,
            WorkerError::FeedbackFailed(_)
            | WorkerError::Timeout { .. }
            | WorkerError::Storage(_)
            | WorkerError::Firestore(_)
            | WorkerError::Pose(_)
            | WorkerError::Queue(_) => ErrorKind::Transport,
            WorkerError::Media(e) => match e {
                posecoach_media::MediaError::Report(_) | posecoach_media::MediaError::Internal(_) => {
                    ErrorKind::Internal
                }
                _ => ErrorKind::Transport,
            },
            WorkerError::ConfigError(_) | WorkerError::Internal(_) | WorkerError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Message persisted on the `error` record.
    pub fn job_message(&self) -> String {
        self.to_string()
    }
}
