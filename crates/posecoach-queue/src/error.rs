//! Queue error types.

use posecoach_firestore::FirestoreError;
use posecoach_models::TransitionError;
use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job store: {0}")]
    Store(#[from] FirestoreError),

    #[error("job {0} is not in the queue")]
    UnknownJob(String),

    #[error("{0}")]
    Transition(#[from] TransitionError),
}

impl QueueError {
    pub fn unknown_job(id: impl Into<String>) -> Self {
        Self::UnknownJob(id.into())
    }

    /// Store failures that may succeed on a later attempt.
    ///
    /// A rejected transition or a vanished document never will.
    pub fn is_retryable(&self) -> bool {
        match self {
            QueueError::Store(e) => e.is_retryable(),
            QueueError::UnknownJob(_) | QueueError::Transition(_) => false,
        }
    }
}
