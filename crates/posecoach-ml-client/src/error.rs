//! Pose service error types.

use thiserror::Error;

pub type MlResult<T> = Result<T, MlError>;

#[derive(Debug, Error)]
pub enum MlError {
    /// 5xx or 429 from the service
    #[error("pose service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The service refused the video
    #[error("pose service rejected the video: {0}")]
    Rejected(String),

    #[error("unexpected landmark payload: {0}")]
    Malformed(String),

    #[error("pose service did not answer within {0} seconds")]
    Timeout(u64),

    #[error("pose service transport: {0}")]
    Network(#[from] reqwest::Error),

    #[error("landmark JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl MlError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            MlError::ServiceUnavailable(_) | MlError::Timeout(_) => true,
            MlError::Network(e) => !e.is_decode(),
            _ => false,
        }
    }
}
