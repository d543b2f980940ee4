//! Firestore error types.

use thiserror::Error;

pub type FirestoreResult<T> = Result<T, FirestoreError>;

/// Wait after a 429 that carried no usable Retry-After header.
const THROTTLE_FALLBACK_MS: u64 = 1000;

/// Failures of the Firestore REST API and its credentials.
#[derive(Debug, Error)]
pub enum FirestoreError {
    #[error("credentials rejected: {0}")]
    Auth(String),

    #[error("permission denied: {0}")]
    Forbidden(String),

    #[error("no such document: {0}")]
    Missing(String),

    #[error("document already exists: {0}")]
    Conflict(String),

    /// The document changed since it was read.
    #[error("stale write: {0}")]
    Stale(String),

    #[error("throttled, retry in {0}ms")]
    Throttled(u64),

    #[error("Firestore unavailable ({0}): {1}")]
    Unavailable(u16, String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("HTTP transport: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl FirestoreError {
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn missing(path: impl Into<String>) -> Self {
        Self::Missing(path.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Classify a non-success response.
    ///
    /// Firestore reports a failed `updateTime` precondition either as 412 or
    /// as 400 with `FAILED_PRECONDITION` in the body.
    pub fn from_http_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 => Self::Auth(body),
            403 => Self::Forbidden(body),
            404 => Self::Missing(body),
            409 => Self::Conflict(body),
            412 => Self::Stale(body),
            400 if body.contains("FAILED_PRECONDITION") => Self::Stale(body),
            429 => Self::Throttled(THROTTLE_FALLBACK_MS),
            500..=599 => Self::Unavailable(status, body),
            _ => Self::Rejected(body),
        }
    }

    /// Replace the throttle wait with the server's Retry-After, in seconds.
    pub fn with_retry_after(self, secs: Option<u64>) -> Self {
        match (self, secs) {
            (Self::Throttled(_), Some(secs)) => Self::Throttled(secs.saturating_mul(1000)),
            (other, _) => other,
        }
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::Throttled(ms) => Some(*ms),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Throttled(_) | Self::Unavailable(..) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// True when an `updateTime` precondition did not hold.
    pub fn is_stale_write(&self) -> bool {
        matches!(self, Self::Stale(_))
    }
}
