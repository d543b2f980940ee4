//! Storage error types.

use std::fmt::Display;

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

/// Failures talking to the R2 bucket or the local work directory.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("R2 storage is not configured: {0}")]
    Config(String),

    #[error("object {key} does not exist")]
    Missing { key: String },

    #[error("refusing to upload empty object {key}")]
    EmptyArtifact { key: String },

    #[error("upload of {key} failed: {reason}")]
    Upload { key: String, reason: String },

    #[error("download of {key} failed: {reason}")]
    Download { key: String, reason: String },

    #[error("R2 request failed: {0}")]
    Request(String),

    #[error("local file error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn missing(key: impl Into<String>) -> Self {
        Self::Missing { key: key.into() }
    }

    pub fn upload(key: &str, reason: impl Display) -> Self {
        Self::Upload {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn download(key: &str, reason: impl Display) -> Self {
        Self::Download {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Object key the failure refers to, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Missing { key } | Self::EmptyArtifact { key } | Self::Upload { key, .. } | Self::Download { key, .. } => {
                Some(key)
            }
            Self::Config(_) | Self::Request(_) | Self::Io(_) => None,
        }
    }
}
