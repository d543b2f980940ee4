//! Media error types.

use std::path::PathBuf;

use thiserror::Error;

pub type MediaResult<T> = Result<T, MediaError>;

/// The external binaries the media pipeline shells out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Ffmpeg,
    Ffprobe,
}

impl Tool {
    pub fn binary(&self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Ffprobe => "ffprobe",
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.binary())
    }
}

/// Failures decoding input videos or rendering artifacts.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0} not found in PATH")]
    ToolMissing(Tool),

    #[error("{tool} failed: {message}")]
    ToolFailed {
        tool: Tool,
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("{tool} did not finish within {secs} seconds")]
    ToolTimeout { tool: Tool, secs: u64 },

    #[error("video file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("unreadable video: {0}")]
    InvalidVideo(String),

    #[error("frame is {actual_width}x{actual_height}, encoder expects {width}x{height}")]
    FrameSize {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("PDF rendering failed: {0}")]
    Report(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("ffprobe output: {0}")]
    ProbeJson(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

impl MediaError {
    /// An FFmpeg failure with whatever diagnostics were captured.
    pub fn ffmpeg(message: impl Into<String>, stderr: Option<String>, exit_code: Option<i32>) -> Self {
        Self::ToolFailed {
            tool: Tool::Ffmpeg,
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn report(message: impl std::fmt::Debug) -> Self {
        Self::Report(format!("{:?}", message))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Stderr tail captured from the failing tool, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::ToolFailed { stderr, .. } => stderr.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(MediaError::ToolMissing(Tool::Ffprobe).to_string(), "ffprobe not found in PATH");
        assert_eq!(
            MediaError::ToolTimeout {
                tool: Tool::Ffmpeg,
                secs: 600
            }
            .to_string(),
            "ffmpeg did not finish within 600 seconds"
        );
        let err = MediaError::ffmpeg("exit status 1", Some("Unknown encoder".into()), Some(1));
        assert_eq!(err.stderr(), Some("Unknown encoder"));
        assert_eq!(err.to_string(), "ffmpeg failed: exit status 1");
    }
}
