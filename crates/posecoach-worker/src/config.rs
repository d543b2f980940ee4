//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use posecoach_analysis::ComparisonConfig;
use posecoach_media::{TileSize, DEFAULT_FPS};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Identity stamped on claimed jobs
    pub worker_id: String,
    /// Idle sleep when no job is claimable
    pub poll_interval: Duration,
    /// Deadline for a whole job
    pub job_timeout: Duration,
    /// Deadline for each external call within a job
    pub stage_timeout: Duration,
    /// Work directory for per-job temporary files
    pub work_dir: PathBuf,
    /// Frames decoded per input video
    pub max_frames: u32,
    /// Output fps when the reference frame rate is unknown
    pub output_fps: f64,
    /// Size of each half of the comparison video
    pub tile: TileSize,
    pub comparison: ComparisonConfig,
    /// Prometheus listener port; no exporter when unset
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", uuid::Uuid::new_v4()),
            poll_interval: Duration::from_secs(5),
            job_timeout: Duration::from_secs(3600), // 1 hour
            stage_timeout: Duration::from_secs(600),
            work_dir: PathBuf::from("/tmp/posecoach"),
            max_frames: 300,
            output_fps: DEFAULT_FPS,
            tile: TileSize::default(),
            comparison: ComparisonConfig::default(),
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            worker_id: std::env::var("WORKER_ID")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.worker_id),
            poll_interval: Duration::from_secs(
                std::env::var("WORKER_POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            job_timeout: Duration::from_secs(
                std::env::var("WORKER_JOB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            stage_timeout: Duration::from_secs(
                std::env::var("WORKER_STAGE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            max_frames: std::env::var("WORKER_MAX_FRAMES")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_frames),
            output_fps: std::env::var("WORKER_OUTPUT_FPS")
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|f| f.is_finite() && *f > 0.0)
                .unwrap_or(defaults.output_fps),
            tile: TileSize::new(
                std::env::var("WORKER_TILE_WIDTH")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(defaults.tile.width),
                std::env::var("WORKER_TILE_HEIGHT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(defaults.tile.height),
            ),
            comparison: ComparisonConfig {
                confidence_threshold: std::env::var("COMPARISON_CONFIDENCE_THRESHOLD")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.comparison.confidence_threshold),
                max_insights: std::env::var("COMPARISON_MAX_INSIGHTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.comparison.max_insights),
            },
            metrics_port: std::env::var("METRICS_PORT").ok().and_then(|s| s.parse().ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_defaults_from_env() {
        for var in [
            "WORKER_POLL_INTERVAL_SECS",
            "WORKER_JOB_TIMEOUT",
            "WORKER_MAX_FRAMES",
            "WORKER_TILE_WIDTH",
            "METRICS_PORT",
        ] {
            std::env::remove_var(var);
        }

        let config = WorkerConfig::from_env();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.job_timeout, Duration::from_secs(3600));
        assert_eq!(config.max_frames, 300);
        assert_eq!(config.tile, TileSize::new(480, 270));
        assert!(config.metrics_port.is_none());
        assert!(config.worker_id.starts_with("worker-"));
    }

    #[test]
    #[serial]
    fn test_overrides_from_env() {
        std::env::set_var("WORKER_POLL_INTERVAL_SECS", "1");
        std::env::set_var("WORKER_MAX_FRAMES", "0");
        std::env::set_var("COMPARISON_CONFIDENCE_THRESHOLD", "0.7");
        std::env::set_var("METRICS_PORT", "9100");

        let config = WorkerConfig::from_env();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.max_frames, 300);
        assert_eq!(config.comparison.confidence_threshold, 0.7);
        assert_eq!(config.metrics_port, Some(9100));

        std::env::remove_var("WORKER_POLL_INTERVAL_SECS");
        std::env::remove_var("WORKER_MAX_FRAMES");
        std::env::remove_var("COMPARISON_CONFIDENCE_THRESHOLD");
        std::env::remove_var("METRICS_PORT");
    }
}
