//! Worker metrics.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{ErrorKind, WorkerError, WorkerResult};

pub const JOBS_CLAIMED_TOTAL: &str = "posecoach_jobs_claimed_total";
pub const JOBS_COMPLETED_TOTAL: &str = "posecoach_jobs_completed_total";
pub const JOBS_FAILED_TOTAL: &str = "posecoach_jobs_failed_total";
pub const VIDEOS_DEGRADED_TOTAL: &str = "posecoach_videos_degraded_total";
pub const JOB_DURATION_SECONDS: &str = "posecoach_job_duration_seconds";
pub const STAGE_DURATION_SECONDS: &str = "posecoach_stage_duration_seconds";

pub fn record_claimed() {
    counter!(JOBS_CLAIMED_TOTAL).increment(1);
}

pub fn record_completed(duration: Duration) {
    counter!(JOBS_COMPLETED_TOTAL).increment(1);
    histogram!(JOB_DURATION_SECONDS, "status" => "done").record(duration.as_secs_f64());
}

pub fn record_failed(kind: ErrorKind, duration: Duration) {
    counter!(JOBS_FAILED_TOTAL, "kind" => kind.as_str()).increment(1);
    histogram!(JOB_DURATION_SECONDS, "status" => "error").record(duration.as_secs_f64());
}

pub fn record_degraded_video() {
    counter!(VIDEOS_DEGRADED_TOTAL).increment(1);
}

pub fn record_stage(stage: &'static str, duration: Duration) {
    histogram!(STAGE_DURATION_SECONDS, "stage" => stage).record(duration.as_secs_f64());
}

/// Install the Prometheus recorder with an HTTP listener on `port`.
pub fn install_exporter(port: u16) -> WorkerResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}
