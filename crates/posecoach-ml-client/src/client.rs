//! Pose service HTTP client.

use std::path::Path;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::error::{MlError, MlResult};
use crate::types::{HealthResponse, PoseExtraction, PoseRequest, PoseResponse};

/// Configuration for the pose service client.
#[derive(Debug, Clone)]
pub struct PoseClientConfig {
    /// Base URL of the pose service
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries
    pub max_retries: u32,
    /// Base delay between retries
    pub retry_delay: Duration,
}

impl Default for PoseClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout: Duration::from_secs(300), // landmarking a full video is slow
            max_retries: 2,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl PoseClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("POSE_SERVICE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            timeout: Duration::from_secs(
                std::env::var("POSE_SERVICE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            max_retries: std::env::var("POSE_SERVICE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            retry_delay: defaults.retry_delay,
        }
    }
}

/// Client for the pose-estimation service.
#[derive(Clone)]
pub struct PoseClient {
    http: Client,
    config: PoseClientConfig,
}

impl PoseClient {
    pub fn new(config: PoseClientConfig) -> MlResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(MlError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> MlResult<Self> {
        Self::new(PoseClientConfig::from_env())
    }

    pub fn config(&self) -> &PoseClientConfig {
        &self.config
    }

    /// Check if the pose service is healthy.
    pub async fn health_check(&self) -> MlResult<bool> {
        let url = format!("{}/health", self.config.base_url);

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response.json().await?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("Pose service health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Pose service health check error: {}", e);
                Ok(false)
            }
        }
    }

    /// Extract landmarks for up to `max_frames` frames of a local video.
    pub async fn extract(&self, video_path: &Path, max_frames: u32) -> MlResult<PoseExtraction> {
        let url = format!("{}/pose/extract", self.config.base_url);
        let request = PoseRequest {
            input_path: video_path.to_string_lossy().into_owned(),
            max_frames,
        };

        debug!(url = %url, path = %request.input_path, max_frames, "Requesting pose extraction");

        let response: PoseResponse = self
            .with_retry(|| async {
                let response = self
                    .http
                    .post(&url)
                    .json(&request)
                    .send()
                    .await
                    .map_err(|e| {
                        if e.is_timeout() {
                            MlError::Timeout(self.config.timeout.as_secs())
                        } else {
                            MlError::Network(e)
                        }
                    })?;

                let status = response.status();
                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body = response.text().await.unwrap_or_default();
                let message = format!("pose service returned {}: {}", status, body);
                if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                    Err(MlError::ServiceUnavailable(message))
                } else {
                    Err(MlError::Rejected(message))
                }
            })
            .await?;

        let raw_frames = response.frames.len();
        let extraction = response.into_extraction(max_frames)?;
        info!(
            path = %request.input_path,
            raw_frames,
            detected_frames = extraction.sequence.len(),
            "Pose extraction complete"
        );
        Ok(extraction)
    }

    async fn with_retry<F, Fut, T>(&self, operation: F) -> MlResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = MlResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.retry_delay * 2u32.saturating_pow(attempt);
                    warn!(
                        "Pose request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
