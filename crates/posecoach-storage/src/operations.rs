//! High-level storage operations for comparison jobs.

use posecoach_models::storage_slug;
use tracing::info;

use crate::client::R2Client;
use crate::error::{StorageError, StorageResult};

pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";
pub const REPORT_CONTENT_TYPE: &str = "application/pdf";

/// Object key of the comparison video for one job.
pub fn comparison_video_key(student: &str, job_id: &str) -> String {
    format!("comparisons/{}_{}_comparison.mp4", storage_slug(student), storage_slug(job_id))
}

/// Object key of the PDF report for one job.
pub fn report_key(student: &str, job_id: &str) -> String {
    format!("reports/{}_{}_report.pdf", storage_slug(student), storage_slug(job_id))
}

impl R2Client {
    /// Upload an artifact and return its locator.
    /// Empty payloads are refused.
    pub async fn put_artifact(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<String> {
        if data.is_empty() {
            return Err(StorageError::EmptyArtifact { key: key.to_string() });
        }
        let len = data.len();
        self.upload_bytes(data, key, content_type).await?;

        let locator = self.public_locator(key);
        info!(key, bytes = len, %locator, "Uploaded artifact");
        Ok(locator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_keys() {
        assert_eq!(
            comparison_video_key("Ana Souza", "job-1"),
            "comparisons/ana_souza_job-1_comparison.mp4"
        );
        assert_eq!(report_key("Ana Souza", "job-1"), "reports/ana_souza_job-1_report.pdf");
        assert_eq!(report_key("../x", "job-1"), "reports/x_job-1_report.pdf");
    }

    #[test]
    fn test_artifact_keys_are_per_job() {
        assert_ne!(report_key("Ana", "job-1"), report_key("Ana", "job-2"));
        assert_ne!(comparison_video_key("Ana", "job-1"), comparison_video_key("Ana", "job-2"));
    }
}
