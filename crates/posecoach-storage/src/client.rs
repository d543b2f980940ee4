//! S3-compatible client for the Cloudflare R2 bucket holding job inputs and
//! generated artifacts.

use std::fmt;
use std::path::Path;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Connection settings for the bucket.
#[derive(Clone)]
pub struct R2Config {
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    /// "auto" unless R2_REGION says otherwise
    pub region: String,
    /// Prefix for artifact locators, without a trailing slash
    pub public_base_url: Option<String>,
}

impl fmt::Debug for R2Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("R2Config")
            .field("endpoint_url", &self.endpoint_url)
            .field("bucket_name", &self.bucket_name)
            .field("region", &self.region)
            .field("public_base_url", &self.public_base_url)
            .finish_non_exhaustive()
    }
}

impl R2Config {
    /// Read `R2_*` variables. Endpoint, keys and bucket are required.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: required("R2_ENDPOINT_URL")?,
            access_key_id: required("R2_ACCESS_KEY_ID")?,
            secret_access_key: required("R2_SECRET_ACCESS_KEY")?,
            bucket_name: required("R2_BUCKET_NAME")?,
            region: std::env::var("R2_REGION")
                .ok()
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| "auto".to_string()),
            public_base_url: std::env::var("R2_PUBLIC_BASE_URL")
                .ok()
                .map(|s| s.trim().trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty()),
        })
    }
}

fn required(name: &str) -> StorageResult<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| StorageError::Config(format!("{} not set", name)))
}

/// Handle on one R2 bucket.
#[derive(Clone)]
pub struct R2Client {
    client: Client,
    bucket: String,
    public_base_url: Option<String>,
}

impl R2Client {
    pub fn new(config: R2Config) -> Self {
        let credentials = Credentials::new(config.access_key_id, config.secret_access_key, None, None, "r2-env");

        let s3_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket_name,
            public_base_url: config.public_base_url,
        }
    }

    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(R2Config::from_env()?))
    }

    /// Locator persisted for `key`: a public URL when a base URL is
    /// configured, otherwise the key itself.
    pub fn public_locator(&self, key: &str) -> String {
        public_locator(self.public_base_url.as_deref(), key)
    }

    pub async fn upload_bytes(&self, data: Vec<u8>, key: &str, content_type: &str) -> StorageResult<()> {
        debug!(key, bytes = data.len(), content_type, "PUT object");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload(key, e))?;

        Ok(())
    }

    async fn get_body(&self, key: &str) -> StorageResult<ByteStream> {
        debug!(key, "GET object");

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(se) if se.is_no_such_key() => StorageError::missing(key),
                _ => StorageError::download(key, e),
            })?;

        Ok(response.body)
    }

    /// Read a whole object into memory.
    pub async fn download_bytes(&self, key: &str) -> StorageResult<Vec<u8>> {
        let body = self.get_body(key).await?;
        let data = body.collect().await.map_err(|e| StorageError::download(key, e))?;
        Ok(data.into_bytes().to_vec())
    }

    /// Stream an object to `path`, creating parent directories.
    pub async fn download_file(&self, key: &str, path: impl AsRef<Path>) -> StorageResult<u64> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut body = self.get_body(key).await?;
        let mut file = tokio::fs::File::create(path).await?;
        let mut written = 0u64;
        while let Some(chunk) = body.try_next().await.map_err(|e| StorageError::download(key, e))? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        info!(key, path = %path.display(), bytes = written, "Downloaded object");
        Ok(written)
    }

    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        let head = self.client.head_object().bucket(&self.bucket).key(key).send().await;
        match head {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false) => Ok(false),
            Err(e) => Err(StorageError::Request(format!("head {}: {}", key, e))),
        }
    }

    /// HEAD the bucket itself; fails on bad credentials or endpoint.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::Request(format!("head bucket {}: {}", self.bucket, e)))?;
        Ok(())
    }
}

pub(crate) fn public_locator(base_url: Option<&str>, key: &str) -> String {
    match base_url {
        Some(base) => format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/')),
        None => key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn set_required() {
        std::env::set_var("R2_ENDPOINT_URL", "https://acct.r2.cloudflarestorage.com");
        std::env::set_var("R2_ACCESS_KEY_ID", "key");
        std::env::set_var("R2_SECRET_ACCESS_KEY", "secret");
        std::env::set_var("R2_BUCKET_NAME", "posecoach");
    }

    #[test]
    fn test_public_locator() {
        assert_eq!(
            public_locator(Some("https://pub.example.com/"), "reports/ana_report.pdf"),
            "https://pub.example.com/reports/ana_report.pdf"
        );
        assert_eq!(public_locator(None, "reports/ana_report.pdf"), "reports/ana_report.pdf");
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        set_required();
        std::env::set_var("R2_PUBLIC_BASE_URL", "https://pub.example.com/");
        std::env::remove_var("R2_REGION");

        let config = R2Config::from_env().unwrap();
        assert_eq!(config.region, "auto");
        assert_eq!(config.bucket_name, "posecoach");
        assert_eq!(config.public_base_url.as_deref(), Some("https://pub.example.com"));

        std::env::remove_var("R2_PUBLIC_BASE_URL");
    }

    #[test]
    #[serial]
    fn test_config_debug_hides_secret() {
        set_required();
        let config = R2Config::from_env().unwrap();
        let rendered = format!("{:?}", config);
        assert!(rendered.contains("posecoach"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    #[serial]
    fn test_config_missing_bucket() {
        set_required();
        std::env::remove_var("R2_BUCKET_NAME");

        let err = R2Config::from_env().unwrap_err();
        assert!(err.to_string().contains("R2_BUCKET_NAME"));
    }
}
