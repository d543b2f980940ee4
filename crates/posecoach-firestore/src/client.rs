//! Firestore REST API client.
//!
//! - Token caching with refresh margin and one retry on an expired token
//! - HTTP client tuning (pooling, timeouts)
//! - Exponential backoff with jitter via [`FirestoreClient::with_retry`]
//! - Tracing spans and request metrics on every call

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, info_span, Instrument};

use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::{outcome, record_request};
use crate::retry::{self, RetryConfig};
use crate::token_cache::{ServiceAccountSource, StaticTokenSource, TokenCache, TokenSource};
use crate::types::{Document, Precondition, RunQueryRequest, RunQueryResponse, StructuredQuery, Value};

const PRODUCTION_ROOT: &str = "https://firestore.googleapis.com";

/// Token the Firestore emulator accepts as an admin credential.
const EMULATOR_TOKEN: &str = "owner";

// =============================================================================
// Configuration
// =============================================================================

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    /// GCP project ID
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Retry configuration
    pub retry: RetryConfig,
    /// `host:port` of a Firestore emulator, if one should be used
    pub emulator_host: Option<String>,
}

impl FirestoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> FirestoreResult<Self> {
        let project_id = ["GCP_PROJECT_ID", "FIREBASE_PROJECT_ID"]
            .into_iter()
            .filter_map(|name| std::env::var(name).ok())
            .map(|id| id.trim().to_string())
            .find(|id| !id.is_empty())
            .ok_or_else(|| FirestoreError::auth("GCP_PROJECT_ID or FIREBASE_PROJECT_ID must name the Firestore project"))?;

        Ok(Self {
            project_id,
            database_id: std::env::var("FIRESTORE_DATABASE_ID").unwrap_or_else(|_| "(default)".to_string()),
            timeout: env_secs("FIRESTORE_TIMEOUT_SECS", 30),
            connect_timeout: env_secs("FIRESTORE_CONNECT_TIMEOUT_SECS", 5),
            retry: RetryConfig::from_env(),
            emulator_host: std::env::var("FIRESTORE_EMULATOR_HOST")
                .ok()
                .filter(|h| !h.trim().is_empty()),
        })
    }

    /// API root this config talks to.
    pub fn api_root(&self) -> String {
        match &self.emulator_host {
            Some(host) => format!("http://{}", host),
            None => PRODUCTION_ROOT.to_string(),
        }
    }
}

fn env_secs(name: &str, default: u64) -> Duration {
    let secs = std::env::var(name).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(default);
    Duration::from_secs(secs)
}

// =============================================================================
// Client
// =============================================================================

/// Firestore REST API client.
#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    config: FirestoreConfig,
    documents_url: String,
    token_cache: Arc<TokenCache>,
}

impl FirestoreClient {
    /// Create a new Firestore client.
    pub async fn new(config: FirestoreConfig) -> FirestoreResult<Self> {
        let source: Arc<dyn TokenSource> = if config.emulator_host.is_some() {
            Arc::new(StaticTokenSource(EMULATOR_TOKEN.to_string()))
        } else {
            Arc::new(ServiceAccountSource::new(Self::create_auth_provider()?))
        };
        let root = config.api_root();
        Self::with_token_source(config, root, source)
    }

    /// Create a client against an explicit API root and token source.
    pub fn with_token_source(
        config: FirestoreConfig,
        api_root: impl AsRef<str>,
        source: Arc<dyn TokenSource>,
    ) -> FirestoreResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("posecoach-firestore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FirestoreError::Http)?;

        let documents_url = format!(
            "{}/v1/projects/{}/databases/{}/documents",
            api_root.as_ref().trim_end_matches('/'),
            config.project_id,
            config.database_id
        );

        Ok(Self {
            http,
            config,
            documents_url,
            token_cache: Arc::new(TokenCache::new(source)),
        })
    }

    fn create_auth_provider() -> FirestoreResult<Arc<dyn TokenProvider>> {
        let service_account = CustomServiceAccount::from_env()
            .map_err(|e| FirestoreError::auth(format!("Failed to load service account: {}", e)))?;

        match service_account {
            Some(sa) => Ok(Arc::new(sa)),
            None => Err(FirestoreError::auth(
                "GOOGLE_APPLICATION_CREDENTIALS not set. \
                 Set it to the path of your service account JSON file.",
            )),
        }
    }

    /// Create from environment variables.
    pub async fn from_env() -> FirestoreResult<Self> {
        let config = FirestoreConfig::from_env()?;
        Self::new(config).await
    }

    fn document_url(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.documents_url, collection, doc_id)
    }

    fn is_access_token_expired(body: &str) -> bool {
        body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
    }

    /// Send an authorized request, refreshing the token once if it expired.
    async fn send<F>(&self, build: F) -> FirestoreResult<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let token = self.token_cache.get_token().await?;
        let response = build(&self.http).bearer_auth(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if !Self::is_access_token_expired(&body) {
            return Err(FirestoreError::auth(body));
        }

        debug!("Firestore access token expired, refreshing");
        self.token_cache.invalidate().await;
        let token = self.token_cache.get_token().await?;
        Ok(build(&self.http).bearer_auth(&token).send().await?)
    }

    // =========================================================================
    // Document operations
    // =========================================================================

    /// Get a document; `None` when it does not exist.
    pub async fn get_document(&self, collection: &str, doc_id: &str) -> FirestoreResult<Option<Document>> {
        let url = self.document_url(collection, doc_id);

        self.execute_request("get_document", collection, Some(doc_id), async {
            let response = self.send(|http| http.get(&url)).await?;
            match response.status() {
                StatusCode::OK => Ok(Some(response.json().await?)),
                StatusCode::NOT_FOUND => Ok(None),
                status => Err(Self::handle_error_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Create a document with a caller-chosen ID.
    pub async fn create_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> FirestoreResult<Document> {
        let url = format!("{}/{}", self.documents_url, collection);
        let body = Document::new(fields);

        self.execute_request("create_document", collection, Some(doc_id), async {
            let response = self
                .send(|http| http.post(&url).query(&[("documentId", doc_id)]).json(&body))
                .await?;
            match response.status() {
                StatusCode::OK => Ok(response.json().await?),
                status => Err(Self::handle_error_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Patch the fields named in `update_mask`.
    ///
    /// Masked fields absent from `fields` are deleted from the document.
    /// Without a mask the whole document is replaced.
    pub async fn update_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_mask: Option<&[&str]>,
    ) -> FirestoreResult<Document> {
        self.patch("update_document", collection, doc_id, fields, update_mask, None)
            .await
    }

    /// Patch guarded by a `currentDocument` precondition.
    ///
    /// Fails with [`FirestoreError::Stale`] when the document
    /// changed since `update_time` was read.
    pub async fn update_document_with_precondition(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_mask: Option<&[&str]>,
        precondition: &Precondition,
    ) -> FirestoreResult<Document> {
        self.patch(
            "update_document_precondition",
            collection,
            doc_id,
            fields,
            update_mask,
            Some(precondition),
        )
        .await
    }

    async fn patch(
        &self,
        operation: &str,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_mask: Option<&[&str]>,
        precondition: Option<&Precondition>,
    ) -> FirestoreResult<Document> {
        let url = self.document_url(collection, doc_id);
        let body = Document::new(fields);

        let mut params: Vec<(&str, String)> = update_mask
            .unwrap_or_default()
            .iter()
            .map(|f| ("updateMask.fieldPaths", f.to_string()))
            .collect();
        if let Some(p) = precondition {
            params.push(p.query_pair());
        }

        self.execute_request(operation, collection, Some(doc_id), async {
            let response = self
                .send(|http| http.patch(&url).query(&params).json(&body))
                .await?;
            match response.status() {
                StatusCode::OK => Ok(response.json().await?),
                status => Err(Self::handle_error_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Run a structured query against the root collections.
    pub async fn run_query(&self, query: StructuredQuery) -> FirestoreResult<Vec<Document>> {
        let url = format!("{}:runQuery", self.documents_url);
        let collection = query
            .from
            .first()
            .map(|c| c.collection_id.clone())
            .unwrap_or_default();
        let body = RunQueryRequest {
            structured_query: query,
        };

        self.execute_request("run_query", &collection, None, async {
            let response = self.send(|http| http.post(&url).json(&body)).await?;
            match response.status() {
                StatusCode::OK => {
                    let results: Vec<RunQueryResponse> = response.json().await?;
                    Ok(results.into_iter().filter_map(|r| r.document).collect())
                }
                status => Err(Self::handle_error_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Retry `op` with this client's retry policy.
    pub async fn with_retry<T, F, Fut>(&self, operation: &str, op: F) -> FirestoreResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = FirestoreResult<T>>,
    {
        retry::with_retry(&self.config.retry, operation, op).await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn execute_request<T, F>(
        &self,
        operation: &str,
        collection: &str,
        doc_id: Option<&str>,
        fut: F,
    ) -> FirestoreResult<T>
    where
        F: std::future::Future<Output = FirestoreResult<T>>,
    {
        let span = match doc_id {
            Some(id) => {
                info_span!("firestore_request", operation = %operation, collection = %collection, doc_id = %id)
            }
            None => info_span!("firestore_request", operation = %operation, collection = %collection),
        };

        let start = Instant::now();
        let result = fut.instrument(span).await;
        record_request(operation, outcome(&result), start.elapsed());

        result
    }

    async fn handle_error_response(status: StatusCode, url: &str, response: Response) -> FirestoreError {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        FirestoreError::from_http_status(status.as_u16(), format!("{} failed: {}", url, body)).with_retry_after(retry_after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_from_env_validates_project_id() {
        std::env::remove_var("GCP_PROJECT_ID");
        std::env::remove_var("FIREBASE_PROJECT_ID");
        let result = FirestoreConfig::from_env();
        assert!(matches!(result, Err(FirestoreError::Auth(_))));
    }

    #[test]
    #[serial]
    fn test_config_emulator_root() {
        std::env::set_var("GCP_PROJECT_ID", "demo");
        std::env::set_var("FIRESTORE_EMULATOR_HOST", "localhost:8080");
        let config = FirestoreConfig::from_env().unwrap();
        assert_eq!(config.database_id, "(default)");
        assert_eq!(config.api_root(), "http://localhost:8080");

        std::env::remove_var("FIRESTORE_EMULATOR_HOST");
        let config = FirestoreConfig::from_env().unwrap();
        assert_eq!(config.api_root(), PRODUCTION_ROOT);
        std::env::remove_var("GCP_PROJECT_ID");
    }
}
