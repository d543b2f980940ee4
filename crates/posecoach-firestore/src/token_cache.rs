//! Access token caching for Firestore authentication.
//!
//! Tokens are refreshed a minute before expiry under a write lock so that
//! concurrent callers share one refresh. If a refresh fails while the old
//! token is still valid, the old token keeps being served.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use gcp_auth::TokenProvider;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};

const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// TTL assumed when the provider reports none.
const TOKEN_DEFAULT_TTL: Duration = Duration::from_secs(50 * 60);

/// OAuth scope for Firestore REST access.
pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

/// A freshly issued access token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    /// Remaining lifetime, if known.
    pub ttl: Option<Duration>,
}

/// Source of bearer tokens.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch(&self) -> FirestoreResult<IssuedToken>;
}

/// Service-account tokens via `gcp_auth`.
pub struct ServiceAccountSource {
    provider: Arc<dyn TokenProvider>,
}

impl ServiceAccountSource {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl TokenSource for ServiceAccountSource {
    async fn fetch(&self) -> FirestoreResult<IssuedToken> {
        let token = self
            .provider
            .token(&[FIRESTORE_SCOPE])
            .await
            .map_err(|e| FirestoreError::auth(format!("Failed to obtain auth token: {}", e)))?;

        let remaining = token.expires_at() - Utc::now();
        Ok(IssuedToken {
            access_token: token.as_str().to_string(),
            ttl: Some(remaining.to_std().unwrap_or(Duration::ZERO)),
        })
    }
}

/// Fixed token, used against the Firestore emulator.
pub struct StaticTokenSource(pub String);

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn fetch(&self) -> FirestoreResult<IssuedToken> {
        Ok(IssuedToken {
            access_token: self.0.clone(),
            ttl: None,
        })
    }
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + TOKEN_REFRESH_MARGIN < self.expires_at
    }

    fn is_usable(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Thread-safe token cache with single-flight refresh.
pub struct TokenCache {
    source: Arc<dyn TokenSource>,
    cache: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(None),
        }
    }

    /// Drop the cached token so the next call refreshes.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_token(&self) -> FirestoreResult<String> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            if cached.is_fresh(Instant::now()) {
                return Ok(cached.access_token.clone());
            }
        }

        let mut cache = self.cache.write().await;
        let now = Instant::now();

        // another task may have refreshed while we waited
        if let Some(cached) = cache.as_ref() {
            if cached.is_fresh(now) {
                return Ok(cached.access_token.clone());
            }
        }

        match self.source.fetch().await {
            Ok(issued) => {
                let ttl = issued.ttl.unwrap_or(TOKEN_DEFAULT_TTL);
                *cache = Some(CachedToken {
                    access_token: issued.access_token.clone(),
                    expires_at: now + ttl,
                });
                debug!(ttl_secs = ttl.as_secs(), "Refreshed Firestore auth token");
                Ok(issued.access_token)
            }
            Err(e) => match cache.as_ref() {
                Some(cached) if cached.is_usable(now) => {
                    warn!("Token refresh failed, using existing token: {}", e);
                    Ok(cached.access_token.clone())
                }
                _ => Err(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingSource {
        calls: AtomicU32,
        ttl: Option<Duration>,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn fetch(&self) -> FirestoreResult<IssuedToken> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(IssuedToken {
                access_token: format!("token-{}", n),
                ttl: self.ttl,
            })
        }
    }

    #[tokio::test]
    async fn test_token_is_cached() {
        let source = Arc::new(CountingSource {
            calls: AtomicU32::new(0),
            ttl: None,
        });
        let cache = TokenCache::new(source.clone());

        assert_eq!(cache.get_token().await.unwrap(), "token-1");
        assert_eq!(cache.get_token().await.unwrap(), "token-1");
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        cache.invalidate().await;
        assert_eq!(cache.get_token().await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn test_short_lived_token_is_refreshed() {
        let source = Arc::new(CountingSource {
            calls: AtomicU32::new(0),
            ttl: Some(Duration::from_secs(30)),
        });
        let cache = TokenCache::new(source.clone());

        cache.get_token().await.unwrap();
        assert_eq!(cache.get_token().await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn test_static_source() {
        let cache = TokenCache::new(Arc::new(StaticTokenSource("owner".into())));
        assert_eq!(cache.get_token().await.unwrap(), "owner");
    }
}
