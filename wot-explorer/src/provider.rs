//! Follow-list and trust provider
//!
//! The provider is the external source of raw follow-graph data and of
//! per-identity trust facts relative to its own local identity. Its trust
//! algorithm is opaque. A provider that is not installed or not ready must be
//! reported as `Unavailable`, never as an empty result.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

/// Errors from provider calls
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Trust provider unavailable: {0}")]
    Unavailable(String),

    #[error("Trust provider request failed: {0}")]
    Request(String),

    #[error("Trust provider returned an unreadable payload: {0}")]
    Decode(String),

    #[error("Trust provider timed out")]
    Timeout,
}

impl ProviderError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ProviderError::Unavailable(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_connect() {
            ProviderError::Unavailable(e.to_string())
        } else if e.is_decode() {
            ProviderError::Decode(e.to_string())
        } else {
            ProviderError::Request(e.to_string())
        }
    }
}

/// Distance and path count of one identity, as the provider sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub distance: u32,
    #[serde(default)]
    pub paths: Option<u32>,
}

/// External follow-list/trust provider
#[async_trait]
pub trait TrustProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// The provider's own identity
    async fn local_identity(&self) -> Result<String, ProviderError>;

    /// Outbound follows of `id`, in provider order
    async fn follows(&self, id: &str) -> Result<Vec<String>, ProviderError>;

    /// Resolve distance and path count for a batch; unknown ids are omitted
    async fn resolve_batch(&self, ids: &[String]) -> Result<HashMap<String, Resolution>, ProviderError>;
}

/// Thread-safe reference to a provider
pub type SharedProvider = Arc<dyn TrustProvider>;

/// HTTP provider configuration
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    /// Base URL, e.g. `http://127.0.0.1:7777`
    pub base_url: String,
    pub request_timeout: Duration,
}

impl HttpProviderConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Deserialize)]
struct IdentityResponse {
    pubkey: String,
}

#[derive(Deserialize)]
struct FollowsResponse {
    #[serde(default)]
    follows: Vec<String>,
}

#[derive(Serialize)]
struct DistanceRequest<'a> {
    pubkeys: &'a [String],
}

#[derive(Deserialize)]
struct DistanceResponse {
    #[serde(default)]
    results: HashMap<String, Resolution>,
}

/// Provider reached over a local HTTP bridge
///
/// - `GET {base}/identity` → `{"pubkey": ..}`
/// - `GET {base}/follows/{id}` → `{"follows": [..]}`
/// - `POST {base}/distance` `{"pubkeys": [..]}` → `{"results": {id: {"distance", "paths"}}}`
///
/// A refused connection or a `503` means the provider is not running.
pub struct HttpTrustProvider {
    client: Client,
    config: HttpProviderConfig,
}

impl HttpTrustProvider {
    pub fn new(config: HttpProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent("wot-explorer/0.1")
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn shared(config: HttpProviderConfig) -> Result<SharedProvider, ProviderError> {
        Ok(Arc::new(Self::new(config)?))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(ProviderError::Unavailable("provider not ready".to_string()));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Request(format!("HTTP {}: {}", status, text)));
        }
        Ok(response)
    }
}

#[async_trait]
impl TrustProvider for HttpTrustProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn local_identity(&self) -> Result<String, ProviderError> {
        let response = self.client.get(self.url("/identity")).send().await?;
        let body: IdentityResponse = Self::check(response).await?.json().await?;
        Ok(body.pubkey)
    }

    async fn follows(&self, id: &str) -> Result<Vec<String>, ProviderError> {
        let response = self
            .client
            .get(self.url(&format!("/follows/{}", id)))
            .send()
            .await?;
        let body: FollowsResponse = Self::check(response).await?.json().await?;
        trace!("Provider returned {} follows for {}", body.follows.len(), id);
        Ok(body.follows)
    }

    async fn resolve_batch(&self, ids: &[String]) -> Result<HashMap<String, Resolution>, ProviderError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let response = self
            .client
            .post(self.url("/distance"))
            .json(&DistanceRequest { pubkeys: ids })
            .send()
            .await?;
        let body: DistanceResponse = Self::check(response).await?.json().await?;
        debug!("Provider resolved {}/{} identities", body.results.len(), ids.len());
        Ok(body.results)
    }
}

/// Provider backed by in-process tables
///
/// Counts calls and can simulate slowness or absence. Used for offline
/// sessions and tests.
#[derive(Default)]
pub struct MemoryTrustProvider {
    identity: Option<String>,
    follows: HashMap<String, Vec<String>>,
    resolutions: Mutex<HashMap<String, Resolution>>,
    delay: Option<Duration>,
    unavailable: bool,
    follow_calls: AtomicUsize,
    resolve_calls: AtomicUsize,
}

impl MemoryTrustProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(mut self, id: &str) -> Self {
        self.identity = Some(id.to_string());
        self
    }

    pub fn with_follows<I, S>(mut self, id: &str, follows: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.follows
            .insert(id.to_string(), follows.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_resolution(self, id: &str, distance: u32, paths: Option<u32>) -> Self {
        self.set_resolution(id, distance, paths);
        self
    }

    /// Delay every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Report the provider as not installed
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Change what later `resolve_batch` calls return
    pub fn set_resolution(&self, id: &str, distance: u32, paths: Option<u32>) {
        self.resolutions
            .lock()
            .insert(id.to_string(), Resolution { distance, paths });
    }

    pub fn follow_calls(&self) -> usize {
        self.follow_calls.load(Ordering::SeqCst)
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    async fn ready(&self) -> Result<(), ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable {
            return Err(ProviderError::Unavailable("not installed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TrustProvider for MemoryTrustProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn local_identity(&self) -> Result<String, ProviderError> {
        self.ready().await?;
        self.identity
            .clone()
            .ok_or_else(|| ProviderError::Unavailable("no local identity".to_string()))
    }

    async fn follows(&self, id: &str) -> Result<Vec<String>, ProviderError> {
        self.follow_calls.fetch_add(1, Ordering::SeqCst);
        self.ready().await?;
        Ok(self.follows.get(id).cloned().unwrap_or_default())
    }

    async fn resolve_batch(&self, ids: &[String]) -> Result<HashMap<String, Resolution>, ProviderError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        self.ready().await?;
        let table = self.resolutions.lock();
        Ok(ids
            .iter()
            .filter_map(|id| table.get(id).map(|r| (id.clone(), *r)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_response_parsing() {
        let body = r#"{"results":{"aa":{"distance":2,"paths":4},"bb":{"distance":3,"paths":null},"cc":{"distance":1}}}"#;
        let parsed: DistanceResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.results["aa"], Resolution { distance: 2, paths: Some(4) });
        assert_eq!(parsed.results["bb"].paths, None);
        assert_eq!(parsed.results["cc"].paths, None);
    }

    #[test]
    fn test_base_url_normalized() {
        let config = HttpProviderConfig::new("http://127.0.0.1:7777/");
        let provider = HttpTrustProvider::new(config).unwrap();
        assert_eq!(provider.url("/identity"), "http://127.0.0.1:7777/identity");
    }

    #[tokio::test]
    async fn test_refused_connection_is_unavailable() {
        // nothing listens on port 9 locally
        let config = HttpProviderConfig::new("http://127.0.0.1:9").with_timeout(Duration::from_secs(2));
        let provider = HttpTrustProvider::new(config).unwrap();
        let err = provider.follows("aa").await.unwrap_err();
        assert!(err.is_unavailable(), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_memory_provider() {
        let provider = MemoryTrustProvider::new()
            .with_identity("root")
            .with_follows("root", ["a", "b"])
            .with_resolution("a", 1, Some(3));

        assert_eq!(provider.local_identity().await.unwrap(), "root");
        assert_eq!(provider.follows("root").await.unwrap(), vec!["a", "b"]);
        assert!(provider.follows("nobody").await.unwrap().is_empty());
        assert_eq!(provider.follow_calls(), 2);

        let resolved = provider
            .resolve_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved["a"].paths, Some(3));
    }

    #[tokio::test]
    async fn test_unavailable_is_distinct_from_empty() {
        let provider = MemoryTrustProvider::new().unavailable();
        assert!(provider.follows("a").await.unwrap_err().is_unavailable());
        assert!(provider.local_identity().await.unwrap_err().is_unavailable());
    }
}
