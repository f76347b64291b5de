//! Transport
//!
//! The network boundary of the fetch cache. A [`Transport`] turns a key into
//! bytes and classifies every failure as a [`FetchError`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::{Client, Url};
use tracing::debug;

use crate::error::{FetchError, Result};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 1024;

/// Upstream error bodies are truncated to this many bytes
pub const MAX_ERROR_BODY: usize = 1024;

// == Transport Trait ==
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Retrieves the bytes stored under `key`.
    async fn fetch(&self, key: &str) -> Result<Bytes>;
}

// == Closure Transport ==
/// Adapts an async closure into a [`Transport`].
pub struct FnTransport<F>(F);

/// Wraps `f` so it can be used wherever a [`Transport`] is expected.
pub fn transport_fn<F, Fut>(f: F) -> FnTransport<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes>> + Send + 'static,
{
    FnTransport(f)
}

#[async_trait]
impl<F, Fut> Transport for FnTransport<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes>> + Send + 'static,
{
    async fn fetch(&self, key: &str) -> Result<Bytes> {
        (self.0)(key.to_string()).await
    }
}

// == HTTP Transport ==
/// Fetches `GET {base_url}{key}` with reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    timeout: Duration,
    /// Largest body accepted, in bytes
    max_body: u64,
}

impl HttpTransport {
    /// Creates a transport resolving keys against `base_url`.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            timeout,
            max_body: u64::MAX,
        })
    }

    /// Rejects response bodies larger than `limit` bytes without buffering them.
    pub fn with_max_body(mut self, limit: u64) -> Self {
        self.max_body = limit;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn max_body(&self) -> u64 {
        self.max_body
    }

    // == URL Resolution ==
    /// Resolves `key` to a URL under the base URL.
    ///
    /// Empty or oversized keys, absolute URLs and keys escaping the base
    /// path are rejected.
    pub fn url_for(&self, key: &str) -> Result<Url> {
        if key.is_empty() {
            return Err(FetchError::InvalidKey("key cannot be empty".to_string()));
        }
        if key.len() > MAX_KEY_LENGTH {
            return Err(FetchError::InvalidKey(format!(
                "key exceeds maximum length of {} bytes",
                MAX_KEY_LENGTH
            )));
        }
        if key.starts_with('/') || Url::parse(key).is_ok() {
            return Err(FetchError::InvalidKey(format!(
                "key must be a relative path: {}",
                key
            )));
        }

        let url = self
            .base_url
            .join(key)
            .map_err(|e| FetchError::InvalidKey(format!("{}: {}", key, e)))?;

        if !url.as_str().starts_with(self.base_url.as_str()) {
            return Err(FetchError::InvalidKey(format!(
                "key resolves outside the upstream: {}",
                key
            )));
        }
        Ok(url)
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else if err.is_connect() {
            FetchError::Unavailable(err.to_string())
        } else if err.is_builder() {
            FetchError::InvalidKey(err.to_string())
        } else if err.is_decode() || err.is_body() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::NoResponse
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, key: &str) -> Result<Bytes> {
        let url = self.url_for(key)?;
        debug!(key, url = %url, "Fetching from upstream");

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = BytesMut::new();
            while body.len() < MAX_ERROR_BODY {
                match response.chunk().await {
                    Ok(Some(chunk)) => body.extend_from_slice(&chunk),
                    _ => break,
                }
            }
            let body = String::from_utf8_lossy(&body[..body.len().min(MAX_ERROR_BODY)]).into_owned();
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let limit = self.max_body;
        if let Some(size) = response.content_length() {
            if size > limit {
                return Err(FetchError::BodyTooLarge { size, limit });
            }
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.classify(e))? {
            let size = (body.len() + chunk.len()) as u64;
            if size > limit {
                return Err(FetchError::BodyTooLarge { size, limit });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }
}
