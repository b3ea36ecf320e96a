//! HTTP access to mirrors
//!
//! The prober only needs three things from the network: the text of a page
//! (hash files, directory listings), the byte length of a file without
//! downloading it, and the anchors of a directory listing. [`MetadataFetcher`]
//! is that seam; [`HttpClient`] implements it over `reqwest`.

use async_trait::async_trait;
use reqwest::header::CONTENT_LENGTH;
use tracing::debug;

use crate::config::{HttpConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::listing::{Link, extract_links};
use crate::retry::fetch_with_retry;

/// Source of mirror metadata
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    /// GET `url` and return the body as text
    async fn fetch_text(&self, url: &str) -> Result<String>;

    /// HEAD `url` and return its Content-Length
    async fn fetch_content_length(&self, url: &str) -> Result<u64>;

    /// Fetch a directory listing and return its anchors in document order
    async fn list_links(&self, url: &str) -> Result<Vec<Link>> {
        let html = self.fetch_text(url).await?;
        Ok(extract_links(&html))
    }
}

/// `reqwest`-backed fetcher with a connection-level timeout and retries
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    retry: RetryConfig,
}

impl HttpClient {
    /// Create a client from HTTP and retry settings
    ///
    /// # Errors
    /// Returns error if the underlying client cannot be built (e.g. TLS backend failure)
    pub fn new(http: &HttpConfig, retry: RetryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(http.timeout)
            .user_agent(http.user_agent.clone())
            .pool_max_idle_per_host(http.pool_max_idle_per_host)
            .build()?;

        Ok(Self { client, retry })
    }

    async fn get_once(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }

    async fn head_once(&self, url: &str) -> Result<u64> {
        let response = self.client.head(url).send().await?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // HEAD bodies are empty, so the header is the only trustworthy length
        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .ok_or_else(|| Error::MissingContentLength {
                url: url.to_string(),
            })
    }
}

#[async_trait]
impl MetadataFetcher for HttpClient {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        debug!(url, "GET");
        fetch_with_retry(&self.retry, || self.get_once(url)).await
    }

    async fn fetch_content_length(&self, url: &str) -> Result<u64> {
        debug!(url, "HEAD");
        fetch_with_retry(&self.retry, || self.head_once(url)).await
    }
}
