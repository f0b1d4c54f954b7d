// src/utils/http.rs

//! HTTP fetch collaborator for search result pages.

use std::time::Duration;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use tokio::sync::Semaphore;

use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;

/// Fetches one page of markup.
///
/// Retries, throttling and request de-duplication belong to the implementation;
/// callers fetch each URL at most once.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Create a configured asynchronous HTTP client.
///
/// The configured cookie is attached to every request.
pub fn create_async_client(config: &CrawlerConfig) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    if !config.cookie.trim().is_empty() {
        let value = HeaderValue::from_str(config.cookie.trim())
            .map_err(|e| AppError::config(format!("crawler.cookie is not a valid header: {e}")))?;
        headers.insert(COOKIE, value);
    }

    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .default_headers(headers)
        .build()?;
    Ok(client)
}

/// `PageFetcher` backed by reqwest.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &CrawlerConfig) -> Result<Self> {
        Ok(Self::new(create_async_client(config)?))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::fetch(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::fetch(url, format!("status {status}")));
        }
        Ok(response.text().await?)
    }
}

/// Caps the number of fetches in flight across every user of one instance.
pub struct BoundedFetcher {
    inner: Arc<dyn PageFetcher>,
    permits: Semaphore,
}

impl BoundedFetcher {
    pub fn new(inner: Arc<dyn PageFetcher>, limit: usize) -> Self {
        Self {
            inner,
            permits: Semaphore::new(limit.max(1)),
        }
    }
}

#[async_trait]
impl PageFetcher for BoundedFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| AppError::fetch(url, e))?;
        self.inner.fetch(url).await
    }
}
