//! HTTP client wrapper for manifests and IIIF image requests.
//!
//! This module provides the `HttpClient` struct which fetches manifest JSON
//! documents and streams image bodies into memory, keeping enough metadata
//! (content type, declared length) for the acquisition state machine to
//! classify the response.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, DEFAULT_USER_AGENT, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use crate::manifest::ManifestError;

/// HTTP client for manifest and image requests.
///
/// This client is designed to be created once per run and shared by every
/// acquisition task, taking advantage of connection pooling.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

/// A fully or partially received image response.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    /// Value of the Content-Type header (empty when missing).
    pub content_type: String,
    /// Body bytes received.
    pub body: Vec<u8>,
    /// Declared Content-Length, when the server sent one.
    pub expected_len: Option<u64>,
}

impl FetchedImage {
    /// Returns whether the Content-Type announces an image.
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.content_type.to_ascii_lowercase().contains("image")
    }

    /// Returns how many declared bytes never arrived.
    #[must_use]
    pub fn missing_bytes(&self) -> u64 {
        self.expected_len
            .map_or(0, |expected| expected.saturating_sub(self.body.len() as u64))
    }

    /// Returns a truncation error when the body is shorter than declared.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Truncated`] when bytes are missing.
    pub fn ensure_complete(&self, url: &str) -> Result<(), DownloadError> {
        match self.expected_len {
            Some(expected) if self.missing_bytes() > 0 => Err(DownloadError::truncated(
                url,
                expected,
                self.body.len() as u64,
            )),
            _ => Ok(()),
        }
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts and User-Agent.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_settings(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            Duration::from_secs(READ_TIMEOUT_SECS),
            DEFAULT_USER_AGENT,
        )
    }

    /// Creates a new HTTP client with explicit timeouts and User-Agent.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error if the TLS backend cannot be initialized.
    #[instrument(level = "debug", skip(user_agent))]
    pub fn with_settings(
        connect_timeout: Duration,
        read_timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .gzip(true)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    /// Fetches and parses a manifest document.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Fetch`] for transport or status failures and
    /// [`ManifestError::Parse`] when the body is not JSON.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get_json(&self, url: &str) -> Result<Value, ManifestError> {
        let response = self
            .send_request(url)
            .await
            .map_err(|e| ManifestError::fetch(url, e))?;
        let text = response
            .text()
            .await
            .map_err(|e| ManifestError::fetch(url, DownloadError::from_request(url, e)))?;
        serde_json::from_str(&text).map_err(|e| ManifestError::parse(url, e))
    }

    /// Streams an image response body into memory.
    ///
    /// A body that breaks off before its declared Content-Length is returned
    /// as a partial [`FetchedImage`] so the caller can apply its truncation
    /// policy; other stream errors are returned as errors.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] for invalid URLs, transport failures,
    /// timeouts and non-success statuses.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_image(&self, url: &str) -> Result<FetchedImage, DownloadError> {
        let response = self.send_request(url).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let expected_len = response.content_length();

        let mut body = Vec::with_capacity(
            expected_len
                .and_then(|len| usize::try_from(len).ok())
                .unwrap_or(0),
        );
        let mut stream = response.bytes_stream();
        while let Some(chunk_result) = stream.next().await {
            match chunk_result {
                Ok(chunk) => body.extend_from_slice(&chunk),
                Err(e) if expected_len.is_some_and(|len| (body.len() as u64) < len) => {
                    warn!(
                        received = body.len(),
                        expected = expected_len,
                        error = %e,
                        "image body ended early"
                    );
                    break;
                }
                Err(e) => return Err(DownloadError::from_request(url, e)),
            }
        }

        debug!(bytes = body.len(), content_type = %content_type, "image body received");

        Ok(FetchedImage {
            content_type,
            body,
            expected_len,
        })
    }

    async fn send_request(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::from_request(url, e))?;

        if !response.status().is_success() {
            return Err(DownloadError::http_status(url, response.status().as_u16()));
        }

        Ok(response)
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}
