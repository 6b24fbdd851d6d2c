//! Error types for the download module.
//!
//! This module defines structured errors for image acquisition, providing
//! context-rich messages for the failure ledger and console output.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching, decoding or saving one image.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error while saving an image or its diagnostics.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The server answered with something other than an image.
    #[error("incorrect MIME type ({content_type}) for {url}")]
    NotAnImage {
        /// The requested URL.
        url: String,
        /// The Content-Type the server sent (empty when missing).
        content_type: String,
    },

    /// The body could not be decoded as an image.
    #[error("failed to decode image from {url}: {source}")]
    Undecodable {
        /// The requested URL.
        url: String,
        /// The decoder error.
        #[source]
        source: image::ImageError,
    },

    /// The body ended before the declared Content-Length.
    #[error("image was truncated by {missing} bytes ({received} of {expected}) for {url}")]
    Truncated {
        /// The requested URL.
        url: String,
        /// Declared Content-Length.
        expected: u64,
        /// Bytes actually received.
        received: u64,
        /// `expected - received`.
        missing: u64,
    },

    /// Re-encoding the decoded image failed.
    #[error("failed to encode {path}: {source}")]
    Encode {
        /// Output path being written.
        path: PathBuf,
        /// The encoder error.
        #[source]
        source: image::ImageError,
    },

    /// A blocking decode/encode worker panicked or was cancelled.
    #[error("image worker failed for {url}: {source}")]
    Worker {
        /// The URL whose body was being processed.
        url: String,
        /// The join error from the blocking pool.
        #[source]
        source: tokio::task::JoinError,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Maps a reqwest error to `Timeout` or `Network`.
    pub fn from_request(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::timeout(url)
        } else {
            Self::network(url, source)
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a wrong-content-type error.
    pub fn not_an_image(url: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self::NotAnImage {
            url: url.into(),
            content_type: content_type.into(),
        }
    }

    /// Creates a decode error.
    pub fn undecodable(url: impl Into<String>, source: image::ImageError) -> Self {
        Self::Undecodable {
            url: url.into(),
            source,
        }
    }

    /// Creates a truncated-body error.
    pub fn truncated(url: impl Into<String>, expected: u64, received: u64) -> Self {
        Self::Truncated {
            url: url.into(),
            expected,
            received,
            missing: expected.saturating_sub(received),
        }
    }

    /// Creates an encode error.
    pub fn encode(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Encode {
            path: path.into(),
            source,
        }
    }

    /// Creates a blocking-worker error.
    pub fn worker(url: impl Into<String>, source: tokio::task::JoinError) -> Self {
        Self::Worker {
            url: url.into(),
            source,
        }
    }

    /// Returns the number of missing bytes for a truncated body.
    #[must_use]
    pub fn missing_bytes(&self) -> Option<u64> {
        match self {
            Self::Truncated { missing, .. } => Some(*missing),
            _ => None,
        }
    }
}
