//! Error types for manifest loading and resource resolution.

use thiserror::Error;

use crate::download::DownloadError;

/// Errors that can occur while loading or reading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest could not be retrieved.
    #[error("failed to load manifest from {url}: {source}")]
    Fetch {
        /// Manifest URL.
        url: String,
        /// Transport or status error.
        #[source]
        source: DownloadError,
    },

    /// The response body is not JSON.
    #[error("manifest at {url} is not valid JSON: {source}")]
    Parse {
        /// Manifest URL.
        url: String,
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },

    /// The document parsed but holds nothing.
    #[error("manifest at {url} is empty")]
    Empty {
        /// Manifest URL.
        url: String,
    },

    /// No resolver strategy understood the document layout.
    #[error("no image resources found: unrecognized manifest layout (tried {tried})")]
    UnrecognizedSchema {
        /// Names of the strategies that were tried.
        tried: String,
    },

    /// Resources were requested before the manifest was loaded.
    #[error("manifest {url} has not been loaded")]
    NotLoaded {
        /// Manifest URL.
        url: String,
    },
}

impl ManifestError {
    /// Creates a fetch error.
    pub fn fetch(url: impl Into<String>, source: DownloadError) -> Self {
        Self::Fetch {
            url: url.into(),
            source,
        }
    }

    /// Creates a parse error.
    pub fn parse(url: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Parse {
            url: url.into(),
            source,
        }
    }

    /// Creates an empty-document error.
    pub fn empty(url: impl Into<String>) -> Self {
        Self::Empty { url: url.into() }
    }

    /// Creates a not-loaded error.
    pub fn not_loaded(url: impl Into<String>) -> Self {
        Self::NotLoaded { url: url.into() }
    }
}
