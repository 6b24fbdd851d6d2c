//! Batch input parsing and sequential manifest processing.
//!
//! Manifests are processed one after another; a failing manifest is reported
//! and the batch moves on.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::download::{ManifestDownloader, ManifestReport};

/// Errors reading a batch file.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The manifest list could not be read.
    #[error("failed to read manifest list {path}: {source}")]
    Read {
        /// List file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Extracts manifest URLs from newline-delimited text.
///
/// Blank lines and lines starting with `#` are skipped.
///
/// # Examples
///
/// ```
/// use iiif_download_core::batch::parse_manifest_list;
///
/// let text = "# shelf A\nhttps://x.org/1/manifest.json\n\n  https://x.org/2/manifest.json  \n";
/// let urls = parse_manifest_list(text);
/// assert_eq!(urls, ["https://x.org/1/manifest.json", "https://x.org/2/manifest.json"]);
/// ```
#[must_use]
pub fn parse_manifest_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Reads and parses a manifest list file.
///
/// # Errors
///
/// Returns [`BatchError::Read`] if the file cannot be read.
pub fn read_manifest_list(path: &Path) -> Result<Vec<String>, BatchError> {
    let text = fs::read_to_string(path).map_err(|source| BatchError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_manifest_list(&text))
}

/// Totals over a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    /// One report per manifest, in input order.
    pub reports: Vec<ManifestReport>,
}

impl BatchSummary {
    /// Manifests that loaded and saved every image.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.reports.iter().filter(|r| r.is_success()).count()
    }

    /// Manifests with any failure.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.reports.len() - self.succeeded()
    }

    /// Images on disk across all manifests.
    #[must_use]
    pub fn images_downloaded(&self) -> usize {
        self.reports.iter().map(|r| r.images_downloaded).sum()
    }

    /// Images attempted across all manifests.
    #[must_use]
    pub fn images_total(&self) -> usize {
        self.reports.iter().map(|r| r.images_total).sum()
    }

    /// Whether every manifest succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Runs manifests sequentially through a [`ManifestDownloader`].
#[derive(Debug)]
pub struct BatchDownloader {
    downloader: ManifestDownloader,
}

impl BatchDownloader {
    /// Wraps a configured downloader.
    #[must_use]
    pub fn new(downloader: ManifestDownloader) -> Self {
        Self { downloader }
    }

    /// Underlying per-manifest downloader.
    #[must_use]
    pub fn downloader(&self) -> &ManifestDownloader {
        &self.downloader
    }

    /// Downloads every manifest in order, calling `on_report` after each.
    #[instrument(skip(self, urls, on_report), fields(manifests = urls.len()))]
    pub async fn download_all<F>(&self, urls: &[String], mut on_report: F) -> BatchSummary
    where
        F: FnMut(&ManifestReport),
    {
        let mut summary = BatchSummary::default();

        for url in urls {
            let report = self.downloader.download(url, None).await;
            if let Some(error) = &report.error {
                warn!(manifest = %report.url, error = %error, "manifest failed, continuing");
            }
            on_report(&report);
            summary.reports.push(report);
        }

        info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            images = summary.images_downloaded(),
            "batch complete"
        );
        summary
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let urls = parse_manifest_list("\n#comment\n  # indented comment\nhttps://a.org/m\r\n");
        assert_eq!(urls, ["https://a.org/m"]);
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_manifest_list("").is_empty());
    }

    #[test]
    fn test_read_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = read_manifest_list(&tmp.path().join("nope.txt")).unwrap_err();
        assert!(err.to_string().contains("nope.txt"));
    }

    #[test]
    fn test_read_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("manifests.txt");
        fs::write(&path, "https://a.org/1\nhttps://a.org/2\n").unwrap();
        assert_eq!(read_manifest_list(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_summary_counts() {
        let ok = ManifestReport {
            images_total: 3,
            images_downloaded: 3,
            ..ManifestReport::default()
        };
        let broken = ManifestReport {
            error: Some("fetch".to_string()),
            ..ManifestReport::default()
        };
        let summary = BatchSummary {
            reports: vec![ok, broken],
        };
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.images_downloaded(), 3);
        assert!(!summary.is_success());
    }
}
