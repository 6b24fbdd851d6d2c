//! Per-image acquisition.
//!
//! An [`Image`] moves through [`AcquisitionState`]:
//!
//! ```text
//! Unchecked ──check ok──▶ Saved
//!     │
//!     └─▶ RequestedMax ──ok──▶ Saved
//!              │
//!              └─failure─▶ RequestedReduced ──ok──▶ Saved
//!                                 │
//!                                 └─failure─▶ Failed
//! ```
//!
//! A failed reduced request can only lead to `Failed`, so no image is ever
//! requested more than twice. A body cut short beyond the tolerance band is
//! a failure like any other; local I/O and encode errors fail immediately.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::client::{FetchedImage, HttpClient};
use super::codec::{self, Dimensions};
use super::constants::MAX_TOLERATED_MISSING_BYTES;
use super::engine::DownloadStats;
use super::error::DownloadError;
use super::size::{SizeRequest, max_size, reduced_size};
use super::throttle::ProviderDelays;
use crate::manifest::ImageResource;
use crate::sidecar::Sidecar;

/// Shared collaborators for every acquisition of one manifest run.
#[derive(Debug, Clone)]
pub struct AcquireContext {
    /// HTTP client for image requests.
    pub client: HttpClient,
    /// Pre-request delays.
    pub delays: ProviderDelays,
    /// Attempt log and failure ledger.
    pub sidecar: Arc<Sidecar>,
    /// In-flight and outcome counters.
    pub stats: Arc<DownloadStats>,
    /// Save bodies missing at most a couple of bytes.
    pub allow_truncation: bool,
    /// DPI written into saved JPEGs.
    pub max_resolution: u16,
}

/// Where an image is in its acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    /// Nothing checked or requested yet.
    Unchecked,
    /// First request, at the maximum negotiated size.
    RequestedMax(SizeRequest),
    /// Single fallback request, at the reduced size.
    RequestedReduced(SizeRequest),
    /// A valid file is on disk.
    Saved,
    /// Terminal failure, recorded in the ledger.
    Failed,
}

impl AcquisitionState {
    /// Size of the request this state issues, if it issues one.
    #[must_use]
    pub fn request(self) -> Option<SizeRequest> {
        match self {
            Self::RequestedMax(size) | Self::RequestedReduced(size) => Some(size),
            _ => None,
        }
    }

    /// Number of requests issued once this state is reached.
    #[must_use]
    pub fn attempts(self) -> u8 {
        match self {
            Self::RequestedMax(_) => 1,
            Self::RequestedReduced(_) => 2,
            _ => 0,
        }
    }

    /// Whether the state is `Saved` or `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Saved | Self::Failed)
    }
}

/// Result of acquiring one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImageOutcome {
    /// A file already on disk passed [`Image::check`]; no request was made.
    AlreadyValid {
        /// 1-based manifest position.
        index: usize,
    },
    /// The image was downloaded and saved.
    Saved {
        /// 1-based manifest position.
        index: usize,
        /// URL of the successful request.
        url: String,
        /// Requests issued (1 or 2).
        attempts: u8,
    },
    /// The image could not be acquired.
    Failed {
        /// 1-based manifest position.
        index: usize,
        /// URL of the last request.
        url: String,
        /// Requests issued (1 or 2; 0 for an unusable base URL).
        attempts: u8,
        /// Rendered error.
        error: String,
    },
}

impl ImageOutcome {
    /// 1-based manifest position.
    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            Self::AlreadyValid { index }
            | Self::Saved { index, .. }
            | Self::Failed { index, .. } => *index,
        }
    }

    /// Whether a valid file is on disk.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Requests issued for this image.
    #[must_use]
    pub fn attempts(&self) -> u8 {
        match self {
            Self::AlreadyValid { .. } => 0,
            Self::Saved { attempts, .. } | Self::Failed { attempts, .. } => *attempts,
        }
    }

    /// URL of the last request, if any was made.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::AlreadyValid { .. } => None,
            Self::Saved { url, .. } | Self::Failed { url, .. } => Some(url),
        }
    }
}

/// One image of a manifest.
#[derive(Debug, Clone)]
pub struct Image {
    index: usize,
    base_url: String,
    height: Option<u32>,
    width: Option<u32>,
    file_name: String,
    dir: PathBuf,
    max_dim: Option<u32>,
    min_dim: Option<u32>,
    state: AcquisitionState,
}

impl Image {
    /// Creates the image at 1-based position `index`.
    #[must_use]
    pub fn new(
        index: usize,
        resource: &ImageResource,
        dir: &Path,
        max_dim: Option<u32>,
        min_dim: Option<u32>,
    ) -> Self {
        Self {
            index,
            base_url: resource.service_id.clone(),
            height: resource.height,
            width: resource.width,
            file_name: format!("{index:04}.jpg"),
            dir: dir.to_path_buf(),
            max_dim,
            min_dim,
            state: AcquisitionState::Unchecked,
        }
    }

    /// 1-based manifest position.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Image service base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Output file name, `NNNN.jpg`.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Full output path.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    /// Current acquisition state.
    #[must_use]
    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    /// Size of the current (or last) request.
    #[must_use]
    pub fn size(&self) -> Option<SizeRequest> {
        self.state.request()
    }

    /// Request URL for a given size.
    #[must_use]
    pub fn sized_url(&self, size: SizeRequest) -> String {
        format!("{}/full/{size}/0/default.jpg", self.base_url)
    }

    /// Whether a file already on disk satisfies the size contract.
    ///
    /// With a ceiling, the stored long side must not exceed it and must reach
    /// the smaller of the floor and the declared long side. Without a
    /// ceiling, every declared dimension must match exactly.
    #[must_use]
    pub fn check(&self) -> bool {
        let path = self.path();
        if !path.exists() {
            return false;
        }

        match codec::probe_dimensions(&path) {
            Ok(stored) => self.satisfied_by(stored),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "existing file unreadable");
                false
            }
        }
    }

    fn satisfied_by(&self, stored: Dimensions) -> bool {
        let Some(max_dim) = self.max_dim else {
            return self.height.is_none_or(|h| h == stored.height)
                && self.width.is_none_or(|w| w == stored.width);
        };

        if stored.long_side() > max_dim {
            return false;
        }

        let declared_long = match (self.height, self.width) {
            (None, None) => None,
            (h, w) => Some(h.unwrap_or(0).max(w.unwrap_or(0))),
        };
        let floor = match (self.min_dim, declared_long) {
            (Some(min), Some(long)) => min.min(long),
            (Some(min), None) => min,
            (None, _) => 0,
        };
        stored.long_side() >= floor
    }

    /// Moves to the first request.
    fn begin(&mut self) {
        let size = max_size(self.height, self.width, self.max_dim);
        self.state = AcquisitionState::RequestedMax(size);
    }

    /// Moves to the fallback request, or to `Failed` after the fallback.
    fn fail_attempt(&mut self) {
        self.state = match self.state {
            AcquisitionState::RequestedMax(_) => AcquisitionState::RequestedReduced(
                reduced_size(self.height, self.width, self.min_dim),
            ),
            _ => AcquisitionState::Failed,
        };
    }

    /// Acquires the image, never issuing more than two requests.
    ///
    /// Errors never escape: a terminal failure is written to the sidecar and
    /// the ledger and returned as [`ImageOutcome::Failed`].
    #[instrument(skip(self, ctx), fields(index = self.index, url = %self.base_url))]
    pub async fn acquire(&mut self, ctx: &AcquireContext) -> ImageOutcome {
        if self.check() {
            self.state = AcquisitionState::Saved;
            debug!("already on disk");
            return ImageOutcome::AlreadyValid { index: self.index };
        }

        self.begin();

        while let Some(size) = self.state.request() {
            let attempts = self.state.attempts();
            let url = self.sized_url(size);

            match self.attempt(ctx, &url).await {
                Ok(dims) => {
                    self.state = AcquisitionState::Saved;
                    info!(
                        size = %size,
                        attempts,
                        width = dims.width,
                        height = dims.height,
                        "image saved"
                    );
                    return ImageOutcome::Saved {
                        index: self.index,
                        url,
                        attempts,
                    };
                }
                Err(e) if is_retryable(&e) => {
                    self.fail_attempt();
                    if let Some(next) = self.state.request() {
                        ctx.stats.increment_retried();
                        warn!(
                            size = %size,
                            retry_size = %next,
                            error = %e,
                            "retrying at reduced size"
                        );
                        continue;
                    }
                    return self.terminal_failure(ctx, url, attempts, &e);
                }
                Err(e) => {
                    self.state = AcquisitionState::Failed;
                    return self.terminal_failure(ctx, url, attempts, &e);
                }
            }
        }

        // Only reachable if the state machine gains a non-request state above.
        ImageOutcome::Failed {
            index: self.index,
            url: self.base_url.clone(),
            attempts: self.state.attempts(),
            error: "acquisition ended without a result".to_string(),
        }
    }

    async fn attempt(&self, ctx: &AcquireContext, url: &str) -> Result<Dimensions, DownloadError> {
        ctx.delays.pace(url).await;

        if let Err(e) = ctx.sidecar.record_attempt(self.index, url) {
            warn!(error = %e, "failed to record attempt");
        }

        let fetched = {
            let _in_flight = ctx.stats.track_request();
            ctx.client.fetch_image(url).await?
        };

        if !fetched.is_image() {
            self.save_diagnostic(&fetched);
            return Err(DownloadError::not_an_image(url, &fetched.content_type));
        }

        if let Err(e) = fetched.ensure_complete(url) {
            let missing = fetched.missing_bytes();
            if !ctx.allow_truncation || missing > MAX_TOLERATED_MISSING_BYTES {
                return Err(e);
            }
            warn!(missing, "image truncated, saving anyway");
        }

        codec::decode_and_save(
            url.to_string(),
            fetched.body,
            self.path(),
            self.max_dim,
            ctx.max_resolution,
        )
        .await
    }

    /// Keeps a non-image body next to the expected output for inspection.
    fn save_diagnostic(&self, fetched: &FetchedImage) {
        let path = self.dir.join(format!("{}.txt", self.file_name));
        if let Err(e) = std::fs::write(&path, String::from_utf8_lossy(&fetched.body).as_bytes()) {
            warn!(path = %path.display(), error = %e, "failed to save response body");
        }
    }

    fn terminal_failure(
        &self,
        ctx: &AcquireContext,
        url: String,
        attempts: u8,
        error: &DownloadError,
    ) -> ImageOutcome {
        warn!(url = %url, attempts, error = %error, "image failed");
        if let Err(e) = ctx.sidecar.record_failure(&self.path(), &url, error) {
            warn!(error = %e, "failed to record image failure");
        }
        ImageOutcome::Failed {
            index: self.index,
            url,
            attempts,
            error: error.to_string(),
        }
    }
}

/// Failures a second, smaller request may fix. Local disk, encode and
/// worker errors do not qualify.
fn is_retryable(error: &DownloadError) -> bool {
    !matches!(
        error,
        DownloadError::Io { .. } | DownloadError::Encode { .. } | DownloadError::Worker { .. }
    )
}
