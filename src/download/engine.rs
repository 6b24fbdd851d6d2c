//! Concurrent image acquisition and per-manifest orchestration.
//!
//! This module provides the [`AcquisitionEngine`], which runs the images of
//! one manifest concurrently behind a semaphore, and the
//! [`ManifestDownloader`], which loads a manifest, resolves its images, runs
//! them through the engine and writes the run summary.
//!
//! # Example
//!
//! ```no_run
//! use iiif_download_core::DownloadConfig;
//! use iiif_download_core::download::ManifestDownloader;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DownloadConfig::from_env()?;
//! let downloader = ManifestDownloader::new(config)?;
//! let report = downloader
//!     .download("https://iiif.example.org/ms1/manifest.json", None)
//!     .await;
//! println!("{}/{} images", report.images_downloaded, report.images_total);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{debug, error, info, instrument, warn};

use super::client::HttpClient;
use super::constants::DEBUG_IMAGE_LIMIT;
use super::error::DownloadError;
use super::image::{AcquireContext, Image, ImageOutcome};
use crate::config::DownloadConfig;
use crate::manifest::{Manifest, ResolverChain};
use crate::sidecar::Sidecar;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Error type for engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Counters for one engine run.
///
/// Atomic so that concurrent image tasks can update them without locking.
#[derive(Debug, Default)]
pub struct DownloadStats {
    saved: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    retried: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl DownloadStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Images downloaded and saved.
    #[must_use]
    pub fn saved(&self) -> usize {
        self.saved.load(Ordering::SeqCst)
    }

    /// Images already valid on disk.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Images that failed terminally.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Reduced-size retries issued.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    /// Requests currently awaiting a response.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous requests observed.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Total images processed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.saved() + self.skipped() + self.failed()
    }

    pub(crate) fn increment_retried(&self) {
        self.retried.fetch_add(1, Ordering::SeqCst);
    }

    /// Marks a request as in flight until the guard drops.
    pub(crate) fn track_request(&self) -> InFlightGuard<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlightGuard { stats: self }
    }

    fn record(&self, outcome: &ImageOutcome) {
        let counter = match outcome {
            ImageOutcome::AlreadyValid { .. } => &self.skipped,
            ImageOutcome::Saved { .. } => &self.saved,
            ImageOutcome::Failed { .. } => &self.failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Decrements the in-flight counter on drop.
#[derive(Debug)]
pub(crate) struct InFlightGuard<'a> {
    stats: &'a DownloadStats,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Outcomes of one engine run, ordered by image index.
#[derive(Debug, Clone, Default)]
pub struct EngineRun {
    /// Per-image outcomes sorted by index.
    pub outcomes: Vec<ImageOutcome>,
    /// Index to source URL for every processed image.
    pub mapping: BTreeMap<usize, String>,
}

/// Runs the images of one manifest concurrently.
///
/// # Concurrency Model
///
/// - Each image runs in its own Tokio task
/// - A semaphore permit is acquired before spawning each task
/// - Permits are released automatically when the task completes (RAII)
/// - File names are fixed before spawning, so completion order is irrelevant
#[derive(Debug)]
pub struct AcquisitionEngine {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
}

impl AcquisitionEngine {
    /// Creates an engine allowing `concurrency` simultaneous images.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is outside
    /// the valid range (1-100).
    ///
    /// # Example
    ///
    /// ```
    /// use iiif_download_core::download::AcquisitionEngine;
    ///
    /// let engine = AcquisitionEngine::new(5).unwrap();
    /// assert_eq!(engine.concurrency(), 5);
    /// assert!(AcquisitionEngine::new(0).is_err());
    /// ```
    #[instrument(level = "debug")]
    pub fn new(concurrency: usize) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        })
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Acquires every image and collects the outcomes.
    ///
    /// Individual image failures do NOT cause this method to error; they are
    /// returned as [`ImageOutcome::Failed`]. A panicking task is logged and
    /// its image is missing from the result.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SemaphoreClosed`] if the semaphore is closed.
    #[instrument(
        skip(self, images, ctx),
        fields(images = images.len(), concurrency = self.concurrency)
    )]
    pub async fn acquire_all(
        &self,
        images: Vec<Image>,
        ctx: &AcquireContext,
    ) -> Result<EngineRun, EngineError> {
        let mapping: Arc<DashMap<usize, String>> = Arc::new(DashMap::new());
        let mut handles = Vec::with_capacity(images.len());

        for mut image in images {
            let pending = PendingImage {
                index: image.index(),
                base_url: image.base_url().to_string(),
                path: image.path(),
            };
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SemaphoreClosed)?;

            let ctx = ctx.clone();
            let mapping = Arc::clone(&mapping);

            handles.push((pending, tokio::spawn(async move {
                let _permit = permit;

                let outcome = image.acquire(&ctx).await;
                ctx.stats.record(&outcome);
                mapping.insert(
                    outcome.index(),
                    outcome.url().unwrap_or(image.base_url()).to_string(),
                );
                outcome
            })));
        }

        debug!(task_count = handles.len(), "waiting for images to complete");

        let mut outcomes = Vec::with_capacity(handles.len());
        for (pending, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let outcome = panicked(&pending, e, ctx);
                    mapping.insert(pending.index, pending.base_url);
                    outcome
                }
            };
            outcomes.push(outcome);
        }
        outcomes.sort_by_key(ImageOutcome::index);

        let mapping = mapping
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        info!(
            saved = ctx.stats.saved(),
            skipped = ctx.stats.skipped(),
            failed = ctx.stats.failed(),
            retried = ctx.stats.retried(),
            peak_in_flight = ctx.stats.peak_in_flight(),
            "images processed"
        );

        Ok(EngineRun { outcomes, mapping })
    }
}

/// What the join loop needs to account for a task that never returned.
#[derive(Debug)]
struct PendingImage {
    index: usize,
    base_url: String,
    path: PathBuf,
}

/// Turns a panicked or cancelled image task into a recorded failure.
fn panicked(pending: &PendingImage, join_error: JoinError, ctx: &AcquireContext) -> ImageOutcome {
    let error = DownloadError::worker(&pending.base_url, join_error);
    error!(index = pending.index, error = %error, "image task panicked");
    if let Err(e) = ctx.sidecar.record_failure(&pending.path, &pending.base_url, &error) {
        warn!(error = %e, "failed to record image failure");
    }
    let outcome = ImageOutcome::Failed {
        index: pending.index,
        url: pending.base_url.clone(),
        attempts: 0,
        error: error.to_string(),
    };
    ctx.stats.record(&outcome);
    outcome
}

/// A terminal image failure in the run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    /// 1-based manifest position.
    pub index: usize,
    /// URL of the last request.
    pub url: String,
    /// Rendered error.
    pub error: String,
}

/// Summary of one manifest run, also written as `info.json`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ManifestReport {
    /// Manifest URL (percent-decoded).
    pub url: String,
    /// Directory-safe identifier.
    pub uid: String,
    /// Output directory.
    pub dir: PathBuf,
    /// Resolved license.
    pub license: String,
    /// Images attempted.
    pub images_total: usize,
    /// Images valid on disk afterwards.
    pub images_downloaded: usize,
    /// Index to source URL.
    pub images: BTreeMap<usize, String>,
    /// Terminal image failures.
    pub failures: Vec<FailureRecord>,
    /// Manifest-level failure, if the run stopped early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Reduced-size retries issued.
    pub retried: usize,
}

impl ManifestReport {
    fn for_manifest(manifest: &Manifest) -> Self {
        Self {
            url: manifest.url().to_string(),
            uid: manifest.uid().to_string(),
            dir: manifest.dir().to_path_buf(),
            license: manifest.license().to_string(),
            ..Self::default()
        }
    }

    fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// Whether the manifest loaded and every image is on disk.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
            && self.failures.is_empty()
            && self.images_downloaded == self.images_total
    }
}

/// Downloads the images of manifests, one manifest at a time.
#[derive(Debug)]
pub struct ManifestDownloader {
    config: DownloadConfig,
    client: HttpClient,
    engine: AcquisitionEngine,
    chain: ResolverChain,
}

impl ManifestDownloader {
    /// Creates a downloader from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] for an invalid concurrency or an HTTP client
    /// that cannot be built.
    pub fn new(config: DownloadConfig) -> Result<Self, EngineError> {
        let client = HttpClient::with_settings(
            config.connect_timeout,
            config.read_timeout,
            &config.user_agent,
        )
        .map_err(EngineError::Client)?;
        Self::with_client(config, client)
    }

    /// Creates a downloader around an existing client.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] for an out-of-range limit.
    pub fn with_client(config: DownloadConfig, client: HttpClient) -> Result<Self, EngineError> {
        let engine = AcquisitionEngine::new(config.concurrency)?;
        Ok(Self {
            config,
            client,
            engine,
            chain: ResolverChain::default(),
        })
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Downloads every image of one manifest.
    ///
    /// Never fails: manifest-level problems are logged and reported through
    /// [`ManifestReport::error`].
    #[instrument(skip(self, dir_name), fields(manifest = %url))]
    pub async fn download(&self, url: &str, dir_name: Option<&Path>) -> ManifestReport {
        let mut manifest = Manifest::new(url, &self.config.img_dir, dir_name);

        let sidecar = match Sidecar::create(
            manifest.dir(),
            self.config.failure_ledger_path(),
            manifest.url(),
        ) {
            Ok(sidecar) => Arc::new(sidecar),
            Err(e) => {
                error!(
                    error = %e,
                    dir = %manifest.dir().display(),
                    "cannot prepare output directory"
                );
                return ManifestReport::for_manifest(&manifest).with_error(e);
            }
        };

        if let Err(e) = manifest.load(&self.client).await {
            error!(error = %e, "failed to load manifest");
            let report = ManifestReport::for_manifest(&manifest).with_error(e);
            write_report(&sidecar, &report);
            return report;
        }

        if self.config.save_manifest
            && let Some(content) = manifest.content()
            && let Err(e) = sidecar.write_manifest_json(content)
        {
            warn!(error = %e, "failed to save manifest.json");
        }

        if let Err(e) = sidecar.record_license(manifest.license()) {
            warn!(error = %e, "failed to record license");
        }

        let mut images: Vec<Image> = manifest
            .resources(&self.chain)
            .iter()
            .enumerate()
            .map(|(i, resource)| {
                Image::new(
                    i + 1,
                    resource,
                    manifest.dir(),
                    self.config.max_size,
                    self.config.min_size,
                )
            })
            .collect();

        if images.is_empty() {
            warn!("no images found in manifest");
            let report =
                ManifestReport::for_manifest(&manifest).with_error("no images found in manifest");
            write_report(&sidecar, &report);
            return report;
        }

        if self.config.debug && images.len() > DEBUG_IMAGE_LIMIT {
            debug!(limit = DEBUG_IMAGE_LIMIT, "debug mode, truncating image list");
            images.truncate(DEBUG_IMAGE_LIMIT);
        }

        info!(
            images = images.len(),
            dir = %manifest.dir().display(),
            license = manifest.license(),
            "downloading images"
        );

        let ctx = AcquireContext {
            client: self.client.clone(),
            delays: self.config.provider_delays.clone(),
            sidecar: Arc::clone(&sidecar),
            stats: Arc::new(DownloadStats::new()),
            allow_truncation: self.config.allow_truncation,
            max_resolution: self.config.max_resolution,
        };

        let total = images.len();
        let mut report = ManifestReport::for_manifest(&manifest);
        report.images_total = total;

        match self.engine.acquire_all(images, &ctx).await {
            Ok(run) => {
                report.images_downloaded = run.outcomes.iter().filter(|o| o.is_success()).count();
                report.failures = run
                    .outcomes
                    .iter()
                    .filter_map(|outcome| match outcome {
                        ImageOutcome::Failed { index, url, error, .. } => Some(FailureRecord {
                            index: *index,
                            url: url.clone(),
                            error: error.clone(),
                        }),
                        _ => None,
                    })
                    .collect();
                report.images = run.mapping;
                report.retried = ctx.stats.retried();
            }
            Err(e) => {
                error!(error = %e, "image engine stopped");
                report.error = Some(e.to_string());
            }
        }

        write_report(&sidecar, &report);

        info!(
            downloaded = report.images_downloaded,
            total = report.images_total,
            failed = report.failures.len(),
            "manifest complete"
        );
        report
    }
}

fn write_report(sidecar: &Sidecar, report: &ManifestReport) {
    if let Err(e) = sidecar.write_report(report) {
        warn!(error = %e, "failed to write info.json");
    }
}
