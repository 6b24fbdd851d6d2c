//! Image acquisition from IIIF Image API services.
//!
//! This module turns resolved image resources into JPEG files on disk: it
//! negotiates request sizes, fetches under bounded concurrency with
//! per-provider pacing, validates and re-encodes the result, and retries once
//! at a reduced size on failure.
//!
//! # Features
//!
//! - Two-tier size negotiation (maximum, then reduced)
//! - Explicit per-image state machine bounding requests to two
//! - Idempotent re-runs: valid files on disk are never re-downloaded
//! - Semaphore-bounded concurrency (5 by default)
//! - Per-provider pre-request delays
//!
//! # Example
//!
//! ```no_run
//! use iiif_download_core::DownloadConfig;
//! use iiif_download_core::download::ManifestDownloader;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = ManifestDownloader::new(DownloadConfig::default())?;
//! let report = downloader
//!     .download("https://iiif.example.org/ms1/manifest.json", None)
//!     .await;
//! assert!(report.images_downloaded <= report.images_total);
//! # Ok(())
//! # }
//! ```

mod client;
pub mod codec;
pub mod constants;
mod engine;
mod error;
mod image;
mod size;
mod throttle;

pub use client::{FetchedImage, HttpClient};
pub use engine::{
    AcquisitionEngine, DEFAULT_CONCURRENCY, DownloadStats, EngineError, EngineRun, FailureRecord,
    MAX_CONCURRENCY, MIN_CONCURRENCY, ManifestDownloader, ManifestReport,
};
pub use error::DownloadError;
pub use image::{AcquireContext, AcquisitionState, Image, ImageOutcome};
pub use size::{SizeRequest, max_size, reduced_size};
pub use throttle::{ProviderDelays, extract_domain};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
