//! IIIF Download Core Library
//!
//! This library retrieves the page images referenced by IIIF Presentation
//! manifests (v2 and v3) and stores them as JPEG files at a size negotiated
//! with the remote IIIF Image API.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - Run configuration built from defaults, environment and CLI
//! - [`manifest`] - Manifest entity and image resource resolution
//! - [`metadata`] - Metadata lookup and license normalization
//! - [`download`] - Size negotiation, acquisition state machine, concurrency engine
//! - [`sidecar`] - Per-manifest `info.txt`/`info.json` and the failure ledger
//! - [`batch`] - Manifest lists and sequential batch processing

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod batch;
pub mod config;
pub mod download;
pub mod manifest;
pub mod metadata;
pub mod sidecar;

// Re-export commonly used types
pub use batch::{BatchDownloader, BatchSummary, parse_manifest_list, read_manifest_list};
pub use config::{ConfigError, DownloadConfig};
pub use download::{
    AcquisitionEngine, DEFAULT_CONCURRENCY, DownloadError, DownloadStats, EngineError, HttpClient,
    ImageOutcome, ManifestDownloader, ManifestReport, ProviderDelays, SizeRequest,
};
pub use manifest::{ImageResource, Manifest, ManifestError, ResolverChain};
pub use metadata::{license, license_url};
pub use sidecar::{Sidecar, SidecarError};
